//! Column schemas for synthetic info tables.

use chrono::{Duration, NaiveDate};
use polars::prelude::*;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use xqdata_data::time::datetime_series;
use xqdata_data::{DataError, Result};

/// Exchanges cycled through for generated `code` values.
const EXCHANGES: [&str; 2] = ["XSHE", "XSHG"];

/// Distinct labels drawn for generic text columns.
const LABELS: usize = 5;

/// Dtype of a generated column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MockColumn {
    /// Text
    Str,
    /// 64-bit integer
    Int,
    /// 64-bit float
    Float,
    /// Boolean
    Bool,
    /// Millisecond timestamp
    Datetime,
}

impl MockColumn {
    fn generate<R: Rng>(&self, name: &str, rows: usize, rng: &mut R) -> Result<Column> {
        let column: Column = match self {
            // Instrument codes are unique so they can serve as a key
            Self::Str if name == "code" => {
                let codes: Vec<String> = (0..rows)
                    .map(|i| format!("{:06}.{}", i + 1, EXCHANGES[i % EXCHANGES.len()]))
                    .collect();
                Series::new(name.into(), codes).into()
            }
            Self::Str => {
                let labels: Vec<String> = (0..rows)
                    .map(|_| format!("{name}_{}", rng.gen_range(0..LABELS)))
                    .collect();
                Series::new(name.into(), labels).into()
            }
            Self::Int => {
                let values: Vec<i64> = (0..rows).map(|_| rng.gen_range(0..1_000)).collect();
                Series::new(name.into(), values).into()
            }
            Self::Float => {
                let values: Vec<f64> = (0..rows).map(|_| rng.gen_range(0.0..100.0)).collect();
                Series::new(name.into(), values).into()
            }
            Self::Bool => {
                let values: Vec<bool> = (0..rows).map(|_| rng.gen_bool(0.5)).collect();
                Series::new(name.into(), values).into()
            }
            Self::Datetime => {
                let origin = NaiveDate::from_ymd_opt(1990, 1, 1)
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
                    .ok_or_else(|| DataError::InvalidTime("1990-01-01".to_string()))?;
                let values: Vec<_> = (0..rows)
                    .map(|_| origin + Duration::days(rng.gen_range(0..12_000)))
                    .collect();
                datetime_series(name, &values)?.into()
            }
        };
        Ok(column)
    }
}

impl FromStr for MockColumn {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "str" | "string" | "object" | "symbol" => Ok(Self::Str),
            "int" | "int64" => Ok(Self::Int),
            "float" | "float64" | "double" => Ok(Self::Float),
            "bool" => Ok(Self::Bool),
            "datetime" | "timestamp" => Ok(Self::Datetime),
            _ => Err(DataError::InvalidDtype(s.to_string())),
        }
    }
}

impl fmt::Display for MockColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Str => "str",
            Self::Int => "int64",
            Self::Float => "float64",
            Self::Bool => "bool",
            Self::Datetime => "datetime",
        };
        write!(f, "{s}")
    }
}

/// Ordered column layout of one info type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockSchema {
    columns: Vec<(String, MockColumn)>,
}

impl MockSchema {
    /// Parse `(name, dtype)` pairs such as `("listed_date", "datetime")`.
    pub fn parse(columns: &[(&str, &str)]) -> Result<Self> {
        let columns = columns
            .iter()
            .map(|(name, dtype)| Ok(((*name).to_string(), dtype.parse()?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { columns })
    }

    /// Column names in order.
    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Generate `rows` rows.
    pub fn generate<R: Rng>(&self, rows: usize, rng: &mut R) -> Result<DataFrame> {
        let columns = self
            .columns
            .iter()
            .map(|(name, dtype)| dtype.generate(name, rows, rng))
            .collect::<Result<Vec<_>>>()?;
        Ok(DataFrame::new(columns)?)
    }
}
