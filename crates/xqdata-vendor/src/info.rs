//! Instrument info types.

use crate::client::{Params, normalize_columns};
use chrono::NaiveDate;
use polars::prelude::*;
use std::collections::BTreeMap;
use xqdata_data::Result;

/// Listing-date placeholders and their replacements.
const LISTED_REPAIRS: [(&str, &str); 2] = [("0000-00-00", "1990-01-01"), ("2999-12-31", "2100-12-31")];

/// Delisting-date placeholders and their replacements.
const DELISTED_REPAIRS: [(&str, &str); 1] = [("0000-00-00", "2100-01-01")];

/// How one info type is fetched from the vendor.
#[derive(Debug, Clone, PartialEq)]
pub struct InfoSpec {
    /// Vendor instrument type passed to `all_instruments`
    pub instrument_type: String,
    /// Fixed extra parameters
    pub params: Params,
    /// Replace placeholder listing dates and parse them as dates
    pub repair_listing_dates: bool,
}

impl InfoSpec {
    /// Instrument list of a vendor type with listing-date repair.
    pub fn instruments(instrument_type: impl Into<String>) -> Self {
        Self {
            instrument_type: instrument_type.into(),
            params: Params::new(),
            repair_listing_dates: true,
        }
    }

    /// Add a fixed parameter.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Normalise a vendor instrument list.
    pub fn post_process(&self, df: DataFrame) -> Result<DataFrame> {
        let mut df = normalize_columns(df)?;
        if self.repair_listing_dates {
            repair_date_column(&mut df, "listed_date", &LISTED_REPAIRS)?;
            repair_date_column(&mut df, "de_listed_date", &DELISTED_REPAIRS)?;
        }
        Ok(df)
    }
}

/// Info types known to a vendor client, keyed by lower-cased name.
#[derive(Debug, Clone, PartialEq)]
pub struct InfoConfig {
    specs: BTreeMap<String, InfoSpec>,
}

impl Default for InfoConfig {
    fn default() -> Self {
        let specs = [
            ("stock", "CS"),
            ("fund", "FUND"),
            ("futures", "Future"),
            ("option", "Option"),
            ("convertible", "Convertible"),
            ("etf", "ETF"),
            ("lof", "LOF"),
        ]
        .into_iter()
        .map(|(name, vendor)| (name.to_string(), InfoSpec::instruments(vendor)))
        .collect();
        Self { specs }
    }
}

impl InfoConfig {
    /// Add or replace an info type.
    pub fn register(&mut self, name: &str, spec: InfoSpec) {
        self.specs.insert(name.to_lowercase(), spec);
    }

    /// Configuration of an info type.
    pub fn get(&self, name: &str) -> Option<&InfoSpec> {
        self.specs.get(&name.to_lowercase())
    }

    /// Configured type names.
    pub fn names(&self) -> Vec<&str> {
        self.specs.keys().map(String::as_str).collect()
    }
}

/// Replace placeholder dates in a text column and parse it as `Date`.
/// Unparseable values become null.
fn repair_date_column(df: &mut DataFrame, column: &str, repairs: &[(&str, &str)]) -> Result<()> {
    let Ok(values) = df.column(column) else {
        return Ok(());
    };
    if values.dtype() != &DataType::String {
        return Ok(());
    }

    let dates: Vec<Option<NaiveDate>> = values
        .str()?
        .into_iter()
        .map(|v| {
            v.and_then(|raw| {
                let raw = repairs
                    .iter()
                    .find(|(from, _)| *from == raw)
                    .map_or(raw, |(_, to)| *to);
                NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
            })
        })
        .collect();
    df.with_column(Series::new(column.into(), dates))?;
    Ok(())
}
