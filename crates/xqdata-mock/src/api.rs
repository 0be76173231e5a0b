//! Synthetic backend.

use crate::schema::MockSchema;
use chrono::{NaiveDate, NaiveDateTime};
use parking_lot::Mutex;
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use xqdata_data::api::shape_panel_output;
use xqdata_data::filter::apply_filters;
use xqdata_data::reshape::{CODE, DATETIME, OBJECT, key_columns};
use xqdata_data::time::datetime_series;
use xqdata_data::{
    Credentials, DataApi, DataError, Diagnostic, Diagnostics, FactorRequest, Fetched, Filter,
    Result,
};

/// Configuration for the synthetic backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MockConfig {
    /// RNG seed
    pub seed: u64,
    /// Fewest rows of a generated info table
    pub min_info_rows: usize,
    /// Most rows of a generated info table
    pub max_info_rows: usize,
    /// Start used when a request has no lower bound
    pub default_start: NaiveDate,
    /// End used when a request has no upper bound
    pub default_end: NaiveDate,
    /// Secondary keys used when a dual-key request names none
    pub default_objects: Vec<String>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            min_info_rows: 30,
            max_info_rows: 100,
            default_start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default(),
            default_end: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap_or_default(),
            default_objects: vec!["OBJ001".to_string(), "OBJ002".to_string()],
        }
    }
}

/// Backend producing random data for tests and demos.
///
/// Factor values are drawn for every key combination on the dates implied by
/// the request frequency. Bounds are inclusive.
#[derive(Debug)]
pub struct MockDataApi {
    config: MockConfig,
    schemas: HashMap<String, MockSchema>,
    rng: Mutex<StdRng>,
}

impl Default for MockDataApi {
    fn default() -> Self {
        Self::new(MockConfig::default())
    }
}

impl MockDataApi {
    /// Create a backend.
    pub fn new(config: MockConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            schemas: HashMap::new(),
            rng: Mutex::new(rng),
        }
    }

    /// Configuration in use.
    pub fn config(&self) -> &MockConfig {
        &self.config
    }

    /// Register the column layout of an info type.
    ///
    /// Dtypes are `str`, `int64`, `float64`, `bool` or `datetime`.
    pub fn set_mock_info(&mut self, info_type: &str, schema: &[(&str, &str)]) -> Result<()> {
        let schema = MockSchema::parse(schema)?;
        tracing::debug!(info_type, columns = ?schema.names(), "set mock schema");
        self.schemas.insert(info_type.to_lowercase(), schema);
        Ok(())
    }

    fn bounds(&self, request: &FactorRequest) -> Result<(NaiveDateTime, NaiveDateTime)> {
        let midnight = |d: NaiveDate| {
            d.and_hms_opt(0, 0, 0)
                .ok_or_else(|| DataError::InvalidTime(d.to_string()))
        };
        let start = match request.range.start {
            Some(t) => t,
            None => midnight(self.config.default_start)?,
        };
        let end = match request.range.end {
            Some(t) => t,
            None => midnight(self.config.default_end)?,
        };
        Ok((start, end))
    }

    /// Random wide panel keyed by `datetime, code[, object]`.
    fn panel(&self, request: &FactorRequest, objects: Option<&[String]>) -> Result<DataFrame> {
        let (start, end) = self.bounds(request)?;
        let dates = request.frequency.date_range(start, end);

        let mut stamps = Vec::new();
        let mut codes = Vec::new();
        let mut objs = Vec::new();
        for date in &dates {
            for code in &request.codes {
                match objects {
                    None => {
                        stamps.push(*date);
                        codes.push(code.clone());
                    }
                    Some(objects) => {
                        for object in objects {
                            stamps.push(*date);
                            codes.push(code.clone());
                            objs.push(object.clone());
                        }
                    }
                }
            }
        }

        let mut columns: Vec<Column> = vec![
            datetime_series(DATETIME, &stamps)?.into(),
            Series::new(CODE.into(), codes).into(),
        ];
        if objects.is_some() {
            columns.push(Series::new(OBJECT.into(), objs).into());
        }

        let mut rng = self.rng.lock();
        for factor in distinct(&request.factors) {
            let values: Vec<f64> = (0..stamps.len())
                .map(|_| rng.gen_range(-3.0..3.0))
                .collect();
            columns.push(Series::new(factor.as_str().into(), values).into());
        }
        Ok(DataFrame::new(columns)?)
    }
}

fn distinct(names: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        if !out.contains(name) {
            out.push(name.clone());
        }
    }
    out
}

impl DataApi for MockDataApi {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn auth(&mut self, _credentials: &Credentials) -> Result<()> {
        Ok(())
    }

    fn get_info(&self, info_type: &str, filters: &[Filter]) -> Result<Fetched<DataFrame>> {
        let Some(schema) = self.schemas.get(&info_type.to_lowercase()) else {
            let mut diagnostics = Diagnostics::new();
            diagnostics.push(Diagnostic::UnconfiguredType {
                info_type: info_type.to_string(),
            });
            return Ok(Fetched::with(DataFrame::empty(), diagnostics));
        };

        let mut rng = self.rng.lock();
        let (lo, hi) = (self.config.min_info_rows, self.config.max_info_rows);
        let rows = rng.gen_range(lo.min(hi)..=hi.max(lo));
        let info = schema.generate(rows, &mut *rng)?;
        Ok(Fetched::clean(apply_filters(info, filters)?))
    }

    fn get_factor(&self, request: &FactorRequest) -> Result<Fetched<DataFrame>> {
        let wide = self.panel(request, None)?;
        let keys = key_columns(false);
        let data = shape_panel_output(wide, &keys, &distinct(&request.factors), request.panel)?;
        Ok(Fetched::clean(data))
    }

    fn get_dualkey_factor(&self, request: &FactorRequest) -> Result<Fetched<DataFrame>> {
        let objects = request
            .objects
            .as_deref()
            .unwrap_or(&self.config.default_objects);
        let wide = self.panel(request, Some(objects))?;
        let keys = key_columns(true);
        let data = shape_panel_output(wide, &keys, &distinct(&request.factors), request.panel)?;
        Ok(Fetched::clean(data))
    }
}
