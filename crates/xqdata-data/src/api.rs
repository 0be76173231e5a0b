//! Backend-agnostic data interface.

use crate::diagnostic::Fetched;
use crate::error::Result;
use crate::filter::Filter;
use crate::frequency::Frequency;
use crate::reshape::{self, ATTRIBUTE};
use crate::time::TimeRange;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Credentials passed to [`DataApi::auth`].
///
/// Backends read the keys they need, e.g. `path` for the store or
/// `username`/`password` for a vendor feed.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    values: BTreeMap<String, String>,
}

impl Credentials {
    /// Empty credentials.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a key.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Value of a key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print secrets
        f.debug_struct("Credentials")
            .field("keys", &self.values.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Parameters of a factor request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorRequest {
    /// Requested factors
    pub factors: Vec<String>,
    /// Entity codes
    pub codes: Vec<String>,
    /// Secondary keys of dual-key factors, `None` for all
    pub objects: Option<Vec<String>>,
    /// Time bounds
    pub range: TimeRange,
    /// Data frequency
    pub frequency: Frequency,
    /// Return a panel (`true`) or a long table
    pub panel: bool,
}

impl FactorRequest {
    /// Daily panel request without time bounds.
    pub fn new<F, C>(factors: impl IntoIterator<Item = F>, codes: impl IntoIterator<Item = C>) -> Self
    where
        F: Into<String>,
        C: Into<String>,
    {
        Self {
            factors: factors.into_iter().map(Into::into).collect(),
            codes: codes.into_iter().map(Into::into).collect(),
            objects: None,
            range: TimeRange::unbounded(),
            frequency: Frequency::Daily,
            panel: true,
        }
    }

    /// Restrict dual-key factors to these secondary keys.
    pub fn with_objects<O: Into<String>>(mut self, objects: impl IntoIterator<Item = O>) -> Self {
        self.objects = Some(objects.into_iter().map(Into::into).collect());
        self
    }

    /// Set the time bounds.
    pub const fn with_range(mut self, range: TimeRange) -> Self {
        self.range = range;
        self
    }

    /// Parse and set the time bounds.
    pub fn between(self, start: &str, end: &str) -> Result<Self> {
        Ok(self.with_range(TimeRange::parse(Some(start), Some(end))?))
    }

    /// Set the frequency.
    pub const fn with_frequency(mut self, frequency: Frequency) -> Self {
        self.frequency = frequency;
        self
    }

    /// Choose panel or long output.
    pub const fn with_panel(mut self, panel: bool) -> Self {
        self.panel = panel;
        self
    }
}

/// Uniform interface implemented by every backend.
pub trait DataApi: fmt::Debug {
    /// Short backend name, e.g. `store`.
    fn name(&self) -> &'static str;

    /// Connect and verify credentials.
    fn auth(&mut self, credentials: &Credentials) -> Result<()>;

    /// Reference data of one type, filtered by column predicates.
    ///
    /// An unconfigured type yields an empty frame and one
    /// [`crate::Diagnostic::UnconfiguredType`].
    fn get_info(&self, info_type: &str, filters: &[Filter]) -> Result<Fetched<DataFrame>>;

    /// Single-key factor values indexed by `datetime, code`.
    fn get_factor(&self, request: &FactorRequest) -> Result<Fetched<DataFrame>>;

    /// Dual-key factor values indexed by `datetime, code, object`.
    fn get_dualkey_factor(&self, request: &FactorRequest) -> Result<Fetched<DataFrame>>;
}

/// Shape long rows into the requested output.
///
/// Panels get exactly one column per resolved attribute in request order.
/// Long output keeps the `attribute`/`value` columns, sorted by key.
pub fn shape_long_output(
    long: &DataFrame,
    keys: &[&str],
    attributes: &[String],
    panel: bool,
) -> Result<DataFrame> {
    if long.height() == 0 {
        return Ok(DataFrame::empty());
    }
    if panel {
        let wide = reshape::to_panel(long, keys)?;
        return reshape::ensure_columns(wide, keys, attributes);
    }
    let mut select: Vec<Expr> = keys.iter().map(|k| col(*k)).collect();
    select.push(col(ATTRIBUTE));
    select.push(col(reshape::VALUE));
    Ok(long
        .clone()
        .lazy()
        .select(select)
        .sort_by_exprs(
            keys.iter().map(|k| col(*k)).collect::<Vec<_>>(),
            SortMultipleOptions::default().with_maintain_order(true),
        )
        .collect()?)
}

/// Shape a merged panel into the requested output.
///
/// Long output stacks the attribute columns and labels them `attribute`.
pub fn shape_panel_output(
    wide: DataFrame,
    keys: &[&str],
    attributes: &[String],
    panel: bool,
) -> Result<DataFrame> {
    if wide.height() == 0 {
        return Ok(DataFrame::empty());
    }
    let wide = reshape::ensure_columns(wide, keys, attributes)?;
    if panel {
        return Ok(wide);
    }
    reshape::relabel_long(reshape::to_long(&wide, keys)?, ATTRIBUTE)
}
