//! Factor retrieval functions.
//!
//! Every function answers one call shape, [`FactorCall`], and declares which
//! extra parameters it accepts. The registry never forwards undeclared ones.

use crate::client::{
    AdjustType, Params, PriceQuery, VendorClient, clip_inclusive, normalize_columns,
    vendor_frequency,
};
use chrono::{NaiveDate, Timelike};
use polars::prelude::*;
use std::fmt;
use xqdata_data::reshape::{self, CODE, DATETIME, key_columns};
use xqdata_data::{Frequency, Result, TimeRange};

/// Bars ending at or after this hour belong to the next trading date.
pub const NIGHT_SESSION_HOUR: u32 = 21;

/// Vendor bar fields served by [`PriceFunction`].
pub const PRICE_FIELDS: [&str; 35] = [
    "open",
    "high",
    "low",
    "close",
    "volume",
    "trading_date",
    "last",
    "prev_close",
    "total_turnover",
    "limit_up",
    "limit_down",
    "a1",
    "a2",
    "a3",
    "a4",
    "a5",
    "b1",
    "b2",
    "b3",
    "b4",
    "b5",
    "a1_v",
    "a2_v",
    "a3_v",
    "a4_v",
    "a5_v",
    "b1_v",
    "b2_v",
    "b3_v",
    "b4_v",
    "b5_v",
    "change_rate",
    "num_trades",
    "open_interest",
    "prev_settlement",
];

/// Arguments of one function invocation.
#[derive(Debug, Clone, Copy)]
pub struct FactorCall<'a> {
    /// Attributes routed to the function
    pub attributes: &'a [String],
    /// Instrument codes
    pub codes: &'a [String],
    /// Time bounds, inclusive
    pub range: TimeRange,
    /// Data frequency
    pub frequency: Frequency,
    /// Accepted extra parameters
    pub params: &'a Params,
}

impl FactorCall<'_> {
    fn start_date(&self) -> Option<NaiveDate> {
        self.range.start.map(|t| t.date())
    }

    fn end_date(&self) -> Option<NaiveDate> {
        self.range.end.map(|t| t.date())
    }
}

/// A retrieval function for a family of attributes.
pub trait FactorFunction: fmt::Debug {
    /// Registry name.
    fn name(&self) -> &str;

    /// Extra parameters the function accepts.
    fn declared_params(&self) -> &[&str];

    /// Panel keyed by `datetime, code` with one column per attribute found.
    fn fetch(&self, client: &dyn VendorClient, call: &FactorCall<'_>) -> Result<DataFrame>;
}

/// Bar fields, raw or adjusted.
///
/// `close` is fetched unadjusted, `close_post` and `close_pre` with backward
/// and forward adjustment. Intraday requests ending in the night session are
/// extended to the next trading date, then clipped back to the range.
#[derive(Debug, Clone, Copy, Default)]
pub struct PriceFunction;

impl PriceFunction {
    /// Every attribute this function serves.
    pub fn attributes() -> Vec<String> {
        let mut names: Vec<String> = PRICE_FIELDS.iter().map(|f| f.to_string()).collect();
        for adjust in [AdjustType::Post, AdjustType::Pre] {
            if let Some(suffix) = adjust.suffix() {
                names.extend(PRICE_FIELDS.iter().map(|f| format!("{f}{suffix}")));
            }
        }
        names
    }

    /// Requested attributes served with `adjust`, paired with their vendor field.
    fn split<'a>(attributes: &'a [String], adjust: AdjustType) -> Vec<(&'a str, &'a str)> {
        attributes
            .iter()
            .filter_map(|attr| {
                let field = match adjust.suffix() {
                    None => attr.as_str(),
                    Some(suffix) => attr.strip_suffix(suffix)?,
                };
                PRICE_FIELDS
                    .iter()
                    .any(|f| *f == field)
                    .then_some((attr.as_str(), field))
            })
            .collect()
    }
}

impl FactorFunction for PriceFunction {
    fn name(&self) -> &str {
        "price"
    }

    fn declared_params(&self) -> &[&str] {
        &["skip_suspended", "market"]
    }

    fn fetch(&self, client: &dyn VendorClient, call: &FactorCall<'_>) -> Result<DataFrame> {
        let frequency = vendor_frequency(call.frequency)?;

        let end_date = match call.range.end {
            Some(end) if call.frequency.is_intraday() && end.hour() >= NIGHT_SESSION_HOUR => {
                Some(client.get_next_trading_date(end.date())?)
            }
            _ => call.end_date(),
        };

        let mut parts = Vec::new();
        for adjust in [AdjustType::None, AdjustType::Post, AdjustType::Pre] {
            let requested = Self::split(call.attributes, adjust);
            if requested.is_empty() {
                continue;
            }
            let query = PriceQuery {
                codes: call.codes.to_vec(),
                start_date: call.start_date(),
                end_date,
                frequency: frequency.to_string(),
                fields: requested.iter().map(|(_, f)| f.to_string()).collect(),
                adjust,
                params: call.params.clone(),
            };
            let bars = client.get_price(&query)?;
            if bars.height() == 0 {
                continue;
            }

            let bars = clip_inclusive(normalize_columns(bars)?, call.range)?;
            let mut select = vec![col(DATETIME), col(CODE)];
            for (attr, field) in &requested {
                if bars.column(field).is_ok() {
                    select.push(col(*field).alias(*attr));
                }
            }
            parts.push(bars.lazy().select(select).collect()?);
        }

        reshape::outer_merge(parts, &key_columns(false))
    }
}

/// Generic vendor factor values such as `pe_ratio`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FactorValueFunction;

impl FactorFunction for FactorValueFunction {
    fn name(&self) -> &str {
        "factor"
    }

    fn declared_params(&self) -> &[&str] {
        &["universe"]
    }

    fn fetch(&self, client: &dyn VendorClient, call: &FactorCall<'_>) -> Result<DataFrame> {
        let values = client.get_factor(
            call.codes,
            call.attributes,
            call.start_date(),
            call.end_date(),
            call.params,
        )?;
        if values.height() == 0 {
            return Ok(DataFrame::empty());
        }

        let values = normalize_columns(values)?;
        let mut select = vec![col(DATETIME), col(CODE)];
        select.extend(
            call.attributes
                .iter()
                .filter(|a| values.column(a).is_ok())
                .map(|a| col(a.as_str())),
        );
        Ok(values.lazy().select(select).collect()?)
    }
}
