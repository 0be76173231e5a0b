//! Vendor SDK boundary.
//!
//! A [`VendorClient`] speaks the vendor's vocabulary (`order_book_id`, `date`,
//! `1d` bars). Frames leave this module through [`normalize_columns`] so the
//! rest of the crate only sees `datetime` and `code`.

use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use xqdata_data::reshape::{CODE, DATETIME};
use xqdata_data::time::{DATETIME_DTYPE, normalize_datetime, to_millis};
use xqdata_data::{Credentials, DataError, Frequency, Result, TimeRange};

/// Extra keyword parameters forwarded to the vendor.
pub type Params = BTreeMap<String, serde_json::Value>;

/// Vendor column holding the instrument code.
pub const VENDOR_CODE: &str = "order_book_id";

/// Vendor column holding the observation date.
pub const VENDOR_DATE: &str = "date";

/// Price adjustment applied by the vendor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdjustType {
    /// Raw prices
    #[default]
    None,
    /// Backward adjusted
    Post,
    /// Forward adjusted
    Pre,
}

impl AdjustType {
    /// Vendor token.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Post => "post",
            Self::Pre => "pre",
        }
    }

    /// Attribute suffix selecting this adjustment.
    pub const fn suffix(&self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Post => Some("_post"),
            Self::Pre => Some("_pre"),
        }
    }
}

/// Bar request sent to [`VendorClient::get_price`].
#[derive(Debug, Clone, PartialEq)]
pub struct PriceQuery {
    /// Instrument codes
    pub codes: Vec<String>,
    /// First trading date
    pub start_date: Option<NaiveDate>,
    /// Last trading date
    pub end_date: Option<NaiveDate>,
    /// Vendor frequency token, e.g. `1d`
    pub frequency: String,
    /// Vendor field names
    pub fields: Vec<String>,
    /// Adjustment
    pub adjust: AdjustType,
    /// Extra parameters
    pub params: Params,
}

/// Market data SDK used by the vendor backend.
pub trait VendorClient: fmt::Debug {
    /// Log in.
    fn authenticate(&mut self, credentials: &Credentials) -> Result<()>;

    /// Bars keyed by `order_book_id` and `datetime` (or `date`).
    fn get_price(&self, query: &PriceQuery) -> Result<DataFrame>;

    /// Factor values keyed by `order_book_id` and `date`.
    fn get_factor(
        &self,
        codes: &[String],
        factors: &[String],
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
        params: &Params,
    ) -> Result<DataFrame>;

    /// Instrument list of one vendor instrument type.
    fn all_instruments(&self, instrument_type: &str, params: &Params) -> Result<DataFrame>;

    /// Trading dates in `[start, end]`.
    fn get_trading_dates(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<NaiveDate>>;

    /// First trading date after `date`.
    fn get_next_trading_date(&self, date: NaiveDate) -> Result<NaiveDate>;
}

/// Rename vendor key columns and cast `datetime` to the canonical dtype.
pub fn normalize_columns(mut df: DataFrame) -> Result<DataFrame> {
    if df.column(VENDOR_CODE).is_ok() {
        df.rename(VENDOR_CODE, CODE.into())?;
    }
    if df.column(VENDOR_DATE).is_ok() && df.column(DATETIME).is_err() {
        df.rename(VENDOR_DATE, DATETIME.into())?;
    }
    normalize_datetime(df, DATETIME)
}

/// Keep rows whose `datetime` lies in `range`, bounds included.
pub fn clip_inclusive(df: DataFrame, range: TimeRange) -> Result<DataFrame> {
    let bound = |t: NaiveDateTime| lit(to_millis(t)).cast(DATETIME_DTYPE);
    let mut predicate = lit(true);
    if let Some(start) = range.start {
        predicate = predicate.and(col(DATETIME).gt_eq(bound(start)));
    }
    if let Some(end) = range.end {
        predicate = predicate.and(col(DATETIME).lt_eq(bound(end)));
    }
    Ok(df.lazy().filter(predicate).collect()?)
}

/// Vendor bar frequency token.
pub fn vendor_frequency(frequency: Frequency) -> Result<&'static str> {
    match frequency {
        Frequency::Daily | Frequency::BusinessDaily => Ok("1d"),
        Frequency::Weekly => Ok("1w"),
        Frequency::Minute => Ok("1m"),
        Frequency::Tick => Ok("tick"),
        Frequency::MonthEnd => Err(DataError::InvalidFrequency(format!(
            "{frequency} has no vendor bars"
        ))),
    }
}
