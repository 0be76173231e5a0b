//! Time parsing and time-range handling.
//!
//! All timestamps are naive (exchange-local) and stored as epoch
//! milliseconds. Polars columns use `Datetime(Milliseconds, None)`.

use crate::error::{DataError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use polars::prelude::*;

/// Polars dtype of every `datetime` key column.
pub const DATETIME_DTYPE: DataType = DataType::Datetime(TimeUnit::Milliseconds, None);

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Parse a timestamp from the formats accepted by the public API.
///
/// Accepts `YYYY-MM-DD`, `YYYYMMDD`, `YYYY-MM-DD HH:MM:SS` and the
/// `T`-separated ISO variant.
pub fn parse_time(value: &str) -> Result<NaiveDateTime> {
    let value = value.trim();
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Ok(dt);
        }
    }
    for fmt in ["%Y-%m-%d", "%Y%m%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(value, fmt) {
            return Ok(date.and_time(NaiveTime::MIN));
        }
    }
    Err(DataError::InvalidTime(value.to_string()))
}

/// Convert a timestamp to epoch milliseconds.
pub fn to_millis(dt: NaiveDateTime) -> i64 {
    dt.and_utc().timestamp_millis()
}

/// Convert epoch milliseconds back to a timestamp.
pub fn from_millis(ms: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_millis(ms).map(|dt| dt.naive_utc())
}

/// Epoch milliseconds of a temporal polars value, `None` for anything else.
pub fn any_value_millis(value: &AnyValue<'_>) -> Option<i64> {
    match value {
        AnyValue::Datetime(v, unit, _) | AnyValue::DatetimeOwned(v, unit, _) => Some(match unit {
            TimeUnit::Nanoseconds => v.div_euclid(1_000_000),
            TimeUnit::Microseconds => v.div_euclid(1_000),
            TimeUnit::Milliseconds => *v,
        }),
        AnyValue::Date(days) => Some(i64::from(*days) * MILLIS_PER_DAY),
        _ => None,
    }
}

/// Build a millisecond `Datetime` series from timestamps.
pub fn datetime_series(name: &str, values: &[NaiveDateTime]) -> Result<Series> {
    let millis: Vec<i64> = values.iter().map(|dt| to_millis(*dt)).collect();
    Ok(Series::new(name.into(), millis).cast(&DATETIME_DTYPE)?)
}

/// Cast a temporal column to the canonical millisecond `Datetime` dtype.
pub fn normalize_datetime(df: DataFrame, column: &str) -> Result<DataFrame> {
    if df.column(column).is_err() {
        return Ok(df);
    }
    Ok(df
        .lazy()
        .with_column(col(column).cast(DATETIME_DTYPE))
        .collect()?)
}

/// Optional lower and upper time bounds of a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TimeRange {
    /// Lower bound
    pub start: Option<NaiveDateTime>,
    /// Upper bound
    pub end: Option<NaiveDateTime>,
}

impl TimeRange {
    /// Create a range, rejecting `start > end`.
    pub fn new(start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> Result<Self> {
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(DataError::InvalidDateRange {
                    start: s.to_string(),
                    end: e.to_string(),
                });
            }
        }
        Ok(Self { start, end })
    }

    /// A range without bounds.
    pub const fn unbounded() -> Self {
        Self {
            start: None,
            end: None,
        }
    }

    /// Parse a range from optional strings.
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self> {
        Self::new(
            start.map(parse_time).transpose()?,
            end.map(parse_time).transpose()?,
        )
    }

    /// Open-interval membership, the semantics of stored queries.
    pub fn contains_exclusive(&self, t: NaiveDateTime) -> bool {
        self.start.is_none_or(|s| t > s) && self.end.is_none_or(|e| t < e)
    }

    /// Closed-interval membership, the semantics of vendor queries.
    pub fn contains_inclusive(&self, t: NaiveDateTime) -> bool {
        self.start.is_none_or(|s| t >= s) && self.end.is_none_or(|e| t <= e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("2024-01-31", (2024, 1, 31), (0, 0))]
    #[case("20240131", (2024, 1, 31), (0, 0))]
    #[case("2024-01-31 09:30:00", (2024, 1, 31), (9, 30))]
    #[case("2024-01-31T21:00:00", (2024, 1, 31), (21, 0))]
    fn test_parse_time(
        #[case] input: &str,
        #[case] ymd: (i32, u32, u32),
        #[case] hm: (u32, u32),
    ) {
        let expected = NaiveDate::from_ymd_opt(ymd.0, ymd.1, ymd.2)
            .unwrap()
            .and_hms_opt(hm.0, hm.1, 0)
            .unwrap();
        assert_eq!(parse_time(input).unwrap(), expected);
    }

    #[test]
    fn test_parse_time_rejects_garbage() {
        assert!(matches!(
            parse_time("yesterday"),
            Err(DataError::InvalidTime(_))
        ));
    }

    #[test]
    fn test_millis_roundtrip() {
        let dt = parse_time("2024-03-15 14:59:57").unwrap();
        assert_eq!(from_millis(to_millis(dt)), Some(dt));
    }

    #[test]
    fn test_any_value_millis_units() {
        let ns = AnyValue::Datetime(1_000_000_000, TimeUnit::Nanoseconds, None);
        assert_eq!(any_value_millis(&ns), Some(1_000));
        assert_eq!(any_value_millis(&AnyValue::Date(1)), Some(MILLIS_PER_DAY));
        assert_eq!(any_value_millis(&AnyValue::Int64(5)), None);
    }

    #[test]
    fn test_range_bounds() {
        let range = TimeRange::parse(Some("2024-01-01"), Some("2024-01-03")).unwrap();
        let t1 = parse_time("2024-01-01").unwrap();
        let t2 = parse_time("2024-01-02").unwrap();
        let t3 = parse_time("2024-01-03").unwrap();

        assert!(!range.contains_exclusive(t1));
        assert!(range.contains_exclusive(t2));
        assert!(!range.contains_exclusive(t3));
        assert!(range.contains_inclusive(t1));
        assert!(range.contains_inclusive(t3));
    }

    #[test]
    fn test_invalid_range() {
        let result = TimeRange::parse(Some("2024-02-01"), Some("2024-01-01"));
        assert!(matches!(result, Err(DataError::InvalidDateRange { .. })));
    }
}
