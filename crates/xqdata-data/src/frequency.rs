//! Data frequency codes.

use crate::error::{DataError, Result};
use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sampling frequency of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Frequency {
    /// Calendar daily (`D`)
    #[default]
    Daily,
    /// Business daily (`B`)
    BusinessDaily,
    /// Weekly, anchored on Sunday (`W`)
    Weekly,
    /// Month end (`ME`)
    MonthEnd,
    /// One minute bars (`min`)
    Minute,
    /// Snapshot ticks (`tick`)
    Tick,
}

impl Frequency {
    /// Code used by callers, e.g. `D` or `min`.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Daily => "D",
            Self::BusinessDaily => "B",
            Self::Weekly => "W",
            Self::MonthEnd => "ME",
            Self::Minute => "min",
            Self::Tick => "tick",
        }
    }

    /// Lower-cased code stored in the attribute catalog.
    pub const fn to_db_str(&self) -> &'static str {
        match self {
            Self::Daily => "d",
            Self::BusinessDaily => "b",
            Self::Weekly => "w",
            Self::MonthEnd => "me",
            Self::Minute => "min",
            Self::Tick => "tick",
        }
    }

    /// Whether bars are finer than one day.
    pub const fn is_intraday(&self) -> bool {
        matches!(self, Self::Minute | Self::Tick)
    }

    /// Expand `[start, end]` into the timestamps of this frequency.
    ///
    /// Both bounds are inclusive. Tick data is modelled as 3 second snapshots.
    pub fn date_range(&self, start: NaiveDateTime, end: NaiveDateTime) -> Vec<NaiveDateTime> {
        let mut out = Vec::new();
        if start > end {
            return out;
        }
        match self {
            Self::Daily | Self::BusinessDaily => {
                let mut t = start;
                while t <= end {
                    if *self == Self::Daily || !is_weekend(t.date()) {
                        out.push(t);
                    }
                    t += Duration::days(1);
                }
            }
            Self::Weekly => {
                let offset = (7 - start.weekday().num_days_from_sunday()) % 7;
                let mut t = start + Duration::days(i64::from(offset));
                while t <= end {
                    out.push(t);
                    t += Duration::days(7);
                }
            }
            Self::MonthEnd => {
                let mut month = NaiveDate::from_ymd_opt(start.year(), start.month(), 1);
                while let Some(first) = month {
                    let Some(last) = month_end(first) else { break };
                    let t = last.and_time(start.time());
                    if t > end {
                        break;
                    }
                    if t >= start {
                        out.push(t);
                    }
                    month = first.checked_add_months(Months::new(1));
                }
            }
            Self::Minute | Self::Tick => {
                let step = if *self == Self::Minute {
                    Duration::minutes(1)
                } else {
                    Duration::seconds(3)
                };
                let mut t = start;
                while t <= end {
                    out.push(t);
                    t += step;
                }
            }
        }
        out
    }
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

fn month_end(first: NaiveDate) -> Option<NaiveDate> {
    first.checked_add_months(Months::new(1))?.pred_opt()
}

impl FromStr for Frequency {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "d" | "1d" | "day" => Ok(Self::Daily),
            "b" => Ok(Self::BusinessDaily),
            "w" | "w-sun" => Ok(Self::Weekly),
            "me" | "m" => Ok(Self::MonthEnd),
            "min" | "1m" | "1min" => Ok(Self::Minute),
            "tick" => Ok(Self::Tick),
            other => Err(DataError::InvalidFrequency(other.to_string())),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
