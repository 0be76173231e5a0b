//! Composable query predicates.
//!
//! A request is a list of [`Filter`]s combined by logical AND. The same list
//! is translated to SQL by the storage engine and to polars expressions when a
//! backend filters an in-memory table.

use crate::error::{DataError, Result};
use crate::time::{DATETIME_DTYPE, to_millis};
use chrono::NaiveDateTime;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Comparison operator of a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comparator {
    /// `field == value`
    Eq,
    /// `field > value`
    Gt,
    /// `field < value`
    Lt,
    /// `field` is one of a list of values
    IsIn,
}

impl Comparator {
    /// SQL operator token.
    pub const fn sql_op(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::IsIn => "IN",
        }
    }
}

/// Scalar or list operand of a filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterValue {
    /// Text value
    Str(String),
    /// Integer value
    Int(i64),
    /// Floating point value
    Float(f64),
    /// Boolean value
    Bool(bool),
    /// Timestamp value
    Time(NaiveDateTime),
    /// List operand for [`Comparator::IsIn`]
    List(Vec<FilterValue>),
}

impl FilterValue {
    /// Literal polars expression for a scalar operand.
    fn to_lit(&self) -> Expr {
        match self {
            Self::Str(s) => lit(s.clone()),
            Self::Int(v) => lit(*v),
            Self::Float(v) => lit(*v),
            Self::Bool(v) => lit(*v),
            Self::Time(t) => lit(to_millis(*t)).cast(DATETIME_DTYPE),
            Self::List(_) => lit(NULL),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for FilterValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for FilterValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<NaiveDateTime> for FilterValue {
    fn from(v: NaiveDateTime) -> Self {
        Self::Time(v)
    }
}

impl<T: Into<Self>> From<Vec<T>> for FilterValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "'{s}'"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Time(t) => write!(f, "{t}"),
            Self::List(values) => {
                f.write_str("[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// A single immutable predicate `field <comparator> value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// Column the predicate applies to
    pub field: String,
    /// Comparison operator
    pub comparator: Comparator,
    /// Operand
    pub value: FilterValue,
}

impl Filter {
    /// Create a filter.
    pub fn new(field: impl Into<String>, comparator: Comparator, value: impl Into<FilterValue>) -> Self {
        Self {
            field: field.into(),
            comparator,
            value: value.into(),
        }
    }

    /// `field == value`
    pub fn eq(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(field, Comparator::Eq, value)
    }

    /// `field > value`
    pub fn gt(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(field, Comparator::Gt, value)
    }

    /// `field < value`
    pub fn lt(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(field, Comparator::Lt, value)
    }

    /// `field` in `values`
    pub fn isin<T: Into<FilterValue>>(field: impl Into<String>, values: Vec<T>) -> Self {
        Self::new(field, Comparator::IsIn, values)
    }

    /// Polars expression evaluating this predicate.
    pub fn to_expr(&self) -> Expr {
        let field = col(self.field.as_str());
        match (&self.comparator, &self.value) {
            (Comparator::IsIn, FilterValue::List(values)) => values
                .iter()
                .map(|v| field.clone().eq(v.to_lit()))
                .reduce(|acc, e| acc.or(e))
                .unwrap_or_else(|| lit(false)),
            (Comparator::IsIn, scalar) | (Comparator::Eq, scalar) => field.eq(scalar.to_lit()),
            (Comparator::Gt, v) => field.gt(v.to_lit()),
            (Comparator::Lt, v) => field.lt(v.to_lit()),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.field, self.comparator.sql_op(), self.value)
    }
}

/// Keep only the rows of `df` matching every filter.
///
/// Every filtered field must be a column of the frame.
pub fn apply_filters(df: DataFrame, filters: &[Filter]) -> Result<DataFrame> {
    if filters.is_empty() {
        return Ok(df);
    }
    for filter in filters {
        if df.column(&filter.field).is_err() {
            return Err(DataError::MissingColumn(filter.field.clone()));
        }
    }
    let predicate = filters
        .iter()
        .map(Filter::to_expr)
        .reduce(|acc, e| acc.and(e))
        .unwrap_or_else(|| lit(true));
    Ok(df.lazy().filter(predicate).collect()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::parse_time;

    fn sample() -> DataFrame {
        df!(
            "code" => ["000001.XSHE", "000002.XSHE", "600000.XSHG"],
            "price" => [10.0, 20.0, 30.0],
            "board" => ["main", "main", "star"]
        )
        .unwrap()
    }

    #[test]
    fn test_eq_filter() {
        let out = apply_filters(sample(), &[Filter::eq("board", "star")]).unwrap();
        assert_eq!(out.height(), 1);
    }

    #[test]
    fn test_filters_are_anded() {
        let filters = [Filter::eq("board", "main"), Filter::gt("price", 15.0)];
        let out = apply_filters(sample(), &filters).unwrap();
        assert_eq!(out.height(), 1);
        let code = out.column("code").unwrap().str().unwrap().get(0);
        assert_eq!(code, Some("000002.XSHE"));
    }

    #[test]
    fn test_isin_filter() {
        let filter = Filter::isin("code", vec!["000001.XSHE", "600000.XSHG"]);
        let out = apply_filters(sample(), &[filter]).unwrap();
        assert_eq!(out.height(), 2);
    }

    #[test]
    fn test_empty_isin_matches_nothing() {
        let filter = Filter::isin::<&str>("code", vec![]);
        let out = apply_filters(sample(), &[filter]).unwrap();
        assert_eq!(out.height(), 0);
    }

    #[test]
    fn test_unknown_field_is_an_error() {
        let result = apply_filters(sample(), &[Filter::lt("volume", 1_i64)]);
        assert!(matches!(result, Err(DataError::MissingColumn(f)) if f == "volume"));
    }

    #[test]
    fn test_display() {
        let t = parse_time("2024-01-01").unwrap();
        assert_eq!(
            Filter::gt("datetime", t).to_string(),
            "datetime > 2024-01-01 00:00:00"
        );
        assert_eq!(
            Filter::isin("code", vec!["a", "b"]).to_string(),
            "code IN ['a', 'b']"
        );
    }
}
