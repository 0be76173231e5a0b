//! Storage engine interface.
//!
//! The store backend talks to persistence only through [`Storage`]. The
//! crate ships [`SqliteStore`]; other engines implement the same trait.

pub mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::{DataError, Result};
use crate::filter::Filter;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Logical column type of a stored table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    /// 64-bit float
    Double,
    /// 64-bit integer
    Int,
    /// Boolean
    Bool,
    /// Interned string (codes, categories)
    Symbol,
    /// Free text
    String,
    /// Calendar date
    Date,
    /// Timestamp with millisecond precision
    Timestamp,
}

impl ColumnType {
    /// Catalog spelling, e.g. `DOUBLE`.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Double => "DOUBLE",
            Self::Int => "INT",
            Self::Bool => "BOOL",
            Self::Symbol => "SYMBOL",
            Self::String => "STRING",
            Self::Date => "DATE",
            Self::Timestamp => "TIMESTAMP",
        }
    }

    /// Polars dtype used when a column of this type is read.
    pub const fn polars_dtype(&self) -> DataType {
        match self {
            Self::Double => DataType::Float64,
            Self::Int => DataType::Int64,
            Self::Bool => DataType::Boolean,
            Self::Symbol | Self::String => DataType::String,
            Self::Date => DataType::Date,
            Self::Timestamp => DataType::Datetime(TimeUnit::Milliseconds, None),
        }
    }

    /// Column type able to hold a polars dtype.
    pub fn from_polars(dtype: &DataType) -> Result<Self> {
        match dtype {
            DataType::Float32 | DataType::Float64 => Ok(Self::Double),
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64 => Ok(Self::Int),
            DataType::Boolean => Ok(Self::Bool),
            DataType::String => Ok(Self::String),
            DataType::Date => Ok(Self::Date),
            DataType::Datetime(_, _) => Ok(Self::Timestamp),
            other => Err(DataError::InvalidDtype(other.to_string())),
        }
    }
}

impl FromStr for ColumnType {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "DOUBLE" | "FLOAT" | "REAL" => Ok(Self::Double),
            "INT" | "LONG" | "INTEGER" => Ok(Self::Int),
            "BOOL" | "BOOLEAN" => Ok(Self::Bool),
            "SYMBOL" => Ok(Self::Symbol),
            "STRING" | "TEXT" => Ok(Self::String),
            "DATE" => Ok(Self::Date),
            "TIMESTAMP" | "DATETIME" => Ok(Self::Timestamp),
            other => Err(DataError::InvalidDtype(other.to_string())),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column definition used when creating a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbColumn {
    /// Column name
    pub name: String,
    /// Column type
    pub dtype: ColumnType,
}

impl DbColumn {
    /// Create a column definition.
    pub fn new(name: impl Into<String>, dtype: ColumnType) -> Self {
        Self {
            name: name.into(),
            dtype,
        }
    }

    /// Column definitions matching a frame's schema.
    pub fn from_frame(df: &DataFrame) -> Result<Vec<Self>> {
        df.get_columns()
            .iter()
            .map(|c| Ok(Self::new(c.name().as_str(), ColumnType::from_polars(c.dtype())?)))
            .collect()
    }
}

/// Persistence operations the store backend depends on.
pub trait Storage: fmt::Debug {
    /// Whether a database exists.
    fn exists_database(&self, db: &str) -> Result<bool>;

    /// Create a database if it does not exist.
    fn create_database(&self, db: &str) -> Result<()>;

    /// Whether a table exists.
    fn exists_table(&self, db: &str, table: &str) -> Result<bool>;

    /// Declared columns of a table, empty if it does not exist.
    fn table_columns(&self, db: &str, table: &str) -> Result<Vec<DbColumn>>;

    /// Create a table in an existing database. Duplicate keys are kept;
    /// deduplication happens in [`Storage::upsert`].
    fn create_table(&self, db: &str, table: &str, columns: &[DbColumn]) -> Result<()>;

    /// Rows matching every filter, with columns typed by the table schema.
    fn query(&self, db: &str, table: &str, conds: &[Filter]) -> Result<DataFrame>;

    /// Merge rows on `key_cols`: rows with an existing key replace it, later
    /// rows in `data` win over earlier ones. Returns the number of rows
    /// written.
    fn upsert(&self, db: &str, table: &str, key_cols: &[String], data: &DataFrame) -> Result<usize>;
}
