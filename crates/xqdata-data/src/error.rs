//! Error types for data operations.

use thiserror::Error;

/// Result type for data operations.
pub type Result<T> = std::result::Result<T, DataError>;

/// Errors that can occur during data operations.
#[derive(Debug, Error)]
pub enum DataError {
    /// Authentication failed or the backend is unreachable
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Backend used before a successful `auth`
    #[error("Backend is not connected, call auth first")]
    NotConnected,

    /// More than one catalog row for one attribute key
    #[error(
        "Attribute {attribute} is not unique for type {entity_type} at frequency {frequency}, check the attribute catalog"
    )]
    AmbiguousCatalog {
        /// Entity type of the duplicated key
        entity_type: String,
        /// Frequency of the duplicated key
        frequency: String,
        /// Attribute name of the duplicated key
        attribute: String,
    },

    /// Duplicate (index, attribute) pairs while pivoting to a panel
    #[error("Ambiguous pivot: {count} duplicate rows for attribute {attribute} at {key}")]
    PivotAmbiguity {
        /// Rendered index of the first duplicate
        key: String,
        /// Attribute of the first duplicate
        attribute: String,
        /// Number of rows sharing that index and attribute
        count: u32,
    },

    /// A backend call for one attribute group failed
    #[error("Fetch failed for {group}: {reason}")]
    Fetch {
        /// Description of the failed group
        group: String,
        /// Underlying failure
        reason: String,
    },

    /// Unknown frequency code
    #[error("Invalid frequency: {0}")]
    InvalidFrequency(String),

    /// Unknown column dtype
    #[error("Invalid dtype: {0}")]
    InvalidDtype(String),

    /// Time value could not be parsed
    #[error("Invalid time: {0}")]
    InvalidTime(String),

    /// Invalid date range
    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidDateRange {
        /// Start of the range
        start: String,
        /// End of the range
        end: String,
    },

    /// Required column is missing from a frame
    #[error("Missing column: {0}")]
    MissingColumn(String),

    /// Storage object does not exist
    #[error("Storage object not found: {0}")]
    NotFound(String),

    /// Storage layer error that is not a SQLite error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Vendor SDK error
    #[error("Vendor error: {0}")]
    Vendor(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Polars error
    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
