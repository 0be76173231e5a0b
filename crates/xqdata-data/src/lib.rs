#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/xqdata/xqdata/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod api;
pub mod catalog;
pub mod diagnostic;
pub mod error;
pub mod filter;
pub mod frequency;
pub mod reshape;
pub mod storage;
pub mod store;
pub mod time;

pub use api::{Credentials, DataApi, FactorRequest};
pub use catalog::{AttributeCatalog, AttributeDescriptor, AttributeGroup, CatalogCache, StorageLocation};
pub use diagnostic::{Diagnostic, Diagnostics, Fetched};
pub use error::{DataError, Result};
pub use filter::{Comparator, Filter, FilterValue};
pub use frequency::Frequency;
pub use storage::{ColumnType, DbColumn, SqliteStore, Storage};
pub use store::{AttributeQuery, NewAttribute, NewObject, StoreConfig, StoreDataApi};
pub use time::TimeRange;

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
