#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/xqdata/xqdata/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;

pub use config::ClientConfig;
pub use xqdata_data::{
    AttributeCatalog, AttributeDescriptor, ColumnType, Comparator, Credentials, DataApi, DataError,
    Diagnostic, FactorRequest, Fetched, Filter, FilterValue, Frequency, NewAttribute, NewObject,
    Result, SqliteStore, Storage, StoreConfig, StoreDataApi, TimeRange,
};
pub use xqdata_mock::{MockConfig, MockDataApi};
pub use xqdata_vendor::{FactorRegistry, VendorClient, VendorDataApi};

/// Backend names accepted by [`get_dataapi`].
pub const BACKENDS: [&str; 2] = ["mock", "store"];

/// Backend by name with default configuration.
///
/// Unknown names fall back to the mock backend.
pub fn get_dataapi(name: &str) -> Box<dyn DataApi> {
    ClientConfig::default().with_backend(name).build()
}

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
