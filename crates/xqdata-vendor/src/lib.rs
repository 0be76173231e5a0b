#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/xqdata/xqdata/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod api;
pub mod client;
pub mod function;
pub mod info;
pub mod registry;

pub use api::VendorDataApi;
pub use client::{AdjustType, Params, PriceQuery, VendorClient};
pub use function::{FactorCall, FactorFunction, FactorValueFunction, PriceFunction};
pub use info::{InfoConfig, InfoSpec};
pub use registry::{FactorRegistry, FunctionGroup};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
