#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/xqdata/xqdata/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod api;
pub mod schema;

pub use api::{MockConfig, MockDataApi};
pub use schema::{MockColumn, MockSchema};

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
