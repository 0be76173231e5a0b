//! Client configuration file.

use crate::BACKENDS;
use serde::{Deserialize, Serialize};
use std::path::Path;
use xqdata_data::{DataApi, Result, StoreConfig, StoreDataApi};
use xqdata_mock::{MockConfig, MockDataApi};

/// Backend selection and per-backend settings, loadable from JSON.
///
/// ```json
/// { "backend": "store", "store": { "path": "/data/xqdata.db" } }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Backend name, see [`BACKENDS`]
    pub backend: String,
    /// Store backend settings
    pub store: StoreConfig,
    /// Mock backend settings
    pub mock: MockConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend: "mock".to_string(),
            store: StoreConfig::default(),
            mock: MockConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Load from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Select a backend.
    pub fn with_backend(mut self, backend: &str) -> Self {
        self.backend = backend.to_lowercase();
        self
    }

    /// Build the selected backend, unauthenticated.
    ///
    /// Unknown backends fall back to the mock backend.
    pub fn build(self) -> Box<dyn DataApi> {
        match self.backend.to_lowercase().as_str() {
            "store" => Box::new(StoreDataApi::new(self.store)),
            "mock" => Box::new(MockDataApi::new(self.mock)),
            other => {
                tracing::warn!(
                    backend = other,
                    known = ?BACKENDS,
                    "unknown backend, falling back to mock"
                );
                Box::new(MockDataApi::new(self.mock))
            }
        }
    }
}
