//! Store file location.
//!
//! The default store lives in the platform data directory:
//! - Linux: `~/.local/share/xqdata/`
//! - macOS: `~/Library/Application Support/xqdata/`
//! - Windows: `%APPDATA%\xqdata\`

use std::path::{Path, PathBuf};
use xqdata::{DataError, StoreConfig};

/// Default store directory.
pub(crate) fn default_store_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("xqdata")
}

/// Default store database path.
pub(crate) fn default_store_path() -> PathBuf {
    default_store_dir().join("xqdata.db")
}

/// Resolve the store file: `--db`, then the config file, then the default.
///
/// Creates the parent directory of file-backed stores.
pub(crate) fn resolve_store_path(
    flag: Option<&Path>,
    config: &StoreConfig,
) -> Result<PathBuf, DataError> {
    let path = flag
        .map(Path::to_path_buf)
        .or_else(|| config.path.clone())
        .unwrap_or_else(default_store_path);

    if path.as_os_str() != xqdata_data::store::MEMORY_PATH {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_wins_over_config() {
        let config = StoreConfig::at("/tmp/from-config.db");
        let path = resolve_store_path(Some(Path::new(":memory:")), &config).unwrap();
        assert_eq!(path, PathBuf::from(":memory:"));
    }

    #[test]
    fn test_config_wins_over_default() {
        let dir = std::env::temp_dir().join("xqdata-store-path-test");
        let config = StoreConfig::at(dir.join("store.db"));
        let path = resolve_store_path(None, &config).unwrap();
        assert_eq!(path, dir.join("store.db"));
        assert!(dir.is_dir());
    }

    #[test]
    fn test_default_file_name() {
        assert!(default_store_path().ends_with("xqdata/xqdata.db"));
    }
}
