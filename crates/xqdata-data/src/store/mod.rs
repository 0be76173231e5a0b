//! Attribute store backend.
//!
//! [`StoreDataApi`] serves factor and info queries from a [`Storage`] engine
//! through the attribute catalog, and writes panels back with merge-on-key
//! semantics. The catalog is cached per client until
//! [`StoreDataApi::invalidate_catalog`] is called; catalog writes made through
//! this client invalidate it themselves.

pub mod router;
pub mod schema;
pub mod upsert;

pub use router::RouteRequest;
pub use schema::{NewAttribute, NewObject};

use crate::api::{Credentials, DataApi, FactorRequest, shape_long_output};
use crate::catalog::{AttributeCatalog, AttributeDescriptor, CATALOG_TABLE, CatalogCache, INFO_DB, StorageLocation};
use crate::diagnostic::{Diagnostic, Fetched};
use crate::error::{DataError, Result};
use crate::filter::Filter;
use crate::frequency::Frequency;
use crate::reshape::key_columns;
use crate::storage::{DbColumn, SqliteStore, Storage};
use crate::time::TimeRange;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Path value selecting an in-memory database.
pub const MEMORY_PATH: &str = ":memory:";

/// Store backend configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database file, `None` for an in-memory store
    pub path: Option<PathBuf>,
    /// Create the info database and catalog table on connect
    pub init_on_connect: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            init_on_connect: true,
        }
    }
}

impl StoreConfig {
    /// Configuration for a database file.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }
}

/// General attribute query.
///
/// [`DataApi::get_factor`] and [`DataApi::get_dualkey_factor`] are thin
/// wrappers around this.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeQuery {
    /// Requested attributes
    pub attributes: Vec<String>,
    /// Entity codes, `None` for all
    pub codes: Option<Vec<String>>,
    /// Secondary keys, `None` for all
    pub objects: Option<Vec<String>>,
    /// Query dual-key attributes
    pub dual_key: bool,
    /// Restrict to these entity types
    pub entity_types: Option<Vec<String>>,
    /// Time bounds, exclusive
    pub range: TimeRange,
    /// Data frequency
    pub frequency: Frequency,
    /// Additional predicates, e.g. on `value`
    pub filters: Vec<Filter>,
    /// Return a panel or a long table
    pub panel: bool,
}

impl AttributeQuery {
    /// Query equivalent to a factor request. An empty code list selects all
    /// codes.
    pub fn from_request(request: &FactorRequest, dual_key: bool) -> Self {
        Self {
            attributes: request.factors.clone(),
            codes: (!request.codes.is_empty()).then(|| request.codes.clone()),
            objects: request.objects.clone(),
            dual_key,
            entity_types: None,
            range: request.range,
            frequency: request.frequency,
            filters: Vec::new(),
            panel: request.panel,
        }
    }
}

/// Backend reading and writing the attribute store.
#[derive(Debug)]
pub struct StoreDataApi {
    config: StoreConfig,
    storage: Option<Box<dyn Storage>>,
    catalog: CatalogCache,
}

impl StoreDataApi {
    /// Unconnected client; call [`DataApi::auth`] before use.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            storage: None,
            catalog: CatalogCache::new(),
        }
    }

    /// Client connected to an existing engine.
    pub fn with_storage(storage: impl Storage + 'static) -> Self {
        Self {
            config: StoreConfig::default(),
            storage: Some(Box::new(storage)),
            catalog: CatalogCache::new(),
        }
    }

    /// Configuration in use.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn storage(&self) -> Result<&dyn Storage> {
        self.storage.as_deref().ok_or(DataError::NotConnected)
    }

    /// Session catalog snapshot, loaded on first use.
    pub fn catalog(&self) -> Result<Arc<AttributeCatalog>> {
        let storage = self.storage()?;
        self.catalog.get_or_load(|| schema::load_catalog(storage))
    }

    /// Drop the cached catalog so the next query sees external changes.
    pub fn invalidate_catalog(&self) {
        self.catalog.invalidate();
    }

    /// Create the info database and the catalog table.
    pub fn init_db(&self) -> Result<()> {
        schema::init_db(self.storage()?)
    }

    /// Register an attribute and provision its table.
    pub fn add_attribute(&self, attribute: &NewAttribute) -> Result<AttributeDescriptor> {
        let storage = self.storage()?;
        // Ambiguity is checked against the stored rows, not the snapshot
        let current = schema::load_catalog(storage)?;
        let descriptor = schema::add_attribute(storage, &current, attribute)?;
        self.invalidate_catalog();
        Ok(descriptor)
    }

    /// Provision the databases and tables of an entity type.
    pub fn add_object(&self, object: &NewObject) -> Result<Vec<StorageLocation>> {
        schema::add_object(self.storage()?, object)
    }

    /// Run an attribute query through the catalog and router.
    pub fn get_attributes(&self, query: &AttributeQuery) -> Result<Fetched<DataFrame>> {
        let storage = self.storage()?;
        let catalog = self.catalog()?;

        let (groups, mut diagnostics) = catalog
            .resolve(
                &query.attributes,
                query.entity_types.as_deref(),
                query.frequency,
                query.dual_key,
            )
            .into_parts();

        let mut resolved: Vec<String> = Vec::new();
        for attribute in &query.attributes {
            let found = groups.iter().any(|g| g.attributes.contains(attribute));
            if found && !resolved.contains(attribute) {
                resolved.push(attribute.clone());
            }
        }

        let route = RouteRequest {
            codes: query.codes.as_deref(),
            objects: query.objects.as_deref(),
            dual_key: query.dual_key,
            range: query.range,
            extra: &query.filters,
        };
        let (long, fetch_diagnostics) = router::fetch(storage, &groups, &route)?.into_parts();
        diagnostics.extend(fetch_diagnostics);

        let keys = key_columns(query.dual_key);
        let data = shape_long_output(&long, &keys, &resolved, query.panel)?;
        Ok(Fetched { data, diagnostics })
    }

    /// Write the attribute columns of a wide panel.
    ///
    /// See [`upsert::upsert_attribute`]. Returns the number of rows written.
    pub fn upsert_attribute(
        &self,
        entity_type: &str,
        data: &DataFrame,
        attributes: Option<&[String]>,
        frequency: Frequency,
    ) -> Result<Fetched<usize>> {
        let catalog = self.catalog()?;
        upsert::upsert_attribute(
            self.storage()?,
            &catalog,
            entity_type,
            data,
            attributes,
            frequency,
        )
    }

    /// Merge reference data into an info table, creating it from the frame's
    /// schema if missing.
    pub fn upsert_info(&self, table_name: &str, key_columns: &[String], data: &DataFrame) -> Result<bool> {
        let storage = self.storage()?;
        let table = table_name.to_lowercase();
        if !storage.exists_database(INFO_DB)? {
            storage.create_database(INFO_DB)?;
        }
        if !storage.exists_table(INFO_DB, &table)? {
            storage.create_table(INFO_DB, &table, &DbColumn::from_frame(data)?)?;
            tracing::info!(table = %table, "created info table");
        }
        storage.upsert(INFO_DB, &table, key_columns, data)?;
        if table == CATALOG_TABLE {
            self.invalidate_catalog();
        }
        Ok(true)
    }

    /// Copy factor data from another backend into the store.
    ///
    /// Reads a panel from `external`, dual-key when the request names
    /// objects, and writes it for `entity_type`. Returns `false` when the
    /// source had no data.
    pub fn sync_data(
        &self,
        external: &dyn DataApi,
        entity_type: &str,
        request: &FactorRequest,
    ) -> Result<Fetched<bool>> {
        let request = request.clone().with_panel(true);
        let (data, mut diagnostics) = if request.objects.is_some() {
            external.get_dualkey_factor(&request)?
        } else {
            external.get_factor(&request)?
        }
        .into_parts();

        if data.height() == 0 {
            tracing::info!(source = external.name(), "nothing to sync");
            return Ok(Fetched { data: false, diagnostics });
        }

        let (rows, upsert_diagnostics) = self
            .upsert_attribute(entity_type, &data, Some(&request.factors), request.frequency)?
            .into_parts();
        diagnostics.extend(upsert_diagnostics);
        tracing::info!(source = external.name(), entity_type, rows, "synced factors");
        Ok(Fetched { data: true, diagnostics })
    }
}

impl DataApi for StoreDataApi {
    fn name(&self) -> &'static str {
        "store"
    }

    fn auth(&mut self, credentials: &Credentials) -> Result<()> {
        let path = credentials
            .get("path")
            .map(PathBuf::from)
            .or_else(|| self.config.path.clone());
        let store = match path {
            Some(p) if p.as_os_str() != MEMORY_PATH => SqliteStore::new(&p),
            _ => SqliteStore::in_memory(),
        }
        .map_err(|e| DataError::Auth(e.to_string()))?;

        if self.config.init_on_connect {
            schema::init_db(&store)?;
        }
        self.storage = Some(Box::new(store));
        self.invalidate_catalog();
        Ok(())
    }

    fn get_info(&self, info_type: &str, filters: &[Filter]) -> Result<Fetched<DataFrame>> {
        let storage = self.storage()?;
        let table = info_type.to_lowercase();
        if !storage.exists_database(INFO_DB)? || !storage.exists_table(INFO_DB, &table)? {
            let diagnostic = Diagnostic::UnconfiguredType {
                info_type: info_type.to_string(),
            };
            tracing::warn!("{diagnostic}");
            return Ok(Fetched {
                data: DataFrame::empty(),
                diagnostics: vec![diagnostic],
            });
        }
        Ok(Fetched::clean(storage.query(INFO_DB, &table, filters)?))
    }

    fn get_factor(&self, request: &FactorRequest) -> Result<Fetched<DataFrame>> {
        self.get_attributes(&AttributeQuery::from_request(request, false))
    }

    fn get_dualkey_factor(&self, request: &FactorRequest) -> Result<Fetched<DataFrame>> {
        self.get_attributes(&AttributeQuery::from_request(request, true))
    }
}
