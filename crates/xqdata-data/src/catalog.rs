//! Attribute catalog.
//!
//! The catalog maps `(type, frequency, attribute)` to the physical location
//! holding the attribute's values. Resolving a request groups attributes by
//! location so each `(database, table)` is queried once.

use crate::diagnostic::{Diagnostic, Diagnostics, Fetched};
use crate::error::{DataError, Result};
use crate::frequency::Frequency;
use crate::storage::ColumnType;
use parking_lot::RwLock;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Database holding the catalog and info tables.
pub const INFO_DB: &str = "infos";
/// Table holding the catalog rows.
pub const CATALOG_TABLE: &str = "attribute";
/// Unique key of a catalog row.
pub const CATALOG_KEY: [&str; 3] = ["type", "frequency", "attribute"];

/// Catalog columns in storage order.
pub const CATALOG_COLUMNS: [&str; 9] = [
    "type",
    "frequency",
    "attribute",
    "name",
    "dtype",
    "code_dtype",
    "obj_dtype",
    "db_name",
    "table_name",
];

/// Physical `(database, table)` location of an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StorageLocation {
    /// Database name
    pub db_name: String,
    /// Table name
    pub table_name: String,
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.db_name, self.table_name)
    }
}

/// One catalog row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDescriptor {
    /// Entity type, e.g. `stock`
    pub entity_type: String,
    /// Lower-cased frequency code
    pub frequency: String,
    /// Attribute name
    pub attribute: String,
    /// Display name
    pub name: Option<String>,
    /// Value dtype, e.g. `DOUBLE`
    pub dtype: String,
    /// Entity key dtype
    pub code_dtype: String,
    /// Secondary key dtype, `None` for single-key attributes
    pub obj_dtype: Option<String>,
    /// Database holding the values
    pub db_name: String,
    /// Table holding the values
    pub table_name: String,
}

impl AttributeDescriptor {
    /// Whether values are keyed by a secondary `object`.
    pub fn is_dual_key(&self) -> bool {
        self.obj_dtype.as_deref().is_some_and(|d| !d.is_empty())
    }

    /// Physical location of the values.
    pub fn location(&self) -> StorageLocation {
        StorageLocation {
            db_name: self.db_name.clone(),
            table_name: self.table_name.clone(),
        }
    }

    /// Parsed value dtype.
    pub fn value_dtype(&self) -> Result<ColumnType> {
        self.dtype.parse()
    }

    fn matches_key(&self, entity_type: &str, frequency: &str, attribute: &str) -> bool {
        self.attribute == attribute
            && self.frequency.eq_ignore_ascii_case(frequency)
            && self.entity_type.eq_ignore_ascii_case(entity_type)
    }
}

/// Attributes sharing one physical location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeGroup {
    /// Shared location
    pub location: StorageLocation,
    /// Attribute names, in request order
    pub attributes: Vec<String>,
}

/// Snapshot of the catalog rows.
#[derive(Debug, Clone, Default)]
pub struct AttributeCatalog {
    rows: Vec<AttributeDescriptor>,
}

impl AttributeCatalog {
    /// Build a catalog from rows.
    pub const fn new(rows: Vec<AttributeDescriptor>) -> Self {
        Self { rows }
    }

    /// All rows.
    pub fn rows(&self) -> &[AttributeDescriptor] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the catalog has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows matching one unique key. More than one row means the catalog is
    /// inconsistent.
    pub fn lookup(
        &self,
        entity_type: &str,
        frequency: Frequency,
        attribute: &str,
    ) -> Vec<&AttributeDescriptor> {
        self.rows
            .iter()
            .filter(|r| r.matches_key(entity_type, frequency.to_db_str(), attribute))
            .collect()
    }

    /// The single row for a key, failing on duplicates.
    pub fn lookup_unique(
        &self,
        entity_type: &str,
        frequency: Frequency,
        attribute: &str,
    ) -> Result<Option<&AttributeDescriptor>> {
        let rows = self.lookup(entity_type, frequency, attribute);
        if rows.len() > 1 {
            return Err(DataError::AmbiguousCatalog {
                entity_type: entity_type.to_string(),
                frequency: frequency.to_db_str().to_string(),
                attribute: attribute.to_string(),
            });
        }
        Ok(rows.into_iter().next())
    }

    /// Resolve requested attributes to location groups.
    ///
    /// Rows are filtered by name, frequency, optional entity types and key
    /// shape (`dual_key` selects rows with a secondary key dtype). Unknown
    /// attributes and attributes with duplicated catalog keys are dropped with
    /// a diagnostic; the rest are grouped by location in request order.
    pub fn resolve(
        &self,
        attributes: &[String],
        entity_types: Option<&[String]>,
        frequency: Frequency,
        dual_key: bool,
    ) -> Fetched<Vec<AttributeGroup>> {
        let mut diagnostics = Diagnostics::new();
        let mut groups: Vec<AttributeGroup> = Vec::new();
        let mut by_location: HashMap<StorageLocation, usize> = HashMap::new();
        let mut requested = HashSet::new();

        for attribute in attributes {
            if !requested.insert(attribute.as_str()) {
                continue;
            }

            let candidates: Vec<&AttributeDescriptor> = self
                .rows
                .iter()
                .filter(|r| &r.attribute == attribute)
                .filter(|r| r.frequency.eq_ignore_ascii_case(frequency.to_db_str()))
                .filter(|r| r.is_dual_key() == dual_key)
                .filter(|r| {
                    entity_types.is_none_or(|types| {
                        types.iter().any(|t| t.eq_ignore_ascii_case(&r.entity_type))
                    })
                })
                .collect();

            if candidates.is_empty() {
                diagnostics.push(Diagnostic::MissingAttribute {
                    attribute: attribute.clone(),
                });
                continue;
            }

            let mut per_type: HashMap<String, usize> = HashMap::new();
            for row in &candidates {
                *per_type.entry(row.entity_type.to_lowercase()).or_insert(0) += 1;
            }
            if per_type.values().any(|&n| n > 1) {
                diagnostics.push(Diagnostic::AmbiguousCatalog {
                    attribute: attribute.clone(),
                });
                continue;
            }

            for row in candidates {
                let location = row.location();
                let idx = *by_location.entry(location.clone()).or_insert_with(|| {
                    groups.push(AttributeGroup {
                        location,
                        attributes: Vec::new(),
                    });
                    groups.len() - 1
                });
                let group = &mut groups[idx];
                if !group.attributes.contains(attribute) {
                    group.attributes.push(attribute.clone());
                }
            }
        }

        Fetched::with(groups, diagnostics)
    }

    /// Read catalog rows from a frame with the [`CATALOG_COLUMNS`] layout.
    pub fn from_frame(df: &DataFrame) -> Result<Self> {
        if df.height() == 0 {
            return Ok(Self::default());
        }
        let text = |name: &str| -> Result<Vec<Option<String>>> {
            let column = df
                .column(name)
                .map_err(|_| DataError::MissingColumn(name.to_string()))?
                .cast(&DataType::String)?;
            Ok(column
                .str()?
                .into_iter()
                .map(|v| v.map(str::to_string))
                .collect())
        };
        let required = |values: Vec<Option<String>>| -> Vec<String> {
            values.into_iter().map(Option::unwrap_or_default).collect()
        };
        let optional = |values: Vec<Option<String>>| -> Vec<Option<String>> {
            values
                .into_iter()
                .map(|v| v.filter(|s| !s.is_empty()))
                .collect()
        };

        let types = required(text("type")?);
        let frequencies = required(text("frequency")?);
        let attributes = required(text("attribute")?);
        let names = optional(text("name")?);
        let dtypes = required(text("dtype")?);
        let code_dtypes = required(text("code_dtype")?);
        let obj_dtypes = optional(text("obj_dtype")?);
        let db_names = required(text("db_name")?);
        let table_names = required(text("table_name")?);

        let rows = (0..df.height())
            .map(|i| AttributeDescriptor {
                entity_type: types[i].clone(),
                frequency: frequencies[i].to_lowercase(),
                attribute: attributes[i].clone(),
                name: names[i].clone(),
                dtype: dtypes[i].clone(),
                code_dtype: code_dtypes[i].clone(),
                obj_dtype: obj_dtypes[i].clone(),
                db_name: db_names[i].clone(),
                table_name: table_names[i].clone(),
            })
            .collect();

        Ok(Self { rows })
    }

    /// Render rows with the [`CATALOG_COLUMNS`] layout.
    pub fn to_frame(rows: &[AttributeDescriptor]) -> Result<DataFrame> {
        let pick = |f: fn(&AttributeDescriptor) -> String| -> Vec<String> {
            rows.iter().map(f).collect()
        };
        Ok(DataFrame::new(vec![
            Series::new("type".into(), pick(|r| r.entity_type.clone())).into(),
            Series::new("frequency".into(), pick(|r| r.frequency.clone())).into(),
            Series::new("attribute".into(), pick(|r| r.attribute.clone())).into(),
            Series::new("name".into(), pick(|r| r.name.clone().unwrap_or_default())).into(),
            Series::new("dtype".into(), pick(|r| r.dtype.clone())).into(),
            Series::new("code_dtype".into(), pick(|r| r.code_dtype.clone())).into(),
            Series::new(
                "obj_dtype".into(),
                pick(|r| r.obj_dtype.clone().unwrap_or_default()),
            )
            .into(),
            Series::new("db_name".into(), pick(|r| r.db_name.clone())).into(),
            Series::new("table_name".into(), pick(|r| r.table_name.clone())).into(),
        ])?)
    }
}

/// Session-owned, lazily loaded catalog snapshot.
///
/// The snapshot is kept until [`CatalogCache::invalidate`] is called, so
/// catalog changes made by other sessions are not seen before then.
#[derive(Debug, Default)]
pub struct CatalogCache {
    slot: RwLock<Option<Arc<AttributeCatalog>>>,
}

impl CatalogCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached snapshot, loading it on first use.
    pub fn get_or_load<F>(&self, load: F) -> Result<Arc<AttributeCatalog>>
    where
        F: FnOnce() -> Result<AttributeCatalog>,
    {
        if let Some(catalog) = self.slot.read().as_ref() {
            return Ok(Arc::clone(catalog));
        }
        let mut slot = self.slot.write();
        if let Some(catalog) = slot.as_ref() {
            return Ok(Arc::clone(catalog));
        }
        let catalog = Arc::new(load()?);
        tracing::debug!(rows = catalog.len(), "loaded attribute catalog");
        *slot = Some(Arc::clone(&catalog));
        Ok(catalog)
    }

    /// Drop the snapshot; the next access reloads it.
    pub fn invalidate(&self) {
        *self.slot.write() = None;
    }

    /// Whether a snapshot is cached.
    pub fn is_loaded(&self) -> bool {
        self.slot.read().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn row(entity_type: &str, attribute: &str, dtype: &str, obj: Option<&str>) -> AttributeDescriptor {
        AttributeDescriptor {
            entity_type: entity_type.to_string(),
            frequency: "d".to_string(),
            attribute: attribute.to_string(),
            name: None,
            dtype: dtype.to_string(),
            code_dtype: "SYMBOL".to_string(),
            obj_dtype: obj.map(str::to_string),
            db_name: format!("{entity_type}_d"),
            table_name: format!("attr_{}", dtype.to_lowercase()),
        }
    }

    fn catalog() -> AttributeCatalog {
        AttributeCatalog::new(vec![
            row("stock", "pe_ratio", "DOUBLE", None),
            row("stock", "pb_ratio", "DOUBLE", None),
            row("stock", "industry", "SYMBOL", None),
            row("stock", "weight", "DOUBLE", Some("SYMBOL")),
        ])
    }

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_resolve_groups_by_location() {
        let resolved = catalog().resolve(
            &names(&["pe_ratio", "industry", "pb_ratio"]),
            None,
            Frequency::Daily,
            false,
        );
        assert!(resolved.diagnostics.is_empty());
        assert_eq!(resolved.data.len(), 2);
        assert_eq!(resolved.data[0].location.table_name, "attr_double");
        assert_eq!(resolved.data[0].attributes, names(&["pe_ratio", "pb_ratio"]));
        assert_eq!(resolved.data[1].attributes, names(&["industry"]));
    }

    #[test]
    fn test_resolve_drops_unknown_with_diagnostic() {
        let resolved = catalog().resolve(
            &names(&["pe_ratio", "nope"]),
            None,
            Frequency::Daily,
            false,
        );
        assert_eq!(resolved.data.len(), 1);
        assert_eq!(
            resolved.diagnostics,
            vec![Diagnostic::MissingAttribute {
                attribute: "nope".to_string()
            }]
        );
    }

    #[test]
    fn test_resolve_respects_key_shape() {
        let cat = catalog();
        let single = cat.resolve(&names(&["weight"]), None, Frequency::Daily, false);
        assert!(single.data.is_empty());
        let dual = cat.resolve(&names(&["weight"]), None, Frequency::Daily, true);
        assert_eq!(dual.data.len(), 1);
    }

    #[test]
    fn test_resolve_respects_frequency_and_type() {
        let cat = catalog();
        let minute = cat.resolve(&names(&["pe_ratio"]), None, Frequency::Minute, false);
        assert!(minute.data.is_empty());
        let fund = cat.resolve(
            &names(&["pe_ratio"]),
            Some(&names(&["FUND"])),
            Frequency::Daily,
            false,
        );
        assert!(fund.data.is_empty());
        let stock = cat.resolve(
            &names(&["pe_ratio"]),
            Some(&names(&["STOCK"])),
            Frequency::Daily,
            false,
        );
        assert_eq!(stock.data.len(), 1);
    }

    #[test]
    fn test_ambiguous_rows_are_skipped_on_read() {
        let mut rows = catalog().rows().to_vec();
        let mut dup = row("stock", "pe_ratio", "DOUBLE", None);
        dup.table_name = "attr_other".to_string();
        rows.push(dup);
        let cat = AttributeCatalog::new(rows);

        let resolved = cat.resolve(&names(&["pe_ratio", "pb_ratio"]), None, Frequency::Daily, false);
        assert_eq!(resolved.data.len(), 1);
        assert_eq!(resolved.data[0].attributes, names(&["pb_ratio"]));
        assert!(matches!(
            resolved.diagnostics[0],
            Diagnostic::AmbiguousCatalog { .. }
        ));
        assert!(matches!(
            cat.lookup_unique("stock", Frequency::Daily, "pe_ratio"),
            Err(DataError::AmbiguousCatalog { .. })
        ));
    }

    #[test]
    fn test_frame_roundtrip() {
        let cat = catalog();
        let frame = AttributeCatalog::to_frame(cat.rows()).unwrap();
        assert_eq!(frame.height(), 4);
        let back = AttributeCatalog::from_frame(&frame).unwrap();
        assert_eq!(back.rows(), cat.rows());
    }

    #[test]
    fn test_cache_loads_once_until_invalidated() {
        let cache = CatalogCache::new();
        let loads = Cell::new(0);
        let load = || {
            loads.set(loads.get() + 1);
            Ok(catalog())
        };

        assert!(!cache.is_loaded());
        assert_eq!(cache.get_or_load(load).unwrap().len(), 4);
        assert_eq!(cache.get_or_load(load).unwrap().len(), 4);
        assert_eq!(loads.get(), 1);

        cache.invalidate();
        assert!(!cache.is_loaded());
        cache.get_or_load(load).unwrap();
        assert_eq!(loads.get(), 2);
    }
}
