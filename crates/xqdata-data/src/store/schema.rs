//! Catalog provisioning and attribute table layout.

use crate::catalog::{
    AttributeCatalog, AttributeDescriptor, CATALOG_COLUMNS, CATALOG_KEY, CATALOG_TABLE, INFO_DB,
    StorageLocation,
};
use crate::error::{DataError, Result};
use crate::frequency::Frequency;
use crate::reshape::{ATTRIBUTE, CODE, DATETIME, OBJECT, VALUE};
use crate::storage::{ColumnType, DbColumn, Storage};

/// Columns of an attribute table.
pub fn attribute_columns(
    dtype: ColumnType,
    code_dtype: ColumnType,
    obj_dtype: Option<ColumnType>,
) -> Vec<DbColumn> {
    let mut columns = vec![
        DbColumn::new(DATETIME, ColumnType::Timestamp),
        DbColumn::new(CODE, code_dtype),
    ];
    if let Some(obj_dtype) = obj_dtype {
        columns.push(DbColumn::new(OBJECT, obj_dtype));
    }
    columns.push(DbColumn::new(ATTRIBUTE, ColumnType::Symbol));
    columns.push(DbColumn::new(VALUE, dtype));
    columns
}

/// Default database of an entity type at a frequency, e.g. `stock_d`.
pub fn default_db_name(entity_type: &str, frequency: Frequency) -> String {
    format!("{}_{}", entity_type.to_lowercase(), frequency.to_db_str())
}

/// Default table for a value dtype, e.g. `attr_double`.
pub fn default_table_name(dtype: ColumnType) -> String {
    format!("attr_{}", dtype.as_str().to_lowercase())
}

/// Create the info database and the catalog table.
pub fn init_db(storage: &dyn Storage) -> Result<()> {
    if !storage.exists_database(INFO_DB)? {
        storage.create_database(INFO_DB)?;
        tracing::info!(db = INFO_DB, "created info database");
    }
    if !storage.exists_table(INFO_DB, CATALOG_TABLE)? {
        let columns: Vec<DbColumn> = CATALOG_COLUMNS
            .iter()
            .map(|name| match *name {
                "name" | "obj_dtype" => DbColumn::new(*name, ColumnType::String),
                _ => DbColumn::new(*name, ColumnType::Symbol),
            })
            .collect();
        storage.create_table(INFO_DB, CATALOG_TABLE, &columns)?;
    }
    Ok(())
}

/// Read the full catalog. A store without a catalog table has no attributes.
pub fn load_catalog(storage: &dyn Storage) -> Result<AttributeCatalog> {
    if !storage.exists_database(INFO_DB)? || !storage.exists_table(INFO_DB, CATALOG_TABLE)? {
        return Ok(AttributeCatalog::default());
    }
    let df = storage.query(INFO_DB, CATALOG_TABLE, &[])?;
    AttributeCatalog::from_frame(&df)
}

fn ensure_table(
    storage: &dyn Storage,
    location: &StorageLocation,
    columns: &[DbColumn],
) -> Result<()> {
    if !storage.exists_database(&location.db_name)? {
        storage.create_database(&location.db_name)?;
    }
    if !storage.exists_table(&location.db_name, &location.table_name)? {
        storage.create_table(&location.db_name, &location.table_name, columns)?;
        tracing::info!(%location, "provisioned attribute table");
        return Ok(());
    }

    let existing = storage.table_columns(&location.db_name, &location.table_name)?;
    if existing != columns {
        let render = |cols: &[DbColumn]| {
            cols.iter()
                .map(|c| format!("{} {}", c.name, c.dtype))
                .collect::<Vec<_>>()
                .join(", ")
        };
        return Err(DataError::Storage(format!(
            "table {location} has columns ({}), expected ({})",
            render(&existing),
            render(columns)
        )));
    }
    Ok(())
}

/// Definition of a catalog attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAttribute {
    /// Entity type, stored lower-cased
    pub entity_type: String,
    /// Attribute name
    pub attribute: String,
    /// Display name
    pub name: Option<String>,
    /// Data frequency
    pub frequency: Frequency,
    /// Value dtype
    pub dtype: ColumnType,
    /// Entity key dtype
    pub code_dtype: ColumnType,
    /// Secondary key dtype, `None` for single-key attributes
    pub obj_dtype: Option<ColumnType>,
    /// Database override
    pub db_name: Option<String>,
    /// Table override
    pub table_name: Option<String>,
}

impl NewAttribute {
    /// Daily single-key attribute with symbol codes.
    pub fn new(entity_type: impl Into<String>, attribute: impl Into<String>, dtype: ColumnType) -> Self {
        Self {
            entity_type: entity_type.into(),
            attribute: attribute.into(),
            name: None,
            frequency: Frequency::Daily,
            dtype,
            code_dtype: ColumnType::Symbol,
            obj_dtype: None,
            db_name: None,
            table_name: None,
        }
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the frequency.
    pub const fn with_frequency(mut self, frequency: Frequency) -> Self {
        self.frequency = frequency;
        self
    }

    /// Set the entity key dtype.
    pub const fn with_code_dtype(mut self, code_dtype: ColumnType) -> Self {
        self.code_dtype = code_dtype;
        self
    }

    /// Make the attribute dual-key.
    pub const fn with_obj_dtype(mut self, obj_dtype: ColumnType) -> Self {
        self.obj_dtype = Some(obj_dtype);
        self
    }

    /// Override the storage location.
    pub fn with_location(mut self, db_name: impl Into<String>, table_name: impl Into<String>) -> Self {
        self.db_name = Some(db_name.into());
        self.table_name = Some(table_name.into());
        self
    }

    /// Catalog row for this definition, with default locations filled in.
    pub fn descriptor(&self) -> AttributeDescriptor {
        AttributeDescriptor {
            entity_type: self.entity_type.to_lowercase(),
            frequency: self.frequency.to_db_str().to_string(),
            attribute: self.attribute.clone(),
            name: self.name.clone(),
            dtype: self.dtype.as_str().to_string(),
            code_dtype: self.code_dtype.as_str().to_string(),
            obj_dtype: self.obj_dtype.map(|d| d.as_str().to_string()),
            db_name: self
                .db_name
                .clone()
                .unwrap_or_else(|| default_db_name(&self.entity_type, self.frequency)),
            table_name: self
                .table_name
                .clone()
                .unwrap_or_else(|| default_table_name(self.dtype)),
        }
    }
}

/// Register an attribute, provisioning its table.
///
/// An existing row for the same key is replaced. Fails if the key is already
/// ambiguous.
pub fn add_attribute(
    storage: &dyn Storage,
    catalog: &AttributeCatalog,
    attribute: &NewAttribute,
) -> Result<AttributeDescriptor> {
    catalog.lookup_unique(&attribute.entity_type, attribute.frequency, &attribute.attribute)?;

    let descriptor = attribute.descriptor();
    init_db(storage)?;
    ensure_table(
        storage,
        &descriptor.location(),
        &attribute_columns(attribute.dtype, attribute.code_dtype, attribute.obj_dtype),
    )?;

    let key: Vec<String> = CATALOG_KEY.iter().map(|k| k.to_string()).collect();
    let row = AttributeCatalog::to_frame(std::slice::from_ref(&descriptor))?;
    storage.upsert(INFO_DB, CATALOG_TABLE, &key, &row)?;
    tracing::info!(
        entity_type = %descriptor.entity_type,
        attribute = %descriptor.attribute,
        location = %descriptor.location(),
        "registered attribute"
    );
    Ok(descriptor)
}

/// Storage layout of a new entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewObject {
    /// Entity type
    pub name: String,
    /// Frequencies to provision
    pub frequencies: Vec<Frequency>,
    /// Entity key dtype
    pub code_dtype: ColumnType,
    /// Value dtypes, one table each
    pub dtypes: Vec<ColumnType>,
    /// Secondary key dtype for dual-key tables
    pub obj_dtype: Option<ColumnType>,
}

impl NewObject {
    /// Daily layout with one `DOUBLE` table and symbol codes.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            frequencies: vec![Frequency::Daily],
            code_dtype: ColumnType::Symbol,
            dtypes: vec![ColumnType::Double],
            obj_dtype: None,
        }
    }
}

/// Provision `{name}_{freq}` databases with one `attr_{dtype}` table per
/// value dtype. Returns every location, including ones that already existed.
pub fn add_object(storage: &dyn Storage, object: &NewObject) -> Result<Vec<StorageLocation>> {
    if object.name.trim().is_empty() {
        return Err(DataError::Storage("entity type name is empty".to_string()));
    }
    let mut locations = Vec::new();
    for frequency in &object.frequencies {
        for dtype in &object.dtypes {
            let location = StorageLocation {
                db_name: default_db_name(&object.name, *frequency),
                table_name: default_table_name(*dtype),
            };
            ensure_table(
                storage,
                &location,
                &attribute_columns(*dtype, object.code_dtype, object.obj_dtype),
            )?;
            locations.push(location);
        }
    }
    Ok(locations)
}
