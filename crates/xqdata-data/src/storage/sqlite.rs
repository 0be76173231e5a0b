//! SQLite storage engine.
//!
//! Each `(database, table)` pair maps to one SQLite table named
//! `"{database}.{table}"`. Databases are registered in a `_databases` table
//! so their existence can be checked like in a real multi-database engine.

use super::{ColumnType, DbColumn, Storage};
use crate::error::{DataError, Result};
use crate::filter::{Comparator, Filter, FilterValue};
use crate::time::{any_value_millis, parse_time, to_millis};
use polars::prelude::*;
use rusqlite::types::{Value, ValueRef};
use rusqlite::{Connection, params, params_from_iter};
use std::path::Path;

const MILLIS_PER_DAY: i64 = 86_400_000;

/// SQLite-backed [`Storage`].
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) a store file.
    ///
    /// # Arguments
    /// * `path` - Path to the SQLite database file
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Initialize the database registry.
    fn initialize_schema(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS _databases (
                name TEXT PRIMARY KEY,
                created_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    /// Table names registered under a database.
    pub fn list_tables(&self, db: &str) -> Result<Vec<String>> {
        let prefix = format!("{db}.");
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(names
            .into_iter()
            .filter_map(|n| n.strip_prefix(&prefix).map(str::to_string))
            .collect())
    }

    /// Declared schema of a table, empty if it does not exist.
    fn table_schema(&self, db: &str, table: &str) -> Result<Vec<DbColumn>> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", table_ident(db, table)))?;
        let columns = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(1)?, row.get::<_, String>(2)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(columns
            .into_iter()
            .map(|(name, decl)| DbColumn::new(name, from_sql_decl(&decl)))
            .collect())
    }

    fn require_schema(&self, db: &str, table: &str) -> Result<Vec<DbColumn>> {
        let schema = self.table_schema(db, table)?;
        if schema.is_empty() {
            return Err(DataError::NotFound(format!("{db}/{table}")));
        }
        Ok(schema)
    }
}

fn quote(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn table_ident(db: &str, table: &str) -> String {
    quote(&format!("{db}.{table}"))
}

const fn sql_decl(dtype: ColumnType) -> &'static str {
    match dtype {
        ColumnType::Double => "REAL",
        ColumnType::Int => "INTEGER",
        ColumnType::Bool => "BOOLEAN",
        ColumnType::Symbol => "SYMBOL TEXT",
        ColumnType::String => "TEXT",
        ColumnType::Date => "DATE",
        ColumnType::Timestamp => "TIMESTAMP",
    }
}

fn from_sql_decl(decl: &str) -> ColumnType {
    match decl.to_uppercase().as_str() {
        "REAL" => ColumnType::Double,
        "INTEGER" => ColumnType::Int,
        "BOOLEAN" => ColumnType::Bool,
        "SYMBOL TEXT" => ColumnType::Symbol,
        "DATE" => ColumnType::Date,
        "TIMESTAMP" => ColumnType::Timestamp,
        _ => ColumnType::String,
    }
}

/// Convert a filter operand to a SQL parameter for a column of `dtype`.
fn filter_param(value: &FilterValue, dtype: ColumnType) -> Value {
    match value {
        FilterValue::Str(s) => match (dtype, parse_time(s)) {
            (ColumnType::Timestamp, Ok(t)) => Value::Integer(to_millis(t)),
            (ColumnType::Date, Ok(t)) => Value::Integer(to_millis(t).div_euclid(MILLIS_PER_DAY)),
            _ => Value::Text(s.clone()),
        },
        FilterValue::Int(v) => match dtype {
            ColumnType::Symbol | ColumnType::String => Value::Text(v.to_string()),
            _ => Value::Integer(*v),
        },
        FilterValue::Float(v) => Value::Real(*v),
        FilterValue::Bool(v) => Value::Integer(i64::from(*v)),
        FilterValue::Time(t) => match dtype {
            ColumnType::Date => Value::Integer(to_millis(*t).div_euclid(MILLIS_PER_DAY)),
            _ => Value::Integer(to_millis(*t)),
        },
        FilterValue::List(_) => Value::Null,
    }
}

/// Render `conds` as a WHERE clause with positional parameters.
fn where_clause(conds: &[Filter], schema: &[DbColumn]) -> Result<(String, Vec<Value>)> {
    let mut clauses = Vec::with_capacity(conds.len());
    let mut params = Vec::new();

    for cond in conds {
        let column = schema
            .iter()
            .find(|c| c.name == cond.field)
            .ok_or_else(|| DataError::MissingColumn(cond.field.clone()))?;
        let field = quote(&cond.field);

        match (&cond.comparator, &cond.value) {
            (Comparator::IsIn, FilterValue::List(values)) => {
                if values.is_empty() {
                    clauses.push("0".to_string());
                    continue;
                }
                let placeholders = vec!["?"; values.len()].join(", ");
                clauses.push(format!("{field} IN ({placeholders})"));
                params.extend(values.iter().map(|v| filter_param(v, column.dtype)));
            }
            (Comparator::IsIn, scalar) => {
                clauses.push(format!("{field} = ?"));
                params.push(filter_param(scalar, column.dtype));
            }
            (op, value) => {
                clauses.push(format!("{field} {} ?", op.sql_op()));
                params.push(filter_param(value, column.dtype));
            }
        }
    }

    if clauses.is_empty() {
        Ok((String::new(), params))
    } else {
        Ok((format!(" WHERE {}", clauses.join(" AND ")), params))
    }
}

/// Convert a polars cell to a SQL value for a column of `dtype`.
fn cell_value(value: &AnyValue<'_>, dtype: ColumnType) -> Value {
    if value.is_null() {
        return Value::Null;
    }
    match dtype {
        ColumnType::Double => value.extract::<f64>().map_or(Value::Null, Value::Real),
        ColumnType::Int => value.extract::<i64>().map_or(Value::Null, Value::Integer),
        ColumnType::Bool => match value {
            AnyValue::Boolean(b) => Value::Integer(i64::from(*b)),
            other => other
                .extract::<i64>()
                .map_or(Value::Null, |v| Value::Integer(i64::from(v != 0))),
        },
        ColumnType::Symbol | ColumnType::String => Value::Text(match value {
            AnyValue::String(s) => (*s).to_string(),
            AnyValue::StringOwned(s) => s.to_string(),
            other => other.to_string(),
        }),
        ColumnType::Date => match value {
            AnyValue::Date(d) => Value::Integer(i64::from(*d)),
            AnyValue::String(s) => parse_time(s).map_or(Value::Null, |t| {
                Value::Integer(to_millis(t).div_euclid(MILLIS_PER_DAY))
            }),
            other => any_value_millis(other)
                .map_or(Value::Null, |ms| Value::Integer(ms.div_euclid(MILLIS_PER_DAY))),
        },
        ColumnType::Timestamp => match value {
            AnyValue::String(s) => parse_time(s).map_or(Value::Null, |t| Value::Integer(to_millis(t))),
            other => any_value_millis(other)
                .or_else(|| other.extract::<i64>())
                .map_or(Value::Null, Value::Integer),
        },
    }
}

/// Typed buffer collecting one result column.
enum ColumnBuffer {
    Double(Vec<Option<f64>>),
    Int(Vec<Option<i64>>),
    Bool(Vec<Option<bool>>),
    Text(Vec<Option<String>>),
    Date(Vec<Option<i32>>),
    Timestamp(Vec<Option<i64>>),
}

impl ColumnBuffer {
    const fn new(dtype: ColumnType) -> Self {
        match dtype {
            ColumnType::Double => Self::Double(Vec::new()),
            ColumnType::Int => Self::Int(Vec::new()),
            ColumnType::Bool => Self::Bool(Vec::new()),
            ColumnType::Symbol | ColumnType::String => Self::Text(Vec::new()),
            ColumnType::Date => Self::Date(Vec::new()),
            ColumnType::Timestamp => Self::Timestamp(Vec::new()),
        }
    }

    fn push(&mut self, value: ValueRef<'_>) {
        let as_i64 = || match value {
            ValueRef::Integer(i) => Some(i),
            ValueRef::Real(f) => Some(f as i64),
            _ => None,
        };
        match self {
            Self::Double(v) => v.push(match value {
                ValueRef::Integer(i) => Some(i as f64),
                ValueRef::Real(f) => Some(f),
                ValueRef::Text(t) => std::str::from_utf8(t).ok().and_then(|s| s.parse().ok()),
                _ => None,
            }),
            Self::Int(v) => v.push(as_i64()),
            Self::Bool(v) => v.push(as_i64().map(|i| i != 0)),
            Self::Text(v) => v.push(match value {
                ValueRef::Text(t) => Some(String::from_utf8_lossy(t).into_owned()),
                ValueRef::Integer(i) => Some(i.to_string()),
                ValueRef::Real(f) => Some(f.to_string()),
                _ => None,
            }),
            Self::Date(v) => v.push(as_i64().and_then(|d| i32::try_from(d).ok())),
            Self::Timestamp(v) => v.push(as_i64()),
        }
    }

    fn into_column(self, name: &str) -> Result<Column> {
        let name: PlSmallStr = name.into();
        let series = match self {
            Self::Double(v) => Series::new(name, v),
            Self::Int(v) => Series::new(name, v),
            Self::Bool(v) => Series::new(name, v),
            Self::Text(v) => Series::new(name, v),
            Self::Date(v) => Series::new(name, v).cast(&DataType::Date)?,
            Self::Timestamp(v) => {
                Series::new(name, v).cast(&ColumnType::Timestamp.polars_dtype())?
            }
        };
        Ok(series.into())
    }
}

impl Storage for SqliteStore {
    fn exists_database(&self, db: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM _databases WHERE name = ?1",
            params![db],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn create_database(&self, db: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO _databases (name, created_at) VALUES (?1, ?2)",
            params![db, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn exists_table(&self, db: &str, table: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![format!("{db}.{table}")],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn table_columns(&self, db: &str, table: &str) -> Result<Vec<DbColumn>> {
        self.table_schema(db, table)
    }

    fn create_table(&self, db: &str, table: &str, columns: &[DbColumn]) -> Result<()> {
        if !self.exists_database(db)? {
            return Err(DataError::NotFound(db.to_string()));
        }
        if columns.is_empty() {
            return Err(DataError::Storage(format!(
                "table {db}/{table} needs at least one column"
            )));
        }

        let defs: Vec<String> = columns
            .iter()
            .map(|c| format!("{} {}", quote(&c.name), sql_decl(c.dtype)))
            .collect();
        self.conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} ({})",
                table_ident(db, table),
                defs.join(", ")
            ),
            [],
        )?;

        // Attribute tables are read by code and time range
        let has = |name: &str| columns.iter().any(|c| c.name == name);
        if has("code") && has("datetime") {
            self.conn.execute(
                &format!(
                    "CREATE INDEX IF NOT EXISTS {} ON {}(\"code\", \"datetime\")",
                    quote(&format!("idx_{db}.{table}_code_datetime")),
                    table_ident(db, table)
                ),
                [],
            )?;
        }

        tracing::debug!(db, table, columns = columns.len(), "created table");
        Ok(())
    }

    fn query(&self, db: &str, table: &str, conds: &[Filter]) -> Result<DataFrame> {
        let schema = self.require_schema(db, table)?;
        let (clause, params) = where_clause(conds, &schema)?;
        let names: Vec<String> = schema.iter().map(|c| quote(&c.name)).collect();
        let sql = format!(
            "SELECT {} FROM {}{}",
            names.join(", "),
            table_ident(db, table),
            clause
        );
        tracing::trace!(%sql, "storage query");

        let mut buffers: Vec<ColumnBuffer> =
            schema.iter().map(|c| ColumnBuffer::new(c.dtype)).collect();
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        while let Some(row) = rows.next()? {
            for (i, buffer) in buffers.iter_mut().enumerate() {
                buffer.push(row.get_ref(i)?);
            }
        }

        let columns = buffers
            .into_iter()
            .zip(&schema)
            .map(|(buffer, c)| buffer.into_column(&c.name))
            .collect::<Result<Vec<_>>>()?;
        Ok(DataFrame::new(columns)?)
    }

    fn upsert(&self, db: &str, table: &str, key_cols: &[String], data: &DataFrame) -> Result<usize> {
        let schema = self.require_schema(db, table)?;
        let dtype_of = |name: &str| {
            schema
                .iter()
                .find(|c| c.name == name)
                .map(|c| c.dtype)
                .ok_or_else(|| DataError::MissingColumn(format!("{db}/{table}.{name}")))
        };

        let columns = data.get_columns();
        let dtypes = columns
            .iter()
            .map(|c| dtype_of(c.name().as_str()))
            .collect::<Result<Vec<_>>>()?;
        let key_positions = key_cols
            .iter()
            .map(|k| {
                columns
                    .iter()
                    .position(|c| c.name().as_str() == k)
                    .ok_or_else(|| DataError::MissingColumn(k.clone()))
            })
            .collect::<Result<Vec<_>>>()?;

        let ident = table_ident(db, table);
        let names: Vec<String> = columns.iter().map(|c| quote(c.name().as_str())).collect();
        let insert_sql = format!(
            "INSERT INTO {ident} ({}) VALUES ({})",
            names.join(", "),
            vec!["?"; names.len()].join(", ")
        );
        let delete_sql = format!(
            "DELETE FROM {ident} WHERE {}",
            key_cols
                .iter()
                .map(|k| format!("{} IS ?", quote(k)))
                .collect::<Vec<_>>()
                .join(" AND ")
        );

        let tx = self.conn.unchecked_transaction()?;
        {
            let mut insert = tx.prepare(&insert_sql)?;
            let mut delete = if key_cols.is_empty() {
                None
            } else {
                Some(tx.prepare(&delete_sql)?)
            };

            for i in 0..data.height() {
                let mut values = Vec::with_capacity(columns.len());
                for (column, dtype) in columns.iter().zip(&dtypes) {
                    values.push(cell_value(&column.get(i)?, *dtype));
                }
                if let Some(delete) = delete.as_mut() {
                    let keys = key_positions.iter().map(|&p| &values[p]);
                    delete.execute(params_from_iter(keys))?;
                }
                insert.execute(params_from_iter(values.iter()))?;
            }
        }
        tx.commit()?;

        tracing::debug!(db, table, rows = data.height(), "upserted rows");
        Ok(data.height())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::{DATETIME_DTYPE, parse_time};

    fn attr_columns() -> Vec<DbColumn> {
        vec![
            DbColumn::new("datetime", ColumnType::Timestamp),
            DbColumn::new("code", ColumnType::Symbol),
            DbColumn::new("attribute", ColumnType::Symbol),
            DbColumn::new("value", ColumnType::Double),
        ]
    }

    fn rows(values: &[(&str, &str, &str, f64)]) -> DataFrame {
        let ms: Vec<i64> = values
            .iter()
            .map(|r| to_millis(parse_time(r.0).unwrap()))
            .collect();
        let df = DataFrame::new(vec![
            Series::new("datetime".into(), ms).into(),
            Series::new(
                "code".into(),
                values.iter().map(|r| r.1).collect::<Vec<_>>(),
            )
            .into(),
            Series::new(
                "attribute".into(),
                values.iter().map(|r| r.2).collect::<Vec<_>>(),
            )
            .into(),
            Series::new(
                "value".into(),
                values.iter().map(|r| r.3).collect::<Vec<_>>(),
            )
            .into(),
        ])
        .unwrap();
        df.lazy()
            .with_column(col("datetime").cast(DATETIME_DTYPE))
            .collect()
            .unwrap()
    }

    fn store_with_table() -> SqliteStore {
        let store = SqliteStore::in_memory().unwrap();
        store.create_database("stock_d").unwrap();
        store
            .create_table("stock_d", "attr_double", &attr_columns())
            .unwrap();
        store
    }

    fn keys() -> Vec<String> {
        ["datetime", "code", "attribute"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_database_and_table_lifecycle() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(!store.exists_database("stock_d").unwrap());
        assert!(matches!(
            store.create_table("stock_d", "attr_double", &attr_columns()),
            Err(DataError::NotFound(_))
        ));

        store.create_database("stock_d").unwrap();
        store.create_database("stock_d").unwrap();
        assert!(store.exists_database("stock_d").unwrap());

        store
            .create_table("stock_d", "attr_double", &attr_columns())
            .unwrap();
        assert!(store.exists_table("stock_d", "attr_double").unwrap());
        assert!(!store.exists_table("stock_d", "attr_int").unwrap());
        assert_eq!(store.list_tables("stock_d").unwrap(), vec!["attr_double"]);
    }

    #[test]
    fn test_query_types_and_filters() {
        let store = store_with_table();
        let data = rows(&[
            ("2024-01-02", "A", "pe", 1.0),
            ("2024-01-03", "A", "pe", 2.0),
            ("2024-01-03", "B", "pb", 3.0),
        ]);
        store.upsert("stock_d", "attr_double", &keys(), &data).unwrap();

        let all = store.query("stock_d", "attr_double", &[]).unwrap();
        assert_eq!(all.height(), 3);
        assert_eq!(all.column("datetime").unwrap().dtype(), &DATETIME_DTYPE);
        assert_eq!(all.column("value").unwrap().dtype(), &DataType::Float64);

        let conds = [
            Filter::eq("code", "A"),
            Filter::gt("datetime", parse_time("2024-01-02").unwrap()),
        ];
        let out = store.query("stock_d", "attr_double", &conds).unwrap();
        assert_eq!(out.height(), 1);
        approx::assert_relative_eq!(
            out.column("value").unwrap().f64().unwrap().get(0).unwrap(),
            2.0
        );

        let conds = [Filter::isin("attribute", vec!["pb"])];
        assert_eq!(
            store.query("stock_d", "attr_double", &conds).unwrap().height(),
            1
        );
    }

    #[test]
    fn test_upsert_merges_on_key() {
        let store = store_with_table();
        let first = rows(&[("2024-01-02", "A", "pe", 1.0), ("2024-01-03", "A", "pe", 2.0)]);
        store.upsert("stock_d", "attr_double", &keys(), &first).unwrap();

        let update = rows(&[("2024-01-03", "A", "pe", 5.0), ("2024-01-03", "A", "pe", 6.0)]);
        store.upsert("stock_d", "attr_double", &keys(), &update).unwrap();

        let out = store
            .query("stock_d", "attr_double", &[Filter::eq("datetime", parse_time("2024-01-03").unwrap())])
            .unwrap();
        assert_eq!(out.height(), 1);
        approx::assert_relative_eq!(
            out.column("value").unwrap().f64().unwrap().get(0).unwrap(),
            6.0
        );
    }

    #[test]
    fn test_upsert_without_keys_keeps_duplicates() {
        let store = store_with_table();
        let data = rows(&[("2024-01-02", "A", "pe", 1.0)]);
        store.upsert("stock_d", "attr_double", &[], &data).unwrap();
        store.upsert("stock_d", "attr_double", &[], &data).unwrap();
        assert_eq!(store.query("stock_d", "attr_double", &[]).unwrap().height(), 2);
    }

    #[test]
    fn test_unknown_table_and_column() {
        let store = store_with_table();
        assert!(matches!(
            store.query("stock_d", "attr_int", &[]),
            Err(DataError::NotFound(_))
        ));
        assert!(matches!(
            store.query("stock_d", "attr_double", &[Filter::eq("object", "x")]),
            Err(DataError::MissingColumn(_))
        ));
    }

    #[test]
    fn test_temporal_filters_accept_strings() {
        let store = SqliteStore::in_memory().unwrap();
        store.create_database("infos").unwrap();
        let columns = [
            DbColumn::new("code", ColumnType::Symbol),
            DbColumn::new("listed_date", ColumnType::Date),
        ];
        store.create_table("infos", "stock", &columns).unwrap();
        let data = df!(
            "code" => ["000001.XSHE", "600000.XSHG"],
            "listed_date" => ["1991-04-03", "1999-11-10"]
        )
        .unwrap();
        store
            .upsert("infos", "stock", &["code".to_string()], &data)
            .unwrap();

        let out = store
            .query("infos", "stock", &[Filter::gt("listed_date", "1995-01-01")])
            .unwrap();
        assert_eq!(out.height(), 1);
        assert_eq!(
            out.column("code").unwrap().str().unwrap().get(0),
            Some("600000.XSHG")
        );
        assert_eq!(
            store
                .query("infos", "stock", &[Filter::eq("listed_date", "1991-04-03")])
                .unwrap()
                .height(),
            1
        );

        let store = store_with_table();
        store
            .upsert("stock_d", "attr_double", &keys(), &rows(&[("2024-01-03", "A", "pe", 1.0)]))
            .unwrap();
        let conds = [Filter::lt("datetime", "2024-01-03 00:00:01")];
        assert_eq!(store.query("stock_d", "attr_double", &conds).unwrap().height(), 1);
    }

    #[test]
    fn test_table_columns_report_declared_schema() {
        let store = store_with_table();
        assert_eq!(
            store.table_columns("stock_d", "attr_double").unwrap(),
            attr_columns()
        );
        assert!(store.table_columns("stock_d", "attr_int").unwrap().is_empty());
    }

    #[test]
    fn test_symbol_codes_keep_leading_zeros() {
        let store = store_with_table();
        let data = rows(&[("2024-01-02", "000001", "pe", 1.0)]);
        store.upsert("stock_d", "attr_double", &keys(), &data).unwrap();
        let out = store.query("stock_d", "attr_double", &[]).unwrap();
        assert_eq!(out.column("code").unwrap().str().unwrap().get(0), Some("000001"));
    }
}
