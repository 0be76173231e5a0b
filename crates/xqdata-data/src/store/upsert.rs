//! Write path: wide panels back into catalog-resolved attribute tables.

use crate::catalog::AttributeCatalog;
use crate::diagnostic::{Diagnostic, Diagnostics, Fetched};
use crate::error::{DataError, Result};
use crate::frequency::Frequency;
use crate::reshape::{ATTRIBUTE, CODE, DATETIME, OBJECT, VALUE, key_columns, require_columns};
use crate::storage::Storage;
use crate::time::normalize_datetime;
use polars::prelude::*;

/// Write the attribute columns of a wide panel.
///
/// `data` is keyed by `datetime, code` and optionally `object`. Attributes
/// default to every non-key column. Each attribute is resolved for
/// `entity_type` at `frequency`; unknown or ambiguous attributes are skipped
/// with a diagnostic. Rows merge on `datetime, code[, object], attribute`, so
/// repeating a write leaves the store unchanged. Null cells are not written.
///
/// Returns the number of rows written.
pub fn upsert_attribute(
    storage: &dyn Storage,
    catalog: &AttributeCatalog,
    entity_type: &str,
    data: &DataFrame,
    attributes: Option<&[String]>,
    frequency: Frequency,
) -> Result<Fetched<usize>> {
    require_columns(data, &[DATETIME, CODE])?;
    let dual_key = data.column(OBJECT).is_ok();
    let keys = key_columns(dual_key);

    let attributes: Vec<String> = match attributes {
        Some(attrs) => attrs.to_vec(),
        None => data
            .get_column_names()
            .into_iter()
            .map(|n| n.to_string())
            .filter(|n| !keys.contains(&n.as_str()))
            .collect(),
    };

    let data = normalize_datetime(data.clone(), DATETIME)?;
    let mut key_cols: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
    key_cols.push(ATTRIBUTE.to_string());

    let mut diagnostics = Diagnostics::new();
    let mut written = 0;
    for attribute in &attributes {
        require_columns(&data, &[attribute.as_str()])?;

        let rows = catalog.lookup(entity_type, frequency, attribute);
        let descriptor = match rows.as_slice() {
            [] => {
                diagnostics.push(Diagnostic::MissingAttribute {
                    attribute: attribute.clone(),
                });
                continue;
            }
            [single] => *single,
            _ => {
                diagnostics.push(Diagnostic::AmbiguousCatalog {
                    attribute: attribute.clone(),
                });
                continue;
            }
        };

        if descriptor.is_dual_key() != dual_key {
            return Err(DataError::Storage(format!(
                "attribute {attribute} is {}, data is {}",
                key_shape(descriptor.is_dual_key()),
                key_shape(dual_key)
            )));
        }

        let mut select: Vec<Expr> = vec![col(DATETIME), col(CODE).cast(DataType::String)];
        if dual_key {
            select.push(col(OBJECT).cast(DataType::String));
        }
        select.push(lit(attribute.as_str()).alias(ATTRIBUTE));
        select.push(
            col(attribute.as_str())
                .cast(descriptor.value_dtype()?.polars_dtype())
                .alias(VALUE),
        );
        let long = data
            .clone()
            .lazy()
            .select(select)
            .filter(col(VALUE).is_not_null())
            .collect()?;
        if long.height() == 0 {
            continue;
        }

        let location = descriptor.location();
        written += storage.upsert(&location.db_name, &location.table_name, &key_cols, &long)?;
        tracing::debug!(%attribute, %location, rows = long.height(), "wrote attribute");
    }

    Ok(Fetched::with(written, diagnostics))
}

const fn key_shape(dual_key: bool) -> &'static str {
    if dual_key { "dual-key" } else { "single-key" }
}
