//! Long/panel reshaping.
//!
//! A long table has key columns (`datetime`, `code`, optionally `object`)
//! followed by `attribute` and `value`. A panel has the same key columns
//! followed by one column per attribute. Polars frames carry no row index, so
//! the key columns play the role of the index levels.

use crate::error::{DataError, Result};
use polars::prelude::*;
use std::collections::HashSet;

/// Timestamp key column.
pub const DATETIME: &str = "datetime";
/// Entity key column.
pub const CODE: &str = "code";
/// Secondary entity key column of dual-key attributes.
pub const OBJECT: &str = "object";
/// Attribute name column of long tables.
pub const ATTRIBUTE: &str = "attribute";
/// Value column of long tables.
pub const VALUE: &str = "value";
/// Label given to stacked column names by [`to_long`].
pub const VARIABLE: &str = "variable";

/// Key columns of single-key or dual-key tables.
pub fn key_columns(dual_key: bool) -> Vec<&'static str> {
    if dual_key {
        vec![DATETIME, CODE, OBJECT]
    } else {
        vec![DATETIME, CODE]
    }
}

/// Fail with [`DataError::MissingColumn`] unless every column is present.
pub fn require_columns(df: &DataFrame, columns: &[&str]) -> Result<()> {
    for name in columns {
        if df.column(name).is_err() {
            return Err(DataError::MissingColumn((*name).to_string()));
        }
    }
    Ok(())
}

fn key_exprs(keys: &[&str]) -> Vec<Expr> {
    keys.iter().map(|k| col(*k)).collect()
}

fn full_join_args() -> JoinArgs {
    JoinArgs::new(JoinType::Full).with_coalesce(JoinCoalesce::CoalesceColumns)
}

fn sort_by_keys(lf: LazyFrame, keys: &[&str]) -> LazyFrame {
    lf.sort_by_exprs(
        key_exprs(keys),
        SortMultipleOptions::default().with_maintain_order(true),
    )
}

/// Distinct values of a string column in order of first appearance.
pub fn distinct_in_order(df: &DataFrame, column: &str) -> Result<Vec<String>> {
    let values = df.column(column)?.str()?;
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for v in values.into_iter().flatten() {
        if seen.insert(v) {
            out.push(v.to_string());
        }
    }
    Ok(out)
}

/// Fail with [`DataError::PivotAmbiguity`] if any (keys, attribute) pair
/// occurs more than once.
pub fn check_unique(long: &DataFrame, keys: &[&str], attribute: &str) -> Result<()> {
    let mut group = key_exprs(keys);
    group.push(col(attribute));

    let duplicates = long
        .clone()
        .lazy()
        .group_by(group)
        .agg([len().alias("__rows")])
        .filter(col("__rows").gt(lit(1)))
        .limit(1)
        .collect()?;

    if duplicates.height() == 0 {
        return Ok(());
    }

    let mut rendered = Vec::with_capacity(keys.len());
    for key in keys {
        rendered.push(duplicates.column(key)?.get(0)?.to_string());
    }
    let attribute = duplicates
        .column(attribute)?
        .str()?
        .get(0)
        .unwrap_or_default()
        .to_string();
    let count = duplicates
        .column("__rows")?
        .cast(&DataType::UInt32)?
        .u32()?
        .get(0)
        .unwrap_or(0);

    Err(DataError::PivotAmbiguity {
        key: format!("({})", rendered.join(", ")),
        attribute,
        count,
    })
}

/// Pivot a long table into a panel.
///
/// Rows are indexed by `keys`, columns are the distinct values of the
/// `attribute` column in order of first appearance, cells are taken from
/// `value`. Keys missing an attribute get a null cell. A duplicate
/// (keys, attribute) pair is an error, never aggregated.
pub fn to_panel(long: &DataFrame, keys: &[&str]) -> Result<DataFrame> {
    let mut required = keys.to_vec();
    required.extend([ATTRIBUTE, VALUE]);
    require_columns(long, &required)?;

    if long.height() == 0 {
        return Ok(long.select(keys.iter().copied())?);
    }

    check_unique(long, keys, ATTRIBUTE)?;

    let attributes = distinct_in_order(long, ATTRIBUTE)?;
    let on = key_exprs(keys);

    let panel = attributes
        .iter()
        .map(|attr| {
            let mut select = key_exprs(keys);
            select.push(col(VALUE).alias(attr.as_str()));
            long.clone()
                .lazy()
                .filter(col(ATTRIBUTE).eq(lit(attr.as_str())))
                .select(select)
        })
        .reduce(|acc, lf| acc.join(lf, on.clone(), on.clone(), full_join_args()))
        .ok_or_else(|| DataError::MissingColumn(ATTRIBUTE.to_string()))?;

    let mut order = key_exprs(keys);
    order.extend(attributes.iter().map(|a| col(a.as_str())));

    Ok(sort_by_keys(panel, keys).select(order).collect()?)
}

/// Stack every non-key column of a panel into `variable`/`value` pairs.
///
/// Null cells are not emitted, so `to_long(to_panel(t))` reproduces `t` up
/// to row order. Rows are ordered by key, then by column position.
pub fn to_long(wide: &DataFrame, keys: &[&str]) -> Result<DataFrame> {
    require_columns(wide, keys)?;

    let value_columns: Vec<String> = wide
        .get_column_names()
        .into_iter()
        .map(|name| name.to_string())
        .filter(|name| !keys.contains(&name.as_str()))
        .collect();

    if value_columns.is_empty() {
        let mut select = key_exprs(keys);
        select.push(lit("").alias(VARIABLE));
        select.push(lit(NULL).cast(DataType::Float64).alias(VALUE));
        return Ok(wide
            .clone()
            .lazy()
            .select(select)
            .filter(lit(false))
            .collect()?);
    }

    let parts: Vec<LazyFrame> = value_columns
        .iter()
        .map(|name| {
            let mut select = key_exprs(keys);
            select.push(lit(name.as_str()).alias(VARIABLE));
            select.push(col(name.as_str()).alias(VALUE));
            wide.clone()
                .lazy()
                .select(select)
                .filter(col(VALUE).is_not_null())
        })
        .collect();

    let stacked = concat(
        parts,
        UnionArgs {
            to_supertypes: true,
            ..Default::default()
        },
    )?;

    Ok(sort_by_keys(stacked, keys).collect()?)
}

/// Rename the generic stacked-column label to `label`.
pub fn relabel_long(mut long: DataFrame, label: &str) -> Result<DataFrame> {
    if long.column(VARIABLE).is_ok() {
        long.rename(VARIABLE, label.into())?;
    }
    Ok(long)
}

/// Full outer join of partial panels on the key columns.
///
/// Empty frames are skipped. Combinations missing from a part surface as
/// nulls rather than dropped rows.
pub fn outer_merge(frames: Vec<DataFrame>, keys: &[&str]) -> Result<DataFrame> {
    let on = key_exprs(keys);
    let mut parts = Vec::new();
    for frame in frames.into_iter().filter(|f| f.height() > 0) {
        require_columns(&frame, keys)?;
        parts.push(frame.lazy());
    }

    let Some(merged) = parts
        .into_iter()
        .reduce(|acc, lf| acc.join(lf, on.clone(), on.clone(), full_join_args()))
    else {
        return Ok(DataFrame::empty());
    };

    Ok(sort_by_keys(merged, keys).collect()?)
}

/// Project a panel onto exactly `keys` followed by `attributes`.
///
/// Attributes with no column yet are added as all-null columns; columns that
/// were not requested are dropped. An empty frame is returned unchanged.
pub fn ensure_columns(panel: DataFrame, keys: &[&str], attributes: &[String]) -> Result<DataFrame> {
    if panel.width() == 0 {
        return Ok(panel);
    }
    require_columns(&panel, keys)?;

    let mut select = key_exprs(keys);
    for attr in attributes {
        if panel.column(attr).is_ok() {
            select.push(col(attr.as_str()));
        } else {
            select.push(lit(NULL).cast(DataType::Float64).alias(attr.as_str()));
        }
    }
    Ok(panel.lazy().select(select).collect()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::{DATETIME_DTYPE, parse_time, to_millis};

    fn ms(s: &str) -> i64 {
        to_millis(parse_time(s).unwrap())
    }

    fn long_table() -> DataFrame {
        let df = df!(
            DATETIME => [ms("2024-01-02"), ms("2024-01-02"), ms("2024-01-02"), ms("2024-01-03")],
            CODE => ["A", "A", "B", "A"],
            ATTRIBUTE => ["pe", "pb", "pe", "pe"],
            VALUE => [1.0, 2.0, 3.0, 4.0]
        )
        .unwrap();
        df.lazy()
            .with_column(col(DATETIME).cast(DATETIME_DTYPE))
            .collect()
            .unwrap()
    }

    #[test]
    fn test_to_panel_shape() {
        let keys = key_columns(false);
        let panel = to_panel(&long_table(), &keys).unwrap();
        assert_eq!(
            panel.get_column_names(),
            vec![DATETIME, CODE, "pe", "pb"]
        );
        assert_eq!(panel.height(), 3);
        // B has no pb on 2024-01-02
        assert_eq!(panel.column("pb").unwrap().null_count(), 2);
    }

    #[test]
    fn test_to_panel_rejects_duplicates() {
        let long = long_table();
        let dup = long.slice(0, 1);
        let long = long.vstack(&dup).unwrap();
        let err = to_panel(&long, &key_columns(false)).unwrap_err();
        match err {
            DataError::PivotAmbiguity {
                attribute, count, ..
            } => {
                assert_eq!(attribute, "pe");
                assert_eq!(count, 2);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_roundtrip_preserves_rows() {
        let keys = key_columns(false);
        let long = long_table();
        let back = to_long(&to_panel(&long, &keys).unwrap(), &keys).unwrap();
        assert_eq!(back.height(), long.height());

        let back = relabel_long(back, ATTRIBUTE).unwrap();
        let mut expected = Vec::new();
        let mut actual = Vec::new();
        for (df, out) in [(&long, &mut expected), (&back, &mut actual)] {
            for i in 0..df.height() {
                out.push(format!(
                    "{}|{}|{}|{}",
                    df.column(DATETIME).unwrap().get(i).unwrap(),
                    df.column(CODE).unwrap().get(i).unwrap(),
                    df.column(ATTRIBUTE).unwrap().get(i).unwrap(),
                    df.column(VALUE).unwrap().get(i).unwrap(),
                ));
            }
        }
        expected.sort();
        actual.sort();
        assert_eq!(expected, actual);
    }

    #[test]
    fn test_to_long_without_value_columns() {
        let keys = key_columns(false);
        let long = long_table();
        let keys_only = long.select(keys.iter().copied()).unwrap();
        let out = to_long(&keys_only, &keys).unwrap();
        assert_eq!(out.height(), 0);
        assert!(out.column(VARIABLE).is_ok());
    }

    #[test]
    fn test_outer_merge_fills_nulls() {
        let keys = key_columns(false);
        let left = df!(DATETIME => [1_i64, 2], CODE => ["A", "A"], "x" => [1.0, 2.0]).unwrap();
        let right = df!(DATETIME => [2_i64, 3], CODE => ["A", "A"], "y" => [5.0, 6.0]).unwrap();
        let merged = outer_merge(vec![left, right, DataFrame::empty()], &keys).unwrap();
        assert_eq!(merged.height(), 3);
        assert_eq!(merged.column("x").unwrap().null_count(), 1);
        assert_eq!(merged.column("y").unwrap().null_count(), 1);
    }

    #[test]
    fn test_outer_merge_of_nothing_is_empty() {
        let merged = outer_merge(vec![], &key_columns(false)).unwrap();
        assert_eq!(merged.width(), 0);
    }

    #[test]
    fn test_ensure_columns_adds_and_orders() {
        let keys = key_columns(false);
        let panel = df!(DATETIME => [1_i64], CODE => ["A"], "pb" => [1.0], "extra" => [0.0]).unwrap();
        let wanted = vec!["pe".to_string(), "pb".to_string()];
        let out = ensure_columns(panel, &keys, &wanted).unwrap();
        assert_eq!(out.get_column_names(), vec![DATETIME, CODE, "pe", "pb"]);
        assert_eq!(out.column("pe").unwrap().null_count(), 1);
    }

    #[test]
    fn test_missing_key_column() {
        let df = df!(CODE => ["A"], ATTRIBUTE => ["pe"], VALUE => [1.0]).unwrap();
        assert!(matches!(
            to_panel(&df, &key_columns(false)),
            Err(DataError::MissingColumn(c)) if c == DATETIME
        ));
    }
}
