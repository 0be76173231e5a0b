//! CSV rendering of result tables.

use polars::prelude::*;
use std::error::Error;
use std::io::Write;
use xqdata_data::time::{any_value_millis, from_millis};

/// Write `df` as CSV with a header row.
///
/// Temporal cells use `YYYY-MM-DD HH:MM:SS`, nulls are empty.
pub(crate) fn write_csv<W: Write>(df: &DataFrame, writer: W) -> Result<(), Box<dyn Error>> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(df.get_column_names().iter().map(|name| name.as_str()))?;

    let columns = df.get_columns();
    for row in 0..df.height() {
        let record = columns
            .iter()
            .map(|column| column.get(row).map(|value| format_cell(&value)))
            .collect::<PolarsResult<Vec<_>>>()?;
        out.write_record(&record)?;
    }
    out.flush()?;
    Ok(())
}

fn format_cell(value: &AnyValue<'_>) -> String {
    if value.is_null() {
        return String::new();
    }
    if let Some(s) = value.get_str() {
        return s.to_string();
    }
    match any_value_millis(value).and_then(from_millis) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => value.to_string(),
    }
}
