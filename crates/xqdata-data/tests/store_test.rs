//! Integration tests for the attribute store backend.

use approx::assert_relative_eq;
use polars::prelude::*;
use rstest::{fixture, rstest};
use xqdata_data::filter::Filter;
use xqdata_data::store::MEMORY_PATH;
use xqdata_data::time::{datetime_series, parse_time, to_millis};
use xqdata_data::{
    ColumnType, Credentials, DataApi, DataError, DbColumn, Diagnostic, FactorRequest, Fetched,
    Frequency, NewAttribute, NewObject, Result, SqliteStore, Storage, StoreConfig, StoreDataApi,
};

const CODES: [&str; 2] = ["000001.XSHE", "000002.XSHE"];
const DAYS: [&str; 4] = ["2024-01-02", "2024-01-03", "2024-01-04", "2024-01-05"];

fn panel(attributes: &[&str]) -> DataFrame {
    let mut times = Vec::new();
    let mut codes = Vec::new();
    for day in DAYS {
        for code in CODES {
            times.push(parse_time(day).unwrap());
            codes.push(code);
        }
    }
    let mut columns: Vec<Column> = vec![
        datetime_series("datetime", &times).unwrap().into(),
        Series::new("code".into(), codes).into(),
    ];
    for (offset, attribute) in attributes.iter().enumerate() {
        let values: Vec<f64> = (0..times.len()).map(|i| (offset * 10 + i) as f64).collect();
        columns.push(Series::new((*attribute).into(), values).into());
    }
    DataFrame::new(columns).unwrap()
}

fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names().iter().map(|n| n.to_string()).collect()
}

#[fixture]
fn api() -> StoreDataApi {
    let mut api = StoreDataApi::new(StoreConfig::default());
    api.auth(&Credentials::new().with("path", MEMORY_PATH)).unwrap();
    for attribute in ["pe_ratio", "pb_ratio"] {
        api.add_attribute(&NewAttribute::new("stock", attribute, ColumnType::Double))
            .unwrap();
    }
    api.add_attribute(&NewAttribute::new("stock", "volume", ColumnType::Int))
        .unwrap();
    let written = api
        .upsert_attribute("stock", &panel(&["pe_ratio", "pb_ratio"]), None, Frequency::Daily)
        .unwrap();
    assert!(written.diagnostics.is_empty());
    assert_eq!(written.data, 16);
    api
}

#[rstest]
fn test_panel_has_one_column_per_attribute(api: StoreDataApi) {
    let request = FactorRequest::new(["pb_ratio", "pe_ratio"], CODES);
    let Fetched { data, diagnostics } = api.get_factor(&request).unwrap();

    assert!(diagnostics.is_empty());
    assert_eq!(column_names(&data), ["datetime", "code", "pb_ratio", "pe_ratio"]);
    assert_eq!(data.height(), 8);

    let pe = data.column("pe_ratio").unwrap().f64().unwrap();
    assert_relative_eq!(pe.get(0).unwrap(), 0.0);
    let pb = data.column("pb_ratio").unwrap().f64().unwrap();
    assert_relative_eq!(pb.get(7).unwrap(), 17.0);
}

#[rstest]
fn test_long_output_layout(api: StoreDataApi) {
    let request = FactorRequest::new(["pe_ratio", "pb_ratio"], CODES).with_panel(false);
    let data = api.get_factor(&request).unwrap().data;

    assert_eq!(column_names(&data), ["datetime", "code", "attribute", "value"]);
    assert_eq!(data.height(), DAYS.len() * CODES.len() * 2);
}

#[rstest]
fn test_time_bounds_are_exclusive(api: StoreDataApi) {
    let request = FactorRequest::new(["pe_ratio"], CODES)
        .between("2024-01-02", "2024-01-05")
        .unwrap();
    let data = api.get_factor(&request).unwrap().data;

    assert_eq!(data.height(), 4);
    let times = data.column("datetime").unwrap().cast(&DataType::Int64).unwrap();
    let times = times.i64().unwrap();
    let first = to_millis(parse_time("2024-01-03").unwrap());
    let last = to_millis(parse_time("2024-01-04").unwrap());
    assert_eq!(times.get(0), Some(first));
    assert_eq!(times.get(3), Some(last));
}

#[rstest]
fn test_single_code_request(api: StoreDataApi) {
    let request = FactorRequest::new(["pe_ratio"], ["000002.XSHE"]);
    let data = api.get_factor(&request).unwrap().data;

    assert_eq!(data.height(), DAYS.len());
    let codes = data.column("code").unwrap().str().unwrap();
    assert!(codes.into_iter().all(|c| c == Some("000002.XSHE")));
}

#[rstest]
fn test_upsert_is_idempotent(api: StoreDataApi) {
    let request = FactorRequest::new(["pe_ratio", "pb_ratio"], CODES).with_panel(false);
    let before = api.get_factor(&request).unwrap().data;

    api.upsert_attribute("stock", &panel(&["pe_ratio", "pb_ratio"]), None, Frequency::Daily)
        .unwrap();
    let after = api.get_factor(&request).unwrap().data;

    assert!(before.equals_missing(&after));
}

#[rstest]
fn test_upsert_overwrites_values(api: StoreDataApi) {
    let update = panel(&["pe_ratio"])
        .lazy()
        .with_column(col("pe_ratio") * lit(2.0))
        .collect()
        .unwrap();
    api.upsert_attribute("Stock", &update, None, Frequency::Daily)
        .unwrap();

    let request = FactorRequest::new(["pe_ratio"], CODES);
    let data = api.get_factor(&request).unwrap().data;
    let pe = data.column("pe_ratio").unwrap().f64().unwrap();
    assert_eq!(data.height(), 8);
    assert_relative_eq!(pe.get(7).unwrap(), 14.0);
}

#[rstest]
fn test_missing_attribute_is_reported(api: StoreDataApi) {
    let request = FactorRequest::new(["pe_ratio", "roe"], CODES);
    let Fetched { data, diagnostics } = api.get_factor(&request).unwrap();

    assert_eq!(column_names(&data), ["datetime", "code", "pe_ratio"]);
    assert_eq!(
        diagnostics,
        vec![Diagnostic::MissingAttribute {
            attribute: "roe".to_string()
        }]
    );
}

#[rstest]
fn test_resolved_attribute_without_rows_is_null(api: StoreDataApi) {
    let request = FactorRequest::new(["pe_ratio", "volume"], CODES);
    let data = api.get_factor(&request).unwrap().data;

    assert_eq!(column_names(&data), ["datetime", "code", "pe_ratio", "volume"]);
    assert_eq!(data.column("volume").unwrap().null_count(), data.height());
}

#[rstest]
fn test_zero_resolved_groups_is_empty(api: StoreDataApi) {
    let request = FactorRequest::new(["roe"], CODES);
    let Fetched { data, diagnostics } = api.get_factor(&request).unwrap();

    assert_eq!(data.height(), 0);
    assert_eq!(diagnostics.len(), 1);
}

#[rstest]
fn test_upsert_skips_unknown_attribute(api: StoreDataApi) {
    let data = panel(&["pe_ratio", "roe"]);
    let written = api
        .upsert_attribute("stock", &data, None, Frequency::Daily)
        .unwrap();

    assert_eq!(written.data, 8);
    assert_eq!(
        written.diagnostics,
        vec![Diagnostic::MissingAttribute {
            attribute: "roe".to_string()
        }]
    );
}

#[rstest]
fn test_unconfigured_info_type(api: StoreDataApi) {
    let Fetched { data, diagnostics } = api.get_info("nonexistent", &[]).unwrap();

    assert_eq!(data.height(), 0);
    assert_eq!(diagnostics.len(), 1);
    assert!(diagnostics[0].to_string().contains("nonexistent"));
}

#[rstest]
fn test_info_upsert_and_filter(api: StoreDataApi) {
    let info = df!(
        "code" => ["000001.XSHE", "000002.XSHE", "600000.XSHG"],
        "exchange" => ["XSHE", "XSHE", "XSHG"],
        "board" => ["main", "main", "main"],
    )
    .unwrap();
    let key = ["code".to_string()];
    assert!(api.upsert_info("Stock", &key, &info).unwrap());
    assert!(api.upsert_info("stock", &key, &info).unwrap());

    let all = api.get_info("stock", &[]).unwrap();
    assert!(all.diagnostics.is_empty());
    assert_eq!(all.data.height(), 3);

    let sz = api
        .get_info("STOCK", &[Filter::eq("exchange", "XSHE")])
        .unwrap()
        .data;
    assert_eq!(sz.height(), 2);
}

#[rstest]
fn test_catalog_write_invalidates_cache(api: StoreDataApi) {
    assert_eq!(api.catalog().unwrap().len(), 3);
    api.add_attribute(&NewAttribute::new("stock", "ps_ratio", ColumnType::Double))
        .unwrap();
    assert_eq!(api.catalog().unwrap().len(), 4);
}

#[test]
fn test_dual_key_single_column() {
    let mut api = StoreDataApi::new(StoreConfig::default());
    api.auth(&Credentials::new()).unwrap();
    api.add_object(&NewObject {
        obj_dtype: Some(ColumnType::Symbol),
        ..NewObject::new("fund_holding")
    })
    .unwrap();
    api.add_attribute(
        &NewAttribute::new("fund_holding", "weight", ColumnType::Double)
            .with_obj_dtype(ColumnType::Symbol),
    )
    .unwrap();

    let times = [parse_time("2024-01-02").unwrap(), parse_time("2024-01-03").unwrap()];
    let data = DataFrame::new(vec![
        datetime_series("datetime", &[times[0], times[0], times[1]])
            .unwrap()
            .into(),
        Series::new("code".into(), ["F1", "F1", "F1"]).into(),
        Series::new("object".into(), ["000001.XSHE", "600000.XSHG", "000001.XSHE"]).into(),
        Series::new("weight".into(), [0.4, 0.6, 0.5]).into(),
    ])
    .unwrap();
    api.upsert_attribute("fund_holding", &data, None, Frequency::Daily)
        .unwrap();

    let request = FactorRequest::new(["weight"], ["F1"]).with_objects(["000001.XSHE"]);
    let Fetched { data, diagnostics } = api.get_dualkey_factor(&request).unwrap();

    assert!(diagnostics.is_empty());
    assert_eq!(column_names(&data), ["datetime", "code", "object", "weight"]);
    assert_eq!(data.height(), 2);

    // Single-key queries do not see dual-key attributes
    let single = api.get_factor(&FactorRequest::new(["weight"], ["F1"])).unwrap();
    assert_eq!(single.data.height(), 0);
    assert_eq!(single.diagnostics.len(), 1);
}

#[test]
fn test_dual_key_attribute_rejects_single_key_data() {
    let api = StoreDataApi::with_storage(SqliteStore::in_memory().unwrap());
    api.init_db().unwrap();
    api.add_attribute(
        &NewAttribute::new("fund_holding", "weight", ColumnType::Double)
            .with_obj_dtype(ColumnType::Symbol),
    )
    .unwrap();
    let err = api
        .upsert_attribute("fund_holding", &panel(&["weight"]), None, Frequency::Daily)
        .unwrap_err();
    assert!(matches!(err, DataError::Storage(_)));
}

#[rstest]
fn test_dual_key_attribute_cannot_share_single_key_table(api: StoreDataApi) {
    let err = api
        .add_attribute(
            &NewAttribute::new("stock", "weight", ColumnType::Double)
                .with_obj_dtype(ColumnType::Symbol),
        )
        .unwrap_err();
    assert!(matches!(err, DataError::Storage(_)));

    let catalog = api.catalog().unwrap();
    assert!(catalog.lookup("stock", Frequency::Daily, "weight").is_empty());
    assert_eq!(catalog.len(), 3);
}

/// Storage that fails every query against one table.
#[derive(Debug)]
struct FlakyStorage {
    inner: SqliteStore,
    failing_table: &'static str,
}

impl Storage for FlakyStorage {
    fn exists_database(&self, db: &str) -> Result<bool> {
        self.inner.exists_database(db)
    }

    fn create_database(&self, db: &str) -> Result<()> {
        self.inner.create_database(db)
    }

    fn exists_table(&self, db: &str, table: &str) -> Result<bool> {
        self.inner.exists_table(db, table)
    }

    fn table_columns(&self, db: &str, table: &str) -> Result<Vec<DbColumn>> {
        self.inner.table_columns(db, table)
    }

    fn create_table(&self, db: &str, table: &str, columns: &[DbColumn]) -> Result<()> {
        self.inner.create_table(db, table, columns)
    }

    fn query(&self, db: &str, table: &str, conds: &[Filter]) -> Result<DataFrame> {
        if table == self.failing_table {
            return Err(DataError::Storage("connection reset".to_string()));
        }
        self.inner.query(db, table, conds)
    }

    fn upsert(&self, db: &str, table: &str, key_cols: &[String], data: &DataFrame) -> Result<usize> {
        self.inner.upsert(db, table, key_cols, data)
    }
}

#[test]
fn test_failing_group_is_skipped() {
    let api = StoreDataApi::with_storage(FlakyStorage {
        inner: SqliteStore::in_memory().unwrap(),
        failing_table: "attr_int",
    });
    api.init_db().unwrap();
    api.add_attribute(&NewAttribute::new("stock", "pe_ratio", ColumnType::Double))
        .unwrap();
    api.add_attribute(&NewAttribute::new("stock", "volume", ColumnType::Int))
        .unwrap();
    api.upsert_attribute("stock", &panel(&["pe_ratio"]), None, Frequency::Daily)
        .unwrap();

    let request = FactorRequest::new(["pe_ratio", "volume"], CODES);
    let Fetched { data, diagnostics } = api.get_factor(&request).unwrap();

    assert_eq!(data.height(), 8);
    assert_eq!(data.column("pe_ratio").unwrap().null_count(), 0);
    assert_eq!(diagnostics.len(), 1);
    assert!(matches!(
        &diagnostics[0],
        Diagnostic::FetchFailed { attributes, .. } if attributes == &["volume".to_string()]
    ));
}

/// Backend returning a fixed panel.
#[derive(Debug)]
struct FixedApi(DataFrame);

impl DataApi for FixedApi {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn auth(&mut self, _credentials: &Credentials) -> Result<()> {
        Ok(())
    }

    fn get_info(&self, _info_type: &str, _filters: &[Filter]) -> Result<Fetched<DataFrame>> {
        Ok(Fetched::clean(DataFrame::empty()))
    }

    fn get_factor(&self, request: &FactorRequest) -> Result<Fetched<DataFrame>> {
        let mut select = vec![col("datetime"), col("code")];
        select.extend(request.factors.iter().map(|f| col(f.as_str())));
        Ok(Fetched::clean(self.0.clone().lazy().select(select).collect()?))
    }

    fn get_dualkey_factor(&self, _request: &FactorRequest) -> Result<Fetched<DataFrame>> {
        Ok(Fetched::clean(DataFrame::empty()))
    }
}

#[rstest]
fn test_sync_data_from_another_backend(api: StoreDataApi) {
    api.add_attribute(&NewAttribute::new("stock", "ps_ratio", ColumnType::Double))
        .unwrap();
    let source = FixedApi(panel(&["ps_ratio"]));
    let request = FactorRequest::new(["ps_ratio"], CODES);

    let synced = api.sync_data(&source, "stock", &request).unwrap();
    assert!(synced.data);
    assert!(synced.diagnostics.is_empty());

    let data = api.get_factor(&request).unwrap().data;
    assert_eq!(data.height(), 8);

    let empty = FixedApi(panel(&["ps_ratio"]).head(Some(0)));
    assert!(!api.sync_data(&empty, "stock", &request).unwrap().data);
}
