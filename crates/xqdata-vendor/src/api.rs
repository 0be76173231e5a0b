//! Vendor backend.

use crate::client::VendorClient;
use crate::function::FactorCall;
use crate::info::{InfoConfig, InfoSpec};
use crate::registry::FactorRegistry;
use chrono::NaiveDate;
use polars::prelude::*;
use xqdata_data::api::shape_panel_output;
use xqdata_data::filter::apply_filters;
use xqdata_data::reshape::{key_columns, outer_merge};
use xqdata_data::{
    Credentials, DataApi, DataError, Diagnostic, Diagnostics, FactorRequest, Fetched, Filter,
    Result, TimeRange,
};

/// Calendar start used when a range has no lower bound.
const CALENDAR_START: (i32, u32, u32) = (1990, 1, 1);

/// Calendar end used when a range has no upper bound.
const CALENDAR_END: (i32, u32, u32) = (2100, 1, 1);

/// Backend serving factors and instrument info from a vendor feed.
///
/// Factor requests are split by retrieval function through the client's
/// [`FactorRegistry`] and the partial panels are outer-joined on
/// `datetime, code`. Time bounds are inclusive.
#[derive(Debug)]
pub struct VendorDataApi {
    client: Box<dyn VendorClient>,
    registry: FactorRegistry,
    info: InfoConfig,
    connected: bool,
}

impl VendorDataApi {
    /// Backend with the built-in functions and info types.
    pub fn new(client: impl VendorClient + 'static) -> Self {
        Self {
            client: Box::new(client),
            registry: FactorRegistry::with_builtins(),
            info: InfoConfig::default(),
            connected: false,
        }
    }

    /// Factor routing of this client.
    pub fn registry(&self) -> &FactorRegistry {
        &self.registry
    }

    /// Mutable factor routing, e.g. to register functions or extra params.
    pub fn registry_mut(&mut self) -> &mut FactorRegistry {
        &mut self.registry
    }

    /// Add or replace an info type.
    pub fn register_info_type(&mut self, name: &str, spec: InfoSpec) {
        self.info.register(name, spec);
    }

    fn client(&self) -> Result<&dyn VendorClient> {
        if self.connected {
            Ok(self.client.as_ref())
        } else {
            Err(DataError::NotConnected)
        }
    }

    /// Vendor trading calendar within `range`.
    pub fn trading_dates(&self, range: TimeRange) -> Result<Vec<NaiveDate>> {
        let bound = |(y, m, d): (i32, u32, u32)| {
            NaiveDate::from_ymd_opt(y, m, d)
                .ok_or_else(|| DataError::InvalidTime(format!("{y}-{m}-{d}")))
        };
        let start = match range.start {
            Some(t) => t.date(),
            None => bound(CALENDAR_START)?,
        };
        let end = match range.end {
            Some(t) => t.date(),
            None => bound(CALENDAR_END)?,
        };
        self.client()?.get_trading_dates(start, end)
    }
}

impl DataApi for VendorDataApi {
    fn name(&self) -> &'static str {
        "vendor"
    }

    fn auth(&mut self, credentials: &Credentials) -> Result<()> {
        self.client
            .authenticate(credentials)
            .map_err(|e| DataError::Auth(e.to_string()))?;
        self.connected = true;
        Ok(())
    }

    fn get_info(&self, info_type: &str, filters: &[Filter]) -> Result<Fetched<DataFrame>> {
        let Some(spec) = self.info.get(info_type) else {
            let mut diagnostics = Diagnostics::new();
            diagnostics.push(Diagnostic::UnconfiguredType {
                info_type: info_type.to_string(),
            });
            return Ok(Fetched::with(DataFrame::empty(), diagnostics));
        };
        let raw = self
            .client()?
            .all_instruments(&spec.instrument_type, &spec.params)?;
        let info = spec.post_process(raw)?;
        Ok(Fetched::clean(apply_filters(info, filters)?))
    }

    fn get_factor(&self, request: &FactorRequest) -> Result<Fetched<DataFrame>> {
        let client = self.client()?;
        let (groups, unrecognized) = self
            .registry
            .group_by_function(&request.factors)
            .into_parts();
        let mut diagnostics = Diagnostics::new();
        diagnostics.extend(unrecognized);

        let mut frames = Vec::new();
        let mut resolved: Vec<String> = Vec::new();
        for group in &groups {
            let Some(function) = self.registry.function(&group.function) else {
                continue;
            };
            let (params, rejected) = self.registry.params_for(&group.function)?.into_parts();
            diagnostics.extend(rejected);

            let call = FactorCall {
                attributes: &group.attributes,
                codes: &request.codes,
                range: request.range,
                frequency: request.frequency,
                params: &params,
            };
            resolved.extend(group.attributes.iter().cloned());
            match function.fetch(client, &call) {
                Ok(frame) => frames.push(frame),
                Err(e) => diagnostics.push(Diagnostic::FetchFailed {
                    attributes: group.attributes.clone(),
                    reason: e.to_string(),
                }),
            }
        }

        // Columns follow request order, not function order
        let order: Vec<String> = request
            .factors
            .iter()
            .filter(|f| resolved.contains(f))
            .fold(Vec::new(), |mut acc, f| {
                if !acc.contains(f) {
                    acc.push(f.clone());
                }
                acc
            });

        let keys = key_columns(false);
        let merged = outer_merge(frames, &keys)?;
        let data = shape_panel_output(merged, &keys, &order, request.panel)?;
        Ok(Fetched::with(data, diagnostics))
    }

    fn get_dualkey_factor(&self, _request: &FactorRequest) -> Result<Fetched<DataFrame>> {
        self.client()?;
        let mut diagnostics = Diagnostics::new();
        diagnostics.push(Diagnostic::Unsupported {
            operation: "get_dualkey_factor".to_string(),
        });
        Ok(Fetched::with(DataFrame::empty(), diagnostics))
    }
}
