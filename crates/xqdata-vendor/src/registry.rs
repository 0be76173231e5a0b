//! Factor Registry
//!
//! Maps attribute names to retrieval functions and holds per-function extra
//! parameters. A registry belongs to one client; nothing here is global.

use crate::client::Params;
use crate::function::{FactorFunction, FactorValueFunction, PriceFunction};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use xqdata_data::{DataError, Diagnostic, Diagnostics, Fetched, Result};

/// Attributes of one request routed to the same function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionGroup {
    /// Function name
    pub function: String,
    /// Attributes in request order
    pub attributes: Vec<String>,
}

/// Attribute routing table with extra parameters.
#[derive(Debug, Clone, Default)]
pub struct FactorRegistry {
    functions: BTreeMap<String, Arc<dyn FactorFunction>>,
    routes: HashMap<String, String>,
    default: Option<String>,
    extra_params: HashMap<String, Params>,
}

impl FactorRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the `price` and `factor` functions.
    ///
    /// Bar fields and their `_post`/`_pre` variants go to `price`;
    /// `pe_ratio`, `pb_ratio`, `ps_ratio` and every unrecognised attribute go
    /// to `factor`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_function(PriceFunction);
        registry.register_function(FactorValueFunction);
        for attribute in PriceFunction::attributes() {
            registry.routes.insert(attribute, "price".to_string());
        }
        for attribute in ["pe_ratio", "pb_ratio", "ps_ratio"] {
            registry
                .routes
                .insert(attribute.to_string(), "factor".to_string());
        }
        registry.default = Some("factor".to_string());
        registry
    }

    /// Add or replace a function.
    pub fn register_function(&mut self, function: impl FactorFunction + 'static) {
        let name = function.name().to_string();
        tracing::debug!(function = %name, "registered factor function");
        self.functions.insert(name, Arc::new(function));
    }

    fn require_function(&self, function: &str) -> Result<()> {
        if self.functions.contains_key(function) {
            Ok(())
        } else {
            Err(DataError::NotFound(format!("factor function {function}")))
        }
    }

    /// Route an attribute to a registered function.
    pub fn register(&mut self, attribute: impl Into<String>, function: &str) -> Result<()> {
        self.require_function(function)?;
        self.routes.insert(attribute.into(), function.to_string());
        Ok(())
    }

    /// Function used for attributes without a route; `None` drops them.
    pub fn set_default(&mut self, function: Option<&str>) -> Result<()> {
        if let Some(function) = function {
            self.require_function(function)?;
        }
        self.default = function.map(str::to_string);
        Ok(())
    }

    /// Store an extra parameter for a function.
    ///
    /// Undeclared parameters are kept but reported and withheld when the
    /// function is invoked.
    pub fn set_extra_param(
        &mut self,
        function: &str,
        param: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Result<()> {
        self.require_function(function)?;
        self.extra_params
            .entry(function.to_string())
            .or_default()
            .insert(param.into(), value.into());
        Ok(())
    }

    /// Look up a function.
    pub fn function(&self, name: &str) -> Option<Arc<dyn FactorFunction>> {
        self.functions.get(name).cloned()
    }

    /// Registered function names.
    pub fn function_names(&self) -> Vec<&str> {
        self.functions.keys().map(String::as_str).collect()
    }

    /// Function an attribute is routed to.
    pub fn route(&self, attribute: &str) -> Option<&str> {
        self.routes
            .get(attribute)
            .or(self.default.as_ref())
            .map(String::as_str)
    }

    /// Group attributes by function, in order of first appearance.
    ///
    /// Attributes with no route and no default are dropped with a diagnostic.
    pub fn group_by_function(&self, attributes: &[String]) -> Fetched<Vec<FunctionGroup>> {
        let mut diagnostics = Diagnostics::new();
        let mut groups: Vec<FunctionGroup> = Vec::new();
        for attribute in attributes {
            let Some(function) = self.route(attribute) else {
                diagnostics.push(Diagnostic::UnrecognizedAttribute {
                    attribute: attribute.clone(),
                });
                continue;
            };
            match groups.iter_mut().find(|g| g.function == function) {
                Some(group) if group.attributes.contains(attribute) => {}
                Some(group) => group.attributes.push(attribute.clone()),
                None => groups.push(FunctionGroup {
                    function: function.to_string(),
                    attributes: vec![attribute.clone()],
                }),
            }
        }
        Fetched::with(groups, diagnostics)
    }

    /// Extra parameters to forward to a function, filtered by its declared
    /// parameters.
    pub fn params_for(&self, function: &str) -> Result<Fetched<Params>> {
        let declared = self
            .functions
            .get(function)
            .ok_or_else(|| DataError::NotFound(format!("factor function {function}")))?
            .declared_params();
        let mut diagnostics = Diagnostics::new();
        let mut params = Params::new();
        for (name, value) in self.extra_params.get(function).into_iter().flatten() {
            if declared.contains(&name.as_str()) {
                params.insert(name.clone(), value.clone());
            } else {
                diagnostics.push(Diagnostic::RejectedParam {
                    function: function.to_string(),
                    param: name.clone(),
                });
            }
        }
        Ok(Fetched::with(params, diagnostics))
    }
}
