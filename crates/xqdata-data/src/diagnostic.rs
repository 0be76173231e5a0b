//! Recoverable issues reported alongside a result.
//!
//! Read paths tolerate partial failure: an unconfigured type, an unknown
//! attribute or one failing storage group does not fail the request. Those
//! conditions are returned as [`Diagnostic`] values next to the data.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A non-fatal condition encountered while serving a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Diagnostic {
    /// Info or attribute type has no configuration.
    UnconfiguredType {
        /// Requested type
        info_type: String,
    },
    /// Attribute is not in the catalog for the requested frequency and key shape.
    MissingAttribute {
        /// Requested attribute
        attribute: String,
    },
    /// More than one catalog row matches one attribute key.
    AmbiguousCatalog {
        /// Requested attribute
        attribute: String,
    },
    /// One attribute group failed to load and was skipped.
    FetchFailed {
        /// Attributes of the failed group
        attributes: Vec<String>,
        /// Underlying failure
        reason: String,
    },
    /// No retrieval function handles the attribute and there is no default.
    UnrecognizedAttribute {
        /// Requested attribute
        attribute: String,
    },
    /// An extra parameter is not declared by the target function.
    RejectedParam {
        /// Target function
        function: String,
        /// Parameter name
        param: String,
    },
    /// The backend does not implement the operation.
    Unsupported {
        /// Operation name
        operation: String,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnconfiguredType { info_type } => write!(
                f,
                "No configuration for info type '{info_type}'. Return empty DataFrame."
            ),
            Self::MissingAttribute { attribute } => {
                write!(f, "attribute {attribute} not found")
            }
            Self::AmbiguousCatalog { attribute } => write!(
                f,
                "attribute {attribute} is not unique, please check the attribute catalog"
            ),
            Self::FetchFailed { attributes, reason } => {
                write!(f, "fetch failed for [{}]: {reason}", attributes.join(", "))
            }
            Self::UnrecognizedAttribute { attribute } => {
                write!(f, "no retrieval function for attribute {attribute}")
            }
            Self::RejectedParam { function, param } => {
                write!(f, "parameter {param} is not accepted by {function}, dropped")
            }
            Self::Unsupported { operation } => {
                write!(f, "{operation} is not supported by this backend")
            }
        }
    }
}

/// Collects diagnostics and logs each one as it is recorded.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Create an empty collector.
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Record a diagnostic.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        tracing::warn!("{diagnostic}");
        self.items.push(diagnostic);
    }

    /// Record every diagnostic of another collection.
    pub fn extend(&mut self, other: impl IntoIterator<Item = Diagnostic>) {
        self.items.extend(other);
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Consume into the recorded list.
    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }
}

/// Result data together with the diagnostics raised while producing it.
#[derive(Debug, Clone)]
pub struct Fetched<T> {
    /// Produced data
    pub data: T,
    /// Recoverable issues, in the order they occurred
    pub diagnostics: Vec<Diagnostic>,
}

impl<T> Fetched<T> {
    /// Data without diagnostics.
    pub const fn clean(data: T) -> Self {
        Self {
            data,
            diagnostics: Vec::new(),
        }
    }

    /// Data with collected diagnostics.
    pub fn with(data: T, diagnostics: Diagnostics) -> Self {
        Self {
            data,
            diagnostics: diagnostics.into_vec(),
        }
    }

    /// Transform the data, keeping the diagnostics.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetched<U> {
        Fetched {
            data: f(self.data),
            diagnostics: self.diagnostics,
        }
    }

    /// Split into data and diagnostics.
    pub fn into_parts(self) -> (T, Vec<Diagnostic>) {
        (self.data, self.diagnostics)
    }
}
