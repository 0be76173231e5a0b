//! Query routing over catalog-resolved attribute groups.
//!
//! One storage query is issued per [`AttributeGroup`]. Non-empty results are
//! unioned by rows into a single long table; a failing group is reported and
//! skipped so the rest of the request still succeeds.

use crate::catalog::AttributeGroup;
use crate::diagnostic::{Diagnostic, Diagnostics, Fetched};
use crate::error::Result;
use crate::filter::Filter;
use crate::reshape::{ATTRIBUTE, CODE, DATETIME, OBJECT, VALUE, key_columns};
use crate::storage::Storage;
use crate::time::TimeRange;
use polars::prelude::*;

/// Entity, time and caller predicates shared by every group of a request.
#[derive(Debug, Clone, Copy)]
pub struct RouteRequest<'a> {
    /// Entity codes, `None` for all
    pub codes: Option<&'a [String]>,
    /// Secondary keys, only applied to dual-key requests
    pub objects: Option<&'a [String]>,
    /// Whether the attributes are dual-key
    pub dual_key: bool,
    /// Time bounds, applied exclusively
    pub range: TimeRange,
    /// Additional caller predicates
    pub extra: &'a [Filter],
}

impl RouteRequest<'_> {
    /// Predicates common to every group.
    ///
    /// A single code becomes an equality predicate. Time bounds exclude the
    /// boundary timestamps themselves.
    pub fn general_conditions(&self) -> Vec<Filter> {
        let mut conds = Vec::new();
        if let Some(codes) = self.codes {
            match codes {
                [single] => conds.push(Filter::eq(CODE, single.as_str())),
                many => conds.push(Filter::isin(CODE, many.to_vec())),
            }
        }
        if self.dual_key {
            if let Some(objects) = self.objects {
                conds.push(Filter::isin(OBJECT, objects.to_vec()));
            }
        }
        if let Some(start) = self.range.start {
            conds.push(Filter::gt(DATETIME, start));
        }
        if let Some(end) = self.range.end {
            conds.push(Filter::lt(DATETIME, end));
        }
        conds.extend(self.extra.iter().cloned());
        conds
    }
}

/// Predicates for one group: its attributes plus the general predicates.
pub fn group_conditions(group: &AttributeGroup, general: &[Filter]) -> Vec<Filter> {
    let mut conds = vec![Filter::isin(ATTRIBUTE, group.attributes.clone())];
    conds.extend(general.iter().cloned());
    conds
}

/// Query every group and union the non-empty results.
///
/// Returns an empty frame when no group resolves or every group is empty.
pub fn fetch(
    storage: &dyn Storage,
    groups: &[AttributeGroup],
    request: &RouteRequest<'_>,
) -> Result<Fetched<DataFrame>> {
    let mut diagnostics = Diagnostics::new();
    let general = request.general_conditions();

    let mut columns: Vec<Expr> = key_columns(request.dual_key)
        .into_iter()
        .map(col)
        .collect();
    columns.push(col(ATTRIBUTE));
    columns.push(col(VALUE));

    let mut parts = Vec::new();
    for group in groups {
        let conds = group_conditions(group, &general);
        let location = &group.location;
        match storage.query(&location.db_name, &location.table_name, &conds) {
            Ok(df) if df.height() == 0 => {
                tracing::debug!(%location, "group returned no rows");
            }
            Ok(df) => {
                tracing::debug!(%location, rows = df.height(), "group fetched");
                parts.push(df.lazy().select(columns.clone()));
            }
            Err(e) => diagnostics.push(Diagnostic::FetchFailed {
                attributes: group.attributes.clone(),
                reason: format!("{location}: {e}"),
            }),
        }
    }

    if parts.is_empty() {
        return Ok(Fetched::with(DataFrame::empty(), diagnostics));
    }

    let union = concat(
        parts,
        UnionArgs {
            to_supertypes: true,
            ..Default::default()
        },
    )?
    .collect()?;

    Ok(Fetched::with(union, diagnostics))
}
