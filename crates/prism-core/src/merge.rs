//! # Execution-State Merge
//!
//! Layers a request's [`ExecutionState`] onto a declared [`Query`]. The input
//! is never modified. Two independent steps:
//!
//! 1. The effective override (non-empty global, else the query's own entry)
//!    replaces exactly the fields it sets and is recorded on the result.
//! 2. Search types with a paging entry get that entry applied, whether or not
//!    step 1 found an override.

use crate::execution::ExecutionState;
use crate::query::Query;

pub fn apply_execution_state(query: &Query, state: &ExecutionState) -> Query {
    let chosen = state.effective_override(query.id());
    let paged = query
        .search_types()
        .iter()
        .any(|st| state.search_type_override(st.id()).is_some());

    if chosen.is_none() && !paged {
        return query.clone();
    }

    let mut effective = query.clone();

    if let Some(over) = chosen {
        if let Some(timerange) = over.timerange() {
            effective.timerange = timerange.clone();
        }
        if let Some(text) = over.query() {
            effective.query = text.clone();
        }
        effective.global_override = Some(over.clone());
        tracing::debug!(
            "Applied override to query '{}' (timerange: {}, query: {})",
            query.id(),
            over.timerange().is_some(),
            over.query().is_some()
        );
    }

    if paged {
        effective.search_types = query
            .search_types()
            .iter()
            .map(|st| match state.search_type_override(st.id()) {
                Some(paging) => st.apply_execution_state(paging),
                None => st.clone(),
            })
            .collect();
    }

    effective
}
