//! # Search-Type Strategies
//!
//! Every [`SearchType`] variant is served by exactly one
//! [`SearchTypeHandler`]: it refines the query's base source into the
//! backend request for that search type, and turns the backend response back
//! into a typed [`SearchTypeResult`].
//!
//! Handlers are pure; the executor owns all I/O.

pub mod events;
pub mod messages;
pub mod pivot;
pub mod registry;

use crate::client::RawResponse;
use crate::context::GeneratedQueryContext;
use crate::error::{EngineError, Result};
use crate::fragment::SearchSource;
use prism_core::{Query, SearchType, SearchTypeKind};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

// =============================================================================
// Core Trait
// =============================================================================

pub trait SearchTypeHandler: Send + Sync {
    /// The variant this handler serves.
    fn kind(&self) -> SearchTypeKind;

    fn build_query_fragment(
        &self,
        query: &Query,
        search_type: &SearchType,
        context: &GeneratedQueryContext,
    ) -> Result<SearchSource>;

    fn extract_result(
        &self,
        query: &Query,
        search_type: &SearchType,
        response: &RawResponse,
        context: &GeneratedQueryContext,
    ) -> Result<SearchTypeResult>;
}

/// The error a handler returns when handed another variant.
pub(crate) fn mismatch(expected: SearchTypeKind, search_type: &SearchType) -> EngineError {
    EngineError::VariantMismatch {
        expected,
        actual: search_type.kind(),
    }
}

/// Stream scope of a search type: its own streams if it declares any,
/// otherwise the query's.
pub(crate) fn effective_streams<'a>(
    search_type: &'a SearchType,
    context: &'a GeneratedQueryContext,
) -> &'a BTreeSet<String> {
    if search_type.streams().is_empty() {
        context.stream_ids()
    } else {
        search_type.streams()
    }
}

// =============================================================================
// Results
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SearchTypeResult {
    Messages(MessageListResult),
    Events(EventListResult),
    Pivot(PivotResult),
}

impl SearchTypeResult {
    pub fn id(&self) -> &str {
        match self {
            Self::Messages(r) => &r.id,
            Self::Events(r) => &r.id,
            Self::Pivot(r) => &r.id,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Messages(r) => r.name.as_deref(),
            Self::Events(r) => r.name.as_deref(),
            Self::Pivot(r) => r.name.as_deref(),
        }
    }

    pub fn total_results(&self) -> u64 {
        match self {
            Self::Messages(r) => r.total_results,
            Self::Events(r) => r.total_results,
            Self::Pivot(r) => r.total,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    pub message: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageListResult {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub messages: Vec<ResultMessage>,
    pub total_results: u64,
}

pub use events::{EventListResult, EventSummary};
pub use pivot::{PivotResult, PivotRow, PivotValue};
