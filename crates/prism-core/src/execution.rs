//! # Execution State
//!
//! Request-scoped overrides supplied alongside a search execution. They are
//! never stored with a query; permissions and category membership may change
//! between requests, so a state must not be cached and replayed.

use crate::query_string::QueryString;
use crate::timerange::TimeRange;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Paging override for one search type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchTypeExecutionState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl SearchTypeExecutionState {
    pub fn new(offset: u32, limit: u32) -> Self {
        Self {
            offset: Some(offset),
            limit: Some(limit),
        }
    }
}

/// Replacement time range and/or query text, used both as the global
/// override and as a per-query override.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    timerange: Option<TimeRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    query: Option<QueryString>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    search_types: BTreeMap<String, SearchTypeExecutionState>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    keep_search_types: BTreeSet<String>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    keep_queries: BTreeSet<String>,
}

impl GlobalOverride {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_timerange(mut self, timerange: TimeRange) -> Self {
        self.timerange = Some(timerange);
        self
    }

    pub fn with_query(mut self, query: QueryString) -> Self {
        self.query = Some(query);
        self
    }

    pub fn with_search_type(mut self, id: impl Into<String>, state: SearchTypeExecutionState) -> Self {
        self.search_types.insert(id.into(), state);
        self
    }

    pub fn keep_search_types<I: IntoIterator<Item = S>, S: Into<String>>(mut self, ids: I) -> Self {
        self.keep_search_types = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn keep_queries<I: IntoIterator<Item = S>, S: Into<String>>(mut self, ids: I) -> Self {
        self.keep_queries = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn timerange(&self) -> Option<&TimeRange> {
        self.timerange.as_ref()
    }

    pub fn query(&self) -> Option<&QueryString> {
        self.query.as_ref()
    }

    /// Only the time range and query text count; keep-lists and paging do
    /// not make an override non-empty.
    pub fn is_empty(&self) -> bool {
        self.timerange.is_none() && self.query.is_none()
    }

    /// An empty keep-list keeps everything.
    pub fn keeps_query(&self, id: &str) -> bool {
        self.keep_queries.is_empty() || self.keep_queries.contains(id)
    }

    pub fn keeps_search_type(&self, id: &str) -> bool {
        self.keep_search_types.is_empty() || self.keep_search_types.contains(id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionState {
    global_override: GlobalOverride,
    queries: BTreeMap<String, GlobalOverride>,
    search_types: BTreeMap<String, SearchTypeExecutionState>,
    parameters: BTreeMap<String, serde_json::Value>,
}

impl ExecutionState {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_global_override(mut self, global: GlobalOverride) -> Self {
        self.global_override = global;
        self
    }

    pub fn with_query_override(mut self, query_id: impl Into<String>, over: GlobalOverride) -> Self {
        self.queries.insert(query_id.into(), over);
        self
    }

    pub fn with_search_type(mut self, id: impl Into<String>, state: SearchTypeExecutionState) -> Self {
        self.search_types.insert(id.into(), state);
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }

    pub fn global_override(&self) -> &GlobalOverride {
        &self.global_override
    }

    pub fn query_override(&self, query_id: &str) -> Option<&GlobalOverride> {
        self.queries.get(query_id)
    }

    pub fn parameters(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.parameters
    }

    /// A non-empty global override always wins; otherwise the override
    /// registered for `query_id`. The two are never combined.
    pub fn effective_override(&self, query_id: &str) -> Option<&GlobalOverride> {
        if !self.global_override.is_empty() {
            return Some(&self.global_override);
        }
        self.query_override(query_id).filter(|o| !o.is_empty())
    }

    /// Top-level entries shadow those nested in the global override.
    pub fn search_type_override(&self, search_type_id: &str) -> Option<&SearchTypeExecutionState> {
        self.search_types
            .get(search_type_id)
            .or_else(|| self.global_override.search_types.get(search_type_id))
    }

    pub fn has_search_type_overrides(&self) -> bool {
        !self.search_types.is_empty() || !self.global_override.search_types.is_empty()
    }
}
