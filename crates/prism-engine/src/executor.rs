//! # Search Executor
//!
//! Runs a set of declared queries under one [`ExecutionState`]:
//!
//! 1. drop queries and search types outside the global keep-lists,
//! 2. apply the execution state and bind query parameters,
//! 3. expand stream categories against the caller's collaborators,
//! 4. build one backend request per search type,
//! 5. submit every request concurrently and extract typed results.
//!
//! Steps 1–4 are synchronous and live in [`SearchPlanner`]; only step 5
//! needs a [`BackendClient`].

use crate::client::{BackendClient, RawResponse, SearchRequest};
use crate::context::GeneratedQueryContext;
use crate::error::{EngineError, Result};
use crate::settings::BackendSettings;
use crate::strategies::registry::StrategyRegistry;
use crate::strategies::SearchTypeResult;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use prism_core::{BoxError, ExecutionState, Query};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

/// A query ready to be sent: its effective form, its translation context and
/// one request per kept search type.
#[derive(Debug, Clone)]
pub struct PlannedQuery {
    pub query: Query,
    pub context: GeneratedQueryContext,
    pub requests: Vec<SearchRequest>,
}

#[derive(Debug, Clone)]
pub struct SearchPlanner {
    registry: StrategyRegistry,
    settings: BackendSettings,
}

impl SearchPlanner {
    pub fn new(registry: StrategyRegistry, settings: BackendSettings) -> Self {
        Self { registry, settings }
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    /// Plan every kept query. Category resolution and permission checks run
    /// here, once per query.
    pub fn plan<R, P>(
        &self,
        queries: &[Query],
        state: &ExecutionState,
        resolve: R,
        permitted: P,
        now: DateTime<Utc>,
    ) -> Result<Vec<PlannedQuery>>
    where
        R: Fn(&BTreeSet<String>) -> std::result::Result<Vec<String>, BoxError>,
        P: Fn(&str) -> std::result::Result<bool, BoxError>,
    {
        let keep = state.global_override();
        queries
            .iter()
            .filter(|query| {
                let kept = keep.keeps_query(query.id());
                if !kept {
                    tracing::debug!("Skipping query '{}' (not in keep list)", query.id());
                }
                kept
            })
            .map(|query| self.plan_query(query, state, &resolve, &permitted, now))
            .collect()
    }

    fn plan_query<R, P>(
        &self,
        query: &Query,
        state: &ExecutionState,
        resolve: &R,
        permitted: &P,
        now: DateTime<Utc>,
    ) -> Result<PlannedQuery>
    where
        R: Fn(&BTreeSet<String>) -> std::result::Result<Vec<String>, BoxError>,
        P: Fn(&str) -> std::result::Result<bool, BoxError>,
    {
        let effective = query.apply_execution_state(state);
        let bound = effective.query().bind_parameters(state.parameters())?;
        let effective = effective
            .with_query(bound)
            .replace_stream_category_filters(resolve, permitted)?;
        let context = GeneratedQueryContext::new(&effective, &self.settings, now)?;

        let keep = state.global_override();
        let requests = effective
            .search_types()
            .iter()
            .filter(|st| keep.keeps_search_type(st.id()))
            .map(|st| {
                Ok(SearchRequest {
                    query_id: effective.id().to_string(),
                    search_type_id: st.id().to_string(),
                    source: self.registry.build_query_fragment(&effective, st, &context)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(
            "Planned query '{}' with {} request(s)",
            effective.id(),
            requests.len()
        );
        Ok(PlannedQuery {
            query: effective,
            context,
            requests,
        })
    }

    /// Typed result of one search type of a planned query.
    pub fn extract(&self, planned: &PlannedQuery, search_type_id: &str, response: &RawResponse) -> Result<SearchTypeResult> {
        let search_type = planned
            .query
            .search_type(search_type_id)
            .ok_or_else(|| EngineError::MalformedResponse {
                search_type: search_type_id.to_string(),
                reason: "no such search type in query".into(),
            })?;
        self.registry
            .extract_result(&planned.query, search_type, response, &planned.context)
    }
}

// =============================================================================
// Results
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub query_id: String,
    pub search_types: BTreeMap<String, SearchTypeResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchJobResult {
    pub id: String,
    pub queries: Vec<QueryResult>,
    pub took_ms: u64,
}

impl SearchJobResult {
    pub fn query(&self, id: &str) -> Option<&QueryResult> {
        self.queries.iter().find(|q| q.query_id == id)
    }
}

pub struct SearchExecutor {
    planner: SearchPlanner,
    client: Arc<dyn BackendClient>,
}

impl SearchExecutor {
    pub fn new(planner: SearchPlanner, client: Arc<dyn BackendClient>) -> Self {
        Self { planner, client }
    }

    pub async fn execute<R, P>(
        &self,
        queries: &[Query],
        state: &ExecutionState,
        resolve: R,
        permitted: P,
    ) -> Result<SearchJobResult>
    where
        R: Fn(&BTreeSet<String>) -> std::result::Result<Vec<String>, BoxError>,
        P: Fn(&str) -> std::result::Result<bool, BoxError>,
    {
        let start = Instant::now();
        let job_id = uuid::Uuid::new_v4().to_string();
        let planned = self.planner.plan(queries, state, resolve, permitted, Utc::now())?;

        let requests: Vec<(usize, &SearchRequest)> = planned
            .iter()
            .enumerate()
            .flat_map(|(index, p)| p.requests.iter().map(move |r| (index, r)))
            .collect();
        tracing::info!(
            "Search job {} submitting {} request(s) for {} query(ies)",
            job_id,
            requests.len(),
            planned.len()
        );

        let responses = join_all(requests.iter().map(|(_, request)| self.client.search(request))).await;

        let mut results: Vec<QueryResult> = planned
            .iter()
            .map(|p| QueryResult {
                query_id: p.query.id().to_string(),
                search_types: BTreeMap::new(),
            })
            .collect();

        for ((index, request), response) in requests.into_iter().zip(responses) {
            let response = response.map_err(|e| {
                tracing::error!(
                    "Backend request for '{}' of query '{}' failed: {}",
                    request.search_type_id,
                    request.query_id,
                    e
                );
                EngineError::Client(e)
            })?;
            let result = self
                .planner
                .extract(&planned[index], &request.search_type_id, &response)?;
            results[index]
                .search_types
                .insert(request.search_type_id.clone(), result);
        }

        let took_ms = start.elapsed().as_millis() as u64;
        tracing::info!("Search job {} finished in {}ms", job_id, took_ms);
        Ok(SearchJobResult {
            id: job_id,
            queries: results,
            took_ms,
        })
    }
}
