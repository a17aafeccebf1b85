//! # Generated Query Context
//!
//! Translates the query-level parts of an effective [`Query`] once, and hands
//! each search type its own copy of the result to refine.
//!
//! The base source carries the query text in `must`, and the time range,
//! filter tree and inline search filters in `filter`.

use crate::error::{EngineError, Result};
use crate::fragment::{self, BoolQuery, SearchSource};
use crate::settings::BackendSettings;
use chrono::{DateTime, SecondsFormat, Utc};
use prism_core::{Filter, Query, UsedSearchFilter};
use serde_json::{json, Value};
use std::collections::BTreeSet;

#[derive(Debug, Clone)]
pub struct GeneratedQueryContext {
    base: SearchSource,
    stream_ids: BTreeSet<String>,
    settings: BackendSettings,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
}

impl GeneratedQueryContext {
    /// `query` must already have its categories expanded; see
    /// [`Query::replace_stream_category_filters`].
    pub fn new(query: &Query, settings: &BackendSettings, now: DateTime<Utc>) -> Result<Self> {
        let (from, to) = query.timerange().resolve(now)?;
        let stream_ids = query.used_stream_ids();

        let mut bool_query = BoolQuery::default();
        if query.query().is_match_all() {
            bool_query.must(fragment::match_all());
        } else {
            bool_query.must(fragment::query_string(query.query().as_str()));
        }
        bool_query.filter(fragment::range(
            &settings.timestamp_field,
            &format_timestamp(from),
            &format_timestamp(to),
        ));
        if let Some(filter) = query.filter() {
            bool_query.filter(translate_filter(filter, settings)?);
        }
        for search_filter in query.filters() {
            apply_search_filter(&mut bool_query, search_filter)?;
        }

        tracing::debug!(
            "Generated base context for query '{}' ({} scoped stream(s))",
            query.id(),
            stream_ids.len()
        );

        Ok(Self {
            base: SearchSource {
                query: bool_query,
                ..SearchSource::default()
            },
            stream_ids,
            settings: settings.clone(),
            from,
            to,
        })
    }

    /// A fresh copy of the base source for one search type.
    pub fn search_source(&self) -> SearchSource {
        self.base.clone()
    }

    /// Streams named by the query filter, including those a category
    /// expansion produced.
    pub fn stream_ids(&self) -> &BTreeSet<String> {
        &self.stream_ids
    }

    pub fn settings(&self) -> &BackendSettings {
        &self.settings
    }

    pub fn effective_timerange(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        (self.from, self.to)
    }
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Render a filter tree as a backend clause.
pub fn translate_filter(filter: &Filter, settings: &BackendSettings) -> Result<Value> {
    match filter {
        Filter::And(children) => {
            let clauses = children
                .iter()
                .map(|child| translate_filter(child, settings))
                .collect::<Result<Vec<_>>>()?;
            Ok(json!({ "bool": { "filter": clauses } }))
        }
        Filter::Or(children) => {
            let clauses = children
                .iter()
                .map(|child| translate_filter(child, settings))
                .collect::<Result<Vec<_>>>()?;
            Ok(json!({ "bool": { "should": clauses, "minimum_should_match": 1 } }))
        }
        Filter::Stream { id } => Ok(fragment::term(&settings.streams_field, id)),
        Filter::QueryString { query } => Ok(fragment::query_string(query)),
        Filter::StreamCategory { category } => Err(EngineError::UnexpandedCategory(category.clone())),
    }
}

fn apply_search_filter(bool_query: &mut BoolQuery, search_filter: &UsedSearchFilter) -> Result<()> {
    if let UsedSearchFilter::Referenced { id, disabled: false, .. } = search_filter {
        return Err(EngineError::UnresolvedSearchFilter(id.clone()));
    }
    let Some(text) = search_filter.inline_query() else {
        return Ok(());
    };
    if search_filter.is_negated() {
        bool_query.must_not(fragment::query_string(text));
    } else {
        bool_query.filter(fragment::query_string(text));
    }
    Ok(())
}
