//! # Event-List Strategy
//!
//! Queries the event index. Scope, attribute filters and sorting are limited
//! to a fixed set of event attributes; anything else is dropped with a
//! warning rather than forwarded to the backend.

use super::{effective_streams, mismatch, SearchTypeHandler, SearchTypeResult};
use crate::client::{Hit, RawResponse};
use crate::context::GeneratedQueryContext;
use crate::error::{EngineError, Result};
use crate::fragment::{self, SearchSource, SortClause};
use prism_core::{Direction, EventList, PlanError, Query, SearchType, SearchTypeKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Attributes that may be filtered and sorted on.
pub const KNOWN_ATTRIBUTES: [&str; 5] = ["alert", "event_definition_id", "key", "priority", "timestamp"];
pub const DEFAULT_SORT_FIELD: &str = "timestamp";
pub const DEFAULT_SORT_DIRECTION: Direction = Direction::Desc;
/// Result size when the search type is not paged.
pub const UNPAGED_RESULT_CAP: u32 = 10_000;
/// Field of an event document listing the streams of its source messages.
pub const SOURCE_STREAMS_FIELD: &str = "source_streams";

fn is_known_attribute(field: &str) -> bool {
    KNOWN_ATTRIBUTES.contains(&field)
}

pub struct EventListHandler;

impl SearchTypeHandler for EventListHandler {
    fn kind(&self) -> SearchTypeKind {
        SearchTypeKind::Events
    }

    fn build_query_fragment(
        &self,
        _query: &Query,
        search_type: &SearchType,
        context: &GeneratedQueryContext,
    ) -> Result<SearchSource> {
        let SearchType::EventList(events) = search_type else {
            return Err(mismatch(SearchTypeKind::Events, search_type));
        };
        let mut source = context.search_source();

        let streams = effective_streams(search_type, context);
        if !streams.is_empty() {
            source.query.must(fragment::terms(SOURCE_STREAMS_FIELD, streams));
        }

        for attribute in events.attributes() {
            if !is_known_attribute(&attribute.field) {
                tracing::warn!(
                    "Dropping filter on unknown event attribute '{}' in '{}'",
                    attribute.field,
                    search_type.id()
                );
                continue;
            }
            for clause in attribute.to_query_strings() {
                source.query.filter(fragment::query_string(&clause));
            }
        }

        source.sort = vec![sort_clause(events)];

        match events.page() {
            Some(page) => {
                let per_page = events.per_page().unwrap_or(EventList::DEFAULT_PAGE_SIZE);
                source.size = Some(per_page);
                source.from = Some(page_offset(page, per_page, search_type.id())?);
            }
            None => source.size = Some(UNPAGED_RESULT_CAP),
        }
        Ok(source)
    }

    fn extract_result(
        &self,
        _query: &Query,
        search_type: &SearchType,
        response: &RawResponse,
        _context: &GeneratedQueryContext,
    ) -> Result<SearchTypeResult> {
        if !matches!(search_type, SearchType::EventList(_)) {
            return Err(mismatch(SearchTypeKind::Events, search_type));
        }
        let events = response
            .hits
            .hits
            .iter()
            .map(|hit| EventSummary::parse(hit, search_type.id()))
            .collect::<Result<Vec<_>>>()?;
        Ok(SearchTypeResult::Events(EventListResult {
            id: search_type.id().to_string(),
            name: search_type.name().map(str::to_string),
            events,
            total_results: response.total(),
        }))
    }
}

/// Index of the first hit on `page`; pages past `u32::MAX` hits are rejected.
fn page_offset(page: u32, per_page: u32, search_type_id: &str) -> Result<u32> {
    let from = u64::from(page.saturating_sub(1)) * u64::from(per_page);
    u32::try_from(from).map_err(|_| {
        EngineError::Plan(PlanError::Validation {
            entity: "event list",
            reason: format!(
                "page {} of {} events in '{}' starts beyond the addressable result range",
                page, per_page, search_type_id
            ),
        })
    })
}

/// First declared sort on a known attribute, else newest first.
fn sort_clause(events: &EventList) -> SortClause {
    match events.sort().first() {
        Some(sort) if is_known_attribute(&sort.field) => SortClause::new(&sort.field, sort.direction),
        Some(sort) => {
            tracing::warn!("Ignoring sort on unknown event attribute '{}'", sort.field);
            SortClause::new(DEFAULT_SORT_FIELD, DEFAULT_SORT_DIRECTION)
        }
        None => SortClause::new(DEFAULT_SORT_FIELD, DEFAULT_SORT_DIRECTION),
    }
}

// =============================================================================
// Results
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSummary {
    pub id: String,
    #[serde(default, rename = "source_streams", alias = "streams")]
    pub streams: BTreeSet<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub alert: bool,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub event_definition_id: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
}

impl EventSummary {
    fn parse(hit: &Hit, search_type_id: &str) -> Result<Self> {
        serde_json::from_value(serde_json::Value::Object(hit.source.clone())).map_err(|e| {
            EngineError::MalformedResponse {
                search_type: search_type_id.to_string(),
                reason: format!("event {}: {}", hit.id.as_deref().unwrap_or("<unknown>"), e),
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventListResult {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub events: Vec<EventSummary>,
    pub total_results: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::BackendSettings;
    use chrono::Utc;
    use prism_core::{AttributeFilter, Filter, SortSpec};
    use serde_json::json;

    fn context(query: &Query) -> GeneratedQueryContext {
        GeneratedQueryContext::new(query, &BackendSettings::default(), Utc::now()).unwrap()
    }

    fn query_on_streams() -> Query {
        Query::builder()
            .filter(Filter::or([Filter::stream("q1"), Filter::stream("q2")]).unwrap())
            .build()
            .unwrap()
    }

    #[test]
    fn test_scope_falls_back_to_query_streams() {
        let query = query_on_streams();
        let events = EventList::builder().build().unwrap();
        let source = EventListHandler
            .build_query_fragment(&query, &events, &context(&query))
            .unwrap();
        assert!(source
            .query
            .must
            .contains(&json!({"terms": {"source_streams": ["q1", "q2"]}})));
    }

    #[test]
    fn test_own_streams_win() {
        let query = query_on_streams();
        let events = EventList::builder().streams(["own"]).build().unwrap();
        let source = EventListHandler
            .build_query_fragment(&query, &events, &context(&query))
            .unwrap();
        assert!(source
            .query
            .must
            .contains(&json!({"terms": {"source_streams": ["own"]}})));
    }

    #[test]
    fn test_no_streams_no_scope_clause() {
        let query = Query::builder().build().unwrap();
        let events = EventList::builder().build().unwrap();
        let source = EventListHandler
            .build_query_fragment(&query, &events, &context(&query))
            .unwrap();
        assert_eq!(source.query.must, vec![fragment::match_all()]);
    }

    #[test]
    fn test_attribute_filters_are_allow_listed() {
        let query = Query::builder().build().unwrap();
        let events = EventList::builder()
            .attribute(AttributeFilter::new("priority", ["3", "4"]))
            .attribute(AttributeFilter::new("secret_field", ["x"]))
            .build()
            .unwrap();
        let source = EventListHandler
            .build_query_fragment(&query, &events, &context(&query))
            .unwrap();
        let filters = &source.query.filter;
        assert!(filters.contains(&fragment::query_string(r#"(priority:"3" OR priority:"4")"#)));
        assert!(!filters.iter().any(|f| f.to_string().contains("secret_field")));
    }

    #[test]
    fn test_sort_selection() {
        let query = Query::builder().build().unwrap();
        let known = EventList::builder()
            .sort(SortSpec::new("priority", Direction::Asc))
            .build()
            .unwrap();
        let source = EventListHandler
            .build_query_fragment(&query, &known, &context(&query))
            .unwrap();
        assert_eq!(source.sort, vec![SortClause::new("priority", Direction::Asc)]);

        let unknown = EventList::builder()
            .sort(SortSpec::new("message", Direction::Asc))
            .build()
            .unwrap();
        let source = EventListHandler
            .build_query_fragment(&query, &unknown, &context(&query))
            .unwrap();
        assert_eq!(source.sort, vec![SortClause::new("timestamp", Direction::Desc)]);
    }

    #[test]
    fn test_paging() {
        let query = Query::builder().build().unwrap();

        let paged = EventList::builder().page(3).build().unwrap();
        let source = EventListHandler
            .build_query_fragment(&query, &paged, &context(&query))
            .unwrap();
        assert_eq!(source.size, Some(EventList::DEFAULT_PAGE_SIZE));
        assert_eq!(source.from, Some(20));

        let sized = EventList::builder().page(2).per_page(25).build().unwrap();
        let source = EventListHandler
            .build_query_fragment(&query, &sized, &context(&query))
            .unwrap();
        assert_eq!((source.from, source.size), (Some(25), Some(25)));

        let unpaged = EventList::builder().build().unwrap();
        let source = EventListHandler
            .build_query_fragment(&query, &unpaged, &context(&query))
            .unwrap();
        assert_eq!((source.from, source.size), (None, Some(UNPAGED_RESULT_CAP)));
    }

    #[test]
    fn test_page_beyond_result_range_is_rejected() {
        let query = Query::builder().build().unwrap();
        let far = EventList::builder().page(500_000).per_page(10_000).build().unwrap();
        let err = EventListHandler
            .build_query_fragment(&query, &far, &context(&query))
            .unwrap_err();
        assert!(matches!(err, EngineError::Plan(PlanError::Validation { .. })));

        let last = EventList::builder().page(u32::MAX).per_page(1).build().unwrap();
        let source = EventListHandler
            .build_query_fragment(&query, &last, &context(&query))
            .unwrap();
        assert_eq!(source.from, Some(u32::MAX - 1));
    }

    #[test]
    fn test_extract_result() {
        let query = Query::builder().build().unwrap();
        let events = EventList::builder().id("ev").name("Alerts").build().unwrap();
        let response = RawResponse::from_json(json!({
            "hits": {
                "total": {"value": 120, "relation": "eq"},
                "hits": [{
                    "_id": "e1",
                    "_source": {
                        "id": "e1",
                        "source_streams": ["s1"],
                        "message": "CPU high",
                        "timestamp": "2024-05-01 12:00:00.000",
                        "alert": true,
                        "priority": 3,
                        "event_definition_id": "def-1"
                    }
                }]
            }
        }))
        .unwrap();

        let result = EventListHandler
            .extract_result(&query, &events, &response, &context(&query))
            .unwrap();
        assert_eq!(result.id(), "ev");
        assert_eq!(result.name(), Some("Alerts"));
        assert_eq!(result.total_results(), 120);
        let SearchTypeResult::Events(result) = result else {
            panic!("expected events result");
        };
        let summary = &result.events[0];
        assert!(summary.alert);
        assert_eq!(summary.priority, Some(3));
        assert!(summary.streams.contains("s1"));
    }

    #[test]
    fn test_malformed_hit_is_reported() {
        let query = Query::builder().build().unwrap();
        let events = EventList::builder().id("ev").build().unwrap();
        let response = RawResponse::from_json(json!({
            "hits": {"total": 1, "hits": [{"_id": "bad", "_source": {"message": "no id"}}]}
        }))
        .unwrap();
        let err = EventListHandler
            .extract_result(&query, &events, &response, &context(&query))
            .unwrap_err();
        assert!(matches!(err, EngineError::MalformedResponse { search_type, .. } if search_type == "ev"));
    }
}
