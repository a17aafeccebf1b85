//! # Queries
//!
//! A [`Query`] is a declared search: time range, query text, an optional
//! filter tree and the search types to run. Values are immutable; every
//! `with_*` method returns a new query.
//!
//! Construction goes through [`QueryBuilder`], which applies the defaults in
//! one pass before freezing the value:
//!
//! - a missing id becomes a random UUID,
//! - a missing time range becomes the last [`DEFAULT_RELATIVE_RANGE`] seconds,
//! - a missing query text matches everything,
//! - search types without an id receive a random UUID.
//!
//! [`DEFAULT_RELATIVE_RANGE`]: crate::timerange::DEFAULT_RELATIVE_RANGE

use crate::algebra;
use crate::error::{BoxError, PlanError, Result};
use crate::execution::{ExecutionState, GlobalOverride};
use crate::filter::Filter;
use crate::merge;
use crate::query_string::QueryString;
use crate::search_filter::UsedSearchFilter;
use crate::search_type::SearchType;
use crate::timerange::TimeRange;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawQuery")]
pub struct Query {
    pub(crate) id: String,
    pub(crate) timerange: TimeRange,
    pub(crate) query: QueryString,
    pub(crate) filter: Option<Filter>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub(crate) filters: Vec<UsedSearchFilter>,
    pub(crate) search_types: Vec<SearchType>,
    #[serde(skip)]
    pub(crate) global_override: Option<GlobalOverride>,
}

impl Query {
    pub fn builder() -> QueryBuilder {
        QueryBuilder::default()
    }

    pub fn to_builder(&self) -> QueryBuilder {
        QueryBuilder {
            id: Some(self.id.clone()),
            timerange: Some(self.timerange.clone()),
            query: Some(self.query.clone()),
            filter: self.filter.clone(),
            filters: self.filters.clone(),
            search_types: self.search_types.clone(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn timerange(&self) -> &TimeRange {
        &self.timerange
    }

    pub fn query(&self) -> &QueryString {
        &self.query
    }

    pub fn filter(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }

    pub fn filters(&self) -> &[UsedSearchFilter] {
        &self.filters
    }

    /// In declaration order, ids unique.
    pub fn search_types(&self) -> &[SearchType] {
        &self.search_types
    }

    pub fn search_type(&self, id: &str) -> Option<&SearchType> {
        self.search_types.iter().find(|st| st.id() == id)
    }

    /// The override chosen when an execution state was applied, if any.
    pub fn global_override(&self) -> Option<&GlobalOverride> {
        self.global_override.as_ref()
    }

    pub fn has_referenced_search_filters(&self) -> bool {
        self.filters.iter().any(UsedSearchFilter::is_referenced)
    }

    pub fn with_timerange(&self, timerange: TimeRange) -> Self {
        Self {
            timerange,
            ..self.clone()
        }
    }

    pub fn with_query(&self, query: QueryString) -> Self {
        Self {
            query,
            ..self.clone()
        }
    }

    pub fn with_filter(&self, filter: Option<Filter>) -> Self {
        Self {
            filter,
            ..self.clone()
        }
    }

    pub fn with_filters(&self, filters: Vec<UsedSearchFilter>) -> Self {
        Self {
            filters,
            ..self.clone()
        }
    }

    pub fn with_search_types(&self, search_types: Vec<SearchType>) -> Result<Self> {
        Ok(Self {
            search_types: assign_search_type_ids(search_types)?,
            ..self.clone()
        })
    }

    /// Restrict the query to the given streams on top of its existing filter:
    /// the result is `And(streams, existing)`, or just the stream filter when
    /// the query had none. An empty id set leaves the query unchanged.
    pub fn add_streams_to_filter(&self, stream_ids: &BTreeSet<String>) -> Self {
        let Some(streams) = Filter::any_stream_of(stream_ids.iter().cloned()) else {
            return self.clone();
        };
        let combined = match &self.filter {
            None => streams,
            Some(existing) => Filter::both(streams, existing.clone()),
        };
        self.with_filter(Some(combined))
    }

    /// Stream ids named by the filter tree.
    pub fn used_stream_ids(&self) -> BTreeSet<String> {
        self.filter.as_ref().map(Filter::stream_ids).unwrap_or_default()
    }

    pub fn used_stream_categories(&self) -> BTreeSet<String> {
        self.filter
            .as_ref()
            .map(Filter::stream_categories)
            .unwrap_or_default()
    }

    pub fn stream_ids_for_permissions_check(&self) -> BTreeSet<String> {
        algebra::stream_ids_for_permissions_check(self)
    }

    /// Copy of this query with its category filters expanded into permitted
    /// streams; the filter becomes `None` if nothing survives.
    pub fn replace_stream_category_filters<R, P>(&self, resolve: R, permitted: P) -> Result<Self>
    where
        R: Fn(&BTreeSet<String>) -> std::result::Result<Vec<String>, BoxError>,
        P: Fn(&str) -> std::result::Result<bool, BoxError>,
    {
        match &self.filter {
            None => Ok(self.clone()),
            Some(filter) => {
                let expanded = algebra::expand_categories(filter, resolve, permitted)?;
                Ok(self.with_filter(expanded))
            }
        }
    }

    pub fn apply_execution_state(&self, state: &ExecutionState) -> Self {
        merge::apply_execution_state(self, state)
    }

    /// Export form for content packs; `filters` is always an array.
    pub fn to_content_pack_entity(&self) -> Result<serde_json::Value> {
        #[derive(Serialize)]
        struct Entity<'a> {
            id: &'a str,
            timerange: &'a TimeRange,
            query: &'a QueryString,
            filter: Option<&'a Filter>,
            filters: &'a [UsedSearchFilter],
            search_types: &'a [SearchType],
        }

        let entity = Entity {
            id: &self.id,
            timerange: &self.timerange,
            query: &self.query,
            filter: self.filter.as_ref(),
            filters: &self.filters,
            search_types: &self.search_types,
        };
        Ok(serde_json::to_value(entity)?)
    }
}

/// Raw fields of a [`Query`]; defaults are applied by [`QueryBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    id: Option<String>,
    timerange: Option<TimeRange>,
    query: Option<QueryString>,
    filter: Option<Filter>,
    filters: Vec<UsedSearchFilter>,
    search_types: Vec<SearchType>,
}

impl QueryBuilder {
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn timerange(mut self, timerange: TimeRange) -> Self {
        self.timerange = Some(timerange);
        self
    }

    pub fn query(mut self, query: QueryString) -> Self {
        self.query = Some(query);
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn filters(mut self, filters: Vec<UsedSearchFilter>) -> Self {
        self.filters = filters;
        self
    }

    pub fn search_type(mut self, search_type: SearchType) -> Self {
        self.search_types.push(search_type);
        self
    }

    pub fn search_types(mut self, search_types: impl IntoIterator<Item = SearchType>) -> Self {
        self.search_types.extend(search_types);
        self
    }

    pub fn build(self) -> Result<Query> {
        let id = match self.id.filter(|id| !id.trim().is_empty()) {
            Some(id) => id,
            None => Uuid::new_v4().to_string(),
        };
        Ok(Query {
            id,
            timerange: self.timerange.unwrap_or_default(),
            query: self.query.unwrap_or_default(),
            filter: self.filter,
            filters: self.filters,
            search_types: assign_search_type_ids(self.search_types)?,
            global_override: None,
        })
    }
}

fn assign_search_type_ids(search_types: Vec<SearchType>) -> Result<Vec<SearchType>> {
    let mut seen = BTreeSet::new();
    let mut assigned = Vec::with_capacity(search_types.len());
    for search_type in search_types {
        let search_type = if search_type.id().is_empty() {
            search_type.with_id(Uuid::new_v4().to_string())
        } else {
            search_type
        };
        if !seen.insert(search_type.id().to_string()) {
            return Err(PlanError::validation(
                "query",
                format!("duplicate search type id '{}'", search_type.id()),
            ));
        }
        assigned.push(search_type);
    }
    Ok(assigned)
}

#[derive(Deserialize)]
struct RawQuery {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    timerange: Option<TimeRange>,
    #[serde(default)]
    query: Option<QueryString>,
    #[serde(default)]
    filter: Option<Filter>,
    #[serde(default)]
    filters: Option<Vec<UsedSearchFilter>>,
    #[serde(default)]
    search_types: Vec<SearchType>,
}

impl TryFrom<RawQuery> for Query {
    type Error = PlanError;

    fn try_from(raw: RawQuery) -> Result<Self> {
        QueryBuilder {
            id: raw.id,
            timerange: raw.timerange,
            query: raw.query,
            filter: raw.filter,
            filters: raw.filters.unwrap_or_default(),
            search_types: raw.search_types,
        }
        .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterKind;
    use crate::search_type::{EventList, MessageList};
    use serde_json::json;

    fn restricted(streams: &[&str]) -> SearchType {
        EventList::builder().streams(streams.iter().copied()).build().unwrap()
    }

    #[test]
    fn test_builder_defaults() {
        let query = Query::builder().build().unwrap();
        assert!(!query.id().is_empty());
        assert_eq!(query.timerange(), &TimeRange::default());
        assert!(query.query().is_match_all());
        assert!(query.filter().is_none());
        assert!(query.global_override().is_none());
    }

    #[test]
    fn test_search_types_receive_ids() {
        let query = Query::builder()
            .search_type(MessageList::builder().build().unwrap())
            .search_type(MessageList::builder().id("fixed").build().unwrap())
            .build()
            .unwrap();
        assert!(!query.search_types()[0].id().is_empty());
        assert!(query.search_type("fixed").is_some());
    }

    #[test]
    fn test_duplicate_search_type_ids_are_rejected() {
        let st = MessageList::builder().id("dup").build().unwrap();
        let result = Query::builder().search_types([st.clone(), st]).build();
        assert!(matches!(result, Err(PlanError::Validation { .. })));
    }

    #[test]
    fn test_add_streams_to_filter() {
        let query = Query::builder()
            .filter(Filter::query_string("source:web"))
            .build()
            .unwrap();

        let one = query.add_streams_to_filter(&BTreeSet::from(["s1".to_string()]));
        let filter = one.filter().unwrap();
        assert_eq!(filter.kind(), FilterKind::And);
        assert_eq!(filter.children().unwrap()[0], Filter::stream("s1"));
        assert_eq!(filter.children().unwrap()[1], Filter::query_string("source:web"));

        let bare = Query::builder().build().unwrap();
        let many = bare.add_streams_to_filter(&BTreeSet::from(["a".to_string(), "b".to_string()]));
        assert_eq!(many.filter().unwrap().kind(), FilterKind::Or);

        assert_eq!(bare.add_streams_to_filter(&BTreeSet::new()), bare);
    }

    #[test]
    fn test_add_streams_keeps_existing_composite_filter() {
        let query = Query::builder()
            .filter(Filter::or([Filter::stream("a"), Filter::stream("b")]).unwrap())
            .build()
            .unwrap();
        let added = query.add_streams_to_filter(&BTreeSet::from(["x".to_string(), "y".to_string()]));
        let filter = added.filter().unwrap();
        assert_eq!(filter.kind(), FilterKind::And);
        assert_eq!(
            filter.stream_ids(),
            BTreeSet::from(["a", "b", "x", "y"].map(String::from))
        );
    }

    #[test]
    fn test_stream_ids_for_permissions_check() {
        let query = Query::builder()
            .search_types([restricted(&["a", "b"]), restricted(&["b", "c"])])
            .build()
            .unwrap()
            .add_streams_to_filter(&BTreeSet::from(["x".to_string(), "y".to_string()]));

        let ids = query.stream_ids_for_permissions_check();
        assert_eq!(ids.len(), 5);
        assert_eq!(
            ids.into_iter().collect::<Vec<_>>(),
            vec!["a", "b", "c", "x", "y"]
        );
    }

    #[test]
    fn test_replace_stream_category_filters() {
        let query = Query::builder()
            .filter(Filter::stream_category("colors"))
            .build()
            .unwrap();
        let expanded = query
            .replace_stream_category_filters(|_| Ok(vec!["red".into(), "blue".into()]), |id| Ok(id == "red"))
            .unwrap();
        assert_eq!(expanded.used_stream_ids(), BTreeSet::from(["red".to_string()]));
        assert!(expanded.used_stream_categories().is_empty());
        assert_eq!(query.used_stream_categories(), BTreeSet::from(["colors".to_string()]));

        let dropped = query.replace_stream_category_filters(|_| Ok(vec![]), |_| Ok(true)).unwrap();
        assert!(dropped.filter().is_none());
    }

    #[test]
    fn test_wire_format() {
        let query: Query = serde_json::from_value(json!({
            "id": "q1",
            "timerange": {"type": "relative", "range": 600},
            "query": {"type": "elasticsearch", "query_string": "level:3"},
            "filter": null,
            "search_types": [{"type": "messages", "id": "ml"}]
        }))
        .unwrap();
        assert_eq!(query.id(), "q1");
        assert_eq!(query.query().as_str(), "level:3");

        let value = serde_json::to_value(&query).unwrap();
        assert_eq!(value["filter"], serde_json::Value::Null);
        assert!(value.get("filters").is_none());
        assert_eq!(value["search_types"][0]["type"], "messages");
    }

    #[test]
    fn test_content_pack_export_always_has_filters_array() {
        let query = Query::builder().id("q1").build().unwrap();
        let entity = query.to_content_pack_entity().unwrap();
        assert_eq!(entity["filters"], json!([]));

        let with_filters = query.with_filters(vec![UsedSearchFilter::referenced("f-1")]);
        assert!(with_filters.has_referenced_search_filters());
        assert_eq!(with_filters.to_content_pack_entity().unwrap()["filters"][0]["id"], "f-1");
    }
}
