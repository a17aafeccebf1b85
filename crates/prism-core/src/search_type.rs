//! # Search Types
//!
//! Typed sub-requests of a query. Each variant produces its own result:
//!
//! - [`MessageList`] (`messages`) — raw messages, offset/limit paged.
//! - [`EventList`] (`events`) — event summaries, page/per-page paged, with
//!   attribute filters.
//! - [`Pivot`] (`pivot`) — grouped aggregations described by [`SeriesSpec`]s.
//!
//! All variants share an id, an optional display name and an optional
//! restriction to explicit streams. The id may be empty while the owning
//! query is being assembled; `Query` assigns one when it is built.

use crate::error::{PlanError, Result};
use crate::execution::SearchTypeExecutionState;
use crate::series::SeriesSpec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchTypeKind {
    Messages,
    Events,
    Pivot,
}

impl SearchTypeKind {
    pub const ALL: [SearchTypeKind; 3] = [Self::Messages, Self::Events, Self::Pivot];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Messages => "messages",
            Self::Events => "events",
            Self::Pivot => "pivot",
        }
    }
}

impl std::fmt::Display for SearchTypeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SearchTypeKind {
    type Err = PlanError;

    fn from_str(tag: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == tag)
            .ok_or_else(|| PlanError::unknown("search type", tag))
    }
}

// =============================================================================
// Shared pieces
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchTypeCommon {
    #[serde(default)]
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default)]
    streams: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    #[serde(default)]
    pub direction: Direction,
}

impl SortSpec {
    pub fn new(field: impl Into<String>, direction: Direction) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }
}

/// Restricts results to documents whose `field` matches any of `value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeFilter {
    pub field: String,
    #[serde(default)]
    pub value: Vec<String>,
    #[serde(default)]
    pub negation: bool,
}

impl AttributeFilter {
    pub fn new<I, S>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            field: field.into(),
            value: values.into_iter().map(Into::into).collect(),
            negation: false,
        }
    }

    pub fn negated(mut self) -> Self {
        self.negation = true;
        self
    }

    /// Query-language clauses equivalent to this filter. Values are quoted,
    /// alternatives are OR-ed into a single clause.
    pub fn to_query_strings(&self) -> Vec<String> {
        if self.value.is_empty() {
            return Vec::new();
        }
        let terms: Vec<String> = self
            .value
            .iter()
            .map(|v| format!("{}:\"{}\"", self.field, escape_phrase(v)))
            .collect();
        let clause = if terms.len() == 1 {
            terms.into_iter().collect::<String>()
        } else {
            format!("({})", terms.join(" OR "))
        };
        if self.negation {
            vec![format!("NOT {}", clause)]
        } else {
            vec![clause]
        }
    }
}

fn escape_phrase(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Page number (1-based) and page size, the common view of every variant's
/// paging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub page: u32,
    pub per_page: u32,
}

// =============================================================================
// Variants
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageList {
    #[serde(flatten)]
    common: SearchTypeCommon,
    limit: u32,
    offset: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sort: Vec<SortSpec>,
}

impl MessageList {
    pub const DEFAULT_LIMIT: u32 = 150;

    pub fn builder() -> MessageListBuilder {
        MessageListBuilder(Self {
            common: SearchTypeCommon::default(),
            limit: Self::DEFAULT_LIMIT,
            offset: 0,
            sort: Vec::new(),
        })
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn sort(&self) -> &[SortSpec] {
        &self.sort
    }
}

#[derive(Debug, Clone)]
pub struct MessageListBuilder(MessageList);

impl MessageListBuilder {
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.0.common.id = id.into();
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.0.common.name = Some(name.into());
        self
    }

    pub fn streams<I: IntoIterator<Item = S>, S: Into<String>>(mut self, streams: I) -> Self {
        self.0.common.streams = streams.into_iter().map(Into::into).collect();
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.0.limit = limit;
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.0.offset = offset;
        self
    }

    pub fn sort(mut self, sort: SortSpec) -> Self {
        self.0.sort.push(sort);
        self
    }

    pub fn build(self) -> Result<SearchType> {
        if self.0.limit == 0 {
            return Err(PlanError::validation("message list", "limit must be positive"));
        }
        Ok(SearchType::MessageList(self.0))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventList {
    #[serde(flatten)]
    common: SearchTypeCommon,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attributes: Vec<AttributeFilter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    per_page: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sort: Vec<SortSpec>,
}

impl EventList {
    pub const DEFAULT_PAGE_SIZE: u32 = 10;

    pub fn builder() -> EventListBuilder {
        EventListBuilder(Self {
            common: SearchTypeCommon::default(),
            attributes: Vec::new(),
            page: None,
            per_page: None,
            sort: Vec::new(),
        })
    }

    pub fn attributes(&self) -> &[AttributeFilter] {
        &self.attributes
    }

    pub fn page(&self) -> Option<u32> {
        self.page
    }

    pub fn per_page(&self) -> Option<u32> {
        self.per_page
    }

    pub fn sort(&self) -> &[SortSpec] {
        &self.sort
    }
}

#[derive(Debug, Clone)]
pub struct EventListBuilder(EventList);

impl EventListBuilder {
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.0.common.id = id.into();
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.0.common.name = Some(name.into());
        self
    }

    pub fn streams<I: IntoIterator<Item = S>, S: Into<String>>(mut self, streams: I) -> Self {
        self.0.common.streams = streams.into_iter().map(Into::into).collect();
        self
    }

    pub fn attribute(mut self, filter: AttributeFilter) -> Self {
        self.0.attributes.push(filter);
        self
    }

    pub fn page(mut self, page: u32) -> Self {
        self.0.page = Some(page);
        self
    }

    pub fn per_page(mut self, per_page: u32) -> Self {
        self.0.per_page = Some(per_page);
        self
    }

    pub fn sort(mut self, sort: SortSpec) -> Self {
        self.0.sort.push(sort);
        self
    }

    pub fn build(self) -> Result<SearchType> {
        if self.0.page == Some(0) {
            return Err(PlanError::validation("event list", "pages are numbered from 1"));
        }
        if self.0.per_page == Some(0) {
            return Err(PlanError::validation("event list", "per_page must be positive"));
        }
        Ok(SearchType::EventList(self.0))
    }
}

/// One level of row grouping: the values of `fields`, top `limit` buckets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grouping {
    pub fields: Vec<String>,
    #[serde(default = "default_group_limit")]
    pub limit: u32,
}

fn default_group_limit() -> u32 {
    Grouping::DEFAULT_LIMIT
}

impl Grouping {
    pub const DEFAULT_LIMIT: u32 = 15;

    pub fn values<I: IntoIterator<Item = S>, S: Into<String>>(fields: I) -> Self {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            limit: Self::DEFAULT_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pivot {
    #[serde(flatten)]
    common: SearchTypeCommon,
    row_groups: Vec<Grouping>,
    series: Vec<SeriesSpec>,
    rollup: bool,
}

impl Pivot {
    pub fn builder() -> PivotBuilder {
        PivotBuilder(Self {
            common: SearchTypeCommon::default(),
            row_groups: Vec::new(),
            series: Vec::new(),
            rollup: true,
        })
    }

    pub fn row_groups(&self) -> &[Grouping] {
        &self.row_groups
    }

    /// Ordered as declared.
    pub fn series(&self) -> &[SeriesSpec] {
        &self.series
    }

    pub fn rollup(&self) -> bool {
        self.rollup
    }
}

#[derive(Debug, Clone)]
pub struct PivotBuilder(Pivot);

impl PivotBuilder {
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.0.common.id = id.into();
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.0.common.name = Some(name.into());
        self
    }

    pub fn streams<I: IntoIterator<Item = S>, S: Into<String>>(mut self, streams: I) -> Self {
        self.0.common.streams = streams.into_iter().map(Into::into).collect();
        self
    }

    pub fn row_group(mut self, grouping: Grouping) -> Self {
        self.0.row_groups.push(grouping);
        self
    }

    pub fn series(mut self, series: SeriesSpec) -> Self {
        self.0.series.push(series);
        self
    }

    pub fn rollup(mut self, rollup: bool) -> Self {
        self.0.rollup = rollup;
        self
    }

    pub fn build(self) -> Result<SearchType> {
        for group in &self.0.row_groups {
            if group.fields.is_empty() || group.limit == 0 {
                return Err(PlanError::validation(
                    "pivot",
                    "row groups need at least one field and a positive limit",
                ));
            }
        }
        let mut seen = BTreeSet::new();
        if let Some(dup) = self.0.series.iter().find(|s| !seen.insert(s.id().to_string())) {
            return Err(PlanError::validation(
                "pivot",
                format!("duplicate series id '{}'", dup.id()),
            ));
        }
        Ok(SearchType::Pivot(self.0))
    }
}

// =============================================================================
// The closed sum type
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", try_from = "RawSearchType")]
pub enum SearchType {
    #[serde(rename = "messages")]
    MessageList(MessageList),
    #[serde(rename = "events")]
    EventList(EventList),
    #[serde(rename = "pivot")]
    Pivot(Pivot),
}

impl SearchType {
    fn common(&self) -> &SearchTypeCommon {
        match self {
            Self::MessageList(s) => &s.common,
            Self::EventList(s) => &s.common,
            Self::Pivot(s) => &s.common,
        }
    }

    fn common_mut(&mut self) -> &mut SearchTypeCommon {
        match self {
            Self::MessageList(s) => &mut s.common,
            Self::EventList(s) => &mut s.common,
            Self::Pivot(s) => &mut s.common,
        }
    }

    pub fn kind(&self) -> SearchTypeKind {
        match self {
            Self::MessageList(_) => SearchTypeKind::Messages,
            Self::EventList(_) => SearchTypeKind::Events,
            Self::Pivot(_) => SearchTypeKind::Pivot,
        }
    }

    pub fn id(&self) -> &str {
        &self.common().id
    }

    pub fn name(&self) -> Option<&str> {
        self.common().name.as_deref()
    }

    /// Explicit stream restriction; empty means "the query's streams".
    pub fn streams(&self) -> &BTreeSet<String> {
        &self.common().streams
    }

    pub fn attributes(&self) -> &[AttributeFilter] {
        match self {
            Self::EventList(events) => &events.attributes,
            _ => &[],
        }
    }

    pub fn paging(&self) -> Option<Paging> {
        match self {
            Self::MessageList(list) => Some(Paging {
                page: (list.offset / list.limit.max(1)).saturating_add(1),
                per_page: list.limit,
            }),
            Self::EventList(events) => events.page.map(|page| Paging {
                page,
                per_page: events.per_page.unwrap_or(EventList::DEFAULT_PAGE_SIZE),
            }),
            Self::Pivot(_) => None,
        }
    }

    pub fn with_id(&self, id: impl Into<String>) -> Self {
        let mut copy = self.clone();
        copy.common_mut().id = id.into();
        copy
    }

    pub fn with_streams(&self, streams: BTreeSet<String>) -> Self {
        let mut copy = self.clone();
        copy.common_mut().streams = streams;
        copy
    }

    /// Copy with the request's offset/limit applied. Message lists take them
    /// verbatim; event lists translate them into page/per-page; pivots are
    /// not paged and come back unchanged.
    pub fn apply_execution_state(&self, state: &SearchTypeExecutionState) -> Self {
        match self {
            Self::MessageList(list) => {
                let mut list = list.clone();
                if let Some(limit) = state.limit.filter(|l| *l > 0) {
                    list.limit = limit;
                }
                if let Some(offset) = state.offset {
                    list.offset = offset;
                }
                Self::MessageList(list)
            }
            Self::EventList(events) => {
                let mut events = events.clone();
                if let Some(limit) = state.limit.filter(|l| *l > 0) {
                    events.per_page = Some(limit);
                }
                if let Some(offset) = state.offset {
                    let per_page = events.per_page.unwrap_or(EventList::DEFAULT_PAGE_SIZE);
                    events.page = Some((offset / per_page).saturating_add(1));
                }
                Self::EventList(events)
            }
            Self::Pivot(_) => {
                tracing::debug!("Ignoring paging override for pivot '{}'", self.id());
                self.clone()
            }
        }
    }
}

#[derive(Deserialize)]
struct RawSearchType {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    streams: BTreeSet<String>,
    #[serde(default)]
    limit: Option<u32>,
    #[serde(default)]
    offset: Option<u32>,
    #[serde(default)]
    sort: Vec<SortSpec>,
    #[serde(default)]
    attributes: Vec<AttributeFilter>,
    #[serde(default)]
    page: Option<u32>,
    #[serde(default)]
    per_page: Option<u32>,
    #[serde(default)]
    row_groups: Vec<Grouping>,
    #[serde(default)]
    series: Vec<SeriesSpec>,
    #[serde(default)]
    rollup: Option<bool>,
}

impl TryFrom<RawSearchType> for SearchType {
    type Error = PlanError;

    fn try_from(raw: RawSearchType) -> Result<Self> {
        let common = SearchTypeCommon {
            id: raw.id.unwrap_or_default(),
            name: raw.name,
            streams: raw.streams,
        };
        match raw.kind.parse::<SearchTypeKind>()? {
            SearchTypeKind::Messages => MessageListBuilder(MessageList {
                common,
                limit: raw.limit.unwrap_or(MessageList::DEFAULT_LIMIT),
                offset: raw.offset.unwrap_or(0),
                sort: raw.sort,
            })
            .build(),
            SearchTypeKind::Events => EventListBuilder(EventList {
                common,
                attributes: raw.attributes,
                page: raw.page,
                per_page: raw.per_page,
                sort: raw.sort,
            })
            .build(),
            SearchTypeKind::Pivot => PivotBuilder(Pivot {
                common,
                row_groups: raw.row_groups,
                series: raw.series,
                rollup: raw.rollup.unwrap_or(true),
            })
            .build(),
        }
    }
}
