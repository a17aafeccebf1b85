//! # Filter Trees
//!
//! Boolean combinators restricting which records a query may see.
//!
//! Composite nodes (`and`, `or`) always carry at least one child; leaf nodes
//! carry none and report `None` from [`Filter::children`]. Tree walkers rely
//! on that difference, so an empty composite can never be constructed.

use crate::error::{PlanError, Result};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::{BTreeSet, HashSet};

/// Non-empty, duplicate-free children of a composite filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Children(Vec<Filter>);

impl Children {
    pub fn new(filters: impl IntoIterator<Item = Filter>) -> Result<Self> {
        let mut seen: HashSet<Filter> = HashSet::new();
        let mut unique: Vec<Filter> = Vec::new();
        for filter in filters {
            if seen.insert(filter.clone()) {
                unique.push(filter);
            }
        }
        if unique.is_empty() {
            return Err(PlanError::validation(
                "filter",
                "composite filters need at least one child",
            ));
        }
        Ok(Self(unique))
    }

    pub fn as_slice(&self) -> &[Filter] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Filter> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a Children {
    type Item = &'a Filter;
    type IntoIter = std::slice::Iter<'a, Filter>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "RawFilter")]
pub enum Filter {
    And(Children),
    Or(Children),
    Stream { id: String },
    StreamCategory { category: String },
    QueryString { query: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKind {
    And,
    Or,
    Stream,
    StreamCategory,
    QueryString,
}

impl FilterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::And => "and",
            Self::Or => "or",
            Self::Stream => "stream",
            Self::StreamCategory => "stream_category",
            Self::QueryString => "query_string",
        }
    }
}

impl std::str::FromStr for FilterKind {
    type Err = PlanError;

    fn from_str(tag: &str) -> Result<Self> {
        match tag {
            "and" => Ok(Self::And),
            "or" => Ok(Self::Or),
            "stream" => Ok(Self::Stream),
            "stream_category" => Ok(Self::StreamCategory),
            "query_string" => Ok(Self::QueryString),
            other => Err(PlanError::unknown("filter", other)),
        }
    }
}

impl Filter {
    pub fn and(filters: impl IntoIterator<Item = Filter>) -> Result<Self> {
        Ok(Self::And(Children::new(filters)?))
    }

    pub fn or(filters: impl IntoIterator<Item = Filter>) -> Result<Self> {
        Ok(Self::Or(Children::new(filters)?))
    }

    /// `and` of two filters; equal filters collapse into one.
    pub fn both(first: Filter, second: Filter) -> Self {
        if first == second {
            first
        } else {
            Self::And(Children(vec![first, second]))
        }
    }

    pub fn stream(id: impl Into<String>) -> Self {
        Self::Stream { id: id.into() }
    }

    pub fn stream_category(category: impl Into<String>) -> Self {
        Self::StreamCategory {
            category: category.into(),
        }
    }

    pub fn query_string(query: impl Into<String>) -> Self {
        Self::QueryString {
            query: query.into(),
        }
    }

    /// Matches any of the given streams: `None` for no ids, a bare stream
    /// filter for one, an `or` of stream filters otherwise.
    pub fn any_stream_of<I, S>(ids: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut leaves: Vec<Filter> = ids.into_iter().map(|id| Filter::stream(id)).collect();
        match leaves.len() {
            0 => None,
            1 => leaves.pop(),
            _ => Children::new(leaves).ok().map(Filter::Or),
        }
    }

    pub fn kind(&self) -> FilterKind {
        match self {
            Self::And(_) => FilterKind::And,
            Self::Or(_) => FilterKind::Or,
            Self::Stream { .. } => FilterKind::Stream,
            Self::StreamCategory { .. } => FilterKind::StreamCategory,
            Self::QueryString { .. } => FilterKind::QueryString,
        }
    }

    /// `None` for leaves, never an empty slice.
    pub fn children(&self) -> Option<&[Filter]> {
        match self {
            Self::And(children) | Self::Or(children) => Some(children.as_slice()),
            _ => None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children().is_none()
    }

    /// Pre-order visit of every node in the tree.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Filter)) {
        visit(self);
        if let Some(children) = self.children() {
            for child in children {
                child.walk(visit);
            }
        }
    }

    pub fn stream_ids(&self) -> BTreeSet<String> {
        let mut ids = BTreeSet::new();
        self.walk(&mut |node| {
            if let Filter::Stream { id } = node {
                ids.insert(id.clone());
            }
        });
        ids
    }

    pub fn stream_categories(&self) -> BTreeSet<String> {
        let mut categories = BTreeSet::new();
        self.walk(&mut |node| {
            if let Filter::StreamCategory { category } = node {
                categories.insert(category.clone());
            }
        });
        categories
    }
}

impl Serialize for Filter {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("type", self.kind().as_str())?;
        match self {
            Self::Stream { id } => map.serialize_entry("id", id)?,
            Self::StreamCategory { category } => map.serialize_entry("category", category)?,
            Self::QueryString { query } => map.serialize_entry("query", query)?,
            Self::And(_) | Self::Or(_) => {}
        }
        map.serialize_entry("filters", &self.children())?;
        map.end()
    }
}

#[derive(Deserialize)]
struct RawFilter {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    filters: Option<Vec<Filter>>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    query: Option<String>,
}

impl TryFrom<RawFilter> for Filter {
    type Error = PlanError;

    fn try_from(raw: RawFilter) -> Result<Self> {
        let kind: FilterKind = raw.kind.parse()?;
        let children = raw.filters.unwrap_or_default();
        let required = |value: Option<String>, field: &str| {
            value.filter(|v| !v.is_empty()).ok_or_else(|| {
                PlanError::validation("filter", format!("{} filter requires '{}'", kind.as_str(), field))
            })
        };
        if !matches!(kind, FilterKind::And | FilterKind::Or) && !children.is_empty() {
            return Err(PlanError::validation(
                "filter",
                format!("{} filter cannot have children", kind.as_str()),
            ));
        }
        Ok(match kind {
            FilterKind::And => Filter::and(children)?,
            FilterKind::Or => Filter::or(children)?,
            FilterKind::Stream => Filter::stream(required(raw.id, "id")?),
            FilterKind::StreamCategory => Filter::stream_category(required(raw.category, "category")?),
            FilterKind::QueryString => Filter::query_string(required(raw.query, "query")?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_composite_is_rejected() {
        assert!(Filter::and(Vec::new()).is_err());
        assert!(Filter::or(Vec::new()).is_err());
    }

    #[test]
    fn test_leaf_children_are_none_not_empty() {
        let leaf = Filter::stream("s1");
        assert!(leaf.children().is_none());
        assert!(leaf.is_leaf());

        let composite = Filter::and([leaf.clone()]).unwrap();
        assert_eq!(composite.children().map(<[Filter]>::len), Some(1));
    }

    #[test]
    fn test_duplicate_children_collapse() {
        let filter = Filter::or([Filter::stream("a"), Filter::stream("a"), Filter::stream("b")]).unwrap();
        assert_eq!(filter.children().unwrap().len(), 2);
    }

    #[test]
    fn test_wide_composite_keeps_first_occurrence_order() {
        let ids: Vec<String> = (0..5_000).map(|i| format!("s{}", i % 2_500)).collect();
        let filter = Filter::or(ids.iter().map(Filter::stream)).unwrap();
        let children = filter.children().unwrap();
        assert_eq!(children.len(), 2_500);
        assert_eq!(children[0], Filter::stream("s0"));
        assert_eq!(children[2_499], Filter::stream("s2499"));
    }

    #[test]
    fn test_both() {
        let a = Filter::stream("a");
        assert_eq!(Filter::both(a.clone(), a.clone()), a);
        let combined = Filter::both(a.clone(), Filter::query_string("x"));
        assert_eq!(combined.kind(), FilterKind::And);
        assert_eq!(combined.children().unwrap().len(), 2);
    }

    #[test]
    fn test_any_stream_of() {
        assert_eq!(Filter::any_stream_of(Vec::<String>::new()), None);
        assert_eq!(Filter::any_stream_of(["x"]), Some(Filter::stream("x")));
        let many = Filter::any_stream_of(["x", "y"]).unwrap();
        assert_eq!(many.kind(), FilterKind::Or);
        assert_eq!(many.stream_ids().len(), 2);
    }

    #[test]
    fn test_collects_ids_and_categories_at_any_depth() {
        let filter = Filter::and([
            Filter::or([Filter::stream("a"), Filter::stream_category("colors")]).unwrap(),
            Filter::query_string("source:localhost"),
            Filter::stream("b"),
        ])
        .unwrap();
        assert_eq!(filter.stream_ids(), BTreeSet::from(["a".to_string(), "b".to_string()]));
        assert_eq!(filter.stream_categories(), BTreeSet::from(["colors".to_string()]));
    }

    #[test]
    fn test_wire_format_uses_null_for_leaf_children() {
        let filter = Filter::and([Filter::stream("s1")]).unwrap();
        assert_eq!(
            serde_json::to_value(&filter).unwrap(),
            json!({
                "type": "and",
                "filters": [{"type": "stream", "id": "s1", "filters": null}]
            })
        );
    }

    #[test]
    fn test_deserialization_validates() {
        let parsed: Filter = serde_json::from_value(json!({
            "type": "or",
            "filters": [
                {"type": "stream_category", "category": "colors"},
                {"type": "query_string", "query": "a:b", "filters": null}
            ]
        }))
        .unwrap();
        assert_eq!(parsed.children().unwrap().len(), 2);

        let empty = serde_json::from_value::<Filter>(json!({"type": "and", "filters": []}));
        assert!(empty.is_err());

        let unknown = serde_json::from_value::<Filter>(json!({"type": "xor", "filters": []}));
        assert!(unknown.unwrap_err().to_string().contains("xor"));
    }
}
