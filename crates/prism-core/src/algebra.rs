//! # Filter Algebra
//!
//! Pure rewrites over [`Filter`] trees:
//!
//! - [`expand_categories`] replaces every stream-category leaf by the concrete
//!   streams the caller may read, pruning branches that end up empty.
//! - [`stream_ids_for_permissions_check`] enumerates every stream a query
//!   touches so the caller can authorize it before execution.
//!
//! Neither function holds state. Collaborators run on the calling thread,
//! and their failures are returned as [`PlanError::Collaborator`] without
//! producing a partial tree.

use crate::error::{BoxError, PlanError, Result};
use crate::filter::{Children, Filter};
use crate::query::Query;
use std::collections::BTreeSet;

/// Rewrite `filter`, expanding stream categories into permitted streams.
///
/// Returns `Ok(None)` when nothing survives. Composites keep exactly their
/// surviving children; a composite left with one child is not collapsed.
pub fn expand_categories<R, P>(filter: &Filter, resolve: R, permitted: P) -> Result<Option<Filter>>
where
    R: Fn(&BTreeSet<String>) -> std::result::Result<Vec<String>, BoxError>,
    P: Fn(&str) -> std::result::Result<bool, BoxError>,
{
    rewrite(filter, &resolve, &permitted)
}

fn rewrite<R, P>(filter: &Filter, resolve: &R, permitted: &P) -> Result<Option<Filter>>
where
    R: Fn(&BTreeSet<String>) -> std::result::Result<Vec<String>, BoxError>,
    P: Fn(&str) -> std::result::Result<bool, BoxError>,
{
    match filter {
        Filter::StreamCategory { category } => {
            let streams = permitted_streams(&BTreeSet::from([category.clone()]), resolve, permitted)?;
            tracing::debug!(
                "Category '{}' expanded to {} permitted stream(s)",
                category,
                streams.len()
            );
            let leaves = streams.into_iter().map(Filter::stream);
            Ok(Children::new(leaves).ok().map(Filter::Or))
        }
        Filter::And(children) => rewrite_children(children, resolve, permitted)
            .map(|kept| kept.map(Filter::And)),
        Filter::Or(children) => rewrite_children(children, resolve, permitted)
            .map(|kept| kept.map(Filter::Or)),
        Filter::Stream { .. } | Filter::QueryString { .. } => Ok(Some(filter.clone())),
    }
}

fn rewrite_children<R, P>(children: &Children, resolve: &R, permitted: &P) -> Result<Option<Children>>
where
    R: Fn(&BTreeSet<String>) -> std::result::Result<Vec<String>, BoxError>,
    P: Fn(&str) -> std::result::Result<bool, BoxError>,
{
    let mut kept = Vec::with_capacity(children.len());
    for child in children {
        if let Some(rewritten) = rewrite(child, resolve, permitted)? {
            kept.push(rewritten);
        }
    }
    if kept.is_empty() {
        return Ok(None);
    }
    Children::new(kept).map(Some)
}

/// Resolve `categories` and keep the streams the predicate accepts.
/// Duplicates from the resolver are dropped before the predicate runs, so it
/// is asked once per distinct stream.
pub fn permitted_streams<R, P>(
    categories: &BTreeSet<String>,
    resolve: &R,
    permitted: &P,
) -> Result<BTreeSet<String>>
where
    R: Fn(&BTreeSet<String>) -> std::result::Result<Vec<String>, BoxError>,
    P: Fn(&str) -> std::result::Result<bool, BoxError>,
{
    let candidates: BTreeSet<String> = resolve(categories)
        .map_err(|source| PlanError::Collaborator {
            operation: "stream category resolution",
            source,
        })?
        .into_iter()
        .collect();

    let mut allowed = BTreeSet::new();
    for stream in candidates {
        let ok = permitted(&stream).map_err(|source| PlanError::Collaborator {
            operation: "stream permission check",
            source,
        })?;
        if ok {
            allowed.insert(stream);
        }
    }
    Ok(allowed)
}

/// Every stream id the query references: stream leaves anywhere in its filter
/// tree (including streams added with [`Query::add_streams_to_filter`]) plus
/// the explicit stream restrictions of its search types. Performs no checks.
pub fn stream_ids_for_permissions_check(query: &Query) -> BTreeSet<String> {
    let mut ids = query.used_stream_ids();
    for search_type in query.search_types() {
        ids.extend(search_type.streams().iter().cloned());
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterKind;

    fn category_mapping(categories: &BTreeSet<String>) -> std::result::Result<Vec<String>, BoxError> {
        let mut streams = Vec::new();
        if categories.contains("colors") {
            streams.extend(["red", "yellow", "blue"].map(String::from));
        }
        if categories.contains("numbers") {
            streams.extend(["one", "two", "three"].map(String::from));
        }
        Ok(streams)
    }

    fn two_categories() -> Filter {
        Filter::and([
            Filter::stream_category("colors"),
            Filter::stream_category("numbers"),
        ])
        .unwrap()
    }

    fn assert_or_of_streams(filter: &Filter, size: usize) {
        assert_eq!(filter.kind(), FilterKind::Or);
        let leaves = filter.children().unwrap();
        assert_eq!(leaves.len(), size);
        assert!(leaves.iter().all(|leaf| leaf.kind() == FilterKind::Stream && leaf.children().is_none()));
    }

    #[test]
    fn test_full_permissions_expand_every_category() {
        let expanded = expand_categories(&two_categories(), category_mapping, |_| Ok(true))
            .unwrap()
            .unwrap();
        assert_eq!(expanded.kind(), FilterKind::And);
        let children = expanded.children().unwrap();
        assert_eq!(children.len(), 2);
        children.iter().for_each(|c| assert_or_of_streams(c, 3));
    }

    #[test]
    fn test_partial_permissions_drop_forbidden_streams() {
        let allowed = ["blue", "red", "one", "two"];
        let expanded = expand_categories(&two_categories(), category_mapping, |id| {
            Ok(allowed.contains(&id))
        })
        .unwrap()
        .unwrap();
        let children = expanded.children().unwrap();
        assert_eq!(children.len(), 2);
        children.iter().for_each(|c| assert_or_of_streams(c, 2));
        assert!(!expanded.stream_ids().contains("yellow"));
    }

    #[test]
    fn test_total_rejection_collapses_to_nothing() {
        let expanded = expand_categories(&two_categories(), category_mapping, |_| Ok(false)).unwrap();
        assert!(expanded.is_none());
    }

    #[test]
    fn test_non_category_siblings_survive() {
        let filter = Filter::and([
            Filter::or([
                Filter::stream_category("colors"),
                Filter::stream_category("numbers"),
            ])
            .unwrap(),
            Filter::query_string("source:localhost"),
        ])
        .unwrap();

        let expanded = expand_categories(&filter, category_mapping, |_| Ok(false))
            .unwrap()
            .unwrap();
        assert_eq!(expanded.kind(), FilterKind::And);
        assert_eq!(
            expanded.children().unwrap(),
            &[Filter::query_string("source:localhost")]
        );

        let expanded = expand_categories(&filter, category_mapping, |_| Ok(true))
            .unwrap()
            .unwrap();
        let or = expanded
            .children()
            .unwrap()
            .iter()
            .find(|f| f.kind() == FilterKind::Or)
            .unwrap();
        assert_eq!(or.children().unwrap().len(), 2);
        or.children().unwrap().iter().for_each(|c| assert_or_of_streams(c, 3));
    }

    #[test]
    fn test_input_tree_is_untouched() {
        let filter = two_categories();
        let before = filter.clone();
        let _ = expand_categories(&filter, category_mapping, |_| Ok(true)).unwrap();
        assert_eq!(filter, before);
    }

    #[test]
    fn test_predicate_called_once_per_distinct_stream() {
        let calls = std::cell::Cell::new(0);
        let dup_resolver = |_: &BTreeSet<String>| -> std::result::Result<Vec<String>, BoxError> {
            Ok(vec!["a".into(), "a".into(), "b".into()])
        };
        let expanded = expand_categories(&Filter::stream_category("any"), dup_resolver, |_| {
            calls.set(calls.get() + 1);
            Ok(true)
        })
        .unwrap()
        .unwrap();
        assert_eq!(calls.get(), 2);
        assert_or_of_streams(&expanded, 2);
    }

    #[test]
    fn test_collaborator_failure_is_propagated() {
        let failing = |_: &BTreeSet<String>| -> std::result::Result<Vec<String>, BoxError> {
            Err("catalog unavailable".into())
        };
        let err = expand_categories(&two_categories(), failing, |_| Ok(true)).unwrap_err();
        assert!(matches!(err, PlanError::Collaborator { .. }));

        let err = expand_categories(&two_categories(), category_mapping, |_| Err("acl down".into()))
            .unwrap_err();
        assert!(err.to_string().contains("acl down"));
    }
}
