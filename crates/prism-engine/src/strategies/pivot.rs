//! # Pivot Strategy
//!
//! Turns row groupings into nested `terms` aggregations, one level per
//! grouping field, with the series metrics evaluated in the innermost
//! buckets. When the pivot rolls up (or has no groupings at all) the metrics
//! are also evaluated over the whole result set.
//!
//! Aggregation names are positional (`agg-<level>`, `series-<index>`) so
//! that series ids never have to be valid backend identifiers.

use super::{mismatch, SearchTypeHandler, SearchTypeResult};
use crate::client::RawResponse;
use crate::context::GeneratedQueryContext;
use crate::error::{EngineError, Result};
use crate::fragment::{self, SearchSource};
use crate::settings::BackendSettings;
use prism_core::{Pivot, Query, SearchType, SearchTypeKind, SeriesFunction, SeriesSpec};
use serde::Serialize;
use serde_json::{json, Map, Value};

pub struct PivotHandler;

impl SearchTypeHandler for PivotHandler {
    fn kind(&self) -> SearchTypeKind {
        SearchTypeKind::Pivot
    }

    fn build_query_fragment(
        &self,
        _query: &Query,
        search_type: &SearchType,
        context: &GeneratedQueryContext,
    ) -> Result<SearchSource> {
        let SearchType::Pivot(pivot) = search_type else {
            return Err(mismatch(SearchTypeKind::Pivot, search_type));
        };
        let settings = context.settings();
        let mut source = context.search_source();

        if !search_type.streams().is_empty() {
            source
                .query
                .filter(fragment::terms(&settings.streams_field, search_type.streams()));
        }

        let levels = group_levels(pivot);
        let metrics = series_aggregations(pivot.series(), settings);

        // Innermost first: each level wraps the one below it.
        let mut nested: Option<Map<String, Value>> = None;
        for (depth, (field, limit)) in levels.iter().enumerate().rev() {
            let mut terms = json!({ "terms": { "field": field, "size": limit } });
            let children = nested.take().unwrap_or_else(|| metrics.clone());
            if !children.is_empty() {
                terms["aggregations"] = Value::Object(children);
            }
            let mut level = Map::new();
            level.insert(level_name(depth), terms);
            nested = Some(level);
        }

        let mut aggregations = nested.unwrap_or_default();
        if pivot.rollup() || levels.is_empty() {
            aggregations.extend(metrics);
        }
        source.aggregations = aggregations;
        source.size = Some(0);
        tracing::debug!(
            "Pivot '{}' uses {} grouping level(s) and {} series",
            search_type.id(),
            levels.len(),
            pivot.series().len()
        );
        Ok(source)
    }

    fn extract_result(
        &self,
        _query: &Query,
        search_type: &SearchType,
        response: &RawResponse,
        _context: &GeneratedQueryContext,
    ) -> Result<SearchTypeResult> {
        let SearchType::Pivot(pivot) = search_type else {
            return Err(mismatch(SearchTypeKind::Pivot, search_type));
        };
        let extractor = Extractor {
            search_type_id: search_type.id(),
            series: pivot.series(),
            levels: group_levels(pivot).len(),
        };

        let mut rows = Vec::new();
        if extractor.levels > 0 {
            extractor.collect_rows(&response.aggregations, 0, &mut Vec::new(), &mut rows)?;
        }
        if pivot.rollup() || extractor.levels == 0 {
            rows.push(PivotRow {
                key: Vec::new(),
                values: extractor.values(&response.aggregations, response.total())?,
                source: RowSource::Rollup,
            });
        }

        Ok(SearchTypeResult::Pivot(PivotResult {
            id: search_type.id().to_string(),
            name: search_type.name().map(str::to_string),
            rows,
            total: response.total(),
        }))
    }
}

/// Flattened `(field, limit)` per nesting level.
fn group_levels(pivot: &Pivot) -> Vec<(String, u32)> {
    pivot
        .row_groups()
        .iter()
        .flat_map(|group| group.fields.iter().map(move |field| (field.clone(), group.limit)))
        .collect()
}

fn level_name(depth: usize) -> String {
    format!("agg-{}", depth)
}

fn series_name(index: usize) -> String {
    format!("series-{}", index)
}

fn series_aggregations(series: &[SeriesSpec], settings: &BackendSettings) -> Map<String, Value> {
    let mut aggregations = Map::new();
    for (index, spec) in series.iter().enumerate() {
        let aggregation = match spec.function() {
            SeriesFunction::Count { field: None } => continue,
            SeriesFunction::Count { field: Some(field) } => json!({ "value_count": { "field": field } }),
            SeriesFunction::Avg { field } => json!({ "avg": { "field": field } }),
            SeriesFunction::Sum { field } => json!({ "sum": { "field": field } }),
            SeriesFunction::Min { field } => json!({ "min": { "field": field } }),
            SeriesFunction::Max { field } => json!({ "max": { "field": field } }),
            SeriesFunction::Card { field } => json!({ "cardinality": { "field": field } }),
            SeriesFunction::StdDev { field } | SeriesFunction::Variance { field } => {
                json!({ "extended_stats": { "field": field } })
            }
            SeriesFunction::Percentile { field, percentile } => {
                json!({ "percentiles": { "field": field, "percents": [percentile] } })
            }
            SeriesFunction::Latest { field } => json!({
                "top_hits": {
                    "size": 1,
                    "_source": { "includes": [field] },
                    "sort": [{ &settings.timestamp_field: { "order": "desc" } }]
                }
            }),
        };
        aggregations.insert(series_name(index), aggregation);
    }
    aggregations
}

struct Extractor<'a> {
    search_type_id: &'a str,
    series: &'a [SeriesSpec],
    levels: usize,
}

impl Extractor<'_> {
    fn malformed(&self, reason: impl Into<String>) -> EngineError {
        EngineError::MalformedResponse {
            search_type: self.search_type_id.to_string(),
            reason: reason.into(),
        }
    }

    fn collect_rows(
        &self,
        aggregations: &Map<String, Value>,
        depth: usize,
        key: &mut Vec<String>,
        rows: &mut Vec<PivotRow>,
    ) -> Result<()> {
        let name = level_name(depth);
        let buckets = aggregations
            .get(&name)
            .and_then(|agg| agg.get("buckets"))
            .and_then(Value::as_array)
            .ok_or_else(|| self.malformed(format!("missing buckets for '{}'", name)))?;

        for bucket in buckets {
            let bucket = bucket
                .as_object()
                .ok_or_else(|| self.malformed(format!("bucket of '{}' is not an object", name)))?;
            key.push(bucket_key(bucket));
            if depth + 1 == self.levels {
                let doc_count = bucket.get("doc_count").and_then(Value::as_u64).unwrap_or(0);
                rows.push(PivotRow {
                    key: key.clone(),
                    values: self.values(bucket, doc_count)?,
                    source: RowSource::Leaf,
                });
            } else {
                self.collect_rows(bucket, depth + 1, key, rows)?;
            }
            key.pop();
        }
        Ok(())
    }

    fn values(&self, aggregations: &Map<String, Value>, doc_count: u64) -> Result<Vec<PivotValue>> {
        self.series
            .iter()
            .enumerate()
            .map(|(index, spec)| {
                let value = match spec.function() {
                    SeriesFunction::Count { field: None } => json!(doc_count),
                    function => {
                        let name = series_name(index);
                        let agg = aggregations
                            .get(&name)
                            .ok_or_else(|| self.malformed(format!("missing aggregation for series '{}'", spec.id())))?;
                        Self::metric_value(function, agg)
                    }
                };
                Ok(PivotValue {
                    series: spec.id().to_string(),
                    value,
                })
            })
            .collect()
    }

    fn metric_value(function: &SeriesFunction, agg: &Value) -> Value {
        match function {
            SeriesFunction::StdDev { .. } => agg["std_deviation"].clone(),
            SeriesFunction::Variance { .. } => agg["variance"].clone(),
            SeriesFunction::Percentile { .. } => agg["values"]
                .as_object()
                .and_then(|values| values.values().next().cloned())
                .unwrap_or(Value::Null),
            SeriesFunction::Latest { field } => agg["hits"]["hits"][0]["_source"]
                .get(field)
                .cloned()
                .unwrap_or(Value::Null),
            _ => agg["value"].clone(),
        }
    }
}

fn bucket_key(bucket: &Map<String, Value>) -> String {
    match bucket.get("key_as_string").or_else(|| bucket.get("key")) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

// =============================================================================
// Results
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowSource {
    Leaf,
    Rollup,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotValue {
    pub series: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotRow {
    /// Bucket keys from the outermost grouping inwards; empty for the rollup.
    pub key: Vec<String>,
    /// In series declaration order.
    pub values: Vec<PivotValue>,
    pub source: RowSource,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotResult {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub rows: Vec<PivotRow>,
    pub total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use prism_core::Grouping;

    fn context(query: &Query) -> GeneratedQueryContext {
        GeneratedQueryContext::new(query, &BackendSettings::default(), Utc::now()).unwrap()
    }

    fn pivot(rollup: bool) -> SearchType {
        Pivot::builder()
            .id("p")
            .row_group(Grouping::values(["source"]).with_limit(5))
            .series(SeriesSpec::count().build().unwrap())
            .series(SeriesSpec::avg().field("took").build().unwrap())
            .series(SeriesSpec::latest().field("level").build().unwrap())
            .rollup(rollup)
            .build()
            .unwrap()
    }

    #[test]
    fn test_fragment_nests_metrics_under_groups() {
        let query = Query::builder().build().unwrap();
        let source = PivotHandler
            .build_query_fragment(&query, &pivot(false), &context(&query))
            .unwrap();
        assert_eq!(source.size, Some(0));

        let terms = &source.aggregations["agg-0"];
        assert_eq!(terms["terms"], json!({"field": "source", "size": 5}));
        assert_eq!(terms["aggregations"]["series-1"], json!({"avg": {"field": "took"}}));
        assert_eq!(terms["aggregations"]["series-2"]["top_hits"]["size"], 1);
        assert!(terms["aggregations"].get("series-0").is_none());
        assert!(!source.aggregations.contains_key("series-1"));
    }

    #[test]
    fn test_rollup_adds_top_level_metrics() {
        let query = Query::builder().build().unwrap();
        let source = PivotHandler
            .build_query_fragment(&query, &pivot(true), &context(&query))
            .unwrap();
        assert!(source.aggregations.contains_key("agg-0"));
        assert!(source.aggregations.contains_key("series-1"));
    }

    #[test]
    fn test_multi_field_grouping_nests_levels() {
        let query = Query::builder().build().unwrap();
        let pivot = Pivot::builder()
            .row_group(Grouping::values(["source", "level"]))
            .series(SeriesSpec::count().build().unwrap())
            .rollup(false)
            .build()
            .unwrap();
        let source = PivotHandler
            .build_query_fragment(&query, &pivot, &context(&query))
            .unwrap();
        let inner = &source.aggregations["agg-0"]["aggregations"]["agg-1"]["terms"];
        assert_eq!(inner["field"], "level");
        assert_eq!(inner["size"], Grouping::DEFAULT_LIMIT);
    }

    #[test]
    fn test_extract_rows_and_rollup() {
        let query = Query::builder().build().unwrap();
        let response = RawResponse::from_json(json!({
            "hits": {"total": 30, "hits": []},
            "aggregations": {
                "agg-0": {"buckets": [
                    {
                        "key": "web-1",
                        "doc_count": 20,
                        "series-1": {"value": 12.5},
                        "series-2": {"hits": {"hits": [{"_source": {"level": 4}}]}}
                    },
                    {
                        "key": "web-2",
                        "doc_count": 10,
                        "series-1": {"value": 3.0},
                        "series-2": {"hits": {"hits": [{"_source": {"level": 6}}]}}
                    }
                ]},
                "series-1": {"value": 9.33},
                "series-2": {"hits": {"hits": [{"_source": {"level": 6}}]}}
            }
        }))
        .unwrap();

        let result = PivotHandler
            .extract_result(&query, &pivot(true), &response, &context(&query))
            .unwrap();
        let SearchTypeResult::Pivot(result) = result else {
            panic!("expected pivot result");
        };
        assert_eq!(result.total, 30);
        assert_eq!(result.rows.len(), 3);

        let first = &result.rows[0];
        assert_eq!(first.key, vec!["web-1".to_string()]);
        assert_eq!(first.source, RowSource::Leaf);
        let series: Vec<&str> = first.values.iter().map(|v| v.series.as_str()).collect();
        assert_eq!(series, vec!["count()", "avg(took)", "latest(level)"]);
        assert_eq!(first.values[0].value, json!(20));
        assert_eq!(first.values[2].value, json!(4));

        let rollup = &result.rows[2];
        assert!(rollup.key.is_empty());
        assert_eq!(rollup.source, RowSource::Rollup);
        assert_eq!(rollup.values[0].value, json!(30));
    }

    #[test]
    fn test_missing_buckets_are_malformed() {
        let query = Query::builder().build().unwrap();
        let response = RawResponse::from_json(json!({"hits": {"total": 0, "hits": []}})).unwrap();
        let err = PivotHandler
            .extract_result(&query, &pivot(false), &response, &context(&query))
            .unwrap_err();
        assert!(matches!(err, EngineError::MalformedResponse { .. }));
    }
}
