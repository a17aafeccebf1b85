//! # Backend Client Seam
//!
//! The executor talks to the search backend only through [`BackendClient`].
//! Responses are decoded into [`RawResponse`], which keeps hit sources and
//! aggregations as untyped JSON for the strategies to interpret.

use crate::fragment::SearchSource;
use async_trait::async_trait;
use prism_core::BoxError;
use serde::Deserialize;
use serde_json::{Map, Value};

/// One backend request, issued per search type.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query_id: String,
    pub search_type_id: String,
    pub source: SearchSource,
}

impl SearchRequest {
    pub fn body(&self) -> Value {
        self.source.to_json()
    }
}

#[async_trait]
pub trait BackendClient: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<RawResponse, BoxError>;
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawResponse {
    #[serde(default)]
    pub hits: Hits,
    #[serde(default)]
    pub aggregations: Map<String, Value>,
}

impl RawResponse {
    pub fn from_json(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }

    pub fn total(&self) -> u64 {
        self.hits.total.value()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Hits {
    #[serde(default)]
    pub total: TotalHits,
    #[serde(default)]
    pub hits: Vec<Hit>,
}

/// Backends report totals either as a bare number or as
/// `{"value": n, "relation": "eq"}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TotalHits {
    Count(u64),
    Object {
        value: u64,
        #[serde(default)]
        relation: Option<String>,
    },
}

impl Default for TotalHits {
    fn default() -> Self {
        Self::Count(0)
    }
}

impl TotalHits {
    pub fn value(&self) -> u64 {
        match self {
            Self::Count(n) | Self::Object { value: n, .. } => *n,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Hit {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    #[serde(rename = "_index", default)]
    pub index: Option<String>,
    #[serde(rename = "_source", default)]
    pub source: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_total_hits_forms() {
        let plain = RawResponse::from_json(json!({"hits": {"total": 7, "hits": []}})).unwrap();
        assert_eq!(plain.total(), 7);

        let object = RawResponse::from_json(json!({
            "hits": {"total": {"value": 42, "relation": "eq"}, "hits": [{"_id": "a", "_source": {"x": 1}}]}
        }))
        .unwrap();
        assert_eq!(object.total(), 42);
        assert_eq!(object.hits.hits[0].id.as_deref(), Some("a"));
        assert_eq!(object.hits.hits[0].source["x"], 1);
    }

    #[test]
    fn test_missing_sections_default() {
        let empty = RawResponse::from_json(json!({})).unwrap();
        assert_eq!(empty.total(), 0);
        assert!(empty.aggregations.is_empty());
    }
}
