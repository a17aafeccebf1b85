//! # Backend Fragments
//!
//! A minimal OpenSearch-style request body. Strategies mutate their own copy
//! of the base [`SearchSource`] and the executor renders it with
//! [`SearchSource::to_json`].

use prism_core::Direction;
use serde_json::{json, Map, Value};

/// `bool` compound query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoolQuery {
    pub must: Vec<Value>,
    pub filter: Vec<Value>,
    pub should: Vec<Value>,
    pub must_not: Vec<Value>,
    pub minimum_should_match: Option<u32>,
}

impl BoolQuery {
    pub fn must(&mut self, clause: Value) -> &mut Self {
        self.must.push(clause);
        self
    }

    pub fn filter(&mut self, clause: Value) -> &mut Self {
        self.filter.push(clause);
        self
    }

    pub fn must_not(&mut self, clause: Value) -> &mut Self {
        self.must_not.push(clause);
        self
    }

    pub fn to_json(&self) -> Value {
        let mut body = Map::new();
        for (name, clauses) in [
            ("must", &self.must),
            ("filter", &self.filter),
            ("should", &self.should),
            ("must_not", &self.must_not),
        ] {
            if !clauses.is_empty() {
                body.insert(name.into(), Value::Array(clauses.clone()));
            }
        }
        if let Some(minimum) = self.minimum_should_match {
            body.insert("minimum_should_match".into(), json!(minimum));
        }
        json!({ "bool": body })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortClause {
    pub field: String,
    pub direction: Direction,
}

impl SortClause {
    pub fn new(field: impl Into<String>, direction: Direction) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }

    fn to_json(&self) -> Value {
        let order = match self.direction {
            Direction::Asc => "asc",
            Direction::Desc => "desc",
        };
        json!({ &self.field: { "order": order } })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchSource {
    pub query: BoolQuery,
    pub sort: Vec<SortClause>,
    pub from: Option<u32>,
    pub size: Option<u32>,
    pub aggregations: Map<String, Value>,
}

impl SearchSource {
    pub fn to_json(&self) -> Value {
        let mut body = Map::new();
        body.insert("query".into(), self.query.to_json());
        if !self.sort.is_empty() {
            body.insert(
                "sort".into(),
                Value::Array(self.sort.iter().map(SortClause::to_json).collect()),
            );
        }
        if let Some(from) = self.from {
            body.insert("from".into(), json!(from));
        }
        if let Some(size) = self.size {
            body.insert("size".into(), json!(size));
        }
        if !self.aggregations.is_empty() {
            body.insert("aggregations".into(), Value::Object(self.aggregations.clone()));
        }
        body.insert("track_total_hits".into(), Value::Bool(true));
        Value::Object(body)
    }
}

// =============================================================================
// Clause helpers
// =============================================================================

pub fn match_all() -> Value {
    json!({ "match_all": {} })
}

pub fn query_string(text: &str) -> Value {
    json!({ "query_string": { "query": text, "allow_leading_wildcard": true } })
}

pub fn term(field: &str, value: &str) -> Value {
    json!({ "term": { field: value } })
}

pub fn terms<'a>(field: &str, values: impl IntoIterator<Item = &'a String>) -> Value {
    let values: Vec<&String> = values.into_iter().collect();
    json!({ "terms": { field: values } })
}

pub fn range(field: &str, from: &str, to: &str) -> Value {
    json!({ "range": { field: { "gte": from, "lte": to } } })
}
