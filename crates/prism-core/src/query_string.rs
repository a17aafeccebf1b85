//! # Backend Query Text
//!
//! The free-text part of a query, in the backend's query language. An empty
//! string matches everything. Text may reference request parameters as
//! `$name$` placeholders, bound at execution time from the
//! [`ExecutionState`](crate::execution::ExecutionState).

use crate::error::{PlanError, Result};
use regex::Regex;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

pub const QUERY_STRING_TYPE: &str = "elasticsearch";

fn parameter_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)\$").expect("static pattern"))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "RawQueryString")]
pub struct QueryString {
    query_string: String,
}

impl QueryString {
    pub fn of(text: impl Into<String>) -> Self {
        Self {
            query_string: text.into(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn as_str(&self) -> &str {
        &self.query_string
    }

    /// Whitespace-only text also matches everything.
    pub fn is_match_all(&self) -> bool {
        let trimmed = self.query_string.trim();
        trimmed.is_empty() || trimmed == "*"
    }

    pub fn used_parameters(&self) -> BTreeSet<String> {
        parameter_pattern()
            .captures_iter(&self.query_string)
            .map(|c| c[1].to_string())
            .collect()
    }

    /// Substitute every `$name$` placeholder. String bindings are inserted
    /// verbatim, other JSON values by their JSON rendering.
    pub fn bind_parameters(&self, bindings: &BTreeMap<String, serde_json::Value>) -> Result<Self> {
        if let Some(missing) = self
            .used_parameters()
            .into_iter()
            .find(|name| !bindings.contains_key(name))
        {
            return Err(PlanError::MissingParameter(missing));
        }
        let bound = parameter_pattern().replace_all(&self.query_string, |c: &regex::Captures| {
            match bindings.get(&c[1]) {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => c[0].to_string(),
            }
        });
        Ok(Self::of(bound.into_owned()))
    }
}

impl std::fmt::Display for QueryString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.query_string)
    }
}

impl Serialize for QueryString {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("QueryString", 2)?;
        s.serialize_field("type", QUERY_STRING_TYPE)?;
        s.serialize_field("query_string", &self.query_string)?;
        s.end()
    }
}

/// Older clients send the query as a bare string.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawQueryString {
    Plain(String),
    Object {
        #[serde(rename = "type", default)]
        kind: Option<String>,
        #[serde(default)]
        query_string: String,
    },
}

impl TryFrom<RawQueryString> for QueryString {
    type Error = PlanError;

    fn try_from(raw: RawQueryString) -> Result<Self> {
        match raw {
            RawQueryString::Plain(text) => Ok(Self::of(text)),
            RawQueryString::Object { kind, query_string } => match kind.as_deref() {
                None | Some(QUERY_STRING_TYPE) => Ok(Self::of(query_string)),
                Some(other) => Err(PlanError::unknown("query", other)),
            },
        }
    }
}
