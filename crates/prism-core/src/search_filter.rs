//! Saved or inline search filters attached to a query.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UsedSearchFilter {
    /// A filter whose query text is stored on the query itself.
    InlineQueryString {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        query_string: String,
        #[serde(default)]
        negation: bool,
        #[serde(default)]
        disabled: bool,
    },
    /// A pointer to a filter stored elsewhere, loaded before execution.
    Referenced {
        id: String,
        #[serde(default)]
        negation: bool,
        #[serde(default)]
        disabled: bool,
    },
}

impl UsedSearchFilter {
    pub fn inline(query_string: impl Into<String>) -> Self {
        Self::InlineQueryString {
            title: None,
            description: None,
            query_string: query_string.into(),
            negation: false,
            disabled: false,
        }
    }

    pub fn referenced(id: impl Into<String>) -> Self {
        Self::Referenced {
            id: id.into(),
            negation: false,
            disabled: false,
        }
    }

    pub fn is_referenced(&self) -> bool {
        matches!(self, Self::Referenced { .. })
    }

    pub fn is_disabled(&self) -> bool {
        match self {
            Self::InlineQueryString { disabled, .. } | Self::Referenced { disabled, .. } => *disabled,
        }
    }

    pub fn is_negated(&self) -> bool {
        match self {
            Self::InlineQueryString { negation, .. } | Self::Referenced { negation, .. } => *negation,
        }
    }

    /// Inline text of an enabled filter, `None` for disabled or referenced
    /// filters.
    pub fn inline_query(&self) -> Option<&str> {
        match self {
            Self::InlineQueryString {
                query_string,
                disabled: false,
                ..
            } => Some(query_string),
            _ => None,
        }
    }
}
