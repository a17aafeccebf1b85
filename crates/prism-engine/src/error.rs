//! # Engine Errors

use prism_core::{BoxError, PlanError, SearchTypeKind};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// No strategy is registered for this search type tag.
    #[error("unsupported search type '{tag}'")]
    UnsupportedSearchType { tag: String },

    /// A strategy was handed a search type of another variant.
    #[error("strategy for '{expected}' received a '{actual}' search type")]
    VariantMismatch {
        expected: SearchTypeKind,
        actual: SearchTypeKind,
    },

    /// Category filters must be expanded before a query is translated.
    #[error("stream category '{0}' was not expanded before translation")]
    UnexpandedCategory(String),

    /// Referenced search filters must be inlined before a query is translated.
    #[error("search filter '{0}' is referenced but was not loaded")]
    UnresolvedSearchFilter(String),

    #[error("backend request failed: {0}")]
    Client(#[source] BoxError),

    #[error("malformed backend response for '{search_type}': {reason}")]
    MalformedResponse { search_type: String, reason: String },
}

pub type Result<T> = std::result::Result<T, EngineError>;
