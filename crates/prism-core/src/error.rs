//! # Planning Errors
//!
//! Every failure the model layer can report. Nothing here is recovered
//! locally: construction errors surface at `build()`, collaborator errors are
//! handed back to whoever asked for the rewrite.

use thiserror::Error;

/// Error type produced by externally supplied collaborators (category
/// resolvers, permission predicates, backend clients).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum PlanError {
    /// A builder was finalized with a missing or malformed required field.
    #[error("invalid {entity}: {reason}")]
    Validation { entity: &'static str, reason: String },

    /// A `type` discriminator that is not part of the closed variant set.
    #[error("unknown {kind} type '{tag}'")]
    UnknownVariant { kind: &'static str, tag: String },

    #[error("invalid time range: {0}")]
    InvalidTimeRange(String),

    /// A category resolver or permission predicate failed. The filter tree is
    /// left untouched; callers must not treat this as "no streams".
    #[error("{operation} failed: {source}")]
    Collaborator {
        operation: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("query references unbound parameter '{0}'")]
    MissingParameter(String),

    #[error("malformed JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

impl PlanError {
    pub(crate) fn validation(entity: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            entity,
            reason: reason.into(),
        }
    }

    pub(crate) fn unknown(kind: &'static str, tag: impl Into<String>) -> Self {
        Self::UnknownVariant {
            kind,
            tag: tag.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PlanError>;
