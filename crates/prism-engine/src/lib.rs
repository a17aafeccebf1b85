//! # prism-engine — Backend Translation for PRISM
//!
//! Turns effective [`prism_core::Query`] values into backend requests and
//! backend responses into typed results.
//!
//! - [`context::GeneratedQueryContext`] translates the query-level parts once.
//! - [`strategies`] holds one handler per search type, dispatched through
//!   [`strategies::registry::StrategyRegistry`].
//! - [`executor::SearchExecutor`] plans a job and submits it through a
//!   [`client::BackendClient`].

pub mod client;
pub mod context;
pub mod error;
pub mod executor;
pub mod fragment;
pub mod settings;
pub mod strategies;

pub use client::{BackendClient, RawResponse, SearchRequest};
pub use context::GeneratedQueryContext;
pub use error::{EngineError, Result};
pub use executor::{PlannedQuery, QueryResult, SearchExecutor, SearchJobResult, SearchPlanner};
pub use fragment::{BoolQuery, SearchSource, SortClause};
pub use settings::BackendSettings;
pub use strategies::registry::StrategyRegistry;
pub use strategies::{SearchTypeHandler, SearchTypeResult};
