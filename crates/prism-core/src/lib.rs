//! # prism-core — The Model of PRISM
//!
//! Immutable, backend-agnostic search declarations and the pure operations
//! over them.
//!
//! - [`Query`], [`Filter`], [`SearchType`] and [`SeriesSpec`] are built
//!   through validating builders and never change afterwards.
//! - [`expand_categories`] rewrites category filters into the streams a
//!   caller may read.
//! - [`apply_execution_state`] layers request-scoped overrides onto a query.
//!
//! Nothing in this crate performs I/O or holds shared state. Category
//! resolvers and permission predicates are supplied by the caller and run on
//! the calling thread.

pub mod algebra;
pub mod error;
pub mod execution;
pub mod filter;
pub mod merge;
pub mod query;
pub mod query_string;
pub mod search_filter;
pub mod search_type;
pub mod series;
pub mod timerange;

pub use algebra::{expand_categories, permitted_streams, stream_ids_for_permissions_check};
pub use error::{BoxError, PlanError, Result};
pub use execution::{ExecutionState, GlobalOverride, SearchTypeExecutionState};
pub use filter::{Children, Filter, FilterKind};
pub use merge::apply_execution_state;
pub use query::{Query, QueryBuilder};
pub use query_string::QueryString;
pub use search_filter::UsedSearchFilter;
pub use search_type::{
    AttributeFilter, Direction, EventList, Grouping, MessageList, Paging, Pivot, SearchType,
    SearchTypeKind, SortSpec,
};
pub use series::{SeriesBuilder, SeriesFunction, SeriesSpec};
pub use timerange::TimeRange;
