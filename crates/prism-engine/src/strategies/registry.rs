//! # Strategy Registry
//!
//! Maps each [`SearchTypeKind`] to its [`SearchTypeHandler`]. Populated once
//! at start-up and read-only afterwards; a missing entry is the
//! "unsupported search type" error path.

use super::events::EventListHandler;
use super::messages::MessageListHandler;
use super::pivot::PivotHandler;
use super::{SearchTypeHandler, SearchTypeResult};
use crate::client::RawResponse;
use crate::context::GeneratedQueryContext;
use crate::error::{EngineError, Result};
use crate::fragment::SearchSource;
use prism_core::{Query, SearchType, SearchTypeKind};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct StrategyRegistry {
    handlers: HashMap<SearchTypeKind, Arc<dyn SearchTypeHandler>>,
}

impl StrategyRegistry {
    /// An empty registry; every dispatch fails until handlers are added.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handlers for every built-in search type.
    pub fn with_defaults() -> Self {
        Self::new()
            .register(Arc::new(MessageListHandler))
            .register(Arc::new(EventListHandler))
            .register(Arc::new(PivotHandler))
    }

    /// Bind a handler to the kind it reports, replacing any previous one.
    pub fn register(mut self, handler: Arc<dyn SearchTypeHandler>) -> Self {
        let kind = handler.kind();
        if self.handlers.insert(kind, handler).is_some() {
            tracing::warn!("Replacing handler for search type '{}'", kind);
        }
        self
    }

    pub fn kinds(&self) -> Vec<SearchTypeKind> {
        let mut kinds: Vec<SearchTypeKind> = self.handlers.keys().copied().collect();
        kinds.sort();
        kinds
    }

    pub fn handler(&self, kind: SearchTypeKind) -> Result<&Arc<dyn SearchTypeHandler>> {
        self.handlers
            .get(&kind)
            .ok_or_else(|| EngineError::UnsupportedSearchType {
                tag: kind.as_str().to_string(),
            })
    }

    pub fn build_query_fragment(
        &self,
        query: &Query,
        search_type: &SearchType,
        context: &GeneratedQueryContext,
    ) -> Result<SearchSource> {
        tracing::debug!(
            "Building '{}' fragment for search type '{}'",
            search_type.kind(),
            search_type.id()
        );
        self.handler(search_type.kind())?
            .build_query_fragment(query, search_type, context)
    }

    pub fn extract_result(
        &self,
        query: &Query,
        search_type: &SearchType,
        response: &RawResponse,
        context: &GeneratedQueryContext,
    ) -> Result<SearchTypeResult> {
        self.handler(search_type.kind())?
            .extract_result(query, search_type, response, context)
    }
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::BackendSettings;
    use chrono::Utc;
    use prism_core::{EventList, MessageList};

    /// Claims to serve events but always fails, to prove which handler ran.
    struct FailingEvents;

    impl SearchTypeHandler for FailingEvents {
        fn kind(&self) -> SearchTypeKind {
            SearchTypeKind::Events
        }

        fn build_query_fragment(&self, _: &Query, _: &SearchType, _: &GeneratedQueryContext) -> Result<SearchSource> {
            Err(EngineError::UnexpandedCategory("sentinel".into()))
        }

        fn extract_result(
            &self,
            _: &Query,
            _: &SearchType,
            _: &RawResponse,
            _: &GeneratedQueryContext,
        ) -> Result<SearchTypeResult> {
            Err(EngineError::UnexpandedCategory("sentinel".into()))
        }
    }

    fn context(query: &Query) -> GeneratedQueryContext {
        GeneratedQueryContext::new(query, &BackendSettings::default(), Utc::now()).unwrap()
    }

    #[test]
    fn test_defaults_cover_every_kind() {
        assert_eq!(StrategyRegistry::with_defaults().kinds(), SearchTypeKind::ALL.to_vec());
    }

    #[test]
    fn test_missing_handler_is_unsupported() {
        let registry = StrategyRegistry::new().register(Arc::new(MessageListHandler));
        let query = Query::builder().build().unwrap();
        let events = EventList::builder().build().unwrap();
        let err = registry
            .build_query_fragment(&query, &events, &context(&query))
            .unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedSearchType { tag } if tag == "events"));
    }

    #[test]
    fn test_dispatch_by_kind_and_replacement() {
        let registry = StrategyRegistry::with_defaults().register(Arc::new(FailingEvents));
        let query = Query::builder().build().unwrap();

        let messages = MessageList::builder().build().unwrap();
        assert!(registry.build_query_fragment(&query, &messages, &context(&query)).is_ok());

        let events = EventList::builder().build().unwrap();
        let err = registry
            .build_query_fragment(&query, &events, &context(&query))
            .unwrap_err();
        assert!(matches!(err, EngineError::UnexpandedCategory(s) if s == "sentinel"));
    }
}
