//! Message-list strategy: raw documents, offset/limit paged.

use super::{mismatch, MessageListResult, ResultMessage, SearchTypeHandler, SearchTypeResult};
use crate::client::RawResponse;
use crate::context::GeneratedQueryContext;
use crate::error::Result;
use crate::fragment::{self, SearchSource, SortClause};
use prism_core::{Direction, Query, SearchType, SearchTypeKind};

pub struct MessageListHandler;

impl SearchTypeHandler for MessageListHandler {
    fn kind(&self) -> SearchTypeKind {
        SearchTypeKind::Messages
    }

    fn build_query_fragment(
        &self,
        _query: &Query,
        search_type: &SearchType,
        context: &GeneratedQueryContext,
    ) -> Result<SearchSource> {
        let SearchType::MessageList(list) = search_type else {
            return Err(mismatch(SearchTypeKind::Messages, search_type));
        };
        let settings = context.settings();
        let mut source = context.search_source();

        if !search_type.streams().is_empty() {
            source
                .query
                .filter(fragment::terms(&settings.streams_field, search_type.streams()));
        }

        source.sort = if list.sort().is_empty() {
            vec![SortClause::new(&settings.timestamp_field, Direction::Desc)]
        } else {
            list.sort()
                .iter()
                .map(|s| SortClause::new(&s.field, s.direction))
                .collect()
        };

        let window = settings.max_result_window;
        let size = if list.offset().saturating_add(list.limit()) > window {
            let clamped = window.saturating_sub(list.offset());
            tracing::warn!(
                "Message list '{}' exceeds the result window of {}, returning {} message(s)",
                search_type.id(),
                window,
                clamped
            );
            clamped
        } else {
            list.limit()
        };
        source.from = Some(list.offset());
        source.size = Some(size);
        Ok(source)
    }

    fn extract_result(
        &self,
        _query: &Query,
        search_type: &SearchType,
        response: &RawResponse,
        _context: &GeneratedQueryContext,
    ) -> Result<SearchTypeResult> {
        if !matches!(search_type, SearchType::MessageList(_)) {
            return Err(mismatch(SearchTypeKind::Messages, search_type));
        }
        let messages = response
            .hits
            .hits
            .iter()
            .map(|hit| ResultMessage {
                id: hit.id.clone(),
                index: hit.index.clone(),
                message: hit.source.clone(),
            })
            .collect();
        Ok(SearchTypeResult::Messages(MessageListResult {
            id: search_type.id().to_string(),
            name: search_type.name().map(str::to_string),
            messages,
            total_results: response.total(),
        }))
    }
}
