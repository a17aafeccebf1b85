//! # Backend Settings
//!
//! Field names and limits of the target index layout. Loaded from the
//! `[backend]` table of the configuration file; every key is optional.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendSettings {
    /// Field holding the document timestamp, used for time-range clauses.
    #[serde(default = "default_timestamp_field")]
    pub timestamp_field: String,
    /// Field holding the stream ids a message was routed to.
    #[serde(default = "default_streams_field")]
    pub streams_field: String,
    /// Upper bound on `from + size` for paged message lists.
    #[serde(default = "default_max_result_window")]
    pub max_result_window: u32,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            timestamp_field: default_timestamp_field(),
            streams_field: default_streams_field(),
            max_result_window: default_max_result_window(),
        }
    }
}

fn default_timestamp_field() -> String {
    "timestamp".into()
}
fn default_streams_field() -> String {
    "streams".into()
}
fn default_max_result_window() -> u32 {
    10_000
}
