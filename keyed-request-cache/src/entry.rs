use crate::key::RequestKey;
use crate::transport::{ApiResponse, TransportError};
use chrono::{DateTime, Utc};
use getset::{CopyGetters, Getters};
use serde::Serialize;
use strum_macros::Display;

#[cfg(feature = "graphql")]
use async_graphql::Enum;

/// Lifecycle of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[cfg_attr(feature = "graphql", derive(Enum))]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum EntryState {
    Idle,
    InFlight,
    Resolved,
    Failed,
}

/// Point-in-time view of one cache entry, handed to callers and subscribers.
///
/// `result` keeps the last successful response even after a later failure.
/// `generation` identifies the flight that produced this view; snapshots delivered
/// to subscribers with a lower generation than one already seen are outdated.
#[derive(Debug, Clone, PartialEq, Serialize, Getters, CopyGetters)]
pub struct CacheEntry {
    #[getset(get = "pub")]
    pub(crate) key: RequestKey,
    #[getset(get_copy = "pub")]
    pub(crate) state: EntryState,
    #[getset(get = "pub")]
    pub(crate) result: Option<ApiResponse>,
    #[getset(get = "pub")]
    pub(crate) error: Option<TransportError>,
    #[getset(get_copy = "pub")]
    pub(crate) generation: u64,
    #[getset(get_copy = "pub")]
    pub(crate) subscriber_count: usize,
    #[getset(get_copy = "pub")]
    pub(crate) updated_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    pub fn is_loading(&self) -> bool {
        self.state == EntryState::InFlight
    }

    pub fn is_settled(&self) -> bool {
        matches!(self.state, EntryState::Resolved | EntryState::Failed)
    }

    /// Resolved with a response envelope reporting success.
    pub fn is_successful(&self) -> bool {
        self.state == EntryState::Resolved
            && self.result.as_ref().is_some_and(ApiResponse::is_success)
    }

    /// Payload of the last successful response.
    pub fn data(&self) -> Option<&serde_json::Value> {
        self.result.as_ref().and_then(|r| r.data.as_ref())
    }
}
