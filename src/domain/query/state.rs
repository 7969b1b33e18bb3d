//! Observable state of a query as seen by consumers

use std::sync::Arc;

use super::QueryKey;
use crate::domain::DomainError;

/// Lifecycle status of a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryStatus {
    /// No data and no load in progress
    #[default]
    Idle,
    /// No data yet, first load in progress
    Loading,
    /// Data available
    Success,
    /// No data, last load failed
    Error,
}

/// Snapshot of a query: the value or error plus loading indicators
#[derive(Debug)]
pub struct QueryState<T> {
    pub data: Option<Arc<T>>,
    pub status: QueryStatus,
    /// A load for this key is in flight (first load or refresh)
    pub is_fetching: bool,
    /// The data was invalidated or has outlived the stale time
    pub is_stale: bool,
    /// Error of the most recent failed load, cleared on success
    pub error: Option<DomainError>,
}

impl<T> QueryState<T> {
    pub fn idle() -> Self {
        Self {
            data: None,
            status: QueryStatus::Idle,
            is_fetching: false,
            is_stale: false,
            error: None,
        }
    }

    /// Pending state: no data to show yet
    pub fn is_pending(&self) -> bool {
        self.data.is_none() && matches!(self.status, QueryStatus::Idle | QueryStatus::Loading)
    }

    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

impl<T> Clone for QueryState<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            status: self.status,
            is_fetching: self.is_fetching,
            is_stale: self.is_stale,
            error: self.error.clone(),
        }
    }
}

impl<T> Default for QueryState<T> {
    fn default() -> Self {
        Self::idle()
    }
}

/// What happened to a cache entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryEventKind {
    /// A new value was stored
    Updated,
    /// The entry was marked stale
    Invalidated,
    /// A load failed; any previous value is kept
    Failed(DomainError),
    /// The entry was removed from the cache
    Removed,
}

/// Notification delivered to key subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryEvent {
    pub key: QueryKey,
    pub kind: QueryEventKind,
}

impl QueryEvent {
    pub fn new(key: QueryKey, kind: QueryEventKind) -> Self {
        Self { key, kind }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_is_pending() {
        let state: QueryState<String> = QueryState::idle();
        assert!(state.is_pending());
        assert!(!state.is_success());
        assert!(!state.is_error());
    }

    #[test]
    fn test_stale_data_is_not_pending() {
        let state = QueryState {
            data: Some(Arc::new(1u32)),
            status: QueryStatus::Success,
            is_fetching: true,
            is_stale: true,
            error: None,
        };
        assert!(!state.is_pending());
        assert!(state.is_success());
    }
}
