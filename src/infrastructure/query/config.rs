//! Query cache configuration

use std::time::Duration;

/// Configuration for the query cache
#[derive(Debug, Clone, PartialEq)]
pub struct QueryCacheConfig {
    /// Entries older than this are refetched on the next access.
    /// `None` keeps entries fresh until they are invalidated.
    pub stale_time: Option<Duration>,
    /// How long an entry without subscribers survives before garbage collection
    pub gc_time: Duration,
    /// Period of the background garbage collection task
    pub gc_interval: Duration,
}

impl Default for QueryCacheConfig {
    fn default() -> Self {
        Self {
            stale_time: None,
            gc_time: Duration::from_secs(300), // 5 minutes
            gc_interval: Duration::from_secs(60),
        }
    }
}

impl QueryCacheConfig {
    /// Sets the stale time
    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = Some(stale_time);
        self
    }

    /// Sets the garbage collection time
    pub fn with_gc_time(mut self, gc_time: Duration) -> Self {
        self.gc_time = gc_time;
        self
    }

    /// Sets the garbage collection interval
    pub fn with_gc_interval(mut self, interval: Duration) -> Self {
        self.gc_interval = interval;
        self
    }
}
