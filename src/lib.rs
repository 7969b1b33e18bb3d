//! Feedsync
//!
//! Data synchronization layer of a social media client:
//! - A typed remote service boundary for the hosted backend
//! - A keyed query cache with shared inflight loads, prefix invalidation,
//!   stale-while-revalidate and stale-on-error
//! - A mutation executor that invalidates dependent queries
//! - Cursor-driven infinite feeds stored in the same cache

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;
pub use domain::DomainError;
pub use infrastructure::query::{InfiniteQuery, MutationExecutor, QueryCache, QueryCacheConfig};
pub use infrastructure::services::SocialClient;
