//! Client-side query layer: keyed cache, mutations and infinite listings

mod cache;
mod config;
mod lock;
mod mutation;
mod pagination;
mod subscription;

pub use cache::QueryCache;
pub use config::QueryCacheConfig;
pub use mutation::MutationExecutor;
pub use pagination::InfiniteQuery;
pub use subscription::Subscription;
