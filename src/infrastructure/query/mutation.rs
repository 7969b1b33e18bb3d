//! Mutation executor - runs writes and invalidates dependent queries

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn, Instrument};

use super::cache::QueryCache;
use super::lock::mutex_lock;
use crate::domain::query::InvalidationTarget;
use crate::domain::DomainError;

const SOURCE: &str = "query::mutation";

/// Runs remote write operations against a [`QueryCache`]
///
/// On success every invalidation target is applied before the result is
/// returned, so a fetch issued after the mutation completes observes the
/// invalidation. On failure nothing is invalidated. There is no retry,
/// rollback or optimistic local update.
#[derive(Debug, Clone)]
pub struct MutationExecutor {
    cache: QueryCache,
    pending: Arc<Mutex<HashMap<&'static str, usize>>>,
}

impl MutationExecutor {
    pub fn new(cache: QueryCache) -> Self {
        Self {
            cache,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Executes `operation` and, on success, invalidates the targets
    /// computed from its result
    pub async fn execute<T, Fut, I>(
        &self,
        name: &'static str,
        operation: Fut,
        targets: impl FnOnce(&T) -> I,
    ) -> Result<T, DomainError>
    where
        Fut: Future<Output = Result<T, DomainError>>,
        I: IntoIterator<Item = InvalidationTarget>,
    {
        let _pending = PendingGuard::new(&self.pending, name);

        let result = operation
            .instrument(tracing::debug_span!("mutation", mutation = name))
            .await;

        match result {
            Ok(value) => {
                let mut invalidated = 0;

                for target in targets(&value) {
                    invalidated += self.cache.invalidate(target);
                }

                debug!(mutation = name, invalidated, "Mutation succeeded");
                Ok(value)
            }
            Err(err) => {
                warn!(mutation = name, error = %err, "Mutation failed");
                Err(err)
            }
        }
    }

    /// Whether a mutation with this name is currently running
    pub fn is_pending(&self, name: &str) -> bool {
        mutex_lock(&self.pending, SOURCE, "is_pending")
            .get(name)
            .is_some_and(|count| *count > 0)
    }
}

/// Counts a running mutation until dropped, including when the caller
/// abandons the future
struct PendingGuard<'a> {
    pending: &'a Mutex<HashMap<&'static str, usize>>,
    name: &'static str,
}

impl<'a> PendingGuard<'a> {
    fn new(pending: &'a Mutex<HashMap<&'static str, usize>>, name: &'static str) -> Self {
        *mutex_lock(pending, SOURCE, "pending.enter")
            .entry(name)
            .or_insert(0) += 1;

        Self { pending, name }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let mut pending = mutex_lock(self.pending, SOURCE, "pending.exit");

        if let Some(count) = pending.get_mut(self.name) {
            *count = count.saturating_sub(1);

            if *count == 0 {
                pending.remove(self.name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::query::QueryKey;
    use crate::query_key;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn prefix(key: QueryKey) -> InvalidationTarget {
        InvalidationTarget::Prefix(key)
    }

    #[tokio::test]
    async fn test_success_invalidates_targets() {
        let cache = QueryCache::default();
        let executor = MutationExecutor::new(cache.clone());
        let recent = query_key!["posts", "recent"];
        let user = query_key!["user", "current"];
        cache.set_data(recent.clone(), 1u32);
        cache.set_data(user.clone(), 2u32);

        let result = executor
            .execute("create_post", async { Ok::<_, DomainError>("p1") }, |_| {
                vec![prefix(recent.clone())]
            })
            .await
            .unwrap();

        assert_eq!(result, "p1");
        assert!(cache.peek::<u32>(&recent).is_stale);
        assert!(!cache.peek::<u32>(&user).is_stale);
    }

    #[tokio::test]
    async fn test_targets_can_depend_on_result() {
        let cache = QueryCache::default();
        let executor = MutationExecutor::new(cache.clone());
        let detail = query_key!["posts", "byId", "42"];
        cache.set_data(detail.clone(), 1u32);

        executor
            .execute("update_post", async { Ok::<_, DomainError>("42".to_string()) }, |id| {
                vec![prefix(query_key!["posts", "byId", id.as_str()])]
            })
            .await
            .unwrap();

        assert!(cache.peek::<u32>(&detail).is_stale);
    }

    #[tokio::test]
    async fn test_failure_invalidates_nothing() {
        let cache = QueryCache::default();
        let executor = MutationExecutor::new(cache.clone());
        let recent = query_key!["posts", "recent"];
        cache.set_data(recent.clone(), 1u32);
        let target_calls = AtomicUsize::new(0);

        let result = executor
            .execute(
                "create_post",
                async { Err::<(), _>(DomainError::validation("caption too long")) },
                |_| {
                    target_calls.fetch_add(1, Ordering::SeqCst);
                    vec![prefix(recent.clone())]
                },
            )
            .await;

        assert_eq!(result.unwrap_err(), DomainError::validation("caption too long"));
        assert_eq!(target_calls.load(Ordering::SeqCst), 0);
        assert!(!cache.peek::<u32>(&recent).is_stale);
    }

    #[tokio::test]
    async fn test_fetch_after_mutation_reloads() {
        let cache = QueryCache::default();
        let executor = MutationExecutor::new(cache.clone());
        let key = query_key!["posts", "byId", "42"];
        let loads = Arc::new(AtomicUsize::new(0));

        let loader = |loads: Arc<AtomicUsize>| {
            move || async move { Ok::<_, DomainError>(loads.fetch_add(1, Ordering::SeqCst) as u32) }
        };

        cache.fetch(key.clone(), loader(Arc::clone(&loads))).await.unwrap();
        executor
            .execute("like_post", async { Ok::<_, DomainError>(()) }, |_| {
                vec![InvalidationTarget::Exact(key.clone())]
            })
            .await
            .unwrap();

        let value: Arc<u32> = cache.fetch(key.clone(), loader(Arc::clone(&loads))).await.unwrap();
        assert_eq!(*value, 1);
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_pending_indicator() {
        let executor = MutationExecutor::new(QueryCache::default());
        assert!(!executor.is_pending("sign_in"));

        let running = executor.execute(
            "sign_in",
            async {
                tokio::time::sleep(Duration::from_millis(30)).await;
                Ok::<_, DomainError>(())
            },
            |_| Vec::new(),
        );

        let observer = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            executor.is_pending("sign_in")
        };

        let (result, was_pending) = tokio::join!(running, observer);
        assert!(result.is_ok());
        assert!(was_pending);
        assert!(!executor.is_pending("sign_in"));
    }
}
