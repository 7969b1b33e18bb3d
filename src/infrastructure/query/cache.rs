//! Keyed query cache with shared inflight loads
//!
//! Values of any type are stored type-erased under a [`QueryKey`] and handed
//! back as `Arc<T>`. Loads run on spawned tasks so that a caller dropping
//! its future never cancels a load other callers (or the cache) still need.

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Instant;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

use super::config::QueryCacheConfig;
use super::lock::mutex_lock;
use super::subscription::Subscription;
use crate::domain::query::{
    InvalidationTarget, QueryEvent, QueryEventKind, QueryKey, QueryState, QueryStatus,
};
use crate::domain::DomainError;

const SOURCE: &str = "query::cache";

type AnyValue = Arc<dyn Any + Send + Sync>;
type LoadResult = Result<AnyValue, DomainError>;
type SharedLoad = Shared<BoxFuture<'static, LoadResult>>;
type Listener = Arc<dyn Fn(&QueryEvent) + Send + Sync>;

struct CacheEntry {
    value: AnyValue,
    updated_at: Instant,
    last_accessed: Instant,
    stale: bool,
    /// Error of the last failed refresh; the value above is kept
    error: Option<DomainError>,
}

struct Inflight {
    id: u64,
    load: SharedLoad,
    abort: AbortHandle,
    /// Invalidated while loading: the result is stored stale and new
    /// fetches start their own load instead of joining this one
    invalidated: bool,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<QueryKey, CacheEntry>,
    /// Errors of first loads, which never create an entry
    failures: HashMap<QueryKey, DomainError>,
    inflight: HashMap<QueryKey, Inflight>,
    /// Loads replaced by a newer load for the same key; still running until
    /// they complete or the cache is torn down
    superseded: Vec<(u64, AbortHandle)>,
    listeners: HashMap<QueryKey, Vec<(u64, Listener)>>,
    next_id: u64,
}

impl CacheState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn is_observed(&self, key: &QueryKey) -> bool {
        self.listeners.get(key).is_some_and(|l| !l.is_empty())
    }

    fn listeners_for(&self, key: &QueryKey) -> Vec<Listener> {
        self.listeners
            .get(key)
            .map(|l| l.iter().map(|(_, listener)| Arc::clone(listener)).collect())
            .unwrap_or_default()
    }
}

enum Lookup {
    Hit(AnyValue),
    Join(SharedLoad),
    Miss,
}

pub(super) struct Inner {
    config: QueryCacheConfig,
    state: Mutex<CacheState>,
    gc_task: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    fn lock(&self, op: &'static str) -> MutexGuard<'_, CacheState> {
        mutex_lock(&self.state, SOURCE, op)
    }

    fn is_fresh(&self, entry: &CacheEntry) -> bool {
        if entry.stale {
            return false;
        }

        self.config
            .stale_time
            .is_none_or(|stale_time| entry.updated_at.elapsed() < stale_time)
    }

    fn lookup(&self, state: &mut CacheState, key: &QueryKey) -> Lookup {
        let fresh = state.entries.get(key).is_some_and(|e| self.is_fresh(e));

        if fresh {
            if let Some(entry) = state.entries.get_mut(key) {
                entry.last_accessed = Instant::now();
                return Lookup::Hit(Arc::clone(&entry.value));
            }
        }

        match state.inflight.get(key) {
            Some(inflight) if !inflight.invalidated => Lookup::Join(inflight.load.clone()),
            _ => Lookup::Miss,
        }
    }

    fn complete_load(&self, key: &QueryKey, id: u64, result: &LoadResult) {
        let (listeners, event) = {
            let mut state = self.lock("complete_load");

            if state.inflight.get(key).map(|i| i.id) != Some(id) {
                state.superseded.retain(|(superseded, _)| *superseded != id);
                debug!(key = %key, "Discarding result of superseded load");
                return;
            }

            let Some(inflight) = state.inflight.remove(key) else {
                return;
            };

            let kind = match result {
                Ok(value) => {
                    let now = Instant::now();
                    state.failures.remove(key);
                    state.entries.insert(
                        key.clone(),
                        CacheEntry {
                            value: Arc::clone(value),
                            updated_at: now,
                            last_accessed: now,
                            stale: inflight.invalidated,
                            error: None,
                        },
                    );
                    debug!(key = %key, stale = inflight.invalidated, "Stored query result");
                    QueryEventKind::Updated
                }
                Err(err) => {
                    match state.entries.get_mut(key) {
                        Some(entry) => entry.error = Some(err.clone()),
                        None => {
                            state.failures.insert(key.clone(), err.clone());
                        }
                    }
                    warn!(key = %key, error = %err, "Query load failed");
                    QueryEventKind::Failed(err.clone())
                }
            };

            (state.listeners_for(key), QueryEvent::new(key.clone(), kind))
        };

        notify(&listeners, &event);
    }

    pub(super) fn unsubscribe(&self, key: &QueryKey, id: u64) {
        let mut state = self.lock("unsubscribe");

        let now_unobserved = match state.listeners.get_mut(key) {
            Some(listeners) => {
                listeners.retain(|(listener_id, _)| *listener_id != id);
                listeners.is_empty()
            }
            None => false,
        };

        if now_unobserved {
            state.listeners.remove(key);

            // the garbage collection clock starts when the last observer leaves
            if let Some(entry) = state.entries.get_mut(key) {
                entry.last_accessed = Instant::now();
            }
        }
    }

    fn collect_garbage(&self) -> usize {
        let gc_time = self.config.gc_time;
        let mut state = self.lock("collect_garbage");

        let expired: Vec<QueryKey> = state
            .entries
            .iter()
            .filter(|(key, entry)| {
                !state.is_observed(key)
                    && !state.inflight.contains_key(*key)
                    && entry.last_accessed.elapsed() >= gc_time
            })
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            state.entries.remove(key);
        }

        let CacheState {
            failures,
            listeners,
            inflight,
            ..
        } = &mut *state;
        failures.retain(|key, _| listeners.contains_key(key) || inflight.contains_key(key));

        if !expired.is_empty() {
            debug!(removed = expired.len(), "Garbage collected query entries");
        }

        expired.len()
    }
}

fn notify(listeners: &[Listener], event: &QueryEvent) {
    for listener in listeners {
        listener(event);
    }
}

fn downcast<T: Send + Sync + 'static>(key: &QueryKey, value: AnyValue) -> Result<Arc<T>, DomainError> {
    value
        .downcast::<T>()
        .map_err(|_| DomainError::type_mismatch(key.to_string(), type_name::<T>()))
}

/// Client-side query cache
///
/// Cloning is cheap and every clone shares the same entries, so one
/// instance is created per client and injected into its consumers.
///
/// Guarantees:
/// - at most one inflight load per key; concurrent `fetch` calls share it
/// - fresh entries are served without calling the loader
/// - a failed load keeps the previous value and never creates an entry
/// - subscribers are notified of every change to their key
///
/// Loads are spawned on the ambient tokio runtime.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<Inner>,
}

impl QueryCache {
    /// Creates a new cache with the given configuration
    pub fn new(config: QueryCacheConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(CacheState::default()),
                gc_task: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &QueryCacheConfig {
        &self.inner.config
    }

    /// Returns the cached value for `key`, loading it if missing or stale
    ///
    /// `loader` is only invoked when no fresh value exists and no load for
    /// the key is already in flight.
    pub async fn fetch<T, F, Fut>(&self, key: QueryKey, loader: F) -> Result<Arc<T>, DomainError>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, DomainError>> + Send + 'static,
    {
        let lookup = {
            let mut state = self.inner.lock("fetch");
            self.inner.lookup(&mut state, &key)
        };

        let load = match lookup {
            Lookup::Hit(value) => {
                debug!(key = %key, "Query cache hit");
                return downcast(&key, value);
            }
            Lookup::Join(load) => {
                debug!(key = %key, "Joining inflight load");
                load
            }
            Lookup::Miss => {
                // racing callers may each build a future; only the one that
                // wins the re-check below is spawned
                let future = loader();
                let mut state = self.inner.lock("fetch.start");

                match self.inner.lookup(&mut state, &key) {
                    Lookup::Hit(value) => return downcast(&key, value),
                    Lookup::Join(load) => load,
                    Lookup::Miss => {
                        debug!(key = %key, "Query cache miss, loading");
                        self.start_load(&mut state, &key, future)
                    }
                }
            }
        };

        let value = load.await?;
        downcast(&key, value)
    }

    /// Returns the current state of `key` without waiting
    ///
    /// When the entry is missing or stale and nothing is loading, a
    /// background load is started and the stale value (if any) is returned
    /// with `is_fetching` set.
    pub fn query<T, F, Fut>(&self, key: QueryKey, loader: F) -> QueryState<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, DomainError>> + Send + 'static,
    {
        let needs_load = {
            let mut state = self.inner.lock("query");
            matches!(self.inner.lookup(&mut state, &key), Lookup::Miss)
        };

        if needs_load {
            let future = loader();
            let mut state = self.inner.lock("query.start");

            if matches!(self.inner.lookup(&mut state, &key), Lookup::Miss) {
                debug!(key = %key, "Revalidating query in background");
                let _load = self.start_load(&mut state, &key, future);
            }
        }

        self.peek(&key)
    }

    /// Starts a load for `key` unless one is already in flight
    ///
    /// Unlike [`QueryCache::fetch`] this ignores freshness. Returns `None`
    /// when the key is busy.
    pub(crate) fn try_load<T, F, Fut>(
        &self,
        key: QueryKey,
        loader: F,
    ) -> Option<impl Future<Output = Result<Arc<T>, DomainError>> + Send + 'static>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, DomainError>> + Send + 'static,
    {
        if self.is_fetching(&key) {
            return None;
        }

        let future = loader();
        let load = {
            let mut state = self.inner.lock("try_load");

            if state.inflight.contains_key(&key) {
                return None;
            }

            self.start_load(&mut state, &key, future)
        };

        Some(async move {
            let value = load.await?;
            downcast(&key, value)
        })
    }

    fn start_load<T, Fut>(&self, state: &mut CacheState, key: &QueryKey, future: Fut) -> SharedLoad
    where
        T: Send + Sync + 'static,
        Fut: Future<Output = Result<T, DomainError>> + Send + 'static,
    {
        let id = state.next_id();
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let task_key = key.clone();

        let task = tokio::spawn(async move {
            let result: LoadResult = match AssertUnwindSafe(future).catch_unwind().await {
                Ok(result) => result.map(|value| Arc::new(value) as AnyValue),
                Err(_) => Err(DomainError::internal(format!(
                    "Loader for {} panicked",
                    task_key
                ))),
            };

            if let Some(inner) = weak.upgrade() {
                inner.complete_load(&task_key, id, &result);
            }

            result
        });

        let abort = task.abort_handle();
        let load = async move {
            match task.await {
                Ok(result) => result,
                Err(err) if err.is_cancelled() => {
                    Err(DomainError::cancelled("Query load was cancelled"))
                }
                Err(err) => Err(DomainError::internal(format!("Query load failed: {}", err))),
            }
        }
        .boxed()
        .shared();

        let previous = state.inflight.insert(
            key.clone(),
            Inflight {
                id,
                load: load.clone(),
                abort,
                invalidated: false,
            },
        );

        if let Some(previous) = previous {
            debug!(key = %key, superseded = previous.id, "Superseding invalidated load");
            state.superseded.push((previous.id, previous.abort));
        }

        load
    }

    /// Current state of `key`, never starting a load
    pub fn peek<T: Send + Sync + 'static>(&self, key: &QueryKey) -> QueryState<T> {
        let state = self.inner.lock("peek");
        let is_fetching = state.inflight.contains_key(key);

        let Some(entry) = state.entries.get(key) else {
            let error = state.failures.get(key).cloned();
            let status = if is_fetching {
                QueryStatus::Loading
            } else if error.is_some() {
                QueryStatus::Error
            } else {
                QueryStatus::Idle
            };

            return QueryState {
                data: None,
                status,
                is_fetching,
                is_stale: false,
                error,
            };
        };

        let is_stale = !self.inner.is_fresh(entry);

        match downcast::<T>(key, Arc::clone(&entry.value)) {
            Ok(data) => QueryState {
                data: Some(data),
                status: QueryStatus::Success,
                is_fetching,
                is_stale,
                error: entry.error.clone(),
            },
            Err(err) => QueryState {
                data: None,
                status: QueryStatus::Error,
                is_fetching,
                is_stale,
                error: Some(err),
            },
        }
    }

    /// Cached value for `key`, fresh or stale
    pub fn get_data<T: Send + Sync + 'static>(
        &self,
        key: &QueryKey,
    ) -> Result<Option<Arc<T>>, DomainError> {
        let state = self.inner.lock("get_data");

        state
            .entries
            .get(key)
            .map(|entry| downcast(key, Arc::clone(&entry.value)))
            .transpose()
    }

    /// Stores `value` under `key` as fresh
    pub fn set_data<T: Send + Sync + 'static>(&self, key: QueryKey, value: T) -> Arc<T> {
        let value = Arc::new(value);

        let listeners = {
            let mut state = self.inner.lock("set_data");
            let now = Instant::now();
            state.failures.remove(&key);
            state.entries.insert(
                key.clone(),
                CacheEntry {
                    value: Arc::clone(&value) as AnyValue,
                    updated_at: now,
                    last_accessed: now,
                    stale: false,
                    error: None,
                },
            );
            state.listeners_for(&key)
        };

        notify(&listeners, &QueryEvent::new(key, QueryEventKind::Updated));
        value
    }

    /// Marks every entry matching `target` stale
    ///
    /// Plain keys are matched as prefixes. Returns the number of entries
    /// marked; a target matching nothing is a no-op.
    pub fn invalidate(&self, target: impl Into<InvalidationTarget>) -> usize {
        let target = target.into();

        let notifications: Vec<(Vec<Listener>, QueryEvent)> = {
            let mut state = self.inner.lock("invalidate");
            let mut keys = Vec::new();

            for (key, entry) in state.entries.iter_mut() {
                if target.matches(key) {
                    entry.stale = true;
                    keys.push(key.clone());
                }
            }

            for (key, inflight) in state.inflight.iter_mut() {
                if target.matches(key) {
                    inflight.invalidated = true;
                }
            }

            keys.into_iter()
                .map(|key| {
                    let listeners = state.listeners_for(&key);
                    (listeners, QueryEvent::new(key, QueryEventKind::Invalidated))
                })
                .collect()
        };

        debug!(invalidation = %target, invalidated = notifications.len(), "Invalidated queries");

        for (listeners, event) in &notifications {
            notify(listeners, event);
        }

        notifications.len()
    }

    /// Removes the entry for `key`; an inflight load is left running
    pub fn remove(&self, key: &QueryKey) -> bool {
        let (removed, listeners) = {
            let mut state = self.inner.lock("remove");
            state.failures.remove(key);
            let removed = state.entries.remove(key).is_some();
            (removed, state.listeners_for(key))
        };

        if removed {
            notify(
                &listeners,
                &QueryEvent::new(key.clone(), QueryEventKind::Removed),
            );
        }

        removed
    }

    /// Whether `key` holds a value that is invalidated or past its stale time
    pub fn is_stale(&self, key: &QueryKey) -> bool {
        let state = self.inner.lock("is_stale");
        state
            .entries
            .get(key)
            .is_some_and(|entry| !self.inner.is_fresh(entry))
    }

    pub fn is_fetching(&self, key: &QueryKey) -> bool {
        self.inner.lock("is_fetching").inflight.contains_key(key)
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        self.inner.lock("contains").entries.contains_key(key)
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.inner.lock("len").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<QueryKey> {
        self.inner.lock("keys").entries.keys().cloned().collect()
    }

    /// Registers `callback` for changes to `key`
    ///
    /// Callbacks run synchronously on the thread that changed the entry and
    /// must not block. The registration lasts until the returned
    /// [`Subscription`] is dropped.
    pub fn subscribe<F>(&self, key: QueryKey, callback: F) -> Subscription
    where
        F: Fn(&QueryEvent) + Send + Sync + 'static,
    {
        let mut state = self.inner.lock("subscribe");
        let id = state.next_id();
        state
            .listeners
            .entry(key.clone())
            .or_default()
            .push((id, Arc::new(callback)));

        Subscription::new(Arc::downgrade(&self.inner), key, id)
    }

    pub fn subscriber_count(&self, key: &QueryKey) -> usize {
        self.inner
            .lock("subscriber_count")
            .listeners
            .get(key)
            .map_or(0, Vec::len)
    }

    /// Removes unobserved, idle entries older than the configured gc time
    pub fn collect_garbage(&self) -> usize {
        self.inner.collect_garbage()
    }

    /// Starts periodic garbage collection, replacing a running collector
    pub fn start_gc(&self) {
        let weak = Arc::downgrade(&self.inner);
        let period = self.inner.config.gc_interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;

            loop {
                ticker.tick().await;

                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.collect_garbage();
            }
        });

        if let Some(previous) = mutex_lock(&self.inner.gc_task, SOURCE, "start_gc").replace(task) {
            previous.abort();
        }
    }

    /// Releases every entry and cancels inflight loads
    ///
    /// Callers waiting on a cancelled load receive [`DomainError::Cancelled`].
    /// The cache stays usable afterwards.
    pub fn teardown(&self) {
        if let Some(task) = mutex_lock(&self.inner.gc_task, SOURCE, "teardown.gc").take() {
            task.abort();
        }

        let mut state = self.inner.lock("teardown");
        let cancelled = state.inflight.len() + state.superseded.len();

        for (_, inflight) in state.inflight.drain() {
            inflight.abort.abort();
        }
        for (_, abort) in state.superseded.drain(..) {
            abort.abort();
        }

        let entries = state.entries.len();
        state.entries.clear();
        state.failures.clear();
        state.listeners.clear();

        info!(entries, cancelled, "Query cache torn down");
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(QueryCacheConfig::default())
    }
}

impl fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock("debug");
        f.debug_struct("QueryCache")
            .field("config", &self.inner.config)
            .field("entries", &state.entries.len())
            .field("inflight", &state.inflight.len())
            .field("subscribed_keys", &state.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query_key;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counting_loader(
        calls: &Arc<AtomicUsize>,
        value: &'static str,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<String, DomainError>> {
        let calls = Arc::clone(calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(value.to_string()) }.boxed()
        }
    }

    fn slow_loader(
        calls: &Arc<AtomicUsize>,
        value: &'static str,
        delay: Duration,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<String, DomainError>> {
        let calls = Arc::clone(calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                tokio::time::sleep(delay).await;
                Ok(value.to_string())
            }
            .boxed()
        }
    }

    fn failing_loader(
        calls: &Arc<AtomicUsize>,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<String, DomainError>> {
        let calls = Arc::clone(calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(DomainError::remote(500, "boom")) }.boxed()
        }
    }

    #[tokio::test]
    async fn test_fetch_caches_value() {
        let cache = QueryCache::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = query_key!["posts", "recent"];

        let first: Arc<String> = cache.fetch(key.clone(), counting_loader(&calls, "v1")).await.unwrap();
        let second: Arc<String> = cache.fetch(key.clone(), counting_loader(&calls, "v2")).await.unwrap();

        assert_eq!(*first, "v1");
        assert_eq!(*second, "v1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.contains(&key));
    }

    #[tokio::test]
    async fn test_concurrent_fetches_share_one_load() {
        let cache = QueryCache::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = query_key!["posts", "byId", "42"];
        let delay = Duration::from_millis(50);

        let (a, b) = tokio::join!(
            cache.fetch::<String, _, _>(key.clone(), slow_loader(&calls, "a", delay)),
            cache.fetch::<String, _, _>(key.clone(), slow_loader(&calls, "b", delay)),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*a.unwrap(), "a");
        assert_eq!(*b.unwrap(), "a");
        assert!(!cache.is_fetching(&key));
    }

    #[tokio::test]
    async fn test_invalidate_forces_reload() {
        let cache = QueryCache::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = query_key!["user", "current"];

        cache.fetch::<String, _, _>(key.clone(), counting_loader(&calls, "v1")).await.unwrap();
        assert_eq!(cache.invalidate(key.clone()), 1);
        assert!(cache.peek::<String>(&key).is_stale);

        let value = cache.fetch::<String, _, _>(key.clone(), counting_loader(&calls, "v2")).await.unwrap();
        assert_eq!(*value, "v2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!cache.peek::<String>(&key).is_stale);
    }

    #[tokio::test]
    async fn test_invalidate_missing_key_is_noop() {
        let cache = QueryCache::default();
        assert_eq!(cache.invalidate(query_key!["posts", "byId", "404"]), 0);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_prefix_invalidation() {
        let cache = QueryCache::default();
        let recent = query_key!["posts", "recent"];
        let by_id = query_key!["posts", "byId", "42"];
        let user = query_key!["user", "current"];

        cache.set_data(recent.clone(), 1u32);
        cache.set_data(by_id.clone(), 2u32);
        cache.set_data(user.clone(), 3u32);

        assert_eq!(cache.invalidate(query_key!["posts"]), 2);
        assert!(cache.peek::<u32>(&recent).is_stale);
        assert!(cache.peek::<u32>(&by_id).is_stale);
        assert!(!cache.peek::<u32>(&user).is_stale);
    }

    #[tokio::test]
    async fn test_exact_invalidation_skips_longer_keys() {
        let cache = QueryCache::default();
        let list = query_key!["posts"];
        let detail = query_key!["posts", "byId", "42"];
        cache.set_data(list.clone(), 1u32);
        cache.set_data(detail.clone(), 2u32);

        assert_eq!(cache.invalidate(InvalidationTarget::Exact(list.clone())), 1);
        assert!(cache.peek::<u32>(&list).is_stale);
        assert!(!cache.peek::<u32>(&detail).is_stale);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_value() {
        let cache = QueryCache::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = query_key!["posts", "recent"];

        cache.set_data(key.clone(), "old".to_string());
        cache.invalidate(key.clone());

        let result = cache.fetch::<String, _, _>(key.clone(), failing_loader(&calls)).await;
        assert_eq!(result.unwrap_err(), DomainError::remote(500, "boom"));

        let state = cache.peek::<String>(&key);
        assert_eq!(state.data.as_deref().map(String::as_str), Some("old"));
        assert!(state.is_stale);
        assert_eq!(state.error, Some(DomainError::remote(500, "boom")));
    }

    #[tokio::test]
    async fn test_failed_first_load_creates_no_entry() {
        let cache = QueryCache::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = query_key!["posts", "byId", "42"];

        assert!(cache.fetch::<String, _, _>(key.clone(), failing_loader(&calls)).await.is_err());
        assert!(!cache.contains(&key));
        assert!(cache.is_empty());

        let state = cache.peek::<String>(&key);
        assert_eq!(state.status, QueryStatus::Error);
        assert!(state.data.is_none());
    }

    #[tokio::test]
    async fn test_failed_load_releases_inflight_slot() {
        let cache = QueryCache::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = query_key!["posts", "recent"];

        assert!(cache.fetch::<String, _, _>(key.clone(), failing_loader(&calls)).await.is_err());
        assert!(!cache.is_fetching(&key));

        let value = cache.fetch::<String, _, _>(key.clone(), counting_loader(&calls, "ok")).await.unwrap();
        assert_eq!(*value, "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.peek::<String>(&key).status, QueryStatus::Success);
    }

    #[tokio::test]
    async fn test_panicking_loader_releases_inflight_slot() {
        let cache = QueryCache::default();
        let key = query_key!["posts", "recent"];

        fn explode() -> Result<String, DomainError> {
            panic!("loader bug")
        }

        let result = cache
            .fetch::<String, _, _>(key.clone(), || async { explode() })
            .await;

        assert!(matches!(result, Err(DomainError::Internal { .. })));
        assert!(!cache.is_fetching(&key));
    }

    #[tokio::test]
    async fn test_detached_consumer_still_caches_result() {
        let cache = QueryCache::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = query_key!["posts", "infinite"];

        let detached = tokio::time::timeout(
            Duration::from_millis(5),
            cache.fetch::<String, _, _>(key.clone(), slow_loader(&calls, "late", Duration::from_millis(40))),
        )
        .await;
        assert!(detached.is_err());
        assert!(cache.is_fetching(&key));

        tokio::time::sleep(Duration::from_millis(100)).await;

        let cached = cache.get_data::<String>(&key).unwrap();
        assert_eq!(cached.as_deref().map(String::as_str), Some("late"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_query_serves_stale_while_revalidating() {
        let cache = QueryCache::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = query_key!["posts", "recent"];

        cache.set_data(key.clone(), "old".to_string());
        cache.invalidate(key.clone());

        let state = cache.query::<String, _, _>(
            key.clone(),
            slow_loader(&calls, "new", Duration::from_millis(20)),
        );
        assert_eq!(state.data.as_deref().map(String::as_str), Some("old"));
        assert!(state.is_stale);
        assert!(state.is_fetching);

        // joins the background load instead of starting another
        let value = cache.fetch::<String, _, _>(key.clone(), counting_loader(&calls, "other")).await.unwrap();
        assert_eq!(*value, "new");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_query_on_fresh_entry_does_not_load() {
        let cache = QueryCache::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = query_key!["user", "current"];
        cache.set_data(key.clone(), "ada".to_string());

        let state = cache.query::<String, _, _>(key.clone(), counting_loader(&calls, "x"));
        assert!(state.is_success());
        assert!(!state.is_fetching);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalidation_during_load_lands_stale() {
        let cache = QueryCache::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = query_key!["posts", "recent"];

        cache.query::<String, _, _>(
            key.clone(),
            slow_loader(&calls, "v1", Duration::from_millis(20)),
        );
        cache.invalidate(key.clone());

        tokio::time::sleep(Duration::from_millis(50)).await;

        let state = cache.peek::<String>(&key);
        assert_eq!(state.data.as_deref().map(String::as_str), Some("v1"));
        assert!(state.is_stale);
        assert!(!state.is_fetching);
    }

    #[tokio::test]
    async fn test_invalidated_load_is_not_joined() {
        let cache = QueryCache::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = query_key!["posts", "byId", "42"];

        let pending = cache.query::<String, _, _>(
            key.clone(),
            slow_loader(&calls, "before-like", Duration::from_millis(20)),
        );
        assert!(pending.is_fetching);

        cache.invalidate(key.clone());

        // the invalidated load is not joined
        let value = cache.fetch::<String, _, _>(key.clone(), counting_loader(&calls, "after-like")).await.unwrap();
        assert_eq!(*value, "after-like");
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let cached = cache.get_data::<String>(&key).unwrap();
        assert_eq!(cached.as_deref().map(String::as_str), Some("after-like"));
    }

    #[tokio::test]
    async fn test_stale_time_expires_entries() {
        let cache = QueryCache::new(
            QueryCacheConfig::default().with_stale_time(Duration::from_millis(20)),
        );
        let calls = Arc::new(AtomicUsize::new(0));
        let key = query_key!["posts", "recent"];

        cache.fetch::<String, _, _>(key.clone(), counting_loader(&calls, "v1")).await.unwrap();
        cache.fetch::<String, _, _>(key.clone(), counting_loader(&calls, "v1")).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(cache.peek::<String>(&key).is_stale);

        cache.fetch::<String, _, _>(key.clone(), counting_loader(&calls, "v2")).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_type_mismatch() {
        let cache = QueryCache::default();
        let key = query_key!["user", "current"];
        cache.set_data(key.clone(), 7u32);

        let err = cache.get_data::<String>(&key).unwrap_err();
        assert!(matches!(err, DomainError::TypeMismatch { .. }));
        assert_eq!(cache.peek::<String>(&key).status, QueryStatus::Error);
    }

    #[tokio::test]
    async fn test_subscribers_are_notified_until_dropped() {
        let cache = QueryCache::default();
        let key = query_key!["posts", "byId", "42"];
        let events = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&events);
        let subscription = cache.subscribe(key.clone(), move |event| {
            sink.lock().unwrap().push(event.kind.clone());
        });
        assert_eq!(cache.subscriber_count(&key), 1);

        cache.fetch::<u32, _, _>(key.clone(), || async { Ok(1u32) }).await.unwrap();
        cache.invalidate(key.clone());
        cache.remove(&key);

        drop(subscription);
        assert_eq!(cache.subscriber_count(&key), 0);
        cache.set_data(key.clone(), 2u32);

        assert_eq!(
            *events.lock().unwrap(),
            vec![
                QueryEventKind::Updated,
                QueryEventKind::Invalidated,
                QueryEventKind::Removed,
            ]
        );
    }

    #[tokio::test]
    async fn test_subscribers_see_failures() {
        let cache = QueryCache::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = query_key!["posts", "recent"];
        let events = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&events);
        let _subscription = cache.subscribe(key.clone(), move |event| {
            sink.lock().unwrap().push(event.clone());
        });

        let _ = cache.fetch::<String, _, _>(key.clone(), failing_loader(&calls)).await;

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].key, key);
        assert!(matches!(events[0].kind, QueryEventKind::Failed(_)));
    }

    #[tokio::test]
    async fn test_garbage_collection_keeps_observed_entries() {
        let cache = QueryCache::new(QueryCacheConfig::default().with_gc_time(Duration::ZERO));
        let observed = query_key!["user", "current"];
        let unobserved = query_key!["posts", "recent"];

        let _subscription = cache.subscribe(observed.clone(), |_| {});
        cache.set_data(observed.clone(), 1u32);
        cache.set_data(unobserved.clone(), 2u32);

        assert_eq!(cache.collect_garbage(), 1);
        assert!(cache.contains(&observed));
        assert!(!cache.contains(&unobserved));
    }

    #[tokio::test]
    async fn test_garbage_collection_waits_for_gc_time() {
        let cache = QueryCache::new(QueryCacheConfig::default().with_gc_time(Duration::from_secs(60)));
        let key = query_key!["posts", "recent"];
        cache.set_data(key.clone(), 1u32);

        assert_eq!(cache.collect_garbage(), 0);
        assert!(cache.contains(&key));
    }

    #[tokio::test]
    async fn test_background_gc() {
        let cache = QueryCache::new(
            QueryCacheConfig::default()
                .with_gc_time(Duration::ZERO)
                .with_gc_interval(Duration::from_millis(10)),
        );
        cache.set_data(query_key!["posts", "recent"], 1u32);
        cache.start_gc();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(cache.is_empty());
        cache.teardown();
    }

    #[tokio::test]
    async fn test_teardown_cancels_inflight_loads() {
        let cache = QueryCache::default();
        let key = query_key!["posts", "infinite"];
        cache.set_data(query_key!["user", "current"], 1u32);

        let waiter = {
            let cache = cache.clone();
            let key = key.clone();
            tokio::spawn(async move {
                cache
                    .fetch::<String, _, _>(key, || futures::future::pending())
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(cache.is_fetching(&key));

        cache.teardown();

        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(DomainError::Cancelled { .. })));
        assert!(cache.is_empty());
        assert!(!cache.is_fetching(&key));
    }

    #[tokio::test]
    async fn test_teardown_cancels_superseded_loads() {
        let cache = QueryCache::default();
        let key = query_key!["posts", "byId", "42"];

        let spawn_waiter = |cache: &QueryCache| {
            let cache = cache.clone();
            let key = key.clone();
            tokio::spawn(async move {
                cache
                    .fetch::<String, _, _>(key, || futures::future::pending())
                    .await
            })
        };

        let first = spawn_waiter(&cache);
        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.invalidate(key.clone());

        let second = spawn_waiter(&cache);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(cache.inner.lock("test").superseded.len(), 1);

        cache.teardown();

        let first = tokio::time::timeout(Duration::from_millis(200), first)
            .await
            .expect("superseded waiter should be released")
            .unwrap();
        let second = second.await.unwrap();
        assert!(matches!(first, Err(DomainError::Cancelled { .. })));
        assert!(matches!(second, Err(DomainError::Cancelled { .. })));
        assert!(cache.inner.lock("test").superseded.is_empty());
    }

    #[tokio::test]
    async fn test_completed_superseded_load_is_released() {
        let cache = QueryCache::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = query_key!["posts", "recent"];

        cache.query::<String, _, _>(
            key.clone(),
            slow_loader(&calls, "old", Duration::from_millis(20)),
        );
        cache.invalidate(key.clone());
        cache.query::<String, _, _>(
            key.clone(),
            slow_loader(&calls, "new", Duration::from_millis(40)),
        );

        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(cache.inner.lock("test").superseded.is_empty());
        let cached = cache.get_data::<String>(&key).unwrap();
        assert_eq!(cached.as_deref().map(String::as_str), Some("new"));
    }

    #[tokio::test]
    async fn test_try_load_refuses_when_busy() {
        let cache = QueryCache::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = query_key!["posts", "infinite"];

        let first = cache
            .try_load::<String, _, _>(key.clone(), slow_loader(&calls, "a", Duration::from_millis(20)))
            .expect("idle key should load");
        assert!(cache
            .try_load::<String, _, _>(key.clone(), counting_loader(&calls, "b"))
            .is_none());

        assert_eq!(*first.await.unwrap(), "a");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
