//! Cursor-driven infinite listings on top of the query cache

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::debug;

use super::cache::QueryCache;
use crate::domain::query::{Page, PageToken, PagedResult, Paginated, PaginationState, QueryKey};
use crate::domain::DomainError;

/// Appendable pages of one listing, stored in the cache as a
/// [`PagedResult`] under a single key
///
/// Because the pages live in the cache they share invalidation,
/// subscriptions and garbage collection with every other query. The loader
/// receives the token of the page to fetch (`None` for the first page) and
/// returns that page's items.
pub struct InfiniteQuery<T> {
    cache: QueryCache,
    key: QueryKey,
    _marker: PhantomData<fn() -> T>,
}

impl<T> InfiniteQuery<T>
where
    T: Paginated + Clone + Send + Sync + 'static,
{
    pub fn new(cache: QueryCache, key: QueryKey) -> Self {
        Self {
            cache,
            key,
            _marker: PhantomData,
        }
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Returns the loaded pages, loading the first page when nothing is
    /// cached
    ///
    /// Fresh pages are returned as they are. Stale pages are refetched from
    /// the first page, as many as were loaded before, stopping early once a
    /// page ends the listing.
    pub async fn fetch<F, Fut>(&self, loader: F) -> Result<Arc<PagedResult<T>>, DomainError>
    where
        F: Fn(Option<PageToken>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<T>, DomainError>> + Send + 'static,
    {
        let page_count = self
            .cache
            .get_data::<PagedResult<T>>(&self.key)?
            .map_or(1, |current| current.page_count().max(1));

        self.cache
            .fetch(self.key.clone(), move || load_pages(loader, page_count))
            .await
    }

    /// Loads the page after the last one and appends it
    ///
    /// Returns the current pages unchanged, without calling `loader`, when
    /// the listing has ended or a load for this key is already in flight.
    /// Stale pages are not extended; the listing is refetched from the first
    /// page instead, as [`InfiniteQuery::fetch`] does.
    pub async fn fetch_next_page<F, Fut>(
        &self,
        loader: F,
    ) -> Result<Arc<PagedResult<T>>, DomainError>
    where
        F: Fn(Option<PageToken>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<T>, DomainError>> + Send + 'static,
    {
        let Some(current) = self.cache.get_data::<PagedResult<T>>(&self.key)? else {
            return self.fetch(loader).await;
        };

        if self.cache.is_stale(&self.key) {
            debug!(key = %self.key, "Pages are stale, refetching from the first page");
            return self.fetch(loader).await;
        }

        let Some(token) = current.next_token() else {
            debug!(key = %self.key, "No further pages");
            return Ok(current);
        };

        let base = Arc::clone(&current);
        let load = self.cache.try_load(self.key.clone(), move || async move {
            let items = loader(Some(token.clone())).await?;
            let mut next = (*base).clone();
            next.push(Page::new(items, Some(token)));
            Ok(next)
        });

        match load {
            Some(load) => load.await,
            None => {
                debug!(key = %self.key, "Page load already in flight");
                Ok(current)
            }
        }
    }

    /// Loaded pages, fresh or stale
    pub fn data(&self) -> Result<Option<Arc<PagedResult<T>>>, DomainError> {
        self.cache.get_data(&self.key)
    }

    pub fn state(&self) -> PaginationState {
        let snapshot = self.cache.peek::<PagedResult<T>>(&self.key);

        if snapshot.is_fetching {
            return PaginationState::Loading;
        }

        match snapshot.data {
            Some(result) => PaginationState::HasPages(result.next_token()),
            None => PaginationState::Empty,
        }
    }

    pub fn has_next_page(&self) -> bool {
        matches!(self.state(), PaginationState::HasPages(Some(_)))
    }
}

async fn load_pages<T, F, Fut>(loader: F, page_count: usize) -> Result<PagedResult<T>, DomainError>
where
    T: Paginated,
    F: Fn(Option<PageToken>) -> Fut,
    Fut: Future<Output = Result<Vec<T>, DomainError>>,
{
    let mut result = PagedResult::new();
    let mut token = None;

    for _ in 0..page_count {
        let items = loader(token.clone()).await?;
        result.push(Page::new(items, token));

        token = result.next_token();
        if token.is_none() {
            break;
        }
    }

    Ok(result)
}

impl<T> Clone for InfiniteQuery<T> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            key: self.key.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for InfiniteQuery<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfiniteQuery").field("key", &self.key).finish()
    }
}
