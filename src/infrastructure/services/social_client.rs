//! Social client - cached queries and invalidating mutations over the
//! remote service

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tracing::info;

use crate::domain::query::keys;
use crate::domain::{
    DocumentList, DomainError, InvalidationTarget, LikeAction, NewPost, NewUser, PageToken,
    PagedResult, PaginationState, Post, PostId, QueryState, RemoteService, SavedPost, Session,
    SignInCredentials, UpdatePost, UpdateUser, User, UserId,
};
use crate::infrastructure::query::{InfiniteQuery, MutationExecutor, QueryCache};

/// The data layer of the social client
///
/// Reads go through the [`QueryCache`] under well-known keys; writes go
/// through the [`MutationExecutor`] and invalidate the keys whose views
/// they affect.
#[derive(Clone)]
pub struct SocialClient {
    remote: Arc<dyn RemoteService>,
    cache: QueryCache,
    mutations: MutationExecutor,
    feed: InfiniteQuery<Post>,
}

impl SocialClient {
    pub fn new(remote: Arc<dyn RemoteService>, cache: QueryCache) -> Self {
        Self {
            remote,
            mutations: MutationExecutor::new(cache.clone()),
            feed: InfiniteQuery::new(cache.clone(), keys::infinite_posts()),
            cache,
        }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn mutations(&self) -> &MutationExecutor {
        &self.mutations
    }

    /// Releases every cached entry and cancels inflight loads
    pub fn teardown(&self) {
        self.cache.teardown();
        info!("Social client torn down");
    }

    // Account

    pub async fn create_user_account(&self, user: NewUser) -> Result<User, DomainError> {
        self.mutations
            .execute(
                "create_user_account",
                self.remote.create_user_account(user),
                |_| Vec::new(),
            )
            .await
    }

    pub async fn sign_in(&self, credentials: SignInCredentials) -> Result<Session, DomainError> {
        self.mutations
            .execute("sign_in", self.remote.sign_in(credentials), |_| Vec::new())
            .await
    }

    pub async fn sign_out(&self) -> Result<(), DomainError> {
        self.mutations
            .execute("sign_out", self.remote.sign_out(), |_| Vec::new())
            .await
    }

    pub async fn get_current_user(&self) -> Result<Arc<User>, DomainError> {
        let remote = Arc::clone(&self.remote);
        self.cache
            .fetch(keys::current_user(), move || async move {
                remote.get_current_user().await
            })
            .await
    }

    // Posts

    pub async fn create_post(&self, post: NewPost) -> Result<Post, DomainError> {
        self.mutations
            .execute("create_post", self.remote.create_post(post), |_| {
                vec![keys::recent_posts().into()]
            })
            .await
    }

    pub async fn get_recent_posts(&self) -> Result<Arc<DocumentList<Post>>, DomainError> {
        let remote = Arc::clone(&self.remote);
        self.cache
            .fetch(keys::recent_posts(), move || async move {
                remote.get_recent_posts().await
            })
            .await
    }

    /// Stale-while-revalidate view of the recent posts
    pub fn recent_posts_state(&self) -> QueryState<DocumentList<Post>> {
        let remote = Arc::clone(&self.remote);
        self.cache.query(keys::recent_posts(), move || async move {
            remote.get_recent_posts().await
        })
    }

    pub async fn like_post(
        &self,
        post_id: &str,
        user_id: &str,
        action: LikeAction,
    ) -> Result<Post, DomainError> {
        let post_id = PostId::new(post_id)?;
        let user_id = UserId::new(user_id)?;

        self.mutations
            .execute(
                "like_post",
                self.remote.like_post(&post_id, &user_id, action),
                |post: &Post| {
                    vec![
                        keys::post_by_id(post.id.as_str()).into(),
                        keys::recent_posts().into(),
                        keys::posts().into(),
                        keys::current_user().into(),
                    ]
                },
            )
            .await
    }

    pub async fn save_post(&self, post_id: &str, user_id: &str) -> Result<SavedPost, DomainError> {
        let post_id = PostId::new(post_id)?;
        let user_id = UserId::new(user_id)?;

        self.mutations
            .execute(
                "save_post",
                self.remote.save_post(&post_id, &user_id),
                |_| saved_post_targets(),
            )
            .await
    }

    pub async fn delete_saved_post(&self, saved_record_id: &str) -> Result<(), DomainError> {
        self.mutations
            .execute(
                "delete_saved_post",
                self.remote.delete_saved_post(saved_record_id),
                |_| saved_post_targets(),
            )
            .await
    }

    pub async fn get_post_by_id(&self, post_id: &str) -> Result<Arc<Post>, DomainError> {
        if post_id.is_empty() {
            return Err(DomainError::not_found("No post ID given"));
        }

        let post_id = PostId::new(post_id)?;
        let key = keys::post_by_id(post_id.as_str());
        let remote = Arc::clone(&self.remote);

        self.cache
            .fetch(key, move || async move { remote.get_post_by_id(&post_id).await })
            .await
    }

    pub async fn update_post(&self, post: UpdatePost) -> Result<Post, DomainError> {
        self.mutations
            .execute("update_post", self.remote.update_post(post), |post: &Post| {
                vec![keys::post_by_id(post.id.as_str()).into()]
            })
            .await
    }

    pub async fn delete_post(
        &self,
        post_id: &str,
        image_id: Option<String>,
    ) -> Result<(), DomainError> {
        let post_id = PostId::new(post_id)?;

        self.mutations
            .execute(
                "delete_post",
                self.remote.delete_post(&post_id, image_id),
                |_| vec![keys::recent_posts().into()],
            )
            .await
    }

    /// First page of the feed, or every loaded page when refetching
    pub async fn get_posts(&self) -> Result<Arc<PagedResult<Post>>, DomainError> {
        self.feed.fetch(self.feed_loader()).await
    }

    /// Appends the next feed page; a no-op once the feed has ended
    pub async fn fetch_next_posts(&self) -> Result<Arc<PagedResult<Post>>, DomainError> {
        self.feed.fetch_next_page(self.feed_loader()).await
    }

    pub fn feed_state(&self) -> PaginationState {
        self.feed.state()
    }

    pub fn has_more_posts(&self) -> bool {
        self.feed.has_next_page()
    }

    fn feed_loader(
        &self,
    ) -> impl Fn(Option<PageToken>) -> BoxFuture<'static, Result<Vec<Post>, DomainError>>
    + Send
    + Sync
    + 'static {
        let remote = Arc::clone(&self.remote);

        move |token| {
            let remote = Arc::clone(&remote);
            async move {
                remote
                    .get_infinite_posts(token)
                    .await
                    .map(|list| list.documents)
            }
            .boxed()
        }
    }

    pub async fn search_posts(&self, term: &str) -> Result<Arc<DocumentList<Post>>, DomainError> {
        if term.is_empty() {
            return Err(DomainError::not_found("No search term given"));
        }

        let remote = Arc::clone(&self.remote);
        let term = term.to_string();

        self.cache
            .fetch(keys::search_posts(&term), move || async move {
                remote.search_posts(&term).await
            })
            .await
    }

    // Profiles

    pub async fn get_user_posts(&self, user_id: &str) -> Result<Arc<DocumentList<Post>>, DomainError> {
        if user_id.is_empty() {
            return Err(DomainError::not_found("No user ID given"));
        }

        let user_id = UserId::new(user_id)?;
        let key = keys::user_posts(user_id.as_str());
        let remote = Arc::clone(&self.remote);

        self.cache
            .fetch(key, move || async move { remote.get_user_posts(&user_id).await })
            .await
    }

    pub async fn get_users(&self, limit: Option<u32>) -> Result<Arc<DocumentList<User>>, DomainError> {
        let key = match limit {
            Some(limit) => keys::users().with(limit),
            None => keys::users(),
        };
        let remote = Arc::clone(&self.remote);

        self.cache
            .fetch(key, move || async move { remote.get_users(limit).await })
            .await
    }

    pub async fn get_user_by_id(&self, user_id: &str) -> Result<Arc<User>, DomainError> {
        if user_id.is_empty() {
            return Err(DomainError::not_found("No user ID given"));
        }

        let user_id = UserId::new(user_id)?;
        let key = keys::user_by_id(user_id.as_str());
        let remote = Arc::clone(&self.remote);

        self.cache
            .fetch(key, move || async move { remote.get_user_by_id(&user_id).await })
            .await
    }

    pub async fn update_user(&self, user: UpdateUser) -> Result<User, DomainError> {
        self.mutations
            .execute("update_user", self.remote.update_user(user), |user: &User| {
                vec![
                    keys::current_user().into(),
                    keys::user_by_id(user.id.as_str()).into(),
                ]
            })
            .await
    }
}

fn saved_post_targets() -> Vec<InvalidationTarget> {
    vec![
        keys::recent_posts().into(),
        keys::posts().into(),
        keys::current_user().into(),
    ]
}

impl std::fmt::Debug for SocialClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocialClient")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}
