//! Remote service trait definition

use async_trait::async_trait;

use crate::domain::document::DocumentList;
use crate::domain::post::{LikeAction, NewPost, Post, PostId, SavedPost, UpdatePost};
use crate::domain::query::PageToken;
use crate::domain::user::{NewUser, Session, SignInCredentials, UpdateUser, User, UserId};
use crate::domain::DomainError;

#[cfg(test)]
use mockall::automock;

/// Typed boundary to the hosted backend (accounts, documents, storage)
///
/// Each operation is one request/response exchange from the caller's point
/// of view. Implementations never retry, batch or cache; failures are
/// returned as-is.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Creates an account and its profile document
    async fn create_user_account(&self, user: NewUser) -> Result<User, DomainError>;

    /// Opens an email/password session
    async fn sign_in(&self, credentials: SignInCredentials) -> Result<Session, DomainError>;

    /// Closes the current session
    async fn sign_out(&self) -> Result<(), DomainError>;

    /// Profile of the signed-in account
    async fn get_current_user(&self) -> Result<User, DomainError>;

    async fn create_post(&self, post: NewPost) -> Result<Post, DomainError>;

    async fn update_post(&self, post: UpdatePost) -> Result<Post, DomainError>;

    /// Deletes a post and its image
    async fn delete_post(
        &self,
        post_id: &PostId,
        image_id: Option<String>,
    ) -> Result<(), DomainError>;

    /// Newest posts by creation time
    async fn get_recent_posts(&self) -> Result<DocumentList<Post>, DomainError>;

    async fn get_post_by_id(&self, post_id: &PostId) -> Result<Post, DomainError>;

    /// Adds or removes `user_id` in the post's likes
    async fn like_post(
        &self,
        post_id: &PostId,
        user_id: &UserId,
        action: LikeAction,
    ) -> Result<Post, DomainError>;

    async fn save_post(&self, post_id: &PostId, user_id: &UserId)
    -> Result<SavedPost, DomainError>;

    async fn delete_saved_post(&self, saved_record_id: &str) -> Result<(), DomainError>;

    /// One page of the feed, resuming after `cursor`
    async fn get_infinite_posts(
        &self,
        cursor: Option<PageToken>,
    ) -> Result<DocumentList<Post>, DomainError>;

    /// Full-text search on captions
    async fn search_posts(&self, term: &str) -> Result<DocumentList<Post>, DomainError>;

    async fn get_user_posts(&self, user_id: &UserId) -> Result<DocumentList<Post>, DomainError>;

    async fn get_users(&self, limit: Option<u32>) -> Result<DocumentList<User>, DomainError>;

    async fn get_user_by_id(&self, user_id: &UserId) -> Result<User, DomainError>;

    async fn update_user(&self, user: UpdateUser) -> Result<User, DomainError>;
}
