//! Domain layer - Core entities, query types and the remote service boundary

pub mod document;
pub mod error;
pub mod post;
pub mod query;
pub mod remote;
pub mod user;

pub use document::{DocumentList, DocumentRef};
pub use error::DomainError;
pub use post::{LikeAction, MediaFile, NewPost, Post, PostId, SavedPost, UpdatePost};
pub use query::{
    InvalidationTarget, KeySegment, Page, PageToken, PagedResult, Paginated, PaginationState,
    QueryEvent, QueryEventKind, QueryKey, QueryState, QueryStatus,
};
pub use remote::RemoteService;
pub use user::{NewUser, Session, SignInCredentials, UpdateUser, User, UserId};
