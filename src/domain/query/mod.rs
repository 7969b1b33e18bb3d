//! Query domain - keys, observable state and pagination types used by the
//! client-side query cache

mod key;
pub mod keys;
mod page;
mod state;

pub use key::{InvalidationTarget, KeySegment, QueryKey};
pub use page::{Page, PageToken, PagedResult, Paginated, PaginationState};
pub use state::{QueryEvent, QueryEventKind, QueryState, QueryStatus};
