//! Document domain
//!
//! Identifiers, lists and relationship references shared by every
//! collection stored in the hosted backend.

mod id;
mod list;

pub(crate) use id::document_id;
pub use id::{unique_document_id, validate_document_id, DocumentIdError};
pub use list::{DocumentList, DocumentRef};
