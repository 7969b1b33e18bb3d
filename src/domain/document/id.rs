//! Document identifiers issued by the hosted backend

use thiserror::Error;

use crate::domain::DomainError;

/// Errors that can occur during document ID validation
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DocumentIdError {
    #[error("Document ID cannot be empty")]
    Empty,

    #[error("Document ID exceeds maximum length of {0} characters")]
    TooLong(usize),

    #[error("Document ID must start with a letter or number")]
    InvalidStart,

    #[error("Document ID contains invalid character: '{0}'. Only alphanumeric characters, periods, hyphens, and underscores are allowed")]
    InvalidCharacter(char),
}

impl From<DocumentIdError> for DomainError {
    fn from(err: DocumentIdError) -> Self {
        DomainError::validation(err.to_string())
    }
}

const MAX_DOCUMENT_ID_LENGTH: usize = 36;

/// Validate a document ID
///
/// Rules:
/// - Cannot be empty
/// - Maximum 36 characters
/// - Only alphanumeric characters, periods, hyphens, and underscores
/// - Must start with alphanumeric
pub fn validate_document_id(id: &str) -> Result<(), DocumentIdError> {
    let Some(first) = id.chars().next() else {
        return Err(DocumentIdError::Empty);
    };

    if id.len() > MAX_DOCUMENT_ID_LENGTH {
        return Err(DocumentIdError::TooLong(MAX_DOCUMENT_ID_LENGTH));
    }

    if !first.is_ascii_alphanumeric() {
        return Err(DocumentIdError::InvalidStart);
    }

    if let Some(c) = id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_')))
    {
        return Err(DocumentIdError::InvalidCharacter(c));
    }

    Ok(())
}

/// Generates a fresh document ID (the backend's `ID.unique()`)
pub fn unique_document_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..20].to_string()
}

/// Declares a validated string newtype for a document ID
macro_rules! document_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Create a new ID after validation
            pub fn new(
                id: impl Into<String>,
            ) -> Result<Self, $crate::domain::document::DocumentIdError> {
                let id = id.into();
                $crate::domain::document::validate_document_id(&id)?;
                Ok(Self(id))
            }

            /// Generate a fresh unique ID
            pub fn unique() -> Self {
                Self($crate::domain::document::unique_document_id())
            }

            /// Get the inner string value
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = $crate::domain::document::DocumentIdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

pub(crate) use document_id;
