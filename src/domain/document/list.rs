//! Document collections and relationship references

use serde::{Deserialize, Serialize};

/// A list of documents as returned by the backend's list endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentList<T> {
    /// Total number of documents matching the query (not just this page)
    pub total: u64,
    pub documents: Vec<T>,
}

impl<T> DocumentList<T> {
    pub fn new(documents: Vec<T>) -> Self {
        Self {
            total: documents.len() as u64,
            documents,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }
}

impl<T> Default for DocumentList<T> {
    fn default() -> Self {
        Self {
            total: 0,
            documents: Vec::new(),
        }
    }
}

/// A relationship attribute
///
/// The backend returns related documents either expanded or as a bare ID
/// depending on the query depth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocumentRef {
    Id(String),
    Document {
        #[serde(rename = "$id")]
        id: String,
        #[serde(flatten)]
        attributes: serde_json::Map<String, serde_json::Value>,
    },
}

impl DocumentRef {
    /// The ID of the referenced document
    pub fn id(&self) -> &str {
        match self {
            Self::Id(id) => id,
            Self::Document { id, .. } => id,
        }
    }

    /// A string attribute of an expanded document
    pub fn attribute(&self, name: &str) -> Option<&str> {
        match self {
            Self::Id(_) => None,
            Self::Document { attributes, .. } => attributes.get(name).and_then(|v| v.as_str()),
        }
    }
}

impl From<&str> for DocumentRef {
    fn from(id: &str) -> Self {
        Self::Id(id.to_string())
    }
}
