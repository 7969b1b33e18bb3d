//! Post entity and related types

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::document::{document_id, DocumentRef};
use crate::domain::query::{PageToken, Paginated};
use crate::domain::user::UserId;

document_id!(
    /// Post document identifier
    PostId
);

/// A post stored in the posts collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    #[serde(rename = "$id")]
    pub id: PostId,
    #[serde(rename = "$createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(rename = "$updatedAt", default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<DocumentRef>,
    #[serde(default)]
    pub caption: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub likes: Vec<DocumentRef>,
}

impl Post {
    pub fn like_count(&self) -> usize {
        self.likes.len()
    }

    pub fn is_liked_by(&self, user_id: &UserId) -> bool {
        self.likes.iter().any(|like| like.id() == user_id.as_str())
    }

    /// User IDs in the likes list after applying `action` for `user_id`
    pub fn likes_after(&self, user_id: &UserId, action: LikeAction) -> Vec<String> {
        let mut likes: Vec<String> = self
            .likes
            .iter()
            .map(|like| like.id().to_string())
            .filter(|id| id != user_id.as_str())
            .collect();

        if action == LikeAction::Add {
            likes.push(user_id.to_string());
        }

        likes
    }
}

impl Paginated for Post {
    fn page_token(&self) -> PageToken {
        PageToken::new(self.id.as_str())
    }
}

/// Whether a like is being added or removed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LikeAction {
    Add,
    Del,
}

impl std::fmt::Display for LikeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Add => write!(f, "add"),
            Self::Del => write!(f, "del"),
        }
    }
}

/// Image attached to a new or updated post
#[derive(Clone)]
pub struct MediaFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl MediaFile {
    /// Creates a media file, guessing the content type from the file name
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        let name = name.into();
        let content_type = mime_guess::from_path(&name)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        Self {
            name,
            content_type,
            bytes: bytes.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl std::fmt::Debug for MediaFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaFile")
            .field("name", &self.name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Request to create a post
#[derive(Debug, Clone)]
pub struct NewPost {
    pub creator: UserId,
    pub caption: String,
    pub location: Option<String>,
    pub tags: Vec<String>,
    pub file: Option<MediaFile>,
}

/// Request to update a post
#[derive(Debug, Clone)]
pub struct UpdatePost {
    pub post_id: PostId,
    pub caption: String,
    pub location: Option<String>,
    pub tags: Vec<String>,
    /// Current image, kept unless `file` replaces it
    pub image_id: Option<String>,
    pub image_url: Option<String>,
    pub file: Option<MediaFile>,
}

/// A save record linking a user to a post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedPost {
    #[serde(rename = "$id")]
    pub id: String,
    pub user: DocumentRef,
    pub post: DocumentRef,
}

/// Splits a comma separated tag input, dropping whitespace and empty tags
pub fn parse_tags(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(|tag| tag.chars().filter(|c| !c.is_whitespace()).collect::<String>())
        .filter(|tag| !tag.is_empty())
        .collect()
}
