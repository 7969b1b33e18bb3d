//! User entity and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::document::{document_id, DocumentRef};
use crate::domain::post::MediaFile;

document_id!(
    /// User profile document identifier
    UserId
);

/// User profile stored in the users collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "$id")]
    pub id: UserId,
    #[serde(rename = "$createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// ID of the account this profile belongs to
    pub account_id: String,
    pub name: String,
    pub username: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default)]
    pub posts: Vec<DocumentRef>,
    #[serde(default)]
    pub liked: Vec<DocumentRef>,
    #[serde(default, rename = "save")]
    pub saves: Vec<DocumentRef>,
}

impl User {
    /// Whether the user has saved the given post
    pub fn has_saved(&self, post_id: &str) -> bool {
        self.saves
            .iter()
            .any(|save| save.attribute("post") == Some(post_id))
    }
}

/// Account registration request
#[derive(Clone)]
pub struct NewUser {
    pub name: String,
    pub username: String,
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for NewUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewUser")
            .field("name", &self.name)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Profile update request
#[derive(Debug, Clone)]
pub struct UpdateUser {
    pub user_id: UserId,
    pub name: String,
    pub bio: Option<String>,
    /// Current avatar, kept unless `file` replaces it
    pub image_id: Option<String>,
    pub image_url: Option<String>,
    pub file: Option<MediaFile>,
}

/// Email/password sign-in request
#[derive(Clone)]
pub struct SignInCredentials {
    pub email: String,
    pub password: String,
}

impl SignInCredentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for SignInCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignInCredentials")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// An authenticated session issued by the backend
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(rename = "$id")]
    pub id: String,
    /// Account ID the session belongs to
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire: Option<DateTime<Utc>>,
    /// Session secret, only present when the backend issues it to the client
    #[serde(default, skip_serializing)]
    pub secret: Option<String>,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        self.expire.is_some_and(|expire| expire <= Utc::now())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("expire", &self.expire)
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_deserialize() {
        let json = r#"{
            "$id": "u1",
            "$createdAt": "2024-01-05T10:00:00.000+00:00",
            "accountId": "acc-1",
            "name": "Ada Lovelace",
            "username": "ada",
            "email": "ada@example.com",
            "imageUrl": "https://cdn.example.com/ada.png",
            "save": [{"$id": "s1", "post": "p1"}]
        }"#;

        let user: User = serde_json::from_str(json).unwrap();
        assert_eq!(user.id.as_str(), "u1");
        assert_eq!(user.account_id, "acc-1");
        assert!(user.bio.is_none());
        assert!(user.has_saved("p1"));
        assert!(!user.has_saved("p2"));
    }

    #[test]
    fn test_user_id_rejects_empty() {
        assert!(UserId::new("").is_err());
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = SignInCredentials::new("ada@example.com", "hunter22");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("ada@example.com"));
        assert!(!debug.contains("hunter22"));
    }

    #[test]
    fn test_session_expiry() {
        let session = Session {
            id: "s1".to_string(),
            user_id: "acc-1".to_string(),
            expire: Some(Utc::now() - chrono::Duration::minutes(1)),
            secret: None,
        };
        assert!(session.is_expired());
    }
}
