//! Remote service over the hosted backend's REST API

use std::sync::RwLock;

use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, warn};
use url::form_urlencoded::Serializer;

use super::http_client::HttpClientTrait;
use crate::config::RemoteConfig;
use crate::domain::document::unique_document_id;
use crate::domain::post::MediaFile;
use crate::domain::query::PageToken;
use crate::domain::{
    DocumentList, DomainError, LikeAction, NewPost, NewUser, Post, PostId, RemoteService,
    SavedPost, Session, SignInCredentials, UpdatePost, UpdateUser, User, UserId,
};

const RECENT_POSTS_LIMIT: u32 = 20;
const FEED_PAGE_SIZE: u32 = 9;

/// Query expressions understood by the list endpoints
mod query {
    use serde_json::json;

    fn expr(method: &str, attribute: Option<&str>, values: serde_json::Value) -> String {
        let mut query = json!({ "method": method });
        if let Some(attribute) = attribute {
            query["attribute"] = json!(attribute);
        }
        if !values.is_null() {
            query["values"] = values;
        }
        query.to_string()
    }

    pub fn equal(attribute: &str, value: &str) -> String {
        expr("equal", Some(attribute), json!([value]))
    }

    pub fn search(attribute: &str, term: &str) -> String {
        expr("search", Some(attribute), json!([term]))
    }

    pub fn order_desc(attribute: &str) -> String {
        expr("orderDesc", Some(attribute), serde_json::Value::Null)
    }

    pub fn limit(limit: u32) -> String {
        expr("limit", None, json!([limit]))
    }

    pub fn cursor_after(id: &str) -> String {
        expr("cursorAfter", None, json!([id]))
    }
}

/// Account record returned by the account endpoints
#[derive(Debug, serde::Deserialize)]
struct Account {
    #[serde(rename = "$id")]
    id: String,
}

/// Uploaded file record
#[derive(Debug, serde::Deserialize)]
struct StoredFile {
    #[serde(rename = "$id")]
    id: String,
}

/// [`RemoteService`] backed by the hosted backend's REST API
///
/// Each operation is a single logical call; composite operations (account
/// plus profile creation, upload plus document creation) clean up after
/// themselves when a later step fails. The session secret issued on sign-in
/// is attached to every following request.
#[derive(Debug)]
pub struct HttpRemoteService<C: HttpClientTrait> {
    client: C,
    config: RemoteConfig,
    base_url: String,
    session: RwLock<Option<String>>,
}

impl<C: HttpClientTrait> HttpRemoteService<C> {
    pub fn new(client: C, config: RemoteConfig) -> Self {
        let base_url = config.endpoint.trim_end_matches('/').to_string();

        Self {
            client,
            config,
            base_url,
            session: RwLock::new(None),
        }
    }

    /// Restores a session secret obtained earlier
    pub fn with_session(self, secret: impl Into<String>) -> Self {
        self.set_session(Some(secret.into()));
        self
    }

    fn session(&self) -> Option<String> {
        match self.session.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_session(&self, secret: Option<String>) {
        match self.session.write() {
            Ok(mut guard) => *guard = secret,
            Err(poisoned) => *poisoned.into_inner() = secret,
        }
    }

    fn documents_url(&self, collection: &str) -> String {
        format!(
            "{}/databases/{}/collections/{}/documents",
            self.base_url, self.config.database_id, collection
        )
    }

    fn document_url(&self, collection: &str, id: &str) -> String {
        format!("{}/{}", self.documents_url(collection), id)
    }

    fn files_url(&self) -> String {
        format!(
            "{}/storage/buckets/{}/files",
            self.base_url, self.config.storage_bucket_id
        )
    }

    fn file_preview_url(&self, file_id: &str) -> String {
        let query = Serializer::new(String::new())
            .append_pair("width", "2000")
            .append_pair("height", "2000")
            .append_pair("gravity", "top")
            .append_pair("quality", "100")
            .append_pair("project", &self.config.project_id)
            .finish();

        format!("{}/{}/preview?{}", self.files_url(), file_id, query)
    }

    fn avatar_url(&self, name: &str) -> String {
        let query = Serializer::new(String::new())
            .append_pair("name", name)
            .append_pair("project", &self.config.project_id)
            .finish();

        format!("{}/avatars/initials?{}", self.base_url, query)
    }

    fn headers<'a>(&'a self, session: Option<&'a str>) -> Vec<(&'static str, &'a str)> {
        let mut headers = vec![("X-Appwrite-Project", self.config.project_id.as_str())];

        if let Some(key) = &self.config.api_key {
            headers.push(("X-Appwrite-Key", key.as_str()));
        }

        if let Some(secret) = session {
            headers.push(("X-Appwrite-Session", secret));
        }

        headers
    }

    async fn call(
        &self,
        method: Method,
        url: &str,
        query: Vec<(&str, String)>,
        body: Option<Value>,
    ) -> Result<Value, DomainError> {
        let session = self.session();
        let headers = self.headers(session.as_deref());

        debug!(method = %method, url, "Calling remote service");
        self.client
            .send_json(method, url, headers, query, body.as_ref())
            .await
    }

    async fn list<T: DeserializeOwned>(
        &self,
        collection: &str,
        queries: Vec<String>,
    ) -> Result<DocumentList<T>, DomainError> {
        let query = queries.into_iter().map(|q| ("queries[]", q)).collect();
        let value = self
            .call(Method::GET, &self.documents_url(collection), query, None)
            .await?;
        decode(value)
    }

    async fn create_document<T: DeserializeOwned>(
        &self,
        collection: &str,
        data: Value,
    ) -> Result<T, DomainError> {
        let body = json!({ "documentId": unique_document_id(), "data": data });
        let value = self
            .call(Method::POST, &self.documents_url(collection), vec![], Some(body))
            .await?;
        decode(value)
    }

    async fn update_document<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
        data: Value,
    ) -> Result<T, DomainError> {
        let value = self
            .call(
                Method::PATCH,
                &self.document_url(collection, id),
                vec![],
                Some(json!({ "data": data })),
            )
            .await?;
        decode(value)
    }

    async fn get_document<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<T, DomainError> {
        let value = self
            .call(Method::GET, &self.document_url(collection, id), vec![], None)
            .await?;
        decode(value)
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), DomainError> {
        self.call(Method::DELETE, &self.document_url(collection, id), vec![], None)
            .await
            .map(|_| ())
    }

    async fn upload_file(&self, file: &MediaFile) -> Result<StoredFile, DomainError> {
        let session = self.session();
        let headers = self.headers(session.as_deref());

        let fields = vec![("fileId", unique_document_id())];
        let value = self
            .client
            .upload(&self.files_url(), headers, fields, file)
            .await?;
        decode(value)
    }

    async fn delete_file(&self, file_id: &str) -> Result<(), DomainError> {
        let url = format!("{}/{}", self.files_url(), file_id);
        self.call(Method::DELETE, &url, vec![], None).await.map(|_| ())
    }

    /// Deletes a file left behind by a failed operation; the original error
    /// is what the caller needs, so a failed cleanup is only logged
    async fn discard_file(&self, file_id: &str) {
        if let Err(err) = self.delete_file(file_id).await {
            warn!(file_id, error = %err, "Failed to delete orphaned file");
        }
    }

    /// Uploads `file` when given, returning the new file id and preview URL
    async fn replace_media(
        &self,
        file: Option<&MediaFile>,
    ) -> Result<Option<(String, String)>, DomainError> {
        let Some(file) = file else {
            return Ok(None);
        };

        let stored = self.upload_file(file).await?;
        let url = self.file_preview_url(&stored.id);
        Ok(Some((stored.id, url)))
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, DomainError> {
    serde_json::from_value(value)
        .map_err(|e| DomainError::serialization(format!("Unexpected response shape: {}", e)))
}

#[async_trait]
impl<C: HttpClientTrait> RemoteService for HttpRemoteService<C> {
    async fn create_user_account(&self, user: NewUser) -> Result<User, DomainError> {
        let body = json!({
            "userId": unique_document_id(),
            "email": user.email,
            "password": user.password,
            "name": user.name,
        });
        let account: Account = decode(
            self.call(Method::POST, &format!("{}/account", self.base_url), vec![], Some(body))
                .await?,
        )?;

        let data = json!({
            "accountId": account.id,
            "name": user.name,
            "email": user.email,
            "username": user.username,
            "imageUrl": self.avatar_url(&user.name),
        });

        self.create_document(&self.config.users_collection_id, data)
            .await
    }

    async fn sign_in(&self, credentials: SignInCredentials) -> Result<Session, DomainError> {
        let body = json!({ "email": credentials.email, "password": credentials.password });
        let session: Session = decode(
            self.call(
                Method::POST,
                &format!("{}/account/sessions/email", self.base_url),
                vec![],
                Some(body),
            )
            .await?,
        )?;

        if let Some(secret) = session.secret.as_ref().filter(|s| !s.is_empty()) {
            self.set_session(Some(secret.clone()));
        }

        debug!(session_id = %session.id, "Signed in");
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), DomainError> {
        self.call(
            Method::DELETE,
            &format!("{}/account/sessions/current", self.base_url),
            vec![],
            None,
        )
        .await?;

        self.set_session(None);
        Ok(())
    }

    async fn get_current_user(&self) -> Result<User, DomainError> {
        let account: Account = decode(
            self.call(Method::GET, &format!("{}/account", self.base_url), vec![], None)
                .await?,
        )?;

        let users: DocumentList<User> = self
            .list(
                &self.config.users_collection_id,
                vec![query::equal("accountId", &account.id)],
            )
            .await?;

        users.documents.into_iter().next().ok_or_else(|| {
            DomainError::not_found(format!("No profile for account '{}'", account.id))
        })
    }

    async fn create_post(&self, post: NewPost) -> Result<Post, DomainError> {
        let media = self.replace_media(post.file.as_ref()).await?;
        let (image_id, image_url) = media.clone().unzip();

        let data = json!({
            "creator": post.creator,
            "caption": post.caption,
            "imageUrl": image_url,
            "imageId": image_id,
            "location": post.location,
            "tags": post.tags,
        });

        match self
            .create_document(&self.config.posts_collection_id, data)
            .await
        {
            Ok(created) => Ok(created),
            Err(err) => {
                if let Some((file_id, _)) = media {
                    self.discard_file(&file_id).await;
                }
                Err(err)
            }
        }
    }

    async fn update_post(&self, post: UpdatePost) -> Result<Post, DomainError> {
        let media = self.replace_media(post.file.as_ref()).await?;
        let (image_id, image_url) = match &media {
            Some((id, url)) => (Some(id.clone()), Some(url.clone())),
            None => (post.image_id.clone(), post.image_url.clone()),
        };

        let data = json!({
            "caption": post.caption,
            "imageUrl": image_url,
            "imageId": image_id,
            "location": post.location,
            "tags": post.tags,
        });

        let updated: Post = match self
            .update_document(&self.config.posts_collection_id, post.post_id.as_str(), data)
            .await
        {
            Ok(updated) => updated,
            Err(err) => {
                if let Some((file_id, _)) = &media {
                    self.discard_file(file_id).await;
                }
                return Err(err);
            }
        };

        if media.is_some() {
            if let Some(old) = &post.image_id {
                self.discard_file(old).await;
            }
        }

        Ok(updated)
    }

    async fn delete_post(
        &self,
        post_id: &PostId,
        image_id: Option<String>,
    ) -> Result<(), DomainError> {
        self.delete_document(&self.config.posts_collection_id, post_id.as_str())
            .await?;

        if let Some(image_id) = image_id {
            self.delete_file(&image_id).await?;
        }

        Ok(())
    }

    async fn get_recent_posts(&self) -> Result<DocumentList<Post>, DomainError> {
        self.list(
            &self.config.posts_collection_id,
            vec![query::order_desc("$createdAt"), query::limit(RECENT_POSTS_LIMIT)],
        )
        .await
    }

    async fn get_post_by_id(&self, post_id: &PostId) -> Result<Post, DomainError> {
        self.get_document(&self.config.posts_collection_id, post_id.as_str())
            .await
    }

    async fn like_post(
        &self,
        post_id: &PostId,
        user_id: &UserId,
        action: LikeAction,
    ) -> Result<Post, DomainError> {
        let current = self.get_post_by_id(post_id).await?;
        let likes = current.likes_after(user_id, action);

        self.update_document(
            &self.config.posts_collection_id,
            post_id.as_str(),
            json!({ "likes": likes }),
        )
        .await
    }

    async fn save_post(&self, post_id: &PostId, user_id: &UserId) -> Result<SavedPost, DomainError> {
        self.create_document(
            &self.config.saves_collection_id,
            json!({ "user": user_id, "post": post_id }),
        )
        .await
    }

    async fn delete_saved_post(&self, saved_record_id: &str) -> Result<(), DomainError> {
        self.delete_document(&self.config.saves_collection_id, saved_record_id)
            .await
    }

    async fn get_infinite_posts(
        &self,
        token: Option<PageToken>,
    ) -> Result<DocumentList<Post>, DomainError> {
        let mut queries = vec![query::order_desc("$updatedAt"), query::limit(FEED_PAGE_SIZE)];

        if let Some(token) = token {
            queries.push(query::cursor_after(token.as_str()));
        }

        self.list(&self.config.posts_collection_id, queries).await
    }

    async fn search_posts(&self, term: &str) -> Result<DocumentList<Post>, DomainError> {
        self.list(
            &self.config.posts_collection_id,
            vec![query::search("caption", term)],
        )
        .await
    }

    async fn get_user_posts(&self, user_id: &UserId) -> Result<DocumentList<Post>, DomainError> {
        self.list(
            &self.config.posts_collection_id,
            vec![
                query::equal("creator", user_id.as_str()),
                query::order_desc("$createdAt"),
            ],
        )
        .await
    }

    async fn get_users(&self, limit: Option<u32>) -> Result<DocumentList<User>, DomainError> {
        let mut queries = vec![query::order_desc("$createdAt")];

        if let Some(limit) = limit {
            queries.push(query::limit(limit));
        }

        self.list(&self.config.users_collection_id, queries).await
    }

    async fn get_user_by_id(&self, user_id: &UserId) -> Result<User, DomainError> {
        self.get_document(&self.config.users_collection_id, user_id.as_str())
            .await
    }

    async fn update_user(&self, user: UpdateUser) -> Result<User, DomainError> {
        let media = self.replace_media(user.file.as_ref()).await?;
        let (image_id, image_url) = match &media {
            Some((id, url)) => (Some(id.clone()), Some(url.clone())),
            None => (user.image_id.clone(), user.image_url.clone()),
        };

        let data = json!({
            "name": user.name,
            "bio": user.bio,
            "imageUrl": image_url,
            "imageId": image_id,
        });

        let updated: User = match self
            .update_document(&self.config.users_collection_id, user.user_id.as_str(), data)
            .await
        {
            Ok(updated) => updated,
            Err(err) => {
                if let Some((file_id, _)) = &media {
                    self.discard_file(file_id).await;
                }
                return Err(err);
            }
        };

        if media.is_some() {
            if let Some(old) = &user.image_id {
                self.discard_file(old).await;
            }
        }

        Ok(updated)
    }
}
