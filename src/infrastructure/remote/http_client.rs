use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::Value;

use crate::domain::post::MediaFile;
use crate::domain::DomainError;

/// Trait for HTTP client operations (for mocking)
#[async_trait]
pub trait HttpClientTrait: Send + Sync + std::fmt::Debug {
    /// Sends a request with an optional JSON body and returns the parsed
    /// JSON response (`Value::Null` for empty bodies)
    async fn send_json(
        &self,
        method: Method,
        url: &str,
        headers: Vec<(&str, &str)>,
        query: Vec<(&str, String)>,
        body: Option<&Value>,
    ) -> Result<Value, DomainError>;

    /// Uploads `file` as a multipart form with the given text fields
    async fn upload(
        &self,
        url: &str,
        headers: Vec<(&str, &str)>,
        fields: Vec<(&str, String)>,
        file: &MediaFile,
    ) -> Result<Value, DomainError>;
}

/// Real HTTP client using reqwest
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub fn with_timeout(timeout: std::time::Duration) -> Result<Self, DomainError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                DomainError::configuration(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self { client })
    }

    async fn read(response: reqwest::Response) -> Result<Value, DomainError> {
        let status = response.status();
        let body = response.text().await.map_err(map_transport_error)?;

        if !status.is_success() {
            return Err(map_status(status, &body));
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&body)
            .map_err(|e| DomainError::serialization(format!("Failed to parse response: {}", e)))
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClientTrait for HttpClient {
    async fn send_json(
        &self,
        method: Method,
        url: &str,
        headers: Vec<(&str, &str)>,
        query: Vec<(&str, String)>,
        body: Option<&Value>,
    ) -> Result<Value, DomainError> {
        let mut request = self.client.request(method, url);

        for (key, value) in headers {
            request = request.header(key, value);
        }

        if !query.is_empty() {
            request = request.query(&query);
        }

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(map_transport_error)?;
        Self::read(response).await
    }

    async fn upload(
        &self,
        url: &str,
        headers: Vec<(&str, &str)>,
        fields: Vec<(&str, String)>,
        file: &MediaFile,
    ) -> Result<Value, DomainError> {
        let part = reqwest::multipart::Part::bytes(file.bytes.to_vec())
            .file_name(file.name.clone())
            .mime_str(&file.content_type)
            .map_err(|e| DomainError::validation(format!("Invalid content type: {}", e)))?;

        let mut form = reqwest::multipart::Form::new();
        for (name, value) in fields {
            form = form.text(name.to_string(), value);
        }
        form = form.part("file", part);

        let mut request = self.client.post(url);

        for (key, value) in headers {
            request = request.header(key, value);
        }

        let response = request
            .multipart(form)
            .send()
            .await
            .map_err(map_transport_error)?;
        Self::read(response).await
    }
}

fn map_transport_error(err: reqwest::Error) -> DomainError {
    if err.is_timeout() {
        DomainError::timeout(format!("Request timed out: {}", err))
    } else {
        DomainError::remote(0, format!("Request failed: {}", err))
    }
}

/// Maps a non-success status to the error taxonomy, preferring the
/// backend's own message when the body carries one
fn map_status(status: StatusCode, body: &str) -> DomainError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| format!("HTTP {}: {}", status, body));

    match status.as_u16() {
        401 | 403 => DomainError::unauthorized(message),
        404 => DomainError::not_found(message),
        400 | 409 | 422 => DomainError::validation(message),
        code => DomainError::remote(code, message),
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::RwLock;

    /// A request recorded by [`MockHttpClient`]
    #[derive(Debug, Clone, PartialEq)]
    pub struct RecordedRequest {
        pub method: Method,
        pub url: String,
        pub query: Vec<(String, String)>,
        pub body: Option<Value>,
    }

    #[derive(Debug, Default)]
    pub struct MockHttpClient {
        responses: RwLock<HashMap<(Method, String), Result<Value, DomainError>>>,
        requests: RwLock<Vec<RecordedRequest>>,
    }

    impl MockHttpClient {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_response(self, method: Method, url: impl Into<String>, response: Value) -> Self {
            self.responses
                .write()
                .unwrap()
                .insert((method, url.into()), Ok(response));
            self
        }

        pub fn with_error(self, method: Method, url: impl Into<String>, error: DomainError) -> Self {
            self.responses
                .write()
                .unwrap()
                .insert((method, url.into()), Err(error));
            self
        }

        pub fn requests(&self) -> Vec<RecordedRequest> {
            self.requests.read().unwrap().clone()
        }

        fn respond(&self, method: Method, url: &str) -> Result<Value, DomainError> {
            self.responses
                .read()
                .unwrap()
                .get(&(method.clone(), url.to_string()))
                .cloned()
                .unwrap_or_else(|| {
                    Err(DomainError::internal(format!("No mock response for {} {}", method, url)))
                })
        }
    }

    #[async_trait]
    impl HttpClientTrait for MockHttpClient {
        async fn send_json(
            &self,
            method: Method,
            url: &str,
            _headers: Vec<(&str, &str)>,
            query: Vec<(&str, String)>,
            body: Option<&Value>,
        ) -> Result<Value, DomainError> {
            self.requests.write().unwrap().push(RecordedRequest {
                method: method.clone(),
                url: url.to_string(),
                query: query.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
                body: body.cloned(),
            });

            self.respond(method, url)
        }

        async fn upload(
            &self,
            url: &str,
            _headers: Vec<(&str, &str)>,
            _fields: Vec<(&str, String)>,
            _file: &MediaFile,
        ) -> Result<Value, DomainError> {
            self.requests.write().unwrap().push(RecordedRequest {
                method: Method::POST,
                url: url.to_string(),
                query: Vec::new(),
                body: None,
            });

            self.respond(Method::POST, url)
        }
    }
}
