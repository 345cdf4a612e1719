//! # Remote Document Store Client
//!
//! Thin wrapper around a realtime-database REST surface:
//! - `PATCH {url}/{collection}/{key}.json` merges fields into one document
//! - `GET {url}/{collection}.json` reads the whole collection
//!
//! The auth token, when configured, is passed as the `auth` query parameter.

use crate::config::RemoteSection;
use serde_json::Value;

/// Errors from the HTTP client layer.
#[derive(Debug)]
pub enum ClientError {
    /// The settings could not produce a client.
    InvalidConfig(String),
    /// Cannot reach the remote store.
    ConnectionFailed(String),
    /// 401/403 - invalid or missing auth token.
    Unauthorized,
    /// 429 Too Many Requests.
    RateLimited,
    /// Remote returned a 5xx error.
    ServerError(u16, String),
    /// Remote refused the request with another 4xx status.
    Rejected(u16, String),
    /// Failed to parse response body.
    ParseError(String),
}

impl ClientError {
    /// Check if the same request may succeed later.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed(_) | Self::RateLimited | Self::ServerError(..)
        )
    }
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidConfig(msg) => write!(f, "Invalid remote settings: {msg}"),
            Self::ConnectionFailed(url) => write!(f, "Cannot connect to remote store at {url}"),
            Self::Unauthorized => write!(f, "Unauthorized: invalid or missing auth token"),
            Self::RateLimited => write!(f, "Rate limited: too many requests"),
            Self::ServerError(status, msg) => write!(f, "Server error ({status}): {msg}"),
            Self::Rejected(status, msg) => write!(f, "Request rejected ({status}): {msg}"),
            Self::ParseError(msg) => write!(f, "Parse error: {msg}"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<ClientError> for tagstore_core::TagError {
    fn from(e: ClientError) -> Self {
        Self::RemoteError(e.to_string())
    }
}

/// HTTP client for one remote collection.
#[derive(Debug, Clone)]
pub struct RemoteClient {
    http: reqwest::Client,
    base_url: String,
    collection: String,
    auth_token: Option<String>,
}

impl RemoteClient {
    /// Build a client from `[remote]` settings.
    pub fn new(settings: &RemoteSection) -> Result<Self, ClientError> {
        let base_url = settings
            .database_url
            .as_deref()
            .map(|u| u.trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ClientError::InvalidConfig("no database_url".to_string()))?;
        let http = reqwest::Client::builder()
            .timeout(settings.timeout())
            .build()
            .map_err(|e| ClientError::InvalidConfig(e.to_string()))?;
        Ok(Self {
            http,
            base_url,
            collection: settings.collection.clone(),
            auth_token: settings.auth_token.clone(),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build a request with optional token auth.
    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.base_url, path);
        let mut req = self.http.request(method, &url);
        if let Some(ref token) = self.auth_token {
            req = req.query(&[("auth", token)]);
        }
        req
    }

    /// Handle HTTP response: check status codes and parse JSON.
    async fn handle_response(&self, resp: reqwest::Response) -> Result<Value, ClientError> {
        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ClientError::Unauthorized);
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ClientError::RateLimited);
        }
        if status.is_server_error() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::ServerError(status.as_u16(), body));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Rejected(status.as_u16(), body));
        }
        resp.json::<Value>()
            .await
            .map_err(|e| ClientError::ParseError(e.to_string()))
    }

    /// Send a request and handle connection errors.
    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, ClientError> {
        req.send()
            .await
            .map_err(|e| ClientError::ConnectionFailed(format!("{}: {e}", self.base_url)))
    }

    /// PATCH one document: fields in `document` replace the stored ones.
    pub async fn patch_document(&self, key: &str, document: &Value) -> Result<(), ClientError> {
        let path = format!("{}/{}.json", self.collection, key);
        let req = self.request(reqwest::Method::PATCH, &path).json(document);
        let resp = self.send(req).await?;
        self.handle_response(resp).await.map(|_| ())
    }

    /// GET the whole collection. An empty collection reads as `null`.
    pub async fn fetch_collection(&self) -> Result<Value, ClientError> {
        let path = format!("{}.json", self.collection);
        let req = self.request(reqwest::Method::GET, &path);
        let resp = self.send(req).await?;
        self.handle_response(resp).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_url_is_invalid_config() {
        let result = RemoteClient::new(&RemoteSection::default());
        assert!(matches!(result, Err(ClientError::InvalidConfig(_))));
    }

    #[test]
    fn trailing_slash_trimmed() {
        let settings = RemoteSection {
            database_url: Some("http://127.0.0.1:9000/".to_string()),
            ..RemoteSection::default()
        };
        let client = RemoteClient::new(&settings).expect("client");
        assert_eq!(client.base_url(), "http://127.0.0.1:9000");
    }

    #[test]
    fn transient_classification() {
        assert!(ClientError::ConnectionFailed("x".into()).is_transient());
        assert!(ClientError::ServerError(503, String::new()).is_transient());
        assert!(!ClientError::Unauthorized.is_transient());
        assert!(!ClientError::Rejected(400, String::new()).is_transient());
    }
}
