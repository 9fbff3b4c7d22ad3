//! Transport to the content service
//!
//! Every core component talks to the service through [`ContentSource`], so a
//! scripted in-memory source can stand in for HTTP in tests. Non-2xx status
//! and undecodable bodies are treated the same way on every endpoint.

use async_trait::async_trait;
use mav_common::config::{get_user_agent, ResolvedSettings};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Transport-level failure
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {0}: {1}")]
    Status(u16, String),

    #[error("Decode error: {0}")]
    Decode(String),
}

/// Caller-supplied request context
///
/// The core never reads cookies or other ambient storage for identity; the
/// shell passes the credential in with every call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// Bearer token, if the caller is signed in
    pub auth_token: Option<String>,
}

impl RequestContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            auth_token: Some(token.into()),
        }
    }
}

/// JSON request/response access to the content service
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// GET `path` with optional query pairs, decode the body as JSON
    async fn get_json(
        &self,
        path: &str,
        query: &[(&str, &str)],
        ctx: &RequestContext,
    ) -> Result<Value, TransportError>;

    /// POST a JSON body to `path`, decode the response as JSON
    ///
    /// An empty response body decodes as `Value::Null`.
    async fn post_json(
        &self,
        path: &str,
        body: &Value,
        ctx: &RequestContext,
    ) -> Result<Value, TransportError>;
}

/// reqwest-backed [`ContentSource`]
pub struct HttpContentClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpContentClient {
    pub fn new(
        base_url: impl Into<String>,
        request_timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let http_client = reqwest::Client::builder()
            .user_agent(get_user_agent())
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_settings(settings: &ResolvedSettings) -> Result<Self, TransportError> {
        Self::new(
            settings.api_base_url.clone(),
            Duration::from_millis(settings.request_timeout_ms),
            Duration::from_millis(settings.connect_timeout_ms),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(
        &self,
        request: reqwest::RequestBuilder,
        ctx: &RequestContext,
    ) -> reqwest::RequestBuilder {
        match ctx.auth_token.as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn read_json(response: reqwest::Response) -> Result<Value, TransportError> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(TransportError::Status(status.as_u16(), error_text));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }

        serde_json::from_slice(&bytes).map_err(|e| TransportError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ContentSource for HttpContentClient {
    async fn get_json(
        &self,
        path: &str,
        query: &[(&str, &str)],
        ctx: &RequestContext,
    ) -> Result<Value, TransportError> {
        let url = self.url(path);
        tracing::debug!(url = %url, query = ?query, "GET content service");

        let mut request = self.http_client.get(&url);
        if !query.is_empty() {
            request = request.query(query);
        }

        let response = self
            .authorize(request, ctx)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Self::read_json(response).await
    }

    async fn post_json(
        &self,
        path: &str,
        body: &Value,
        ctx: &RequestContext,
    ) -> Result<Value, TransportError> {
        let url = self.url(path);
        tracing::debug!(url = %url, "POST content service");

        let response = self
            .authorize(self.http_client.post(&url).json(body), ctx)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Self::read_json(response).await
    }
}

/// Unwrap a `{"data": ...}` envelope some deployments add around payloads
///
/// The object is treated as an envelope when it carries `data` and none of
/// `payload_keys`, whatever else sits beside `data` (`success`, `message`,
/// `count`, ...). An object that already carries a payload key is returned
/// as-is.
pub fn unwrap_envelope(value: Value, payload_keys: &[&str]) -> Value {
    match value {
        Value::Object(mut map)
            if map.contains_key("data") && !payload_keys.iter().any(|k| map.contains_key(*k)) =>
        {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}
