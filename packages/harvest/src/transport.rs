//! HTTP transport seam.
//!
//! A [`Transport`] executes exactly one GET against the catalog API and
//! hands back the raw status, `Retry-After` header, and body text. It never
//! retries or interprets the status; that is the job of
//! [`crate::client::CatalogClient`].

use std::time::Duration;

use async_trait::async_trait;

/// Errors raised while talking to the remote host.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The HTTP client reported a failure (connect, TLS, body read, ...).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// No response arrived within the request timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The connection could not be established or was dropped.
    #[error("connection failed: {0}")]
    Connection(String),
}

/// A fully described GET request, relative to the transport's base URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiRequest {
    /// Endpoint path (e.g. `"/catalog/2022-04-01/items"`).
    pub path: String,
    /// Query parameters, in order.
    pub query: Vec<(String, String)>,
    /// Request headers, including credential material.
    pub headers: Vec<(String, String)>,
}

impl ApiRequest {
    /// Looks up the first query parameter named `key`.
    #[must_use]
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Looks up the first header named `name` (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Percent-encodes `segment` for use as a single URL path segment.
///
/// Only RFC 3986 unreserved characters pass through, so `/`, `?` and `#`
/// inside an identifier can never change the request target.
#[must_use]
pub fn encode_path_segment(segment: &str) -> String {
    let mut encoded = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            encoded.push(char::from(byte));
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }
    encoded
}

/// The raw result of one HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    /// HTTP status code.
    pub status: u16,
    /// Value of the `Retry-After` header, if present.
    pub retry_after: Option<String>,
    /// Response body as text.
    pub body: String,
}

/// Executes a single HTTP GET.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `request` once and returns whatever the server answered.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when no complete response was received.
    async fn get(&self, request: &ApiRequest) -> Result<RawResponse, TransportError>;
}

/// [`Transport`] backed by a shared [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl ReqwestTransport {
    /// Builds a transport for `base_url` with a per-request `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Http`] if the TLS backend cannot be
    /// initialised.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            timeout,
        })
    }

    /// The base URL every request path is appended to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, request: &ApiRequest) -> Result<RawResponse, TransportError> {
        let url = format!("{}{}", self.base_url, request.path);

        let mut builder = self.client.get(&url).query(&request.query);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout(self.timeout)
            } else if e.is_connect() {
                TransportError::Connection(e.to_string())
            } else {
                TransportError::Http(e)
            }
        })?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let body = response.text().await?;

        Ok(RawResponse {
            status,
            retry_after,
            body,
        })
    }
}
