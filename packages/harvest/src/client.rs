//! Resilient request client for the catalog API.
//!
//! Every request in the pipeline goes through [`CatalogClient::request`].
//! It injects the credential, executes the request through a
//! [`Transport`], and retries transport failures and retryable statuses
//! (429, 500, 502, 503, 504) according to a [`BackoffPolicy`]. Callers
//! treat its result as final and never retry on top of it.
//!
//! ```ignore
//! let client = CatalogClient::new(transport, BackoffPolicy::default());
//! let body = client
//!     .request("/catalog/2022-04-01/items/B000TEST", &[("includedData", "summaries")], &credential)
//!     .await?;
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::HarvestError;
use crate::backoff::{BackoffPolicy, OutcomeKind, RetryDecision, parse_retry_after};
use crate::transport::{ApiRequest, RawResponse, Transport, TransportError};

/// Maximum length of the response body preview kept in errors and logs.
const BODY_PREVIEW_LEN: usize = 500;

/// `User-Agent` sent with every request.
const USER_AGENT: &str = concat!("catalog-harvest/", env!("CARGO_PKG_VERSION"));

/// A bearer token accepted by the catalog API.
///
/// Construction rejects empty tokens, so holding a `Credential` proves the
/// precondition for issuing requests. The token is never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(Arc<str>);

impl Credential {
    /// Wraps a bearer token.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::Configuration`] if the token is empty or only
    /// whitespace.
    pub fn new(token: impl AsRef<str>) -> Result<Self, HarvestError> {
        let token = token.as_ref().trim();
        if token.is_empty() {
            return Err(HarvestError::Configuration(
                "missing access token".to_string(),
            ));
        }
        Ok(Self(Arc::from(token)))
    }

    /// The raw token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Terminal failure of one logical request.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// Transport failures persisted through every retry.
    #[error("network error on {path} after {retries} retries: {source}")]
    Transport {
        /// Endpoint path.
        path: String,
        /// Retries performed before giving up.
        retries: u32,
        /// Last transport failure.
        #[source]
        source: TransportError,
    },

    /// The server rejected the request, or kept throttling it until the
    /// retry budget ran out.
    #[error("GET {path} failed with HTTP {status} after {retries} retries: {body}")]
    Rejected {
        /// Endpoint path.
        path: String,
        /// Final HTTP status.
        status: u16,
        /// Retries performed before giving up.
        retries: u32,
        /// Truncated response body.
        body: String,
    },

    /// A successful response carried a body that is not valid JSON.
    #[error("bad JSON from {path} (HTTP {status}): {message}; body: {body}")]
    Decode {
        /// Endpoint path.
        path: String,
        /// HTTP status of the response.
        status: u16,
        /// Parser error message.
        message: String,
        /// Truncated response body.
        body: String,
    },

    /// The run was cancelled while the request was pending.
    #[error("request to {path} cancelled")]
    Cancelled {
        /// Endpoint path.
        path: String,
    },
}

impl RequestError {
    /// The HTTP status attached to the failure, if any.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } | Self::Decode { status, .. } => Some(*status),
            Self::Transport { .. } | Self::Cancelled { .. } => None,
        }
    }

    /// Retries performed before the failure became terminal.
    #[must_use]
    pub const fn retries(&self) -> u32 {
        match self {
            Self::Transport { retries, .. } | Self::Rejected { retries, .. } => *retries,
            Self::Decode { .. } | Self::Cancelled { .. } => 0,
        }
    }

    /// Whether the failure was caused by cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Classified result of a single attempt.
#[derive(Debug)]
pub enum RequestOutcome {
    /// A 2xx response with a decoded JSON payload.
    Success(serde_json::Value),
    /// A failure the backoff policy may retry.
    Retryable {
        /// What went wrong.
        kind: OutcomeKind,
        /// Delay suggested by the server (`Retry-After`).
        retry_after: Option<Duration>,
        /// The error to surface if no retry happens.
        error: RequestError,
    },
    /// A failure that must not be retried.
    Fatal(RequestError),
}

impl RequestOutcome {
    /// Classifies the transport result of attempt number `attempt`.
    #[must_use]
    pub fn classify(
        path: &str,
        attempt: u32,
        result: Result<RawResponse, TransportError>,
    ) -> Self {
        let response = match result {
            Ok(response) => response,
            Err(source) => {
                return Self::Retryable {
                    kind: OutcomeKind::Transport,
                    retry_after: None,
                    error: RequestError::Transport {
                        path: path.to_owned(),
                        retries: attempt,
                        source,
                    },
                };
            }
        };

        let status = response.status;
        if (200..300).contains(&status) {
            return match serde_json::from_str(&response.body) {
                Ok(value) => Self::Success(value),
                Err(e) => Self::Fatal(RequestError::Decode {
                    path: path.to_owned(),
                    status,
                    message: e.to_string(),
                    body: body_preview(&response.body),
                }),
            };
        }

        let kind = OutcomeKind::Status(status);
        let error = RequestError::Rejected {
            path: path.to_owned(),
            status,
            retries: attempt,
            body: body_preview(&response.body),
        };

        if kind.is_retryable() {
            Self::Retryable {
                kind,
                retry_after: response.retry_after.as_deref().and_then(parse_retry_after),
                error,
            }
        } else {
            Self::Fatal(error)
        }
    }
}

/// Issues authenticated, retried requests against the catalog API.
#[derive(Clone)]
pub struct CatalogClient {
    transport: Arc<dyn Transport>,
    policy: BackoffPolicy,
    cancel: CancellationToken,
}

impl fmt::Debug for CatalogClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogClient")
            .field("policy", &self.policy)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl CatalogClient {
    /// Creates a client that is never cancelled.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, policy: BackoffPolicy) -> Self {
        Self {
            transport,
            policy,
            cancel: CancellationToken::new(),
        }
    }

    /// Makes in-flight and future requests observe `cancel`.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The retry policy applied to every request.
    #[must_use]
    pub const fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// The cancellation token observed by this client.
    #[must_use]
    pub const fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether the client's run has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Performs one logical GET of `path` and decodes the JSON body.
    ///
    /// # Retry behaviour
    ///
    /// Transport failures and HTTP 429/500/502/503/504 are retried with the
    /// client's [`BackoffPolicy`], honouring `Retry-After`. Any other
    /// status and malformed 2xx bodies fail immediately.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError`] once the request has failed terminally or
    /// the run was cancelled.
    pub async fn request(
        &self,
        path: &str,
        query: &[(&str, &str)],
        credential: &Credential,
    ) -> Result<serde_json::Value, RequestError> {
        let request = ApiRequest {
            path: path.to_owned(),
            query: query
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
            headers: auth_headers(credential),
        };

        let mut attempt: u32 = 0;
        loop {
            if self.cancel.is_cancelled() {
                return Err(Self::cancelled(path));
            }

            let result = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(Self::cancelled(path)),
                result = self.transport.get(&request) => result,
            };

            let (kind, retry_after, error) = match RequestOutcome::classify(path, attempt, result)
            {
                RequestOutcome::Success(value) => return Ok(value),
                RequestOutcome::Fatal(error) => return Err(error),
                RequestOutcome::Retryable {
                    kind,
                    retry_after,
                    error,
                } => (kind, retry_after, error),
            };

            let RetryDecision::RetryAfter(delay) = self.policy.decide(attempt, kind, retry_after)
            else {
                return Err(error);
            };

            log::warn!(
                "GET {path}: {error} (retry {}/{} in {delay:?})",
                attempt + 1,
                self.policy.max_retries,
            );

            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(Self::cancelled(path)),
                () = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }

    fn cancelled(path: &str) -> RequestError {
        log::debug!("GET {path}: abandoned after cancellation");
        RequestError::Cancelled {
            path: path.to_owned(),
        }
    }
}

/// Headers carrying the credential plus the JSON content negotiation.
fn auth_headers(credential: &Credential) -> Vec<(String, String)> {
    let token = credential.token();
    vec![
        ("Authorization".to_owned(), format!("Bearer {token}")),
        ("x-amz-access-token".to_owned(), token.to_owned()),
        ("Accept".to_owned(), "application/json".to_owned()),
        ("Content-Type".to_owned(), "application/json".to_owned()),
        ("User-Agent".to_owned(), USER_AGENT.to_owned()),
    ]
}

/// Truncates `body` to [`BODY_PREVIEW_LEN`] characters.
fn body_preview(body: &str) -> String {
    if body.chars().count() > BODY_PREVIEW_LEN {
        let head: String = body.chars().take(BODY_PREVIEW_LEN).collect();
        format!("{head}...")
    } else {
        body.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedTransport, deterministic_policy, ok_json};

    fn credential() -> Credential {
        Credential::new("token-123").unwrap()
    }

    #[test]
    fn rejects_empty_credential() {
        assert!(matches!(
            Credential::new("   "),
            Err(HarvestError::Configuration(_))
        ));
        assert_eq!(format!("{:?}", credential()), "Credential(***)");
    }

    #[test]
    fn truncates_long_bodies() {
        let preview = body_preview(&"é".repeat(600));
        assert_eq!(preview.chars().count(), BODY_PREVIEW_LEN + 3);
        assert!(preview.ends_with("..."));
        assert_eq!(body_preview("short"), "short");
    }

    #[tokio::test]
    async fn injects_credential_headers() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond("/items", ok_json(&serde_json::json!({"ok": true})));
        let client = CatalogClient::new(transport.clone(), deterministic_policy(3));

        let body = client
            .request("/items", &[("pageSize", "20")], &credential())
            .await
            .unwrap();

        assert_eq!(body["ok"], true);
        let sent = transport.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].header("Authorization"), Some("Bearer token-123"));
        assert_eq!(sent[0].header("x-amz-access-token"), Some("token-123"));
        assert_eq!(sent[0].query_param("pageSize"), Some("20"));
    }

    #[tokio::test(start_paused = true)]
    async fn honours_retry_after_on_429() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(
            "/items",
            RawResponse {
                status: 429,
                retry_after: Some("2".to_string()),
                body: "slow down".to_string(),
            },
        );
        transport.respond("/items", ok_json(&serde_json::json!({"items": []})));
        let client = CatalogClient::new(transport.clone(), deterministic_policy(6));

        let start = tokio::time::Instant::now();
        let body = client.request("/items", &[], &credential()).await.unwrap();

        assert!(start.elapsed() >= Duration::from_secs(2));
        assert_eq!(body["items"], serde_json::json!([]));
        assert_eq!(transport.request_count("/items"), 2);
    }

    #[tokio::test]
    async fn does_not_retry_404() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(
            "/items/missing",
            RawResponse {
                status: 404,
                retry_after: None,
                body: r#"{"errors":[{"code":"NotFound"}]}"#.to_string(),
            },
        );
        let client = CatalogClient::new(transport.clone(), deterministic_policy(6));

        let err = client
            .request("/items/missing", &[], &credential())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RequestError::Rejected {
                status: 404,
                retries: 0,
                ..
            }
        ));
        assert_eq!(transport.request_count("/items/missing"), 1);
    }

    #[tokio::test]
    async fn does_not_retry_bad_json() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(
            "/items",
            RawResponse {
                status: 200,
                retry_after: None,
                body: "{not json".to_string(),
            },
        );
        let client = CatalogClient::new(transport.clone(), deterministic_policy(6));

        let err = client.request("/items", &[], &credential()).await.unwrap_err();

        assert!(matches!(err, RequestError::Decode { status: 200, .. }));
        assert_eq!(transport.request_count("/items"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_retries_on_server_errors() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(
            "/items",
            RawResponse {
                status: 503,
                retry_after: None,
                body: String::new(),
            },
        );
        let client = CatalogClient::new(transport.clone(), deterministic_policy(2));

        let err = client.request("/items", &[], &credential()).await.unwrap_err();

        assert_eq!(err.status(), Some(503));
        assert_eq!(err.retries(), 2);
        assert_eq!(transport.request_count("/items"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transport_failures_then_succeeds() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.fail("/items");
        transport.respond("/items", ok_json(&serde_json::json!({"n": 1})));
        let client = CatalogClient::new(transport.clone(), deterministic_policy(2));

        let body = client.request("/items", &[], &credential()).await.unwrap();

        assert_eq!(body["n"], 1);
        assert_eq!(transport.request_count("/items"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_abandons_pending_request() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.hang("/slow");
        let cancel = CancellationToken::new();
        let client = CatalogClient::new(transport, deterministic_policy(2))
            .with_cancellation(cancel.clone());

        let credential = credential();
        let pending = client.request("/slow", &[], &credential);
        let (result, ()) = tokio::join!(pending, async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel.cancel();
        });

        assert!(result.unwrap_err().is_cancelled());
    }
}
