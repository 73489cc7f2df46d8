use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use thiserror::Error;

/// Boxed transport-level failure shared between clones of the error
pub type SharedSource = Arc<dyn std::error::Error + Send + Sync>;

/// HTTP transport error types
///
/// The error is `Clone` so a single failure can be observed by several
/// waiters (sources are reference-counted).
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum TransportError {
    /// The server answered with a non-2xx status
    #[error("HTTP {status}: {body}")]
    Status {
        status: StatusCode,
        /// Response body preview, capped at
        /// [`ERROR_BODY_PREVIEW_LIMIT`](crate::ERROR_BODY_PREVIEW_LIMIT)
        body: String,
    },

    /// No HTTP response was received (connection, DNS, TLS, protocol)
    #[error("no response: {0}")]
    NoResponse(#[source] SharedSource),

    /// The request did not complete within the configured timeout
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Response body exceeded size limit
    #[error("response body too large: limit {limit} bytes")]
    BodyTooLarge { limit: usize },

    /// The request descriptor could not be turned into an HTTP request
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Invalid base URL or path
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Plain HTTP used while the transport requires TLS
    #[error("URL scheme '{0}' not allowed: TLS is required")]
    InsecureScheme(String),

    /// JSON encoding or decoding failed
    #[error("JSON error: {0}")]
    Json(#[source] Arc<serde_json::Error>),
}

impl TransportError {
    /// Upstream HTTP status, if the server answered
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// `true` if the server rejected the credentials (401 or 403)
    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self.status(),
            Some(StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
        )
    }

    /// `true` if the failure carries an HTTP response
    #[must_use]
    pub fn has_response(&self) -> bool {
        self.status().is_some()
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(Arc::new(err))
    }
}

impl From<hyper_util::client::legacy::Error> for TransportError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        Self::NoResponse(Arc::new(err))
    }
}
