use std::time::Duration;

use http::StatusCode;
use sso_http::TransportError;
use thiserror::Error;

use crate::claims::ClaimsError;
use crate::storage::StorageError;

/// Errors surfaced by the session client.
///
/// `Clone` so that every caller attached to one refresh operation receives
/// the same outcome.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum SessionError {
    /// No token pair is stored; the caller has to log in first
    #[error("no credentials stored")]
    NoCredentials,

    /// The SSO backend refused the refresh token (expired or revoked)
    #[error("refresh token rejected: HTTP {status}")]
    RefreshRejected { status: StatusCode, body: String },

    /// Any other HTTP or network failure, upstream status/body preserved
    #[error("request failed: {0}")]
    Request(#[from] TransportError),

    /// The refresh call did not settle in time
    #[error("token refresh timed out after {0:?}")]
    RefreshTimedOut(Duration),

    /// The issued access token could not be decoded
    #[error("invalid access token: {0}")]
    Claims(#[from] ClaimsError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl SessionError {
    /// Upstream HTTP status carried by the error, if any
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::RefreshRejected { status, .. } => Some(*status),
            Self::Request(e) => e.status(),
            _ => None,
        }
    }

    /// `true` when the session is no longer usable and the user has to log in
    #[must_use]
    pub fn requires_login(&self) -> bool {
        match self {
            Self::NoCredentials | Self::RefreshRejected { .. } => true,
            Self::Request(e) => e.is_auth_failure(),
            _ => false,
        }
    }
}
