use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use http::{HeaderValue, StatusCode};
use serde::Serialize;
use sso_http::{ApiRequest, HttpTransport, TransportError};
use url::Url;

use crate::error::SessionError;
use crate::secret::SecretString;
use crate::token::{TokenPair, TokenPairResponse};

const JWT_PATH: &str = "jwt";
const ACCOUNTS_PATH: &str = "accounts";

/// Network boundary to the SSO backend.
///
/// Plain request/response calls: no retries, no coordination. Refresh
/// de-duplication lives in [`AuthExecutor`](crate::AuthExecutor).
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    /// Exchange a login credential for a fresh pair.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Request`] if the backend refuses the
    /// credential or cannot be reached.
    async fn issue_from_credentials(
        &self,
        identity: &str,
        secret: &SecretString,
    ) -> Result<TokenPair, SessionError>;

    /// Exchange a refresh token for a fresh pair.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::RefreshRejected`] if the backend refuses the
    /// refresh token, [`SessionError::Request`] for any other failure.
    async fn refresh(&self, refresh_token: &SecretString) -> Result<TokenPair, SessionError>;

    /// Best-effort server-side invalidation of `pair`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Request`] if the backend call fails.
    async fn revoke(&self, pair: &TokenPair) -> Result<(), SessionError>;
}

/// Body of `POST /accounts`
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccountRequest {
    pub account_name: String,
    pub email: String,
    #[serde(serialize_with = "expose_secret")]
    pub password: SecretString,
}

impl fmt::Debug for CreateAccountRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateAccountRequest")
            .field("account_name", &self.account_name)
            .field("email", &self.email)
            .field("password", &self.password)
            .finish()
    }
}

fn expose_secret<S: serde::Serializer>(secret: &SecretString, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(secret.expose())
}

#[derive(Serialize)]
struct CredentialsBody<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshBody<'a> {
    refresh_token: &'a str,
}

/// [`TokenIssuer`] talking to the SSO REST API at `base_url`
#[derive(Clone)]
pub struct SsoIssuerClient {
    transport: Arc<dyn HttpTransport>,
    base_url: Url,
}

impl fmt::Debug for SsoIssuerClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SsoIssuerClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl SsoIssuerClient {
    pub fn new(transport: Arc<dyn HttpTransport>, base_url: Url) -> Self {
        Self { transport, base_url }
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Register a new account; returns the account record as sent by the
    /// backend.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Request`] if the backend rejects the request.
    pub async fn create_account(
        &self,
        request: &CreateAccountRequest,
    ) -> Result<serde_json::Value, SessionError> {
        let req = ApiRequest::post(ACCOUNTS_PATH).json(request)?;
        let response = self.transport.send(&self.base_url, req).await.inspect_err(|e| {
            tracing::warn!(email = %request.email, error = %e, "account creation failed");
        })?;
        if response.bytes().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        Ok(response.json()?)
    }

    async fn fetch_pair(&self, request: ApiRequest) -> Result<TokenPair, TransportError> {
        let response = self.transport.send(&self.base_url, request).await?;
        let wire: TokenPairResponse = response.json()?;
        Ok(wire.into())
    }
}

fn is_rejection(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
    )
}

#[async_trait]
impl TokenIssuer for SsoIssuerClient {
    async fn issue_from_credentials(
        &self,
        identity: &str,
        secret: &SecretString,
    ) -> Result<TokenPair, SessionError> {
        let body = CredentialsBody {
            email: identity,
            password: secret.expose(),
        };
        let request = ApiRequest::post(JWT_PATH).json(&body)?;
        self.fetch_pair(request).await.map_err(|e| {
            tracing::warn!(email = identity, error = %e, "failed to obtain token pair");
            SessionError::Request(e)
        })
    }

    async fn refresh(&self, refresh_token: &SecretString) -> Result<TokenPair, SessionError> {
        let body = RefreshBody {
            refresh_token: refresh_token.expose(),
        };
        let request = ApiRequest::put(JWT_PATH).json(&body)?;
        match self.fetch_pair(request).await {
            Ok(pair) => Ok(pair),
            Err(TransportError::Status { status, body }) if is_rejection(status) => {
                Err(SessionError::RefreshRejected { status, body })
            }
            Err(e) => Err(SessionError::Request(e)),
        }
    }

    async fn revoke(&self, pair: &TokenPair) -> Result<(), SessionError> {
        let mut bearer = HeaderValue::try_from(format!("Bearer {}", pair.access_token().expose()))
            .map_err(|_| {
                TransportError::InvalidRequest("access token is not a valid header value".into())
            })?;
        bearer.set_sensitive(true);
        let body = RefreshBody {
            refresh_token: pair.refresh_token().expose(),
        };
        let request = ApiRequest::delete(JWT_PATH).authorization(bearer).json(&body)?;
        self.transport.send(&self.base_url, request).await?;
        Ok(())
    }
}
