use std::sync::Arc;

use sso_http::{HttpTransport, HyperTransport};

use crate::config::SsoConfig;
use crate::credentials::CredentialStore;
use crate::error::SessionError;
use crate::executor::{AuthExecutor, FailureHook};
use crate::issuer::{CreateAccountRequest, SsoIssuerClient, TokenIssuer};
use crate::secret::SecretString;
use crate::storage::{FileTokenStorage, MemoryTokenStorage, TokenStorage};

/// Application-wide session context.
///
/// Owns the one [`CredentialStore`] and the one [`AuthExecutor`] of the
/// application; hand out clones of the executor instead of building more.
#[derive(Debug, Clone)]
pub struct SsoSession {
    credentials: Arc<CredentialStore>,
    issuer: Arc<SsoIssuerClient>,
    executor: AuthExecutor,
}

impl SsoSession {
    /// Build the session from configuration, using [`HyperTransport`] and
    /// the configured token storage, and restore persisted tokens.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Config`] for invalid configuration and
    /// [`SessionError::Request`] if the HTTP client cannot be built.
    pub fn from_config(
        config: &SsoConfig,
        on_failure: Option<FailureHook>,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let transport = HyperTransport::with_config(config.transport_config())?;
        let storage: Arc<dyn TokenStorage> = match &config.storage_path {
            Some(path) => Arc::new(FileTokenStorage::new(path)),
            None => Arc::new(MemoryTokenStorage::new()),
        };
        Self::with_parts(config, Arc::new(transport), storage, on_failure)
    }

    /// Build the session over an explicit transport and storage.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Config`] if the configured URLs are invalid.
    pub fn with_parts(
        config: &SsoConfig,
        transport: Arc<dyn HttpTransport>,
        storage: Arc<dyn TokenStorage>,
        on_failure: Option<FailureHook>,
    ) -> Result<Self, SessionError> {
        let api_url = config.api_url()?;
        let sso_url = config.sso_url()?;

        let credentials = Arc::new(CredentialStore::new(storage));
        if credentials.hydrate() {
            tracing::info!(user = ?credentials.user_name(), "restored session");
        }

        let issuer = Arc::new(SsoIssuerClient::new(Arc::clone(&transport), sso_url));
        let executor = AuthExecutor::builder(
            api_url,
            transport,
            Arc::clone(&credentials),
            Arc::clone(&issuer) as Arc<dyn TokenIssuer>,
        )
        .refresh_timeout(config.refresh_timeout)
        .failure_hook(on_failure)
        .build();

        Ok(Self {
            credentials,
            issuer,
            executor,
        })
    }

    #[must_use]
    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    #[must_use]
    pub fn executor(&self) -> &AuthExecutor {
        &self.executor
    }

    #[must_use]
    pub fn issuer(&self) -> &SsoIssuerClient {
        &self.issuer
    }

    /// Exchange an email/password for a token pair and store it.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Request`] if the SSO backend refuses the
    /// credential, [`SessionError::Claims`] if the issued token is unreadable.
    pub async fn login(&self, email: &str, password: &SecretString) -> Result<(), SessionError> {
        let pair = self.issuer.issue_from_credentials(email, password).await?;
        self.credentials.update(pair)?;
        tracing::info!(user = ?self.credentials.user_name(), "logged in");
        Ok(())
    }

    /// Revoke the refresh token server-side, then forget the credentials.
    ///
    /// Local state is cleared even if the revoke call fails.
    pub async fn logout(&self) {
        if let Some(creds) = self.credentials.current() {
            if let Err(e) = self.issuer.revoke(creds.pair()).await {
                tracing::warn!(error = %e, "failed to revoke refresh token");
            }
        }
        self.credentials.clear();
        tracing::info!("logged out");
    }

    /// Register a new account with the SSO backend.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Request`] if the backend rejects the request.
    pub async fn create_account(
        &self,
        request: &CreateAccountRequest,
    ) -> Result<serde_json::Value, SessionError> {
        self.issuer.create_account(request).await
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::claims::test_support::jwt;
    use crate::token::TokenPair;
    use httpmock::prelude::*;
    use serde_json::json;
    use sso_http::HttpTransportConfig;

    fn config(api: &MockServer, sso: &MockServer) -> SsoConfig {
        let mut config = SsoConfig {
            api_url: api.base_url(),
            sso_url: sso.base_url(),
            ..SsoConfig::default()
        };
        config.http.allow_insecure_http = true;
        config
    }

    fn session(config: &SsoConfig, storage: Arc<MemoryTokenStorage>) -> SsoSession {
        let transport = HyperTransport::with_config(HttpTransportConfig::for_testing()).unwrap();
        SsoSession::with_parts(config, Arc::new(transport), storage, None).unwrap()
    }

    #[test]
    fn invalid_config_is_rejected() {
        let err = SsoSession::from_config(&SsoConfig::default(), None).unwrap_err();
        assert!(matches!(err, SessionError::Config(_)));
    }

    #[tokio::test]
    async fn login_stores_issued_pair() {
        let api = MockServer::start();
        let sso = MockServer::start();
        let token = jwt(&json!({ "userName": "alice", "roles": ["any:user"] }));
        sso.mock(|when, then| {
            when.method(POST).path("/jwt");
            then.status(200)
                .json_body(json!({ "token": token, "refreshToken": "r1" }));
        });

        let storage = Arc::new(MemoryTokenStorage::new());
        let session = session(&config(&api, &sso), storage.clone());
        session
            .login("alice@example.com", &SecretString::new("pw"))
            .await
            .unwrap();

        assert_eq!(session.credentials().user_name().as_deref(), Some("alice"));
        assert_eq!(storage.load().unwrap(), Some(TokenPair::new(token, "r1")));
    }

    #[tokio::test]
    async fn logout_clears_even_if_revoke_fails() {
        let api = MockServer::start();
        let sso = MockServer::start();
        let revoke = sso.mock(|when, then| {
            when.method(DELETE).path("/jwt");
            then.status(500);
        });

        let token = jwt(&json!({ "userName": "bob" }));
        let storage = Arc::new(MemoryTokenStorage::with_pair(TokenPair::new(token, "r1")));
        let session = session(&config(&api, &sso), storage.clone());
        assert!(session.credentials().is_present());

        session.logout().await;

        revoke.assert();
        assert!(!session.credentials().is_present());
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn logout_without_credentials_skips_revoke() {
        let api = MockServer::start();
        let sso = MockServer::start();
        let revoke = sso.mock(|when, then| {
            when.method(DELETE).path("/jwt");
            then.status(204);
        });

        let session = session(&config(&api, &sso), Arc::new(MemoryTokenStorage::new()));
        session.logout().await;

        revoke.assert_calls(0);
    }
}
