//! Authenticated request execution with single-flight token refresh.
//!
//! Every request is sent with the current bearer header. A 401 or 403
//! response starts (or joins) the one refresh operation allowed to be in
//! flight, after which the request is re-sent exactly once.
//!
//! The in-flight marker is a [`Shared`] future stored under a synchronous
//! lock: checking for a running refresh and installing a new one happen in
//! the same critical section, before any `.await`. The refresh itself runs on
//! a spawned task so it settles even if every caller waiting on it is
//! dropped, and a drop guard inside that task clears the marker however the
//! refresh ends.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sso_http::{ApiRequest, ApiResponse, HttpTransport, TransportError};
use url::Url;

use crate::credentials::{CredentialStore, Credentials};
use crate::error::SessionError;
use crate::issuer::TokenIssuer;
use crate::secret::SecretString;

/// Zero-argument hook invoked when the session ends because credentials
/// could not be renewed
pub type FailureHook = Arc<dyn Fn() + Send + Sync>;

type SharedRefresh = Shared<BoxFuture<'static, Result<(), SessionError>>>;

struct InFlight {
    id: u64,
    refresh: SharedRefresh,
}

enum RefreshTicket {
    /// Wait for this refresh, then re-send
    Wait(SharedRefresh),
    /// Credentials changed since the failed attempt; re-send right away
    Resend,
    Fail(SessionError),
}

struct Inner {
    api_url: Url,
    transport: Arc<dyn HttpTransport>,
    credentials: Arc<CredentialStore>,
    issuer: Arc<dyn TokenIssuer>,
    on_failure: Option<FailureHook>,
    refresh_timeout: Option<Duration>,
    in_flight: Mutex<Option<InFlight>>,
    next_refresh_id: AtomicU64,
}

impl Inner {
    fn notify_failure(&self) {
        if let Some(hook) = &self.on_failure {
            hook();
        }
    }
}

/// Executes API requests with credentials attached, renewing them on demand.
///
/// Cheap to clone; clones share the credential store and the refresh marker.
#[derive(Clone)]
pub struct AuthExecutor {
    inner: Arc<Inner>,
}

impl fmt::Debug for AuthExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthExecutor")
            .field("api_url", &self.inner.api_url.as_str())
            .field("refresh_timeout", &self.inner.refresh_timeout)
            .field("refreshing", &self.is_refreshing())
            .finish_non_exhaustive()
    }
}

/// Builder for [`AuthExecutor`]
#[must_use]
pub struct AuthExecutorBuilder {
    api_url: Url,
    transport: Arc<dyn HttpTransport>,
    credentials: Arc<CredentialStore>,
    issuer: Arc<dyn TokenIssuer>,
    on_failure: Option<FailureHook>,
    refresh_timeout: Option<Duration>,
}

impl AuthExecutorBuilder {
    /// Hook fired once per refresh that fails for good, and whenever a
    /// request is rejected again right after a successful refresh
    pub fn on_failure(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_failure = Some(Arc::new(hook));
        self
    }

    /// Same as [`on_failure`](Self::on_failure) for an already shared hook
    pub fn failure_hook(mut self, hook: Option<FailureHook>) -> Self {
        self.on_failure = hook;
        self
    }

    /// Upper bound for one refresh call; unbounded apart from the transport
    /// timeout when unset
    pub fn refresh_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    pub fn build(self) -> AuthExecutor {
        AuthExecutor {
            inner: Arc::new(Inner {
                api_url: self.api_url,
                transport: self.transport,
                credentials: self.credentials,
                issuer: self.issuer,
                on_failure: self.on_failure,
                refresh_timeout: self.refresh_timeout,
                in_flight: Mutex::new(None),
                next_refresh_id: AtomicU64::new(1),
            }),
        }
    }
}

impl AuthExecutor {
    pub fn builder(
        api_url: Url,
        transport: Arc<dyn HttpTransport>,
        credentials: Arc<CredentialStore>,
        issuer: Arc<dyn TokenIssuer>,
    ) -> AuthExecutorBuilder {
        AuthExecutorBuilder {
            api_url,
            transport,
            credentials,
            issuer,
            on_failure: None,
            refresh_timeout: None,
        }
    }

    #[must_use]
    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.inner.credentials
    }

    #[must_use]
    pub fn api_url(&self) -> &Url {
        &self.inner.api_url
    }

    /// `true` while a refresh operation is in flight
    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        self.inner.in_flight.lock().is_some()
    }

    /// Send `request` to the API with the current credentials.
    ///
    /// A request made while logged out is not sent; it waits for a refresh
    /// that is already running or fails with
    /// [`SessionError::NoCredentials`].
    ///
    /// # Errors
    ///
    /// - [`SessionError::NoCredentials`] if nothing is stored
    /// - [`SessionError::RefreshRejected`] / [`SessionError::RefreshTimedOut`]
    ///   if renewing the credentials failed; they are cleared
    /// - [`SessionError::Request`] for any other failure, including a second
    ///   rejection after a successful refresh
    pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, SessionError> {
        let Some(creds) = self.inner.credentials.current() else {
            tracing::debug!(path = request.path(), "no credentials stored");
            return self.refresh_and_resend(None, request).await;
        };

        match self.send_with(&creds, request.clone()).await {
            Ok(response) => Ok(response),
            Err(e) if e.is_auth_failure() => {
                tracing::debug!(
                    path = request.path(),
                    status = ?e.status(),
                    "request not authorized, credentials need a refresh"
                );
                self.refresh_and_resend(Some(creds.generation()), request)
                    .await
            }
            Err(e) => Err(SessionError::Request(e)),
        }
    }

    /// `GET path` and decode the JSON body
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute); a body that does not decode as `T`
    /// yields [`SessionError::Request`].
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, SessionError> {
        let response = self.execute(ApiRequest::get(path)).await?;
        Ok(response.json()?)
    }

    /// `POST path` with a JSON body and decode the JSON response
    ///
    /// # Errors
    ///
    /// See [`get_json`](Self::get_json).
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, SessionError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.execute(ApiRequest::post(path).json(body)?).await?;
        Ok(response.json()?)
    }

    /// `PUT path` with a JSON body and decode the JSON response
    ///
    /// # Errors
    ///
    /// See [`get_json`](Self::get_json).
    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> Result<T, SessionError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.execute(ApiRequest::put(path).json(body)?).await?;
        Ok(response.json()?)
    }

    /// `DELETE path`, ignoring the response body
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub async fn delete(&self, path: &str) -> Result<(), SessionError> {
        self.execute(ApiRequest::delete(path)).await.map(drop)
    }

    async fn send_with(
        &self,
        creds: &Credentials,
        request: ApiRequest,
    ) -> Result<ApiResponse, TransportError> {
        let request = request.authorization(creds.header().clone());
        self.inner.transport.send(&self.inner.api_url, request).await
    }

    async fn refresh_and_resend(
        &self,
        failed_generation: Option<u64>,
        request: ApiRequest,
    ) -> Result<ApiResponse, SessionError> {
        match self.refresh_ticket(failed_generation) {
            RefreshTicket::Wait(refresh) => refresh.await?,
            RefreshTicket::Resend => {}
            RefreshTicket::Fail(e) => return Err(e),
        }

        let creds = self
            .inner
            .credentials
            .current()
            .ok_or(SessionError::NoCredentials)?;
        tracing::debug!(path = request.path(), "re-sending request");

        match self.send_with(&creds, request).await {
            Ok(response) => Ok(response),
            Err(e) => {
                if e.is_auth_failure() {
                    tracing::warn!(
                        status = ?e.status(),
                        "request rejected again after refresh"
                    );
                    self.inner.notify_failure();
                }
                Err(SessionError::Request(e))
            }
        }
    }

    /// Join the running refresh or start one. Never suspends.
    fn refresh_ticket(&self, failed_generation: Option<u64>) -> RefreshTicket {
        let mut slot = self.inner.in_flight.lock();
        if let Some(op) = slot.as_ref() {
            return RefreshTicket::Wait(op.refresh.clone());
        }

        // A settled refresh updates the store before it releases the marker,
        // so the store read here is current.
        let Some(creds) = self.inner.credentials.current() else {
            return RefreshTicket::Fail(SessionError::NoCredentials);
        };
        match failed_generation {
            Some(generation) if generation == creds.generation() => {}
            _ => return RefreshTicket::Resend,
        }

        let id = self.inner.next_refresh_id.fetch_add(1, Ordering::Relaxed);
        let refresh_token = creds.pair().refresh_token().clone();
        let refresh = run_refresh(Arc::clone(&self.inner), id, creds.generation(), refresh_token)
            .boxed()
            .shared();
        *slot = Some(InFlight {
            id,
            refresh: refresh.clone(),
        });
        drop(slot);

        tokio::spawn(refresh.clone());
        RefreshTicket::Wait(refresh)
    }
}

/// Clears the in-flight marker when the refresh future finishes or is dropped
struct ReleaseInFlight {
    inner: Arc<Inner>,
    id: u64,
}

impl Drop for ReleaseInFlight {
    fn drop(&mut self) {
        let mut slot = self.inner.in_flight.lock();
        if slot.as_ref().is_some_and(|op| op.id == self.id) {
            *slot = None;
        }
    }
}

/// Renew the credentials that had `generation` when the refresh started.
///
/// If the store moved on meanwhile (a new login, a logout), the outcome of
/// this refresh is discarded: it neither overwrites nor clears the newer
/// state, and waiters re-send with whatever is stored now.
async fn run_refresh(
    inner: Arc<Inner>,
    id: u64,
    generation: u64,
    refresh_token: SecretString,
) -> Result<(), SessionError> {
    let _release = ReleaseInFlight {
        inner: Arc::clone(&inner),
        id,
    };

    tracing::info!(refresh_id = id, "refreshing access token");
    let call = inner.issuer.refresh(&refresh_token);
    let renewed = match inner.refresh_timeout {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .unwrap_or_else(|_| Err(SessionError::RefreshTimedOut(limit))),
        None => call.await,
    };

    match renewed.and_then(|pair| inner.credentials.update_if_generation(generation, pair)) {
        Ok(true) => {
            tracing::info!(refresh_id = id, "access token refreshed");
            Ok(())
        }
        Ok(false) => {
            tracing::info!(refresh_id = id, "credentials replaced during refresh, discarding refreshed pair");
            Ok(())
        }
        Err(e) => {
            if !inner.credentials.clear_if_generation(generation) {
                tracing::info!(refresh_id = id, error = %e, "token refresh failed after credentials were replaced, keeping them");
                return Ok(());
            }
            tracing::warn!(refresh_id = id, error = %e, "token refresh failed, clearing credentials");
            inner.notify_failure();
            Err(e)
        }
    }
}
