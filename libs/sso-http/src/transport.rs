use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::USER_AGENT;
use http::{HeaderValue, Request, Response};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use url::Url;

use crate::config::{ERROR_BODY_PREVIEW_LIMIT, HttpTransportConfig, TransportSecurity};
use crate::error::TransportError;
use crate::request::ApiRequest;
use crate::response::ApiResponse;

/// Network boundary used by the session layer
///
/// Implementations send one request and report the outcome; they never retry
/// and never look at credentials beyond forwarding the headers they are given.
///
/// Non-2xx responses must be returned as [`TransportError::Status`].
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send `request` resolved against `base_url`
    ///
    /// # Errors
    ///
    /// - [`TransportError::Status`] when the server answers with a non-2xx status
    /// - [`TransportError::NoResponse`] / [`TransportError::Timeout`] when no
    ///   response was received
    /// - other variants for local failures (bad URL, invalid header, body limit)
    async fn send(&self, base_url: &Url, request: ApiRequest)
    -> Result<ApiResponse, TransportError>;
}

type HyperClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// [`HttpTransport`] over a pooled hyper client with rustls
///
/// `HyperTransport` is `Clone + Send + Sync`; clones share the connection pool.
#[derive(Clone)]
pub struct HyperTransport {
    client: HyperClient,
    config: Arc<HttpTransportConfig>,
    user_agent: HeaderValue,
}

impl std::fmt::Debug for HyperTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperTransport")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl HyperTransport {
    /// Create a transport with the default configuration (TLS only)
    ///
    /// # Errors
    ///
    /// Returns an error if TLS initialization fails.
    pub fn new() -> Result<Self, TransportError> {
        Self::with_config(HttpTransportConfig::default())
    }

    /// Create a transport with an explicit configuration
    ///
    /// # Errors
    ///
    /// Returns an error if TLS initialization fails or the user agent is not
    /// a valid header value.
    pub fn with_config(config: HttpTransportConfig) -> Result<Self, TransportError> {
        if config.transport == TransportSecurity::AllowInsecureHttp {
            tracing::warn!(
                "insecure HTTP enabled (TransportSecurity::AllowInsecureHttp); \
                 bearer tokens may be sent in clear text"
            );
        }

        let user_agent = HeaderValue::from_str(&config.user_agent).map_err(|e| {
            TransportError::InvalidRequest(format!("invalid user agent: {e}"))
        })?;

        let https = build_https_connector(config.transport)?;

        let mut builder = Client::builder(TokioExecutor::new());
        // pool_timer is required for pool_idle_timeout to take effect
        builder
            .pool_timer(TokioTimer::new())
            .pool_max_idle_per_host(config.pool_max_idle_per_host);
        if let Some(idle) = config.pool_idle_timeout {
            builder.pool_idle_timeout(idle);
        }
        let client = builder.build::<_, Full<Bytes>>(https);

        Ok(Self {
            client,
            config: Arc::new(config),
            user_agent,
        })
    }

    #[must_use]
    pub fn config(&self) -> &HttpTransportConfig {
        &self.config
    }

    fn check_scheme(&self, url: &Url) -> Result<(), TransportError> {
        match url.scheme() {
            "https" => Ok(()),
            "http" if self.config.transport == TransportSecurity::AllowInsecureHttp => Ok(()),
            other => Err(TransportError::InsecureScheme(other.to_owned())),
        }
    }

    fn build_request(
        &self,
        url: &Url,
        mut request: ApiRequest,
    ) -> Result<Request<Full<Bytes>>, TransportError> {
        if let Some(err) = request.take_error() {
            return Err(err);
        }

        let (method, headers, body) = request.into_parts();
        let mut http_request = Request::builder()
            .method(method)
            .uri(url.as_str())
            .body(body.map(Full::new).unwrap_or_default())
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

        *http_request.headers_mut() = headers;
        if !http_request.headers().contains_key(USER_AGENT) {
            http_request
                .headers_mut()
                .insert(USER_AGENT, self.user_agent.clone());
        }
        Ok(http_request)
    }

    async fn round_trip(&self, request: Request<Full<Bytes>>) -> Result<ApiResponse, TransportError> {
        let response = self.client.request(request).await?;
        let status = response.status();

        if status.is_success() {
            let headers = response.headers().clone();
            let body = read_body_limited(response, self.config.max_body_size).await?;
            return Ok(ApiResponse::new(status, headers, body));
        }

        let preview_limit = self.config.max_body_size.min(ERROR_BODY_PREVIEW_LIMIT);
        let body = match read_body_limited(response, preview_limit).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(TransportError::BodyTooLarge { .. }) => "<body too large for preview>".to_owned(),
            Err(e) => return Err(e),
        };
        Err(TransportError::Status { status, body })
    }
}

#[async_trait]
impl HttpTransport for HyperTransport {
    async fn send(
        &self,
        base_url: &Url,
        request: ApiRequest,
    ) -> Result<ApiResponse, TransportError> {
        let url = request.resolve_url(base_url)?;
        self.check_scheme(&url)?;

        let method = request.method().clone();
        let http_request = self.build_request(&url, request)?;

        tracing::debug!(%method, path = url.path(), "sending request");

        let timeout = self.config.request_timeout;
        let result = tokio::time::timeout(timeout, self.round_trip(http_request))
            .await
            .unwrap_or_else(|_| Err(TransportError::Timeout(timeout)));

        match &result {
            Ok(resp) => tracing::debug!(%method, path = url.path(), status = %resp.status(), "request completed"),
            Err(e) => tracing::debug!(%method, path = url.path(), error = %e, "request failed"),
        }
        result
    }
}

/// Read the whole body, failing with [`TransportError::BodyTooLarge`] past `limit`
async fn read_body_limited(
    response: Response<Incoming>,
    limit: usize,
) -> Result<Bytes, TransportError> {
    let body = Limited::new(response.into_body(), limit);
    match body.collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(err) => {
            if err.downcast_ref::<LengthLimitError>().is_some() {
                Err(TransportError::BodyTooLarge { limit })
            } else {
                Err(TransportError::NoResponse(Arc::from(err)))
            }
        }
    }
}

/// Crypto provider: the globally installed one if any, otherwise aws-lc-rs
fn crypto_provider() -> Arc<rustls::crypto::CryptoProvider> {
    rustls::crypto::CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

fn build_https_connector(
    transport: TransportSecurity,
) -> Result<HttpsConnector<HttpConnector>, TransportError> {
    let builder = hyper_rustls::HttpsConnectorBuilder::new()
        .with_provider_and_webpki_roots(crypto_provider())
        .map_err(|e| TransportError::NoResponse(Arc::new(e)))?;

    let connector = if transport == TransportSecurity::AllowInsecureHttp {
        builder.https_or_http().enable_all_versions().build()
    } else {
        builder.https_only().enable_all_versions().build()
    };
    Ok(connector)
}
