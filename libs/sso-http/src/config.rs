use std::time::Duration;

/// Default User-Agent header value
pub const DEFAULT_USER_AGENT: &str = concat!("sso-http/", env!("CARGO_PKG_VERSION"));

/// Maximum body preview size kept in [`TransportError::Status`] (8KB).
///
/// [`TransportError::Status`]: crate::TransportError::Status
pub const ERROR_BODY_PREVIEW_LIMIT: usize = 8 * 1024;

/// Transport security configuration
///
/// Controls whether the transport enforces TLS or allows insecure HTTP.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportSecurity {
    /// Require TLS for all connections (HTTPS only) - default and recommended
    #[default]
    TlsOnly,
    /// Allow insecure HTTP connections (local development and mock servers)
    ///
    /// **WARNING**: never use against a real SSO backend, bearer tokens
    /// travel in clear text.
    AllowInsecureHttp,
}

/// HTTP transport configuration
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Per-request timeout covering connect, headers and body (default: 30 seconds)
    pub request_timeout: Duration,

    /// Maximum response body size in bytes (default: 10 MB)
    pub max_body_size: usize,

    /// User-Agent header value, applied when the request carries none
    pub user_agent: String,

    /// Transport security mode (default: `TlsOnly`)
    pub transport: TransportSecurity,

    /// Timeout for idle pooled connections (default: 90 seconds)
    pub pool_idle_timeout: Option<Duration>,

    /// Maximum number of idle connections per host (default: 8)
    pub pool_max_idle_per_host: usize,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_body_size: 10 * 1024 * 1024,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            transport: TransportSecurity::TlsOnly,
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 8,
        }
    }
}

impl HttpTransportConfig {
    /// Configuration for tests against local mock servers
    ///
    /// Allows plain HTTP and uses a short timeout so broken tests fail fast.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            max_body_size: 1024 * 1024,
            transport: TransportSecurity::AllowInsecureHttp,
            ..Self::default()
        }
    }
}
