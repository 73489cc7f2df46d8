use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sso_http::{DEFAULT_USER_AGENT, HttpTransportConfig, TransportSecurity};
use thiserror::Error;
use url::Url;

use crate::error::SessionError;

/// Configuration errors reported by [`SsoConfig::validate`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{field} is required")]
    Missing { field: &'static str },

    #[error("{field} is not a valid URL: {reason}")]
    InvalidUrl { field: &'static str, reason: String },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
}

impl From<ConfigError> for SessionError {
    fn from(e: ConfigError) -> Self {
        SessionError::Config(e.to_string())
    }
}

/// Session client configuration
///
/// Durations are humantime strings (`"30s"`, `"1m 30s"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SsoConfig {
    /// Base URL of the protected API
    pub api_url: String,

    /// Base URL of the SSO backend (`/jwt`, `/accounts`)
    pub sso_url: String,

    /// Token file; tokens are kept in memory only when unset
    pub storage_path: Option<PathBuf>,

    /// Upper bound for one refresh call
    #[serde(with = "humantime_serde::option")]
    pub refresh_timeout: Option<Duration>,

    pub http: HttpSettings,
}

impl Default for SsoConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            sso_url: String::new(),
            storage_path: None,
            refresh_timeout: Some(Duration::from_secs(30)),
            http: HttpSettings::default(),
        }
    }
}

/// Transport settings exposed through configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpSettings {
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    pub max_body_size: usize,
    pub user_agent: String,
    /// Permit `http://` URLs, for local development only
    pub allow_insecure_http: bool,
}

impl Default for HttpSettings {
    fn default() -> Self {
        let transport = HttpTransportConfig::default();
        Self {
            request_timeout: transport.request_timeout,
            max_body_size: transport.max_body_size,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            allow_insecure_http: false,
        }
    }
}

impl SsoConfig {
    /// Check that both URLs parse and every limit is non-zero.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.api_url()?;
        self.sso_url()?;
        if self.http.request_timeout.is_zero() {
            return Err(ConfigError::Zero {
                field: "http.request_timeout",
            });
        }
        if self.http.max_body_size == 0 {
            return Err(ConfigError::Zero {
                field: "http.max_body_size",
            });
        }
        if self.refresh_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::Zero {
                field: "refresh_timeout",
            });
        }
        Ok(())
    }

    /// Parsed [`api_url`](Self::api_url)
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the URL is empty or invalid.
    pub fn api_url(&self) -> Result<Url, ConfigError> {
        parse_url("api_url", &self.api_url)
    }

    /// Parsed [`sso_url`](Self::sso_url)
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the URL is empty or invalid.
    pub fn sso_url(&self) -> Result<Url, ConfigError> {
        parse_url("sso_url", &self.sso_url)
    }

    #[must_use]
    pub fn transport_config(&self) -> HttpTransportConfig {
        HttpTransportConfig {
            request_timeout: self.http.request_timeout,
            max_body_size: self.http.max_body_size,
            user_agent: self.http.user_agent.clone(),
            transport: if self.http.allow_insecure_http {
                TransportSecurity::AllowInsecureHttp
            } else {
                TransportSecurity::TlsOnly
            },
            ..HttpTransportConfig::default()
        }
    }
}

fn parse_url(field: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ConfigError::Missing { field });
    }
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
        field,
        reason: e.to_string(),
    })?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::InvalidUrl {
            field,
            reason: "URL cannot be used as a base".into(),
        });
    }
    Ok(url)
}

/// Serde adapters for humantime durations
mod humantime_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&humantime::format_duration(*d).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        humantime::parse_duration(&raw)
            .map_err(|_| de::Error::invalid_value(de::Unexpected::Str(&raw), &"a duration"))
    }

    pub mod option {
        use std::time::Duration;

        use serde::{Deserialize, Deserializer, Serializer};

        #[allow(clippy::ref_option)]
        pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
            match d {
                Some(d) => super::serialize(d, s),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
            #[derive(Deserialize)]
            struct Wrapped(#[serde(with = "super")] Duration);

            Ok(Option::<Wrapped>::deserialize(d)?.map(|Wrapped(d)| d))
        }
    }
}
