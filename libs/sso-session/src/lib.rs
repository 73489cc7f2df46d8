#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! SSO session client
//!
//! Keeps an access/refresh token pair for one user and sends API requests
//! with it, renewing the pair when the API answers 401/403:
//!
//! - [`CredentialStore`]: the current pair, its decoded claims and the bearer
//!   header, swapped atomically and mirrored to a [`TokenStorage`]
//! - [`TokenIssuer`] / [`SsoIssuerClient`]: the SSO backend calls (login,
//!   refresh, revoke, account creation)
//! - [`AuthExecutor`]: sends requests, runs at most one refresh at a time for
//!   any number of concurrent auth failures, and re-sends each failed request
//!   once
//! - [`SsoSession`]: wires the above together from an [`SsoConfig`]
//!
//! Claims are read from the token without verifying its signature; they are
//! meant for display decisions, never for access control.
//!
//! # Example
//!
//! ```ignore
//! use sso_session::{SecretString, SsoConfig, SsoSession};
//!
//! let session = SsoSession::from_config(&config, None)?;
//! session.login("alice@example.com", &SecretString::new(password)).await?;
//! let me: serde_json::Value = session.executor().get_json("/me").await?;
//! ```

pub mod claims;
pub mod config;
pub mod credentials;
pub mod error;
pub mod executor;
pub mod issuer;
pub mod secret;
pub mod session;
pub mod storage;
pub mod token;

pub use claims::{ANY_SCOPE, ClaimsError, TokenClaims};
pub use config::{ConfigError, HttpSettings, SsoConfig};
pub use credentials::{CredentialStore, Credentials};
pub use error::SessionError;
pub use executor::{AuthExecutor, AuthExecutorBuilder, FailureHook};
pub use issuer::{CreateAccountRequest, SsoIssuerClient, TokenIssuer};
pub use secret::SecretString;
pub use session::SsoSession;
pub use storage::{FileTokenStorage, MemoryTokenStorage, StorageError, TokenStorage};
pub use token::{Role, TokenPair, UnknownRole};

pub use sso_http;
