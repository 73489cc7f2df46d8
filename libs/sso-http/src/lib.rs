#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! HTTP transport for the SSO session client
//!
//! This crate is the network boundary used by `sso-session`:
//! - [`ApiRequest`]: an opaque, cloneable description of one HTTP call
//!   (method, path relative to a base URL, query, JSON body, headers)
//! - [`HttpTransport`]: the trait the session layer sends requests through
//! - [`HyperTransport`]: the production implementation (hyper + rustls)
//!
//! Non-2xx responses are reported as [`TransportError::Status`] so that
//! callers can tell "the server answered" apart from "no response at all"
//! ([`TransportError::NoResponse`], [`TransportError::Timeout`]).
//!
//! # Example
//!
//! ```ignore
//! use sso_http::{ApiRequest, HttpTransport, HyperTransport};
//! use url::Url;
//!
//! let transport = HyperTransport::new()?;
//! let base = Url::parse("https://api.example.com")?;
//! let resp = transport
//!     .send(&base, ApiRequest::get("/users").query("page", "1"))
//!     .await?;
//! let users: Vec<User> = resp.json()?;
//! ```

mod config;
mod error;
mod request;
mod response;
mod transport;

pub use config::{DEFAULT_USER_AGENT, ERROR_BODY_PREVIEW_LIMIT, HttpTransportConfig, TransportSecurity};
pub use error::TransportError;
pub use request::ApiRequest;
pub use response::ApiResponse;
pub use transport::{HttpTransport, HyperTransport};
