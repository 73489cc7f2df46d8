use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use serde::Serialize;
use url::Url;

use crate::error::TransportError;

/// Description of one HTTP call against an API base URL
///
/// The descriptor is cheap to clone (the body is `Bytes`), which lets the
/// session layer replay it after a credential refresh.
///
/// Header errors are deferred: an invalid header is remembered and reported
/// when the transport tries to send the request.
///
/// # Example
///
/// ```ignore
/// let req = ApiRequest::post("/projects")
///     .query("dry_run", "true")
///     .header("x-request-id", "abc123")
///     .json(&NewProject { name: "demo" })?;
/// ```
#[derive(Clone, Debug)]
#[must_use = "ApiRequest does nothing until it is sent"]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    body: Option<Bytes>,
    error: Option<TransportError>,
}

impl ApiRequest {
    /// Create a request descriptor for an arbitrary method
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
            error: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Append a query parameter
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Add a header; invalid names or values fail the request on send
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if self.error.is_some() {
            return self;
        }

        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            (Err(e), _) => {
                self.error = Some(TransportError::InvalidRequest(format!(
                    "invalid header name '{name}': {e}"
                )));
            }
            (_, Err(e)) => {
                self.error = Some(TransportError::InvalidRequest(format!(
                    "invalid value for header '{name}': {e}"
                )));
            }
        }
        self
    }

    /// Replace the `Authorization` header
    ///
    /// The value is marked sensitive so it is not printed by `Debug`.
    pub fn authorization(mut self, mut value: HeaderValue) -> Self {
        value.set_sensitive(true);
        self.headers.insert(AUTHORIZATION, value);
        self
    }

    /// Set a JSON body
    ///
    /// Sets `Content-Type: application/json` unless one was already provided.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Json`] if serialization fails.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, TransportError> {
        let encoded = serde_json::to_vec(body)?;
        if !self.headers.contains_key(CONTENT_TYPE) {
            self.headers
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        self.body = Some(Bytes::from(encoded));
        Ok(self)
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[must_use]
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Resolve the full URL against `base`
    ///
    /// The path is appended to the base URL (a trailing slash on the base or
    /// a leading slash on the path is not significant), then query parameters
    /// are appended.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidUrl`] if the joined URL does not parse.
    pub fn resolve_url(&self, base: &Url) -> Result<Url, TransportError> {
        let joined = if self.path.is_empty() {
            base.as_str().to_owned()
        } else {
            format!(
                "{}/{}",
                base.as_str().trim_end_matches('/'),
                self.path.trim_start_matches('/')
            )
        };

        let mut url = Url::parse(&joined).map_err(|e| TransportError::InvalidUrl {
            url: joined.clone(),
            reason: e.to_string(),
        })?;

        if !self.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in &self.query {
                pairs.append_pair(name, value);
            }
        }
        Ok(url)
    }

    /// Take the deferred builder error, if any
    pub(crate) fn take_error(&mut self) -> Option<TransportError> {
        self.error.take()
    }

    pub(crate) fn into_parts(self) -> (Method, HeaderMap, Option<Bytes>) {
        (self.method, self.headers, self.body)
    }
}
