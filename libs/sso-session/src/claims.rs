//! Unverified read of access-token claims.
//!
//! The payload segment of the JWT is base64url-decoded and parsed as JSON.
//! The signature is **not** checked: these claims drive UI decisions only
//! (who is logged in, which menus to show). Access control is enforced by
//! the API server, which verifies the token itself.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;
use thiserror::Error;

use crate::token::Role;

/// Scope that matches every application
pub const ANY_SCOPE: &str = "any";

/// Errors raised when an access token cannot be read
#[derive(Debug, Clone, Error)]
pub enum ClaimsError {
    #[error("access token is not a JWT: {0}")]
    Malformed(&'static str),

    #[error("access token payload is not valid base64url: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("access token payload is not valid JSON: {0}")]
    Json(#[source] Arc<serde_json::Error>),
}

/// Claims decoded from an access token
///
/// Decoding is lenient: a claim of an unexpected type reads as absent
/// instead of failing the whole token.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenClaims {
    /// Display identity of the subject
    #[serde(default, deserialize_with = "lenient::string")]
    user_name: Option<String>,

    /// Subject - the `sub` claim; numeric subjects are kept as their decimal form
    #[serde(default, rename = "sub", deserialize_with = "lenient::string")]
    subject: Option<String>,

    /// Role strings in `"<scope>:<role>"` form; `null` or a non-list means none
    #[serde(default, deserialize_with = "lenient::string_list")]
    roles: Vec<String>,

    /// Expiration time - the `exp` claim, seconds since the epoch
    #[serde(default, rename = "exp", deserialize_with = "lenient::seconds")]
    expires_at: Option<i64>,

    /// Additional claims
    #[serde(flatten)]
    extras: serde_json::Map<String, serde_json::Value>,
}

impl TokenClaims {
    /// Decode the payload of `token` without verifying its signature.
    ///
    /// # Errors
    ///
    /// Returns [`ClaimsError`] if the token does not have three segments, the
    /// payload is not base64url, or it is not a JSON object.
    pub fn decode(token: &str) -> Result<Self, ClaimsError> {
        let mut segments = token.split('.');
        let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
            (Some(_), Some(payload), Some(_), None) => payload,
            _ => return Err(ClaimsError::Malformed("expected three dot-separated segments")),
        };
        if payload.is_empty() {
            return Err(ClaimsError::Malformed("empty payload segment"));
        }

        let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
        serde_json::from_slice(&bytes).map_err(|e| ClaimsError::Json(Arc::new(e)))
    }

    /// Build claims directly from role strings (no token)
    #[must_use]
    pub fn with_roles<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            roles: roles.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn user_name(&self) -> Option<&str> {
        self.user_name.as_deref()
    }

    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    #[must_use]
    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    #[must_use]
    pub fn expires_at(&self) -> Option<i64> {
        self.expires_at
    }

    #[must_use]
    pub fn extra(&self, name: &str) -> Option<&serde_json::Value> {
        self.extras.get(name)
    }

    /// `true` if the roles contain `"<scope>:<role>"` or `"any:<role>"`
    ///
    /// The whole string is compared, so scopes may themselves contain `:`.
    #[must_use]
    pub fn has_role(&self, role: Role, scope: &str) -> bool {
        let role = role.as_str();
        self.roles.iter().any(|granted| {
            granted
                .strip_suffix(role)
                .and_then(|rest| rest.strip_suffix(':'))
                .is_some_and(|granted_scope| granted_scope == scope || granted_scope == ANY_SCOPE)
        })
    }

    #[must_use]
    pub fn is_admin(&self, scope: &str) -> bool {
        self.has_role(Role::Admin, scope)
    }

    #[must_use]
    pub fn is_super_admin(&self) -> bool {
        self.is_admin(ANY_SCOPE)
    }
}

mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    /// Strings as-is, numbers in decimal form, anything else absent
    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }

    /// String entries of a list; `null` and non-lists are empty
    pub fn string_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        })
    }

    /// Integral or fractional seconds, truncated; non-numbers are absent
    pub fn seconds<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        let Value::Number(n) = Value::deserialize(d)? else {
            return Ok(None);
        };
        Ok(n.as_i64().or_else(|| n.as_f64().and_then(truncate_seconds)))
    }

    #[allow(clippy::cast_possible_truncation)]
    fn truncate_seconds(secs: f64) -> Option<i64> {
        // i64::MAX as f64 rounds up to 2^63, which is out of range
        let limit = 9_223_372_036_854_775_808.0_f64;
        (secs.is_finite() && secs.abs() < limit).then(|| secs.trunc() as i64)
    }
}


#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::test_support::jwt;
    use super::*;
    use serde_json::json;

    #[test]
    fn has_role_matches_scope_or_wildcard() {
        let claims = TokenClaims::with_roles(["any:admin", "any:user", "md:moderator"]);

        assert!(claims.has_role(Role::Admin, "some-app"));
        assert!(claims.has_role(Role::User, "some-app"));
        assert!(!claims.has_role(Role::Moderator, "some-app"));
        assert!(claims.has_role(Role::Moderator, "md"));
    }

    #[test]
    fn has_role_scoped_grant_does_not_leak() {
        let claims = TokenClaims::with_roles(["any:admin", "md:moderator"]);

        assert!(claims.has_role(Role::Admin, "x"));
        assert!(claims.has_role(Role::Moderator, "md"));
        assert!(!claims.has_role(Role::Moderator, "other"));
    }

    #[test]
    fn has_role_requires_exact_segments() {
        let claims = TokenClaims::with_roles(["md:administrator", "mdx:moderator", "admin"]);

        assert!(!claims.has_role(Role::Admin, "md"));
        assert!(!claims.has_role(Role::Moderator, "md"));
        assert!(!claims.is_super_admin());
    }

    #[test]
    fn admin_helpers() {
        let scoped = TokenClaims::with_roles(["md:admin"]);
        assert!(scoped.is_admin("md"));
        assert!(!scoped.is_admin("other"));
        assert!(!scoped.is_super_admin());

        let global = TokenClaims::with_roles(["any:admin"]);
        assert!(global.is_admin("other"));
        assert!(global.is_super_admin());
    }

    #[test]
    fn no_roles_means_no_access() {
        let claims = TokenClaims::default();
        assert!(!claims.has_role(Role::User, "md"));
    }

    #[test]
    fn decode_reads_payload() {
        let token = jwt(&json!({
            "userName": "alice",
            "sub": "42",
            "roles": ["md:admin"],
            "exp": 1_900_000_000,
            "tenant": "acme"
        }));

        let claims = TokenClaims::decode(&token).unwrap();
        assert_eq!(claims.user_name(), Some("alice"));
        assert_eq!(claims.subject(), Some("42"));
        assert_eq!(claims.roles(), ["md:admin".to_owned()]);
        assert_eq!(claims.expires_at(), Some(1_900_000_000));
        assert_eq!(claims.extra("tenant"), Some(&json!("acme")));
        assert!(claims.is_admin("md"));
    }

    #[test]
    fn decode_tolerates_padding() {
        let header = URL_SAFE_NO_PAD.encode(b"{}");
        let payload = format!("{}==", URL_SAFE_NO_PAD.encode(br#"{"userName":"bo"}"#));
        let token = format!("{header}.{payload}.sig");
        assert_eq!(TokenClaims::decode(&token).unwrap().user_name(), Some("bo"));
    }

    #[test]
    fn decode_rejects_non_jwt() {
        assert!(matches!(
            TokenClaims::decode("opaque-token"),
            Err(ClaimsError::Malformed(_))
        ));
        assert!(matches!(
            TokenClaims::decode("a..c"),
            Err(ClaimsError::Malformed(_))
        ));
        assert!(matches!(
            TokenClaims::decode("a.b.c.d"),
            Err(ClaimsError::Malformed(_))
        ));
    }

    #[test]
    fn has_role_allows_colons_in_scope() {
        let claims = TokenClaims::with_roles(["org:app:admin"]);

        assert!(claims.has_role(Role::Admin, "org:app"));
        assert!(!claims.has_role(Role::Admin, "org"));
        assert!(!claims.has_role(Role::Admin, "app"));
    }

    #[test]
    fn null_roles_mean_no_roles() {
        let claims = TokenClaims::decode(&jwt(&json!({"userName": "a", "roles": null}))).unwrap();
        assert_eq!(claims.user_name(), Some("a"));
        assert!(claims.roles().is_empty());

        let claims = TokenClaims::decode(&jwt(&json!({"roles": "any:admin"}))).unwrap();
        assert!(claims.roles().is_empty());

        let claims = TokenClaims::decode(&jwt(&json!({"roles": ["md:admin", 7, null]}))).unwrap();
        assert_eq!(claims.roles(), ["md:admin".to_owned()]);
    }

    #[test]
    fn numeric_subject_is_kept_as_text() {
        let claims = TokenClaims::decode(&jwt(&json!({"sub": 42}))).unwrap();
        assert_eq!(claims.subject(), Some("42"));

        let claims = TokenClaims::decode(&jwt(&json!({"sub": {"id": 1}}))).unwrap();
        assert_eq!(claims.subject(), None);
    }

    #[test]
    fn fractional_expiry_is_truncated() {
        let claims = TokenClaims::decode(&jwt(&json!({"exp": 1.7e9}))).unwrap();
        assert_eq!(claims.expires_at(), Some(1_700_000_000));

        let claims = TokenClaims::decode(&jwt(&json!({"exp": 1_700_000_000.75}))).unwrap();
        assert_eq!(claims.expires_at(), Some(1_700_000_000));

        let claims = TokenClaims::decode(&jwt(&json!({"exp": "soon"}))).unwrap();
        assert_eq!(claims.expires_at(), None);

        let claims = TokenClaims::decode(&jwt(&json!({"exp": null}))).unwrap();
        assert_eq!(claims.expires_at(), None);
    }

    #[test]
    fn decode_rejects_bad_payload() {
        assert!(matches!(
            TokenClaims::decode("a.!!!.c"),
            Err(ClaimsError::Encoding(_))
        ));

        let not_json = format!("a.{}.c", URL_SAFE_NO_PAD.encode(b"not json"));
        assert!(matches!(
            TokenClaims::decode(&not_json),
            Err(ClaimsError::Json(_))
        ));
    }
}
