use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::secret::SecretString;

/// Access/refresh token pair issued by the SSO backend.
///
/// Immutable: a refresh or login produces a new pair that replaces the old
/// one wholesale.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenPair {
    access_token: SecretString,
    refresh_token: SecretString,
}

impl TokenPair {
    pub fn new(access_token: impl Into<SecretString>, refresh_token: impl Into<SecretString>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }

    #[must_use]
    pub fn access_token(&self) -> &SecretString {
        &self.access_token
    }

    #[must_use]
    pub fn refresh_token(&self) -> &SecretString {
        &self.refresh_token
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &self.access_token)
            .field("refresh_token", &self.refresh_token)
            .finish()
    }
}

/// Wire shape of the token endpoints: `{ "token": ..., "refreshToken": ... }`.
///
/// `Deserialize`-only so the raw tokens cannot be serialized into logs.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TokenPairResponse {
    pub token: String,
    pub refresh_token: String,
}

impl From<TokenPairResponse> for TokenPair {
    fn from(wire: TokenPairResponse) -> Self {
        Self::new(wire.token, wire.refresh_token)
    }
}

/// Role names carried in the `roles` claim as `"<scope>:<role>"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Moderator,
    Admin,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Moderator => "moderator",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown role name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "moderator" => Ok(Role::Moderator),
            "admin" => Ok(Role::Admin),
            other => Err(UnknownRole(other.to_owned())),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn deserialize_wire_shape() {
        let json = r#"{"token":"acc","refreshToken":"ref","expiresIn":300}"#;
        let pair: TokenPair = serde_json::from_str::<TokenPairResponse>(json)
            .unwrap()
            .into();
        assert_eq!(pair.access_token().expose(), "acc");
        assert_eq!(pair.refresh_token().expose(), "ref");
    }

    #[test]
    fn deserialize_rejects_missing_refresh_token() {
        let json = r#"{"token":"acc"}"#;
        assert!(serde_json::from_str::<TokenPairResponse>(json).is_err());
    }

    #[test]
    fn debug_does_not_reveal_tokens() {
        let pair = TokenPair::new("secret-access", "secret-refresh");
        let dbg = format!("{pair:?}");
        assert!(!dbg.contains("secret-access"));
        assert!(!dbg.contains("secret-refresh"));
    }

    #[test]
    fn role_round_trips_through_str() {
        for role in [Role::User, Role::Moderator, Role::Admin] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert_eq!(
            "owner".parse::<Role>().unwrap_err(),
            UnknownRole("owner".into())
        );
    }
}
