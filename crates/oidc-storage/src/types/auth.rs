//! Authorization request and authorization code entities.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Identity claims collected from a connector during login.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Claims {
    pub user_id: String,
    pub username: String,
    pub preferred_username: String,
    pub email: String,
    pub email_verified: bool,
    pub groups: Vec<String>,
}

/// PKCE (RFC 7636) parameters attached to an authorization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Pkce {
    pub code_challenge: String,
    pub code_challenge_method: String,
}

/// An in-flight authorization request.
///
/// Created when the end user is sent to log in, updated once a connector
/// has authenticated them, and deleted when the code is issued or the
/// request expires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequest {
    /// Request ID, also the storage key.
    pub id: String,

    pub client_id: String,

    #[serde(default)]
    pub response_types: Vec<String>,

    #[serde(default)]
    pub scopes: Vec<String>,

    #[serde(default)]
    pub redirect_uri: String,

    #[serde(default)]
    pub nonce: String,

    #[serde(default)]
    pub state: String,

    /// Show the approval screen even if the user already consented.
    #[serde(default)]
    pub force_approval_prompt: bool,

    /// When the request becomes eligible for garbage collection.
    #[serde(with = "time::serde::rfc3339")]
    pub expiry: OffsetDateTime,

    /// Set once the connector has authenticated the user.
    #[serde(default)]
    pub logged_in: bool,

    #[serde(default)]
    pub claims: Claims,

    #[serde(default)]
    pub connector_id: String,

    /// Opaque connector state, e.g. upstream refresh tokens.
    #[serde(default, with = "crate::types::bytes")]
    pub connector_data: Vec<u8>,

    #[serde(default)]
    pub pkce: Pkce,

    /// Per-request key used to authenticate the approval round-trip.
    #[serde(default, with = "crate::types::bytes")]
    pub hmac_key: Vec<u8>,
}

/// A one-time authorization code issued to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthCode {
    /// The code itself, also the storage key.
    pub id: String,

    pub client_id: String,

    #[serde(default)]
    pub redirect_uri: String,

    #[serde(default)]
    pub nonce: String,

    #[serde(default)]
    pub scopes: Vec<String>,

    #[serde(default)]
    pub connector_id: String,

    #[serde(default, with = "crate::types::bytes")]
    pub connector_data: Vec<u8>,

    #[serde(default)]
    pub claims: Claims,

    /// When the code becomes eligible for garbage collection.
    #[serde(with = "time::serde::rfc3339")]
    pub expiry: OffsetDateTime,

    #[serde(default)]
    pub pkce: Pkce,
}

impl AuthRequest {
    /// Returns `true` if the request expired strictly before `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now > self.expiry
    }
}

impl AuthCode {
    /// Returns `true` if the code expired strictly before `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now > self.expiry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;
    use time::macros::datetime;

    fn code(expiry: OffsetDateTime) -> AuthCode {
        AuthCode {
            id: "code".to_string(),
            client_id: "client".to_string(),
            redirect_uri: "https://localhost/callback".to_string(),
            nonce: String::new(),
            scopes: vec!["openid".to_string()],
            connector_id: "mock".to_string(),
            connector_data: b"{\"some\":\"data\"}".to_vec(),
            claims: Claims::default(),
            expiry,
            pkce: Pkce::default(),
        }
    }

    #[test]
    fn test_expiry_is_strict() {
        let expiry = datetime!(2024-05-01 12:00 UTC);
        let code = code(expiry);

        assert!(!code.is_expired_at(expiry));
        assert!(!code.is_expired_at(expiry - Duration::seconds(1)));
        assert!(code.is_expired_at(expiry + Duration::seconds(1)));
    }

    #[test]
    fn test_connector_data_is_base64() {
        let code = code(datetime!(2024-05-01 12:00 UTC));
        let json = serde_json::to_value(&code).unwrap();

        assert_eq!(json["connectorData"], "eyJzb21lIjoiZGF0YSJ9");
        assert_eq!(json["expiry"], "2024-05-01T12:00:00Z");

        let back: AuthCode = serde_json::from_value(json).unwrap();
        assert_eq!(back, code);
    }
}
