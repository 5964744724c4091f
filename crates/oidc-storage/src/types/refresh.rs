//! Refresh tokens and offline sessions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::auth::Claims;

/// A refresh token issued to a client.
///
/// `obsolete_token` holds the previous token value after rotation so a
/// client that lost the rotation response can still retry once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshToken {
    /// Token ID, also the storage key.
    pub id: String,

    /// Current token value.
    pub token: String,

    #[serde(default)]
    pub obsolete_token: String,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    #[serde(with = "time::serde::rfc3339")]
    pub last_used: OffsetDateTime,

    pub client_id: String,

    #[serde(default)]
    pub connector_id: String,

    #[serde(default, with = "crate::types::bytes")]
    pub connector_data: Vec<u8>,

    #[serde(default)]
    pub claims: Claims,

    #[serde(default)]
    pub scopes: Vec<String>,

    #[serde(default)]
    pub nonce: String,
}

/// Reference from an offline session to a refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRef {
    /// ID of the referenced [`RefreshToken`].
    pub id: String,

    pub client_id: String,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    #[serde(with = "time::serde::rfc3339")]
    pub last_used: OffsetDateTime,
}

impl From<&RefreshToken> for RefreshTokenRef {
    fn from(token: &RefreshToken) -> Self {
        Self {
            id: token.id.clone(),
            client_id: token.client_id.clone(),
            created_at: token.created_at,
            last_used: token.last_used,
        }
    }
}

/// All offline sessions of one user through one connector.
///
/// `refresh` maps client IDs to the refresh token currently held by that
/// client. The row is keyed by `user_id|conn_id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OfflineSessions {
    pub user_id: String,

    pub conn_id: String,

    pub refresh: BTreeMap<String, RefreshTokenRef>,

    #[serde(with = "crate::types::bytes")]
    pub connector_data: Vec<u8>,
}

impl OfflineSessions {
    /// Storage key of this row.
    #[must_use]
    pub fn id(&self) -> String {
        super::offline_session_id(&self.user_id, &self.conn_id)
    }
}
