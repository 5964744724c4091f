//! Entity types persisted by the storage layer.
//!
//! All types serialize with `camelCase` field names, RFC 3339 timestamps and
//! base64-encoded byte fields, so a JSON rendering of any entity is stable
//! across backends.

pub mod auth;
pub mod client;
pub mod connector;
pub mod keys;
pub mod password;
pub mod refresh;

pub(crate) mod bytes;

pub use auth::{AuthCode, AuthRequest, Claims, Pkce};
pub use client::Client;
pub use connector::Connector;
pub use keys::{JsonWebKey, Keys, VerificationKey};
pub use password::Password;
pub use refresh::{OfflineSessions, RefreshToken, RefreshTokenRef};

/// Generates a new random identifier.
///
/// Identifiers are 128 random bits rendered as lowercase hex, which keeps
/// them safe for URLs and for use as store key names.
#[must_use]
pub fn new_id() -> String {
    let mut bytes = [0u8; 16];
    rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
    hex::encode(bytes)
}

/// Builds the composite key of an [`OfflineSessions`] row.
#[must_use]
pub fn offline_session_id(user_id: &str, conn_id: &str) -> String {
    format!("{user_id}|{conn_id}")
}
