//! Signing key ring.
//!
//! The provider keeps a single [`Keys`] row: the current signing key, its
//! public half and the previously used public keys that are still valid for
//! verifying tokens issued before the last rotation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A JSON Web Key (RFC 7517).
///
/// Only the members shared by every key type are modelled explicitly; the
/// type-specific material (`n`/`e` for RSA, `crv`/`x`/`y` for EC, private
/// parts, ...) is kept in `params` as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JsonWebKey {
    pub kty: String,

    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,

    #[serde(flatten)]
    pub params: BTreeMap<String, serde_json::Value>,
}

/// A previously used public key kept around for verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationKey {
    pub public_key: JsonWebKey,

    /// After this instant the key is dropped from the ring.
    #[serde(with = "time::serde::rfc3339")]
    pub expiry: OffsetDateTime,
}

/// The provider's key ring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Keys {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_key: Option<JsonWebKey>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_key_pub: Option<JsonWebKey>,

    #[serde(default)]
    pub verification_keys: Vec<VerificationKey>,

    /// When the signing key should next be rotated.
    #[serde(with = "time::serde::rfc3339")]
    pub next_rotation: OffsetDateTime,
}

impl Default for Keys {
    /// The empty key ring, due for rotation immediately.
    fn default() -> Self {
        Self {
            signing_key: None,
            signing_key_pub: None,
            verification_keys: Vec::new(),
            next_rotation: OffsetDateTime::UNIX_EPOCH,
        }
    }
}
