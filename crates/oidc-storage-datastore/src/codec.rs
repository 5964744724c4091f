//! Opaque blob encoding for nested records.
//!
//! [`Keys`] and [`OfflineSessions`] carry deeply nested, open-ended data
//! (JWKs, maps of refresh token references). They are stored as a single
//! unindexed blob property, [`BLOB_PROPERTY`], holding their JSON encoding.
//! There is no version marker in the blob.

use oidc_storage::{Keys, OfflineSessions, StorageResult};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::client::{Properties, Value, ValueKind};
use crate::entity::{Record, de_error, kind};

/// Name of the property holding the encoded blob.
pub const BLOB_PROPERTY: &str = "JSON";

/// Types persisted as an opaque blob rather than native properties.
pub trait BlobEncoded: Serialize + DeserializeOwned {}

impl BlobEncoded for Keys {}
impl BlobEncoded for OfflineSessions {}

/// Encodes `value` as a blob.
pub fn encode<T: BlobEncoded>(value: &T) -> StorageResult<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

/// Decodes a blob produced by [`encode`].
pub fn decode<T: BlobEncoded>(blob: &[u8]) -> StorageResult<T> {
    Ok(serde_json::from_slice(blob)?)
}

/// Wraps `blob` as the entity's only property.
#[must_use]
pub fn to_properties(blob: Vec<u8>) -> Properties {
    let mut properties = Properties::new();
    properties.insert(BLOB_PROPERTY.to_string(), Value::blob(blob).unindexed());
    properties
}

/// Extracts the blob from an entity written by [`to_properties`].
pub fn from_properties(mut properties: Properties) -> StorageResult<Vec<u8>> {
    match properties.remove(BLOB_PROPERTY).map(|value| value.kind) {
        Some(ValueKind::BlobValue(blob)) => Ok(blob),
        // Some tools write small blobs back as strings.
        Some(ValueKind::StringValue(s)) => Ok(s.into_bytes()),
        Some(other) => Err(de_error(format!(
            "property {BLOB_PROPERTY} holds {other:?}, expected a blob"
        ))),
        None => Err(de_error(format!("missing property {BLOB_PROPERTY}"))),
    }
}

macro_rules! blob_record {
    ($($ty:ty => $kind:expr),+ $(,)?) => {
        $(
            impl Record for $ty {
                const KIND: &'static str = $kind;

                fn to_properties(&self) -> StorageResult<Properties> {
                    Ok(to_properties(encode(self)?))
                }

                fn from_properties(properties: Properties) -> StorageResult<Self> {
                    decode(&from_properties(properties)?)
                }
            }
        )+
    };
}

blob_record! {
    Keys => kind::KEYS,
    OfflineSessions => kind::OFFLINE_SESSIONS,
}

#[cfg(test)]
mod tests {
    use super::*;
    use oidc_storage::{JsonWebKey, RefreshTokenRef, VerificationKey};
    use time::macros::datetime;

    fn jwk(kid: &str) -> JsonWebKey {
        let mut key = JsonWebKey {
            kty: "RSA".to_string(),
            key_use: Some("sig".to_string()),
            kid: Some(kid.to_string()),
            alg: Some("RS256".to_string()),
            ..Default::default()
        };
        key.params
            .insert("n".to_string(), serde_json::json!("0vx7agoebGcQSuu"));
        key.params.insert("e".to_string(), serde_json::json!("AQAB"));
        key
    }

    #[test]
    fn test_keys_round_trip() {
        let keys = Keys {
            signing_key: Some(jwk("current")),
            signing_key_pub: Some(jwk("current")),
            verification_keys: vec![VerificationKey {
                public_key: jwk("previous"),
                expiry: datetime!(2024-06-01 00:00:00 UTC),
            }],
            next_rotation: datetime!(2024-05-02 00:00:00 UTC),
        };

        let props = Record::to_properties(&keys).unwrap();
        assert_eq!(props.len(), 1);
        assert!(props[BLOB_PROPERTY].exclude_from_indexes);

        let back = <Keys as Record>::from_properties(props).unwrap();
        assert_eq!(back, keys);
    }

    #[test]
    fn test_offline_sessions_round_trip() {
        let mut sessions = OfflineSessions {
            user_id: "user1".to_string(),
            conn_id: "github".to_string(),
            connector_data: b"{}".to_vec(),
            ..Default::default()
        };
        sessions.refresh.insert(
            "example-app".to_string(),
            RefreshTokenRef {
                id: "r1".to_string(),
                client_id: "example-app".to_string(),
                created_at: datetime!(2024-05-01 12:00:00 UTC),
                last_used: datetime!(2024-05-01 12:30:00 UTC),
            },
        );

        let blob = encode(&sessions).unwrap();
        let back: OfflineSessions = decode(&blob).unwrap();
        assert_eq!(back, sessions);
    }

    #[test]
    fn test_decode_errors() {
        assert!(decode::<Keys>(b"not json").unwrap_err().is_serialization_error());

        let err = from_properties(Properties::new()).unwrap_err();
        assert!(err.is_serialization_error());

        let mut props = Properties::new();
        props.insert(BLOB_PROPERTY.to_string(), Value::integer(1));
        assert!(from_properties(props).unwrap_err().is_serialization_error());
    }
}
