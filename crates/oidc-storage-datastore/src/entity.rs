//! Mapping between storage types and Datastore properties.
//!
//! Most records are stored as native properties so they stay readable in
//! the Datastore console. A record is serialized to a JSON object first,
//! and every member becomes a property:
//!
//! | JSON              | Datastore value                                  |
//! |-------------------|--------------------------------------------------|
//! | object            | embedded entity                                  |
//! | array             | array                                            |
//! | integer           | integer                                          |
//! | other number      | double                                           |
//! | string            | string, unindexed above [`MAX_INDEXED_STRING`]   |
//! | bool / null       | boolean / null                                   |
//!
//! Reading inverts the table. Timestamps written by other tools come back
//! as RFC 3339 strings and blobs as base64, matching the serde forms of the
//! storage types.
//!
//! [`Keys`](oidc_storage::Keys) and [`OfflineSessions`](oidc_storage::OfflineSessions)
//! are the exception; see [`crate::codec`].

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use oidc_storage::{AuthCode, AuthRequest, Client, Connector, Password, RefreshToken, StorageResult};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Number};
use time::format_description::well_known::Rfc3339;

use crate::client::{Properties, Value, ValueKind};

/// Longest string, in bytes, Datastore will index.
pub const MAX_INDEXED_STRING: usize = 1500;

/// Kind names, before the configured prefix is applied.
pub mod kind {
    pub const CLIENT: &str = "Client";
    pub const AUTH_CODE: &str = "AuthCode";
    pub const AUTH_REQUEST: &str = "AuthRequest";
    pub const REFRESH_TOKEN: &str = "RefreshToken";
    pub const PASSWORD: &str = "Password";
    pub const CONNECTOR: &str = "Connector";
    pub const KEYS: &str = "Keys";
    pub const OFFLINE_SESSIONS: &str = "OfflineSessions";
}

/// A storage type persisted as one Datastore entity.
pub trait Record: Sized + Send + Sync {
    /// Unprefixed kind name.
    const KIND: &'static str;

    fn to_properties(&self) -> StorageResult<Properties>;

    fn from_properties(properties: Properties) -> StorageResult<Self>;
}

macro_rules! property_record {
    ($($ty:ty => $kind:expr),+ $(,)?) => {
        $(
            impl Record for $ty {
                const KIND: &'static str = $kind;

                fn to_properties(&self) -> StorageResult<Properties> {
                    to_properties(self)
                }

                fn from_properties(properties: Properties) -> StorageResult<Self> {
                    from_properties(properties)
                }
            }
        )+
    };
}

property_record! {
    Client => kind::CLIENT,
    AuthCode => kind::AUTH_CODE,
    AuthRequest => kind::AUTH_REQUEST,
    RefreshToken => kind::REFRESH_TOKEN,
    Password => kind::PASSWORD,
    Connector => kind::CONNECTOR,
}

/// Serializes `value` into entity properties.
///
/// # Errors
///
/// Fails with [`StorageError::Serialization`](oidc_storage::StorageError::Serialization)
/// if `value` does not serialize to a JSON object.
pub fn to_properties<T: Serialize>(value: &T) -> StorageResult<Properties> {
    match serde_json::to_value(value)? {
        serde_json::Value::Object(members) => Ok(object_to_properties(members)),
        other => Err(ser_error(format!(
            "expected a JSON object at the top level, got {}",
            json_type(&other)
        ))),
    }
}

/// Rebuilds a value from entity properties.
///
/// # Errors
///
/// Fails with [`StorageError::Serialization`](oidc_storage::StorageError::Serialization)
/// if the properties do not describe a `T`.
pub fn from_properties<T: DeserializeOwned>(properties: Properties) -> StorageResult<T> {
    let object = properties_to_object(properties)?;
    Ok(serde_json::from_value(serde_json::Value::Object(object))?)
}

fn object_to_properties(members: Map<String, serde_json::Value>) -> Properties {
    members
        .into_iter()
        .map(|(name, value)| (name, json_to_value(value)))
        .collect()
}

fn json_to_value(value: serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::null(),
        serde_json::Value::Bool(b) => Value::boolean(b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::integer(i),
            None => Value::double(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => {
            let long = s.len() > MAX_INDEXED_STRING;
            let value = Value::string(s);
            if long { value.unindexed() } else { value }
        }
        serde_json::Value::Array(items) => {
            Value::array(items.into_iter().map(json_to_value).collect())
        }
        serde_json::Value::Object(members) => Value::entity(object_to_properties(members)),
    }
}

fn properties_to_object(properties: Properties) -> StorageResult<Map<String, serde_json::Value>> {
    properties
        .into_iter()
        .map(|(name, value)| Ok((name, value_to_json(value)?)))
        .collect()
}

fn value_to_json(value: Value) -> StorageResult<serde_json::Value> {
    Ok(match value.kind {
        ValueKind::NullValue(()) => serde_json::Value::Null,
        ValueKind::BooleanValue(b) => serde_json::Value::Bool(b),
        ValueKind::IntegerValue(i) => serde_json::Value::Number(i.into()),
        ValueKind::DoubleValue(d) => Number::from_f64(d)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ValueKind::TimestampValue(ts) => serde_json::Value::String(
            ts.format(&Rfc3339)
                .map_err(|e| de_error(format!("timestamp out of range: {e}")))?,
        ),
        ValueKind::StringValue(s) => serde_json::Value::String(s),
        ValueKind::BlobValue(bytes) => serde_json::Value::String(STANDARD.encode(bytes)),
        ValueKind::ArrayValue(array) => serde_json::Value::Array(
            array
                .values
                .into_iter()
                .map(value_to_json)
                .collect::<StorageResult<_>>()?,
        ),
        ValueKind::EntityValue(embedded) => {
            serde_json::Value::Object(properties_to_object(embedded.properties)?)
        }
    })
}

fn json_type(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

pub(crate) fn ser_error(msg: String) -> oidc_storage::StorageError {
    <serde_json::Error as serde::ser::Error>::custom(msg).into()
}

pub(crate) fn de_error(msg: String) -> oidc_storage::StorageError {
    <serde_json::Error as serde::de::Error>::custom(msg).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use oidc_storage::{Claims, Pkce};
    use time::macros::datetime;

    fn auth_code() -> AuthCode {
        AuthCode {
            id: "code-1".to_string(),
            client_id: "example-app".to_string(),
            redirect_uri: "https://example.com/callback".to_string(),
            nonce: "n-0S6_WzA2Mj".to_string(),
            scopes: vec!["openid".to_string(), "email".to_string()],
            connector_id: "github".to_string(),
            connector_data: br#"{"some":"data"}"#.to_vec(),
            claims: Claims {
                user_id: "1".to_string(),
                username: "jane".to_string(),
                email: "jane@example.com".to_string(),
                email_verified: true,
                groups: vec!["admins".to_string()],
                ..Default::default()
            },
            expiry: datetime!(2024-05-01 12:00:00 UTC),
            pkce: Pkce::default(),
        }
    }

    #[test]
    fn test_record_maps_to_native_properties() {
        let props = to_properties(&auth_code()).unwrap();

        assert_eq!(props["clientId"], Value::string("example-app"));
        assert_eq!(props["expiry"], Value::string("2024-05-01T12:00:00Z"));
        assert_eq!(
            props["scopes"],
            Value::array(vec![Value::string("openid"), Value::string("email")])
        );
        match &props["claims"].kind {
            ValueKind::EntityValue(claims) => {
                assert_eq!(claims.properties["emailVerified"], Value::boolean(true));
            }
            other => panic!("claims stored as {other:?}"),
        }

        let back: AuthCode = from_properties(props).unwrap();
        assert_eq!(back, auth_code());
    }

    #[test]
    fn test_long_strings_are_unindexed() {
        let mut client = Client {
            id: "a".to_string(),
            logo_url: "x".repeat(MAX_INDEXED_STRING),
            ..Default::default()
        };
        let props = to_properties(&client).unwrap();
        assert!(!props["logoUrl"].exclude_from_indexes);

        client.logo_url.push('x');
        let props = to_properties(&client).unwrap();
        assert!(props["logoUrl"].exclude_from_indexes);

        let back: Client = from_properties(props).unwrap();
        assert_eq!(back, client);
    }

    #[test]
    fn test_native_timestamps_and_blobs_are_read() {
        let mut props = to_properties(&auth_code()).unwrap();
        props.insert(
            "expiry".to_string(),
            Value::timestamp(datetime!(2030-01-01 00:00:00 UTC)),
        );
        props.insert("connectorData".to_string(), Value::blob(b"raw".to_vec()));

        let code: AuthCode = from_properties(props).unwrap();
        assert_eq!(code.expiry, datetime!(2030-01-01 00:00:00 UTC));
        assert_eq!(code.connector_data, b"raw");
    }

    #[test]
    fn test_non_object_is_rejected() {
        let err = to_properties(&vec![1, 2, 3]).unwrap_err();
        assert!(err.is_serialization_error());

        let err = from_properties::<AuthCode>(Properties::new()).unwrap_err();
        assert!(err.is_serialization_error());
    }
}
