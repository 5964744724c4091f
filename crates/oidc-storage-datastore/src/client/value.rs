//! Property values and entities in their REST wire form.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::key::Key;

/// Named properties of an entity.
pub type Properties = BTreeMap<String, Value>;

/// A stored row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub key: Key,
    #[serde(default)]
    pub properties: Properties,
}

impl Entity {
    #[must_use]
    pub fn new(key: Key, properties: Properties) -> Self {
        Self { key, properties }
    }
}

/// A single property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Value {
    #[serde(flatten)]
    pub kind: ValueKind,

    /// Unindexed values may exceed the 1500 byte index limit.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub exclude_from_indexes: bool,
}

/// The typed payload of a [`Value`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValueKind {
    NullValue(()),
    BooleanValue(bool),
    IntegerValue(#[serde(with = "int64")] i64),
    DoubleValue(f64),
    TimestampValue(#[serde(with = "time::serde::rfc3339")] OffsetDateTime),
    StringValue(String),
    BlobValue(#[serde(with = "blob")] Vec<u8>),
    ArrayValue(ArrayValue),
    EntityValue(EmbeddedEntity),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArrayValue {
    #[serde(default)]
    pub values: Vec<Value>,
}

/// An entity nested inside a property. Carries no key of its own here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedEntity {
    #[serde(default)]
    pub properties: Properties,
}

impl Value {
    fn of(kind: ValueKind) -> Self {
        Self {
            kind,
            exclude_from_indexes: false,
        }
    }

    #[must_use]
    pub fn null() -> Self {
        Self::of(ValueKind::NullValue(()))
    }

    #[must_use]
    pub fn boolean(value: bool) -> Self {
        Self::of(ValueKind::BooleanValue(value))
    }

    #[must_use]
    pub fn integer(value: i64) -> Self {
        Self::of(ValueKind::IntegerValue(value))
    }

    #[must_use]
    pub fn double(value: f64) -> Self {
        Self::of(ValueKind::DoubleValue(value))
    }

    #[must_use]
    pub fn timestamp(value: OffsetDateTime) -> Self {
        Self::of(ValueKind::TimestampValue(value))
    }

    #[must_use]
    pub fn string(value: impl Into<String>) -> Self {
        Self::of(ValueKind::StringValue(value.into()))
    }

    #[must_use]
    pub fn blob(value: impl Into<Vec<u8>>) -> Self {
        Self::of(ValueKind::BlobValue(value.into()))
    }

    #[must_use]
    pub fn array(values: Vec<Value>) -> Self {
        Self::of(ValueKind::ArrayValue(ArrayValue { values }))
    }

    #[must_use]
    pub fn entity(properties: Properties) -> Self {
        Self::of(ValueKind::EntityValue(EmbeddedEntity { properties }))
    }

    /// Marks the value as excluded from indexes.
    #[must_use]
    pub fn unindexed(mut self) -> Self {
        self.exclude_from_indexes = true;
        self
    }
}

/// int64 travels as a decimal string; accept plain numbers too.
mod int64 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &i64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<i64, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(i64),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Ok(n),
            Repr::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

mod blob {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
