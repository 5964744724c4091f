//! Entity keys.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Project and namespace an entity lives in.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionId {
    #[serde(default)]
    pub project_id: String,

    /// Empty selects the default namespace.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace_id: String,
}

impl PartitionId {
    /// Creates a partition in the default namespace of `project_id`.
    #[must_use]
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            namespace_id: String::new(),
        }
    }

    /// Sets the namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace_id = namespace.into();
        self
    }
}

/// Key of a root entity identified by name.
///
/// Only parent-less, name-identified keys are used by the storage layer;
/// the wire form is the REST `Key` message with a single path element.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "KeyRepr", into = "KeyRepr")]
pub struct Key {
    pub partition: PartitionId,
    pub kind: String,
    pub name: String,
}

impl Key {
    #[must_use]
    pub fn new(partition: PartitionId, kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            partition,
            kind: kind.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.partition.namespace_id.is_empty() {
            write!(f, "{}/{}", self.kind, self.name)
        } else {
            write!(
                f,
                "{}:{}/{}",
                self.partition.namespace_id, self.kind, self.name
            )
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyRepr {
    #[serde(default)]
    partition_id: PartitionId,
    #[serde(default)]
    path: Vec<PathElement>,
}

#[derive(Serialize, Deserialize)]
struct PathElement {
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
}

impl From<Key> for KeyRepr {
    fn from(key: Key) -> Self {
        Self {
            partition_id: key.partition,
            path: vec![PathElement {
                kind: key.kind,
                name: Some(key.name),
                id: None,
            }],
        }
    }
}

impl TryFrom<KeyRepr> for Key {
    type Error = String;

    fn try_from(repr: KeyRepr) -> Result<Self, Self::Error> {
        let mut path = repr.path;
        if path.len() != 1 {
            return Err(format!(
                "expected a root key with one path element, got {}",
                path.len()
            ));
        }
        let element = path.remove(0);
        match element.name {
            Some(name) => Ok(Key {
                partition: repr.partition_id,
                kind: element.kind,
                name,
            }),
            None => Err(format!(
                "key of kind {} has a numeric id, expected a name",
                element.kind
            )),
        }
    }
}
