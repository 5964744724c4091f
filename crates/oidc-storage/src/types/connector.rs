use serde::{Deserialize, Serialize};

/// Configuration of an upstream identity connector (LDAP, GitHub, OIDC, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Connector {
    /// Connector ID, also the storage key.
    pub id: String,

    /// Connector implementation, e.g. `"ldap"`.
    #[serde(rename = "type")]
    pub connector_type: String,

    /// Display name.
    pub name: String,

    /// Opaque version used by hosts that sync connectors from elsewhere.
    pub resource_version: String,

    /// Connector-specific configuration, usually JSON.
    #[serde(with = "crate::types::bytes")]
    pub config: Vec<u8>,
}
