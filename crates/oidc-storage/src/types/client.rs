//! OAuth client registration.

use serde::{Deserialize, Serialize};

/// An OAuth2 client registered with the provider.
///
/// `trusted_peers` lists other clients allowed to mint ID tokens with this
/// client as the audience (cross-client trust).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Client {
    /// Client ID, also the storage key.
    pub id: String,

    /// Client secret. Empty for public clients.
    pub secret: String,

    /// Allowed redirect URIs.
    pub redirect_uris: Vec<String>,

    /// IDs of clients that may issue tokens on behalf of this one.
    pub trusted_peers: Vec<String>,

    /// Public clients cannot keep a secret (native or browser apps).
    pub public: bool,

    /// Display name.
    pub name: String,

    /// Display logo.
    pub logo_url: String,
}
