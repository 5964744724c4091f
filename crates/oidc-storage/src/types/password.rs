use serde::{Deserialize, Serialize};

/// A local email/password identity.
///
/// Stored under the lowercased email, so lookups are case-insensitive while
/// `email` keeps whatever casing was supplied at creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Password {
    pub email: String,

    /// Bcrypt hash of the password.
    #[serde(with = "crate::types::bytes")]
    pub hash: Vec<u8>,

    pub username: String,

    pub user_id: String,
}

impl Password {
    /// Storage key of this row.
    #[must_use]
    pub fn key(&self) -> String {
        self.email.to_lowercase()
    }
}
