//! The storage contract.
//!
//! # Implementation Notes
//!
//! Implementations must:
//!
//! - Fail `create_*` with [`StorageError::AlreadyExists`] when the key is taken
//! - Fail `get_*`, `delete_*` and `update_*` with [`StorageError::NotFound`]
//!   when the key is absent ([`Storage::update_keys`] is the exception: it
//!   starts from [`Keys::default`])
//! - Run every `update_*` as an atomic read-modify-write; if the updater
//!   returns an error nothing is written and that error is returned
//! - Treat password emails case-insensitively
//!
//! [`StorageError::AlreadyExists`]: crate::StorageError::AlreadyExists
//! [`StorageError::NotFound`]: crate::StorageError::NotFound

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::StorageResult;
use crate::types::{
    AuthCode, AuthRequest, Client, Connector, Keys, OfflineSessions, Password, RefreshToken,
};

/// Mutation applied by the `update_*` methods.
///
/// Receives the stored value and returns the value to write. Returning an
/// error aborts the update.
pub type Updater<'a, T> = Box<dyn FnOnce(T) -> StorageResult<T> + Send + 'a>;

/// Number of rows removed by a [`Storage::garbage_collect`] sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GcResult {
    pub auth_requests: i64,
    pub auth_codes: i64,
}

impl GcResult {
    /// Returns `true` if nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.auth_requests == 0 && self.auth_codes == 0
    }
}

/// Persistent state of the OIDC provider.
///
/// The trait is object safe; hosts typically hold an `Arc<dyn Storage>`.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Releases the backend. Operations issued afterwards fail.
    async fn close(&self) -> StorageResult<()>;

    async fn create_auth_request(&self, request: &AuthRequest) -> StorageResult<()>;
    async fn create_client(&self, client: &Client) -> StorageResult<()>;
    async fn create_auth_code(&self, code: &AuthCode) -> StorageResult<()>;
    async fn create_refresh(&self, token: &RefreshToken) -> StorageResult<()>;
    async fn create_password(&self, password: &Password) -> StorageResult<()>;
    async fn create_offline_sessions(&self, sessions: &OfflineSessions) -> StorageResult<()>;
    async fn create_connector(&self, connector: &Connector) -> StorageResult<()>;

    async fn get_auth_request(&self, id: &str) -> StorageResult<AuthRequest>;
    async fn get_auth_code(&self, id: &str) -> StorageResult<AuthCode>;
    async fn get_client(&self, id: &str) -> StorageResult<Client>;
    async fn get_keys(&self) -> StorageResult<Keys>;
    async fn get_refresh(&self, id: &str) -> StorageResult<RefreshToken>;
    async fn get_password(&self, email: &str) -> StorageResult<Password>;
    async fn get_offline_sessions(
        &self,
        user_id: &str,
        conn_id: &str,
    ) -> StorageResult<OfflineSessions>;
    async fn get_connector(&self, id: &str) -> StorageResult<Connector>;

    async fn list_clients(&self) -> StorageResult<Vec<Client>>;
    async fn list_refresh_tokens(&self) -> StorageResult<Vec<RefreshToken>>;
    async fn list_passwords(&self) -> StorageResult<Vec<Password>>;
    async fn list_connectors(&self) -> StorageResult<Vec<Connector>>;

    async fn delete_auth_request(&self, id: &str) -> StorageResult<()>;
    async fn delete_auth_code(&self, id: &str) -> StorageResult<()>;
    async fn delete_client(&self, id: &str) -> StorageResult<()>;
    async fn delete_refresh(&self, id: &str) -> StorageResult<()>;
    async fn delete_password(&self, email: &str) -> StorageResult<()>;
    async fn delete_offline_sessions(&self, user_id: &str, conn_id: &str) -> StorageResult<()>;
    async fn delete_connector(&self, id: &str) -> StorageResult<()>;

    async fn update_client(&self, id: &str, updater: Updater<'_, Client>) -> StorageResult<()>;

    /// Updates the key ring, starting from [`Keys::default`] if none is stored.
    async fn update_keys(&self, updater: Updater<'_, Keys>) -> StorageResult<()>;

    async fn update_auth_request(
        &self,
        id: &str,
        updater: Updater<'_, AuthRequest>,
    ) -> StorageResult<()>;
    async fn update_refresh_token(
        &self,
        id: &str,
        updater: Updater<'_, RefreshToken>,
    ) -> StorageResult<()>;
    async fn update_password(
        &self,
        email: &str,
        updater: Updater<'_, Password>,
    ) -> StorageResult<()>;
    async fn update_offline_sessions(
        &self,
        user_id: &str,
        conn_id: &str,
        updater: Updater<'_, OfflineSessions>,
    ) -> StorageResult<()>;
    async fn update_connector(
        &self,
        id: &str,
        updater: Updater<'_, Connector>,
    ) -> StorageResult<()>;

    /// Deletes every auth request and auth code that expired before `now`.
    async fn garbage_collect(&self, now: OffsetDateTime) -> StorageResult<GcResult>;
}
