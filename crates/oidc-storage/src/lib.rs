//! # oidc-storage
//!
//! Storage contract for the OIDC provider.
//!
//! The provider keeps all of its runtime state behind the [`Storage`] trait:
//!
//! - OAuth clients ([`Client`])
//! - Authorization requests and codes ([`AuthRequest`], [`AuthCode`])
//! - Refresh tokens and per-user offline sessions ([`RefreshToken`], [`OfflineSessions`])
//! - Local passwords ([`Password`])
//! - Federated connector configuration ([`Connector`])
//! - The signing key ring ([`Keys`])
//!
//! Backends live in separate crates:
//!
//! - `oidc-storage-datastore` - Cloud Datastore backend
//!
//! Enable the `conformance` feature to get [`conformance::run_tests`], a
//! behavioural suite every backend is expected to pass.

pub mod error;
pub mod storage;
pub mod types;

#[cfg(feature = "conformance")]
pub mod conformance;

pub use error::StorageError;
pub use storage::{GcResult, Storage, Updater};
pub use types::{
    AuthCode, AuthRequest, Claims, Client, Connector, JsonWebKey, Keys, OfflineSessions, Password,
    Pkce, RefreshToken, RefreshTokenRef, VerificationKey, new_id, offline_session_id,
};

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
