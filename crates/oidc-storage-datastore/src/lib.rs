//! # oidc-storage-datastore
//!
//! Google Cloud Datastore backend for [`oidc_storage::Storage`].
//!
//! ## Layout
//!
//! - [`client`] - a small Datastore client: keys, values, transactions and
//!   queries over the REST API ([`HttpDatastore`]) or in memory
//!   ([`MemoryDatastore`])
//! - [`entity`] - maps storage types to native entity properties
//! - [`codec`] - blob encoding for [`Keys`](oidc_storage::Keys) and
//!   [`OfflineSessions`](oidc_storage::OfflineSessions)
//! - [`storage`] - [`DatastoreStorage`], the `Storage` implementation
//! - [`config`] - [`DatastoreConfig`], file and environment configuration
//!
//! ## Example
//!
//! ```no_run
//! use oidc_storage::Storage;
//! use oidc_storage_datastore::DatastoreConfig;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let storage = DatastoreConfig::load(None)?.open()?;
//! let clients = storage.list_clients().await?;
//! println!("{} clients", clients.len());
//! storage.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod entity;
pub mod storage;

pub use client::{
    DatastoreApi, DatastoreClient, DatastoreError, DatastoreResult, HttpDatastore, Key,
    MemoryDatastore, PartitionId, Transaction,
};
pub use codec::BlobEncoded;
pub use config::{ConfigError, DatastoreConfig};
pub use entity::Record;
pub use storage::DatastoreStorage;
