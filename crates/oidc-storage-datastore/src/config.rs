//! Backend configuration.
//!
//! Loaded from an optional TOML file, then overridden by `DATASTORE_*`
//! environment variables:
//!
//! ```toml
//! project_id = "my-project"
//! kind_prefix = "dex_"
//! request_timeout = "10s"
//! ```
//!
//! `DATASTORE_EMULATOR_HOST=localhost:8081` points the backend at a local
//! emulator, matching the variable the Cloud SDK uses.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::client::{DatastoreClient, DatastoreError, HttpDatastore, PartitionId};
use crate::storage::DatastoreStorage;

/// Environment variable naming a Datastore emulator, e.g. `localhost:8081`.
pub const EMULATOR_HOST_ENV: &str = "DATASTORE_EMULATOR_HOST";

/// Environment variable holding the project ID.
pub const PROJECT_ID_ENV: &str = "DATASTORE_PROJECT_ID";

const ENV_PREFIX: &str = "DATASTORE";

/// Default public endpoint of the Datastore REST API.
pub const DEFAULT_ENDPOINT: &str = "https://datastore.googleapis.com";

/// Errors raised while loading configuration or opening the backend.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config load error: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to create Datastore client: {0}")]
    Client(#[from] DatastoreError),
}

/// Datastore backend settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatastoreConfig {
    /// GCP project holding the entities.
    pub project_id: String,

    /// Prepended to every kind name.
    pub kind_prefix: String,

    /// Datastore namespace; empty selects the default namespace.
    pub namespace: String,

    /// `host:port` of an emulator. Takes precedence over `endpoint`.
    pub emulator_host: Option<String>,

    pub endpoint: String,

    /// OAuth2 bearer token sent with every request.
    pub access_token: Option<String>,

    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for DatastoreConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            kind_prefix: String::new(),
            namespace: String::new(),
            emulator_host: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            access_token: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl DatastoreConfig {
    /// Loads configuration from `path`, if it exists, and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path
            && path.exists()
        {
            builder = builder.add_source(File::from(path));
        }
        // DATASTORE_PROJECT_ID, DATASTORE_EMULATOR_HOST, DATASTORE_KIND_PREFIX, ...
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .try_parsing(true),
        );

        let merged: Self = builder.build()?.try_deserialize()?;
        merged.validate()?;
        Ok(merged)
    }

    /// Checks that the configuration can be used to open a backend.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.project_id.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "project_id is required (set {PROJECT_ID_ENV})"
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "request_timeout must be greater than zero".to_string(),
            ));
        }

        let base = self.base_url();
        let url = Url::parse(&base)
            .map_err(|e| ConfigError::Invalid(format!("invalid endpoint {base}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(format!(
                "endpoint {base} must use http or https"
            )));
        }
        Ok(())
    }

    /// Root URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> String {
        match self.emulator_host.as_deref().map(str::trim) {
            Some(host) if !host.is_empty() => {
                if host.contains("://") {
                    host.to_string()
                } else {
                    format!("http://{host}")
                }
            }
            _ => self.endpoint.clone(),
        }
    }

    #[must_use]
    pub fn partition(&self) -> PartitionId {
        PartitionId::new(&self.project_id).with_namespace(&self.namespace)
    }

    /// Builds the REST client and wraps it in [`DatastoreStorage`].
    pub fn open(&self) -> Result<DatastoreStorage, ConfigError> {
        self.validate()?;

        let base_url = self.base_url();
        let mut api = HttpDatastore::new(&base_url, &self.project_id, self.request_timeout)?;
        if let Some(token) = &self.access_token {
            api = api.with_access_token(token);
        }

        tracing::info!(
            project = %self.project_id,
            endpoint = %base_url,
            namespace = %self.namespace,
            kind_prefix = %self.kind_prefix,
            "Opened Datastore storage"
        );

        let client = DatastoreClient::new(Arc::new(api), self.partition());
        Ok(DatastoreStorage::new(client, &self.kind_prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(project: &str) -> DatastoreConfig {
        DatastoreConfig {
            project_id: project.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let cfg = DatastoreConfig::default();
        assert_eq!(cfg.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(cfg.request_timeout, Duration::from_secs(30));
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_base_url_prefers_emulator() {
        let mut cfg = config("demo");
        assert_eq!(cfg.base_url(), DEFAULT_ENDPOINT);

        cfg.emulator_host = Some("localhost:8081".to_string());
        assert_eq!(cfg.base_url(), "http://localhost:8081");

        cfg.emulator_host = Some("https://emulator.internal".to_string());
        assert_eq!(cfg.base_url(), "https://emulator.internal");

        cfg.emulator_host = Some("  ".to_string());
        assert_eq!(cfg.base_url(), DEFAULT_ENDPOINT);
    }

    #[test]
    fn test_validate() {
        assert!(config("demo").validate().is_ok());
        assert!(matches!(
            config(" ").validate(),
            Err(ConfigError::Invalid(_))
        ));

        let mut cfg = config("demo");
        cfg.endpoint = "ftp://example.com".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = config("demo");
        cfg.request_timeout = Duration::ZERO;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_partition_and_open() {
        let mut cfg = config("demo");
        cfg.namespace = "tenant".to_string();
        cfg.kind_prefix = "dex_".to_string();

        let partition = cfg.partition();
        assert_eq!(partition.project_id, "demo");
        assert_eq!(partition.namespace_id, "tenant");

        let storage = cfg.open().unwrap();
        assert_eq!(storage.kind_prefix(), "dex_");
        assert_eq!(storage.client().partition(), &partition);
    }
}
