//! Datastore client errors.

use oidc_storage::StorageError;

/// Errors returned by the Datastore client and its backends.
#[derive(Debug, thiserror::Error)]
pub enum DatastoreError {
    /// The HTTP request failed or the response could not be read.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with an error status.
    #[error("Datastore error {code} {status}: {message}")]
    Status {
        /// HTTP status code.
        code: u16,
        /// Canonical status name, e.g. `INVALID_ARGUMENT`.
        status: String,
        /// Message from the service.
        message: String,
    },

    /// The transaction lost a race with a concurrent writer.
    #[error("Transaction aborted: {0}")]
    Aborted(String),

    /// The client was closed.
    #[error("Datastore client is closed")]
    Cancelled,

    /// The service returned an entity the client cannot represent.
    #[error("Invalid entity: {0}")]
    InvalidEntity(String),

    /// A request or response body could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DatastoreError {
    /// Create an `INVALID_ARGUMENT` status error.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::Status {
            code: 400,
            status: "INVALID_ARGUMENT".to_string(),
            message: message.into(),
        }
    }

    /// Returns `true` if the operation lost a transaction race.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Aborted(_))
    }

    /// Returns `true` if the client was closed.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<DatastoreError> for StorageError {
    fn from(err: DatastoreError) -> Self {
        StorageError::backend(err)
    }
}

/// Result type for Datastore client operations.
pub type DatastoreResult<T> = Result<T, DatastoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_passes_error_through() {
        let err: StorageError = DatastoreError::Aborted("too much contention".to_string()).into();
        assert!(!err.is_not_found());
        let inner = err
            .backend_error::<DatastoreError>()
            .expect("datastore error is preserved");
        assert!(inner.is_conflict());
    }

    #[test]
    fn test_error_display() {
        let err = DatastoreError::invalid_argument("bad key");
        assert_eq!(
            err.to_string(),
            "Datastore error 400 INVALID_ARGUMENT: bad key"
        );
        assert_eq!(
            DatastoreError::Cancelled.to_string(),
            "Datastore client is closed"
        );
    }
}
