//! Storage error types.
//!
//! The contract exposes exactly two conditions callers are expected to branch
//! on: [`StorageError::NotFound`] and [`StorageError::AlreadyExists`].
//! Everything a backend cannot map onto those travels through
//! [`StorageError::Backend`] untouched, so callers can still downcast to the
//! backend's own error type.

use std::error::Error as StdError;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The requested row does not exist.
    #[error("not found")]
    NotFound,

    /// A row with the same key already exists.
    #[error("ID already exists")]
    AlreadyExists,

    /// Encoding or decoding an entity failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An updater function declined to produce a new value.
    #[error("Update rejected: {0}")]
    Rejected(String),

    /// Failure reported by the storage backend, passed through as-is.
    #[error("Backend error: {0}")]
    Backend(#[source] Box<dyn StdError + Send + Sync>),
}

impl StorageError {
    /// Create a `Rejected` error.
    #[must_use]
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected(reason.into())
    }

    /// Wrap a backend error.
    #[must_use]
    pub fn backend<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Backend(Box::new(err))
    }

    /// Returns `true` if this is a `NotFound` error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Returns `true` if this is an `AlreadyExists` error.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists)
    }

    /// Returns `true` if this is a serialization error.
    #[must_use]
    pub fn is_serialization_error(&self) -> bool {
        matches!(self, Self::Serialization(_))
    }

    /// Returns `true` if an updater declined the write.
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    /// Returns the backend error if it is of type `E`.
    #[must_use]
    pub fn backend_error<E>(&self) -> Option<&E>
    where
        E: StdError + 'static,
    {
        match self {
            Self::Backend(err) => err.downcast_ref::<E>(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("connection reset")]
    struct Reset;

    #[test]
    fn test_error_display() {
        assert_eq!(StorageError::NotFound.to_string(), "not found");
        assert_eq!(StorageError::AlreadyExists.to_string(), "ID already exists");
        assert_eq!(
            StorageError::rejected("stale token").to_string(),
            "Update rejected: stale token"
        );
    }

    #[test]
    fn test_error_predicates() {
        assert!(StorageError::NotFound.is_not_found());
        assert!(!StorageError::NotFound.is_already_exists());
        assert!(StorageError::AlreadyExists.is_already_exists());
        assert!(StorageError::rejected("no").is_rejected());

        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(StorageError::from(json_err).is_serialization_error());
    }

    #[test]
    fn test_backend_passthrough() {
        let err = StorageError::backend(Reset);
        assert_eq!(err.to_string(), "Backend error: connection reset");
        assert!(err.backend_error::<Reset>().is_some());
        assert!(StorageError::NotFound.backend_error::<Reset>().is_none());
        assert!(std::error::Error::source(&err).is_some());
    }
}
