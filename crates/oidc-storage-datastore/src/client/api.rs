//! Transport seam between the client and a concrete Datastore backend.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::DatastoreResult;
use super::key::{Key, PartitionId};
use super::value::Entity;

/// Opaque handle of an open transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionId(pub String);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A write applied at commit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Mutation {
    /// Insert or overwrite the entity.
    Upsert(Entity),
    /// Remove the entity; a no-op if it does not exist.
    Delete(Key),
}

/// A kind query, optionally resuming from a cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub partition: PartitionId,
    pub kind: String,
    pub start_cursor: Option<String>,
}

impl Query {
    /// Query for every entity of `kind`.
    #[must_use]
    pub fn kind(partition: PartitionId, kind: impl Into<String>) -> Self {
        Self {
            partition,
            kind: kind.into(),
            start_cursor: None,
        }
    }
}

/// Why a query batch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MoreResults {
    NotFinished,
    MoreResultsAfterLimit,
    MoreResultsAfterCursor,
    NoMoreResults,
    #[serde(other)]
    MoreResultsTypeUnspecified,
}

/// One page of query results.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryBatch {
    pub entities: Vec<Entity>,
    pub end_cursor: Option<String>,
    pub more_results: MoreResults,
}

impl QueryBatch {
    /// Returns `true` if another page follows `end_cursor`.
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.more_results == MoreResults::NotFinished && self.end_cursor.is_some()
    }
}

/// Low-level Datastore operations.
///
/// Implementations:
/// - [`HttpDatastore`](super::http::HttpDatastore) - Cloud Datastore REST API or emulator
/// - [`MemoryDatastore`](super::memory::MemoryDatastore) - in-process, for tests and development
#[async_trait]
pub trait DatastoreApi: Send + Sync {
    /// Starts a read-write transaction.
    async fn begin_transaction(&self) -> DatastoreResult<TransactionId>;

    /// Fetches the entities that exist among `keys`. Missing keys are
    /// simply absent from the result.
    async fn lookup(
        &self,
        keys: &[Key],
        transaction: Option<&TransactionId>,
    ) -> DatastoreResult<Vec<Entity>>;

    /// Applies `mutations`, atomically when `transaction` is set.
    ///
    /// Fails with [`DatastoreError::Aborted`](super::DatastoreError::Aborted)
    /// if an entity read in the transaction changed since.
    async fn commit(
        &self,
        mutations: Vec<Mutation>,
        transaction: Option<&TransactionId>,
    ) -> DatastoreResult<()>;

    /// Abandons a transaction.
    async fn rollback(&self, transaction: &TransactionId) -> DatastoreResult<()>;

    /// Runs one page of a kind query.
    async fn run_query(&self, query: &Query) -> DatastoreResult<QueryBatch>;
}
