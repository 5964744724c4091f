//! Minimal Cloud Datastore client.
//!
//! [`DatastoreClient`] wraps a [`DatastoreApi`] backend with the operations
//! the storage layer needs: named keys in a fixed partition, read-write
//! [`Transaction`]s, kind queries that follow cursors to the end, and batch
//! deletes. Closing the client cancels every in-flight and future call.

mod api;
mod error;
mod http;
mod key;
mod memory;
mod value;

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

pub use api::{DatastoreApi, MoreResults, Mutation, Query, QueryBatch, TransactionId};
pub use error::{DatastoreError, DatastoreResult};
pub use http::HttpDatastore;
pub use key::{Key, PartitionId};
pub use memory::MemoryDatastore;
pub use value::{ArrayValue, EmbeddedEntity, Entity, Properties, Value, ValueKind};

/// Handle to one Datastore partition.
#[derive(Clone)]
pub struct DatastoreClient {
    api: Arc<dyn DatastoreApi>,
    partition: PartitionId,
    cancel: CancellationToken,
}

impl std::fmt::Debug for DatastoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatastoreClient")
            .field("partition", &self.partition)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl DatastoreClient {
    pub fn new(api: Arc<dyn DatastoreApi>, partition: PartitionId) -> Self {
        Self {
            api,
            partition,
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn partition(&self) -> &PartitionId {
        &self.partition
    }

    /// Builds a root key of `kind` named `name` in this client's partition.
    #[must_use]
    pub fn name_key(&self, kind: &str, name: &str) -> Key {
        Key::new(self.partition.clone(), kind, name)
    }

    /// Begins a read-write transaction.
    pub async fn transaction(&self) -> DatastoreResult<Transaction<'_>> {
        let id = self.guard(self.api.begin_transaction()).await?;
        tracing::trace!(transaction = %id, "Began transaction");
        Ok(Transaction {
            client: self,
            id,
            mutations: Vec::new(),
        })
    }

    /// Fetches every entity of `kind`, following query cursors until the
    /// result set is exhausted.
    pub async fn get_all(&self, kind: &str) -> DatastoreResult<Vec<Entity>> {
        let mut query = Query::kind(self.partition.clone(), kind);
        let mut entities = Vec::new();

        loop {
            let batch = self.guard(self.api.run_query(&query)).await?;
            let has_more = batch.has_more();
            entities.extend(batch.entities);
            if !has_more {
                break;
            }
            query.start_cursor = batch.end_cursor;
        }

        Ok(entities)
    }

    /// Deletes `keys` in one non-transactional commit.
    pub async fn delete_multi(&self, keys: Vec<Key>) -> DatastoreResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mutations = keys.into_iter().map(Mutation::Delete).collect();
        self.guard(self.api.commit(mutations, None)).await
    }

    /// Cancels in-flight calls and fails all later ones with
    /// [`DatastoreError::Cancelled`]. Idempotent.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    async fn guard<T>(
        &self,
        call: impl Future<Output = DatastoreResult<T>>,
    ) -> DatastoreResult<T> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(DatastoreError::Cancelled),
            result = call => result,
        }
    }
}

/// An open read-write transaction.
///
/// Reads go to the service immediately; writes are buffered and applied
/// atomically by [`commit`](Self::commit). A transaction that is neither
/// committed nor rolled back simply expires on the service side.
#[derive(Debug)]
pub struct Transaction<'c> {
    client: &'c DatastoreClient,
    id: TransactionId,
    mutations: Vec<Mutation>,
}

impl Transaction<'_> {
    /// Reads `key` within the transaction.
    pub async fn get(&self, key: &Key) -> DatastoreResult<Option<Entity>> {
        let found = self
            .client
            .guard(
                self.client
                    .api
                    .lookup(std::slice::from_ref(key), Some(&self.id)),
            )
            .await?;
        Ok(found.into_iter().find(|entity| &entity.key == key))
    }

    /// Buffers an upsert.
    pub fn put(&mut self, entity: Entity) {
        self.mutations.push(Mutation::Upsert(entity));
    }

    /// Buffers a delete.
    pub fn delete(&mut self, key: Key) {
        self.mutations.push(Mutation::Delete(key));
    }

    /// Applies buffered mutations. Fails with [`DatastoreError::Aborted`]
    /// when a concurrent writer touched an entity this transaction read.
    pub async fn commit(self) -> DatastoreResult<()> {
        let Self {
            client,
            id,
            mutations,
        } = self;
        tracing::trace!(transaction = %id, mutations = mutations.len(), "Committing");
        client
            .guard(client.api.commit(mutations, Some(&id)))
            .await
    }

    /// Discards buffered mutations and releases the transaction.
    pub async fn rollback(self) -> DatastoreResult<()> {
        self.client
            .guard(self.client.api.rollback(&self.id))
            .await
    }

    /// Commits if `result` is `Ok`, otherwise rolls back and hands the
    /// error back unchanged.
    ///
    /// A failed rollback is logged and does not replace the original error.
    pub async fn finish<T, E>(self, result: Result<T, E>) -> Result<T, E>
    where
        E: From<DatastoreError>,
    {
        match result {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(err) => {
                let id = self.id.clone();
                if let Err(rollback_err) = self.rollback().await {
                    tracing::warn!(
                        transaction = %id,
                        error = %rollback_err,
                        "Failed to roll back transaction"
                    );
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(db: Arc<MemoryDatastore>) -> DatastoreClient {
        DatastoreClient::new(db, PartitionId::new("test"))
    }

    fn entity(client: &DatastoreClient, name: &str) -> Entity {
        let mut properties = Properties::new();
        properties.insert("name".to_string(), Value::string(name));
        Entity::new(client.name_key("Client", name), properties)
    }

    #[tokio::test]
    async fn test_transaction_put_then_get() {
        let db = Arc::new(MemoryDatastore::new());
        let client = client(db.clone());
        let key = client.name_key("Client", "a");

        let mut tx = client.transaction().await.unwrap();
        assert!(tx.get(&key).await.unwrap().is_none());
        tx.put(entity(&client, "a"));
        tx.commit().await.unwrap();

        let tx = client.transaction().await.unwrap();
        assert_eq!(tx.get(&key).await.unwrap(), Some(entity(&client, "a")));
        tx.rollback().await.unwrap();
        assert_eq!(db.open_transactions().await, 0);
    }

    #[tokio::test]
    async fn test_finish_rolls_back_on_error() {
        let db = Arc::new(MemoryDatastore::new());
        let client = client(db.clone());

        let mut tx = client.transaction().await.unwrap();
        tx.put(entity(&client, "a"));
        let result: Result<(), DatastoreError> = tx
            .finish(Err(DatastoreError::InvalidEntity("nope".to_string())))
            .await;

        assert!(matches!(result, Err(DatastoreError::InvalidEntity(_))));
        assert!(db.is_empty().await);
        assert_eq!(db.open_transactions().await, 0);
    }

    #[tokio::test]
    async fn test_get_all_follows_cursors() {
        let db = Arc::new(MemoryDatastore::new().with_page_size(3));
        let client = client(db);

        let mut tx = client.transaction().await.unwrap();
        for i in 0..10 {
            tx.put(entity(&client, &format!("c{i:02}")));
        }
        tx.commit().await.unwrap();

        let all = client.get_all("Client").await.unwrap();
        assert_eq!(all.len(), 10);
        assert!(client.get_all("Password").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_multi() {
        let db = Arc::new(MemoryDatastore::new());
        let client = client(db.clone());

        let mut tx = client.transaction().await.unwrap();
        tx.put(entity(&client, "a"));
        tx.put(entity(&client, "b"));
        tx.commit().await.unwrap();

        client.delete_multi(vec![]).await.unwrap();
        client
            .delete_multi(vec![client.name_key("Client", "a")])
            .await
            .unwrap();
        assert_eq!(db.len().await, 1);
    }

    #[tokio::test]
    async fn test_close_cancels_calls() {
        let client = client(Arc::new(MemoryDatastore::new()));
        assert!(!client.is_closed());

        client.close();
        client.close();
        assert!(client.is_closed());

        let err = client.get_all("Client").await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(client.transaction().await.unwrap_err().is_cancelled());
    }
}
