//! In-process Datastore backend.
//!
//! Mirrors the parts of Datastore semantics the storage layer depends on:
//! optimistic read-write transactions that abort when an entity read in
//! the transaction was written by someone else before commit, and kind
//! queries that page through results with a cursor.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::api::{DatastoreApi, MoreResults, Mutation, Query, QueryBatch, TransactionId};
use super::error::{DatastoreError, DatastoreResult};
use super::key::Key;
use super::value::Entity;

const DEFAULT_PAGE_SIZE: usize = 100;

/// Versions observed by an open transaction. `0` records a key that was
/// never written.
type ReadSet = HashMap<Key, u64>;

#[derive(Debug, Default)]
struct State {
    rows: BTreeMap<Key, Entity>,
    /// Last write of every key ever touched. Deletes bump it too, so a key
    /// that was created and removed again no longer looks untouched.
    versions: HashMap<Key, u64>,
    transactions: HashMap<String, ReadSet>,
    next_transaction: u64,
}

impl State {
    fn version_of(&self, key: &Key) -> u64 {
        self.versions.get(key).copied().unwrap_or(0)
    }
}

/// Datastore kept in memory.
#[derive(Debug)]
pub struct MemoryDatastore {
    state: RwLock<State>,
    version: AtomicU64,
    page_size: usize,
}

impl MemoryDatastore {
    /// Creates an empty datastore.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            version: AtomicU64::new(1),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Sets how many entities a single query batch returns.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn next_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::SeqCst)
    }

    /// Number of stored entities across all kinds.
    pub async fn len(&self) -> usize {
        self.state.read().await.rows.len()
    }

    /// Returns `true` if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.rows.is_empty()
    }

    /// Reads an entity outside of any transaction.
    pub async fn get_raw(&self, key: &Key) -> Option<Entity> {
        self.state
            .read()
            .await
            .rows
            .get(key)
            .cloned()
    }

    /// Number of transactions begun and not yet committed or rolled back.
    pub async fn open_transactions(&self) -> usize {
        self.state.read().await.transactions.len()
    }
}

impl Default for MemoryDatastore {
    fn default() -> Self {
        Self::new()
    }
}

fn unknown_transaction(tx: &TransactionId) -> DatastoreError {
    DatastoreError::invalid_argument(format!("unknown transaction {tx}"))
}

#[async_trait]
impl DatastoreApi for MemoryDatastore {
    async fn begin_transaction(&self) -> DatastoreResult<TransactionId> {
        let mut state = self.state.write().await;
        state.next_transaction += 1;
        let id = format!("tx-{}", state.next_transaction);
        state.transactions.insert(id.clone(), ReadSet::new());
        Ok(TransactionId(id))
    }

    async fn lookup(
        &self,
        keys: &[Key],
        transaction: Option<&TransactionId>,
    ) -> DatastoreResult<Vec<Entity>> {
        let mut state = self.state.write().await;
        let State {
            rows,
            versions,
            transactions,
            ..
        } = &mut *state;

        let mut read_set = match transaction {
            Some(tx) => Some(
                transactions
                    .get_mut(&tx.0)
                    .ok_or_else(|| unknown_transaction(tx))?,
            ),
            None => None,
        };

        let mut found = Vec::new();
        for key in keys {
            if let Some(read_set) = read_set.as_deref_mut() {
                read_set
                    .entry(key.clone())
                    .or_insert_with(|| versions.get(key).copied().unwrap_or(0));
            }
            if let Some(entity) = rows.get(key) {
                found.push(entity.clone());
            }
        }
        Ok(found)
    }

    async fn commit(
        &self,
        mutations: Vec<Mutation>,
        transaction: Option<&TransactionId>,
    ) -> DatastoreResult<()> {
        let mut state = self.state.write().await;

        if let Some(tx) = transaction {
            let read_set = state
                .transactions
                .remove(&tx.0)
                .ok_or_else(|| unknown_transaction(tx))?;

            for (key, seen) in &read_set {
                if state.version_of(key) != *seen {
                    return Err(DatastoreError::Aborted(format!(
                        "{key} was modified concurrently"
                    )));
                }
            }
        }

        for mutation in mutations {
            match mutation {
                Mutation::Upsert(entity) => {
                    let version = self.next_version();
                    state.versions.insert(entity.key.clone(), version);
                    state.rows.insert(entity.key.clone(), entity);
                }
                Mutation::Delete(key) => {
                    if state.rows.remove(&key).is_some() {
                        let version = self.next_version();
                        state.versions.insert(key, version);
                    }
                }
            }
        }
        Ok(())
    }

    async fn rollback(&self, transaction: &TransactionId) -> DatastoreResult<()> {
        self.state
            .write()
            .await
            .transactions
            .remove(&transaction.0)
            .map(|_| ())
            .ok_or_else(|| unknown_transaction(transaction))
    }

    async fn run_query(&self, query: &Query) -> DatastoreResult<QueryBatch> {
        let state = self.state.read().await;

        let mut matching = state
            .rows
            .iter()
            .filter(|(key, _)| key.kind == query.kind && key.partition == query.partition)
            .filter(|(key, _)| {
                query
                    .start_cursor
                    .as_deref()
                    .is_none_or(|cursor| key.name.as_str() > cursor)
            })
            .map(|(_, entity)| entity.clone());

        let entities: Vec<Entity> = matching.by_ref().take(self.page_size).collect();
        let more_results = if matching.next().is_some() {
            MoreResults::NotFinished
        } else {
            MoreResults::NoMoreResults
        };

        Ok(QueryBatch {
            end_cursor: entities.last().map(|entity| entity.key.name.clone()),
            entities,
            more_results,
        })
    }
}
