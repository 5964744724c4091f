//! [`Storage`] implementation on top of Cloud Datastore.
//!
//! Every record is one root entity, named by its storage key, in kind
//! `{kind_prefix}{Kind}`. Each single-key operation runs in its own
//! read-write transaction; concurrent writers of the same key surface as a
//! backend error wrapping [`DatastoreError::Aborted`](crate::DatastoreError::Aborted).

use async_trait::async_trait;
use oidc_storage::{
    AuthCode, AuthRequest, Client, Connector, GcResult, Keys, OfflineSessions, Password,
    RefreshToken, Storage, StorageError, StorageResult, Updater, offline_session_id,
};
use time::OffsetDateTime;

use crate::client::{DatastoreClient, Entity, Key};
use crate::entity::Record;

/// Name of the singleton [`Keys`] entity.
pub const KEYS_NAME: &str = "allKeys";

/// Datastore-backed storage.
#[derive(Debug, Clone)]
pub struct DatastoreStorage {
    client: DatastoreClient,
    kind_prefix: String,
}

impl DatastoreStorage {
    /// Creates storage over `client`, prefixing every kind with `kind_prefix`.
    ///
    /// The prefix lets several deployments, or test runs, share one project.
    pub fn new(client: DatastoreClient, kind_prefix: impl Into<String>) -> Self {
        Self {
            client,
            kind_prefix: kind_prefix.into(),
        }
    }

    #[must_use]
    pub fn client(&self) -> &DatastoreClient {
        &self.client
    }

    #[must_use]
    pub fn kind_prefix(&self) -> &str {
        &self.kind_prefix
    }

    fn kind_of<T: Record>(&self) -> String {
        format!("{}{}", self.kind_prefix, T::KIND)
    }

    fn key<T: Record>(&self, name: &str) -> Key {
        self.client.name_key(&self.kind_of::<T>(), name)
    }

    // =========================================================================
    // Generic operations
    // =========================================================================

    async fn create<T: Record>(&self, name: &str, value: &T) -> StorageResult<()> {
        let key = self.key::<T>(name);
        tracing::debug!(kind = T::KIND, name, "Creating entity");

        let properties = value.to_properties()?;
        let mut tx = self.client.transaction().await?;
        let result = match tx.get(&key).await {
            Ok(Some(_)) => Err(StorageError::AlreadyExists),
            Ok(None) => {
                tx.put(Entity::new(key, properties));
                Ok(())
            }
            Err(e) => Err(e.into()),
        };
        tx.finish(result).await
    }

    async fn get<T: Record>(&self, name: &str) -> StorageResult<T> {
        let key = self.key::<T>(name);
        tracing::debug!(kind = T::KIND, name, "Getting entity");

        let tx = self.client.transaction().await?;
        let result = match tx.get(&key).await {
            Ok(Some(entity)) => T::from_properties(entity.properties),
            Ok(None) => Err(StorageError::NotFound),
            Err(e) => Err(e.into()),
        };
        tx.finish(result).await
    }

    async fn delete<T: Record>(&self, name: &str) -> StorageResult<()> {
        let key = self.key::<T>(name);
        tracing::debug!(kind = T::KIND, name, "Deleting entity");

        let mut tx = self.client.transaction().await?;
        let result = match tx.get(&key).await {
            Ok(Some(_)) => {
                tx.delete(key);
                Ok(())
            }
            Ok(None) => Err(StorageError::NotFound),
            Err(e) => Err(e.into()),
        };
        tx.finish(result).await
    }

    async fn list<T: Record>(&self) -> StorageResult<Vec<T>> {
        let kind = self.kind_of::<T>();
        let entities = self.client.get_all(&kind).await?;
        tracing::debug!(kind = T::KIND, count = entities.len(), "Listed entities");

        entities
            .into_iter()
            .map(|entity| T::from_properties(entity.properties))
            .collect()
    }

    /// Transactional read-modify-write. When the row is absent, starts from
    /// `missing` if given, otherwise fails with `NotFound`.
    async fn update<T: Record>(
        &self,
        name: &str,
        updater: Updater<'_, T>,
        missing: Option<T>,
    ) -> StorageResult<()> {
        let key = self.key::<T>(name);
        tracing::debug!(kind = T::KIND, name, "Updating entity");

        let mut tx = self.client.transaction().await?;
        let current = match tx.get(&key).await {
            Ok(Some(entity)) => T::from_properties(entity.properties),
            Ok(None) => missing.ok_or(StorageError::NotFound),
            Err(e) => Err(e.into()),
        };
        let result = current
            .and_then(updater)
            .and_then(|updated| updated.to_properties())
            .map(|properties| tx.put(Entity::new(key, properties)));

        if let Err(e) = &result {
            tracing::debug!(kind = T::KIND, name, error = %e, "Update not applied");
        }
        tx.finish(result).await
    }

    async fn collect_expired<T, F>(&self, is_expired: F) -> StorageResult<Vec<Key>>
    where
        T: Record,
        F: Fn(&T) -> bool + Send,
    {
        let entities = self.client.get_all(&self.kind_of::<T>()).await?;
        let mut expired = Vec::new();
        for entity in entities {
            let value = T::from_properties(entity.properties)?;
            if is_expired(&value) {
                expired.push(entity.key);
            }
        }
        Ok(expired)
    }
}

#[async_trait]
impl Storage for DatastoreStorage {
    async fn close(&self) -> StorageResult<()> {
        if !self.client.is_closed() {
            tracing::info!(
                project = %self.client.partition().project_id,
                kind_prefix = %self.kind_prefix,
                "Closing Datastore storage"
            );
        }
        self.client.close();
        Ok(())
    }

    // =========================================================================
    // Create
    // =========================================================================

    async fn create_auth_request(&self, request: &AuthRequest) -> StorageResult<()> {
        self.create(&request.id, request).await
    }

    async fn create_client(&self, client: &Client) -> StorageResult<()> {
        self.create(&client.id, client).await
    }

    async fn create_auth_code(&self, code: &AuthCode) -> StorageResult<()> {
        self.create(&code.id, code).await
    }

    async fn create_refresh(&self, token: &RefreshToken) -> StorageResult<()> {
        self.create(&token.id, token).await
    }

    async fn create_password(&self, password: &Password) -> StorageResult<()> {
        self.create(&password.key(), password).await
    }

    async fn create_offline_sessions(&self, sessions: &OfflineSessions) -> StorageResult<()> {
        self.create(&sessions.id(), sessions).await
    }

    async fn create_connector(&self, connector: &Connector) -> StorageResult<()> {
        self.create(&connector.id, connector).await
    }

    // =========================================================================
    // Get
    // =========================================================================

    async fn get_auth_request(&self, id: &str) -> StorageResult<AuthRequest> {
        self.get(id).await
    }

    async fn get_auth_code(&self, id: &str) -> StorageResult<AuthCode> {
        self.get(id).await
    }

    async fn get_client(&self, id: &str) -> StorageResult<Client> {
        self.get(id).await
    }

    async fn get_keys(&self) -> StorageResult<Keys> {
        self.get(KEYS_NAME).await
    }

    async fn get_refresh(&self, id: &str) -> StorageResult<RefreshToken> {
        self.get(id).await
    }

    async fn get_password(&self, email: &str) -> StorageResult<Password> {
        self.get(&email.to_lowercase()).await
    }

    async fn get_offline_sessions(
        &self,
        user_id: &str,
        conn_id: &str,
    ) -> StorageResult<OfflineSessions> {
        self.get(&offline_session_id(user_id, conn_id)).await
    }

    async fn get_connector(&self, id: &str) -> StorageResult<Connector> {
        self.get(id).await
    }

    // =========================================================================
    // List
    // =========================================================================

    async fn list_clients(&self) -> StorageResult<Vec<Client>> {
        self.list().await
    }

    async fn list_refresh_tokens(&self) -> StorageResult<Vec<RefreshToken>> {
        self.list().await
    }

    async fn list_passwords(&self) -> StorageResult<Vec<Password>> {
        self.list().await
    }

    async fn list_connectors(&self) -> StorageResult<Vec<Connector>> {
        self.list().await
    }

    // =========================================================================
    // Delete
    // =========================================================================

    async fn delete_auth_request(&self, id: &str) -> StorageResult<()> {
        self.delete::<AuthRequest>(id).await
    }

    async fn delete_auth_code(&self, id: &str) -> StorageResult<()> {
        self.delete::<AuthCode>(id).await
    }

    async fn delete_client(&self, id: &str) -> StorageResult<()> {
        self.delete::<Client>(id).await
    }

    async fn delete_refresh(&self, id: &str) -> StorageResult<()> {
        self.delete::<RefreshToken>(id).await
    }

    async fn delete_password(&self, email: &str) -> StorageResult<()> {
        self.delete::<Password>(&email.to_lowercase()).await
    }

    async fn delete_offline_sessions(&self, user_id: &str, conn_id: &str) -> StorageResult<()> {
        self.delete::<OfflineSessions>(&offline_session_id(user_id, conn_id))
            .await
    }

    async fn delete_connector(&self, id: &str) -> StorageResult<()> {
        self.delete::<Connector>(id).await
    }

    // =========================================================================
    // Update
    // =========================================================================

    async fn update_client(&self, id: &str, updater: Updater<'_, Client>) -> StorageResult<()> {
        self.update(id, updater, None).await
    }

    async fn update_keys(&self, updater: Updater<'_, Keys>) -> StorageResult<()> {
        self.update(KEYS_NAME, updater, Some(Keys::default())).await
    }

    async fn update_auth_request(
        &self,
        id: &str,
        updater: Updater<'_, AuthRequest>,
    ) -> StorageResult<()> {
        self.update(id, updater, None).await
    }

    async fn update_refresh_token(
        &self,
        id: &str,
        updater: Updater<'_, RefreshToken>,
    ) -> StorageResult<()> {
        self.update(id, updater, None).await
    }

    async fn update_password(
        &self,
        email: &str,
        updater: Updater<'_, Password>,
    ) -> StorageResult<()> {
        self.update(&email.to_lowercase(), updater, None).await
    }

    async fn update_offline_sessions(
        &self,
        user_id: &str,
        conn_id: &str,
        updater: Updater<'_, OfflineSessions>,
    ) -> StorageResult<()> {
        self.update(&offline_session_id(user_id, conn_id), updater, None)
            .await
    }

    async fn update_connector(
        &self,
        id: &str,
        updater: Updater<'_, Connector>,
    ) -> StorageResult<()> {
        self.update(id, updater, None).await
    }

    // =========================================================================
    // Garbage collection
    // =========================================================================

    async fn garbage_collect(&self, now: OffsetDateTime) -> StorageResult<GcResult> {
        let codes = self
            .collect_expired::<AuthCode, _>(|code| code.is_expired_at(now))
            .await?;
        let requests = self
            .collect_expired::<AuthRequest, _>(|request| request.is_expired_at(now))
            .await?;

        let result = GcResult {
            auth_requests: requests.len() as i64,
            auth_codes: codes.len() as i64,
        };

        let mut keys = codes;
        keys.extend(requests);
        self.client.delete_multi(keys).await?;

        if !result.is_empty() {
            tracing::info!(
                auth_requests = result.auth_requests,
                auth_codes = result.auth_codes,
                "Garbage collected expired entities"
            );
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::client::{DatastoreError, MemoryDatastore, PartitionId};
    use oidc_storage::{Claims, Pkce};
    use time::Duration;
    use time::macros::datetime;
    use tokio_test::{assert_err, assert_ok};

    const NOW: OffsetDateTime = datetime!(2024-05-01 12:00:00 UTC);

    fn storage(db: &Arc<MemoryDatastore>) -> DatastoreStorage {
        let client = DatastoreClient::new(db.clone(), PartitionId::new("test"));
        DatastoreStorage::new(client, "__Test__")
    }

    fn auth_code(id: &str, expiry: OffsetDateTime) -> AuthCode {
        AuthCode {
            id: id.to_string(),
            client_id: "example-app".to_string(),
            redirect_uri: "https://example.com/callback".to_string(),
            nonce: String::new(),
            scopes: vec!["openid".to_string()],
            connector_id: "local".to_string(),
            connector_data: Vec::new(),
            claims: Claims::default(),
            expiry,
            pkce: Pkce::default(),
        }
    }

    #[tokio::test]
    async fn test_kinds_are_prefixed() {
        let db = Arc::new(MemoryDatastore::new());
        let s = storage(&db);
        s.create_auth_code(&auth_code("c1", NOW)).await.unwrap();

        let key = s.client().name_key("__Test__AuthCode", "c1");
        assert!(db.get_raw(&key).await.is_some());
    }

    #[tokio::test]
    async fn test_create_existing_leaves_row_untouched() {
        let db = Arc::new(MemoryDatastore::new());
        let s = storage(&db);
        let original = auth_code("c1", NOW);
        s.create_auth_code(&original).await.unwrap();

        let mut replacement = original.clone();
        replacement.client_id = "other".to_string();
        let err = s.create_auth_code(&replacement).await.unwrap_err();

        assert!(err.is_already_exists());
        assert_eq!(s.get_auth_code("c1").await.unwrap(), original);
        assert_eq!(db.open_transactions().await, 0);
    }

    #[tokio::test]
    async fn test_password_is_keyed_by_lowercase_email() {
        let db = Arc::new(MemoryDatastore::new());
        let s = storage(&db);
        let password = Password {
            email: "Jane@Example.com".to_string(),
            hash: b"$2a$10$hash".to_vec(),
            username: "jane".to_string(),
            user_id: "u1".to_string(),
        };
        s.create_password(&password).await.unwrap();

        let key = s.client().name_key("__Test__Password", "jane@example.com");
        assert!(db.get_raw(&key).await.is_some());
        assert_eq!(s.get_password("JANE@example.COM").await.unwrap(), password);
    }

    #[tokio::test]
    async fn test_keys_stored_as_blob() {
        let db = Arc::new(MemoryDatastore::new());
        let s = storage(&db);
        s.update_keys(Box::new(|mut keys| {
            keys.next_rotation = NOW;
            Ok(keys)
        }))
        .await
        .unwrap();

        let key = s.client().name_key("__Test__Keys", KEYS_NAME);
        let entity = db.get_raw(&key).await.unwrap();
        assert_eq!(
            entity.properties.keys().collect::<Vec<_>>(),
            vec![crate::codec::BLOB_PROPERTY]
        );
        assert_eq!(s.get_keys().await.unwrap().next_rotation, NOW);
    }

    #[tokio::test]
    async fn test_failed_updater_writes_nothing() {
        let db = Arc::new(MemoryDatastore::new());
        let s = storage(&db);
        s.create_auth_code(&auth_code("c1", NOW)).await.unwrap();

        let err = s
            .update_keys(Box::new(|_| Err(StorageError::rejected("no"))))
            .await
            .unwrap_err();
        assert!(err.is_rejected());
        assert_eq!(db.len().await, 1);
        assert_eq!(db.open_transactions().await, 0);
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let db = Arc::new(MemoryDatastore::new());
        let s = storage(&db);

        let err = s
            .update_refresh_token("missing", Box::new(|token| Ok(token)))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(db.is_empty().await);
    }

    #[tokio::test]
    async fn test_concurrent_write_aborts_transaction() {
        let db = Arc::new(MemoryDatastore::new());
        let s = storage(&db);
        s.create_auth_code(&auth_code("c1", NOW)).await.unwrap();

        let key = s.client().name_key("__Test__AuthCode", "c1");
        let tx = s.client().transaction().await.unwrap();
        tx.get(&key).await.unwrap();
        s.delete_auth_code("c1").await.unwrap();
        let err = tx.commit().await.unwrap_err();
        assert!(err.is_conflict());

        let storage_err: StorageError = err.into();
        assert!(
            storage_err
                .backend_error::<DatastoreError>()
                .is_some_and(DatastoreError::is_conflict)
        );
    }

    #[tokio::test]
    async fn test_garbage_collect() {
        let db = Arc::new(MemoryDatastore::new().with_page_size(2));
        let s = storage(&db);

        for i in 0..3 {
            s.create_auth_code(&auth_code(&format!("old{i}"), NOW - Duration::minutes(1)))
                .await
                .unwrap();
        }
        s.create_auth_code(&auth_code("boundary", NOW)).await.unwrap();
        s.create_auth_code(&auth_code("live", NOW + Duration::hours(1)))
            .await
            .unwrap();

        let result = s.garbage_collect(NOW).await.unwrap();
        assert_eq!(
            result,
            GcResult {
                auth_requests: 0,
                auth_codes: 3
            }
        );
        assert!(s.get_auth_code("boundary").await.is_ok());
        assert!(s.get_auth_code("live").await.is_ok());
        assert!(s.get_auth_code("old0").await.unwrap_err().is_not_found());

        assert!(s.garbage_collect(NOW).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_close() {
        let db = Arc::new(MemoryDatastore::new());
        let s = storage(&db);
        assert_ok!(s.close().await);
        assert_ok!(s.close().await);

        let err = assert_err!(s.get_client("a").await);
        assert!(
            err.backend_error::<DatastoreError>()
                .is_some_and(DatastoreError::is_cancelled)
        );
    }
}
