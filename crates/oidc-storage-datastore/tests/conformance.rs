//! Runs the shared storage conformance suite.

use std::env;
use std::sync::Arc;

use oidc_storage::conformance::run_tests;
use oidc_storage_datastore::config::{EMULATOR_HOST_ENV, PROJECT_ID_ENV};
use oidc_storage_datastore::{DatastoreClient, DatastoreConfig, DatastoreStorage, MemoryDatastore, PartitionId};

#[tokio::test]
async fn conformance_memory() {
    run_tests(|| async {
        // A small page size makes list and GC walk several query batches.
        let api = Arc::new(MemoryDatastore::new().with_page_size(2));
        DatastoreStorage::new(DatastoreClient::new(api, PartitionId::new("test")), "")
    })
    .await;
}

/// Runs against a Datastore emulator when one is configured, e.g.
///
/// ```sh
/// gcloud beta emulators datastore start --no-store-on-disk
/// DATASTORE_EMULATOR_HOST=localhost:8081 DATASTORE_PROJECT_ID=test cargo test
/// ```
#[tokio::test]
async fn conformance_emulator() {
    if env::var(EMULATOR_HOST_ENV).is_err() || env::var(PROJECT_ID_ENV).is_err() {
        eprintln!("{EMULATOR_HOST_ENV} or {PROJECT_ID_ENV} not set, skipping emulator tests");
        return;
    }

    run_tests(|| async {
        let mut config = DatastoreConfig::load(None).expect("load datastore config");
        // Every sub-test starts from empty kinds.
        config.kind_prefix = format!("__TestingDex__{}_", oidc_storage::new_id());
        config.open().expect("open datastore storage")
    })
    .await;
}
