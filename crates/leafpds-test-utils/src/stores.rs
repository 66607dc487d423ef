use std::sync::Arc;
use tempfile::TempDir;

use leafpds_blob_fs::FsBlobStore;
use leafpds_core::EventStore;
use leafpds_storage_sqlite::{
    SqliteAccountStore, SqliteBlobRefStore, SqliteEventStore, SqliteOAuthStore, SqliteRepoStore,
};

pub struct TestStores {
    pub account_store: SqliteAccountStore,
    pub repo_store: SqliteRepoStore,
    pub event_store: SqliteEventStore,
    pub blob_store: FsBlobStore,
    pub blob_ref_store: SqliteBlobRefStore,
    pub oauth_store: SqliteOAuthStore,
    /// Hold the TempDir to keep it alive for the test's duration.
    pub _tempdir: TempDir,
}

/// Create a fresh set of test stores backed by a tempdir.
///
/// All SQLite stores share the same file-backed database and each runs
/// the same idempotent migration on connect. The blob store writes to a
/// `blobs/` subdirectory inside the same tempdir.
pub async fn create_test_stores() -> TestStores {
    let tempdir = TempDir::new().expect("failed to create tempdir");
    let db_path = tempdir.path().join("test.db");
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());

    let account_store = SqliteAccountStore::connect(&db_url)
        .await
        .expect("failed to connect account store");
    let repo_store = SqliteRepoStore::connect(&db_url)
        .await
        .expect("failed to connect repo store");
    let event_store = SqliteEventStore::connect(&db_url)
        .await
        .expect("failed to connect event store");
    let blob_ref_store = SqliteBlobRefStore::connect(&db_url)
        .await
        .expect("failed to connect blob ref store");
    let oauth_store = SqliteOAuthStore::connect(&db_url)
        .await
        .expect("failed to connect oauth store");

    let blobs_path = tempdir.path().join("blobs");
    let blob_store =
        FsBlobStore::new(blobs_path.to_str().unwrap()).expect("failed to create blob store");

    TestStores {
        account_store,
        repo_store,
        event_store,
        blob_store,
        blob_ref_store,
        oauth_store,
        _tempdir: tempdir,
    }
}

impl TestStores {
    pub fn event_store_arc(&self) -> Arc<dyn EventStore> {
        Arc::new(self.event_store.clone()) as Arc<dyn EventStore>
    }
}
