//! Durable local storage: the file backend behind `LocalStore`.

use std::fs;
use std::sync::Arc;

use progress_sync_core::device::DEVICE_ID_STORAGE_KEY;
use progress_sync_core::storage::pending_sync_key;
use progress_sync_core::{
    DeviceIdentity, FileBackend, InMemoryRemoteStore, LocalStore, SyncConfig, SyncOrchestrator,
    UserRecord,
};
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

fn file_store(path: &std::path::Path) -> LocalStore {
    LocalStore::new(Arc::new(FileBackend::new(path)))
}

#[test]
fn test_values_survive_reopen() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("state").join("store.json");

    let store = file_store(&path);
    assert!(store.set("theme", "dark"));
    assert!(store.set("pending_sync_u1", "true"));
    assert!(store.remove("pending_sync_u1"));

    let reopened = file_store(&path);
    assert_eq!(reopened.get("theme").as_deref(), Some("dark"));
    assert_eq!(reopened.get("pending_sync_u1"), None);

    assert!(reopened.clear());
    assert_eq!(file_store(&path).get("theme"), None);
}

#[test]
fn test_corrupt_file_degrades_without_panicking() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("store.json");
    fs::write(&path, "{ not json").unwrap();

    let store = file_store(&path);
    assert_eq!(store.get("anything"), None);
    assert!(!store.set("anything", "value"));
}

#[test]
fn test_device_id_is_stable_across_restarts() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("store.json");

    let first = DeviceIdentity::new(file_store(&path)).device_id().to_string();
    let second = DeviceIdentity::new(file_store(&path)).device_id().to_string();

    assert_eq!(first, second);
    assert_eq!(file_store(&path).get(DEVICE_ID_STORAGE_KEY), Some(first));
}

#[tokio::test]
async fn test_pending_flag_survives_restart() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("store.json");
    let remote = Arc::new(InMemoryRemoteStore::new());
    remote.set_online(false);

    let orchestrator =
        SyncOrchestrator::new(remote.clone(), file_store(&path), SyncConfig::default());
    orchestrator
        .background_sync("u1", UserRecord::new(), &CancellationToken::new())
        .await;
    drop(orchestrator);

    let restarted = SyncOrchestrator::new(remote.clone(), file_store(&path), SyncConfig::default());
    assert!(restarted.has_pending_changes("u1"));
    assert_eq!(file_store(&path).get(&pending_sync_key("u1")).as_deref(), Some("true"));

    remote.set_online(true);
    let outcome = restarted
        .background_sync("u1", UserRecord::new(), &CancellationToken::new())
        .await;
    assert!(outcome.is_synced());
    assert!(!restarted.has_pending_changes("u1"));
}
