#![allow(clippy::expect_used, clippy::unwrap_used)]

use agentbus_checkpoint_store::{
    backends::{FileCheckpointStore, MemoryCheckpointStore},
    Checkpoint, CheckpointStore,
};
use agentbus_common::agent::AgentState;

fn checkpoint(thread: &str) -> Checkpoint {
    let mut c = Checkpoint::new(thread, "agent-1", AgentState::Running);
    c.message_log.push("hello".to_string());
    c
}

async fn exercise_rollback_never_reuses_versions(store: &dyn CheckpointStore) {
    store.save(checkpoint("thread-1")).await.unwrap();
    store.save(checkpoint("thread-1")).await.unwrap();
    store.save(checkpoint("thread-1")).await.unwrap();

    let rolled = store.rollback("thread-1", 1).await.unwrap();
    assert_eq!(rolled.version, 4, "rollback must append a new version, not reuse version 1");
    assert_eq!(rolled.rollback_from_version(), Some(1));

    let versions = store.list_versions("thread-1").await.unwrap();
    assert_eq!(versions, vec![1, 2, 3, 4]);

    let latest = store.load_latest("thread-1").await.unwrap();
    assert_eq!(latest.version, 4);
}

#[tokio::test]
async fn memory_backend_rollback_never_reuses_versions() {
    let store = MemoryCheckpointStore::new();
    exercise_rollback_never_reuses_versions(&store).await;
}

#[tokio::test]
async fn file_backend_rollback_never_reuses_versions() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileCheckpointStore::open(dir.path()).await.unwrap();
    exercise_rollback_never_reuses_versions(&store).await;
}

#[tokio::test]
async fn threads_are_independent() {
    let store = MemoryCheckpointStore::new();
    store.save(checkpoint("a")).await.unwrap();
    store.save(checkpoint("b")).await.unwrap();
    store.save(checkpoint("b")).await.unwrap();

    assert_eq!(store.load_latest("a").await.unwrap().version, 1);
    assert_eq!(store.load_latest("b").await.unwrap().version, 2);
}

#[tokio::test]
async fn rollback_under_concurrency_produces_no_duplicate_versions() {
    let store = MemoryCheckpointStore::new();
    store.save(checkpoint("t")).await.unwrap();
    store.save(checkpoint("t")).await.unwrap();

    let a = {
        let store = store.clone();
        tokio::spawn(async move { store.rollback("t", 1).await })
    };
    let b = {
        let store = store.clone();
        tokio::spawn(async move { store.save(checkpoint("t")).await })
    };

    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    let versions = store.list_versions("t").await.unwrap();
    let mut deduped = versions.clone();
    deduped.sort_unstable();
    deduped.dedup();
    assert_eq!(versions.len(), deduped.len(), "no version should be assigned twice");
    assert!(versions.len() >= 3);
}
