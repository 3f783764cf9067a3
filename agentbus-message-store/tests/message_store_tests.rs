#![allow(clippy::expect_used, clippy::unwrap_used)]

use agentbus_message_store::{
    backends::{FileMessageStore, MemoryMessageStore},
    message::MessageType,
    store::{Cursor, MessageStore},
    Message,
};
use agentbus_retry::RetryPolicy;

#[tokio::test]
async fn file_backend_survives_simulated_crash_between_writes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("messages/index.json");

    let store = FileMessageStore::open(&path, RetryPolicy::default())
        .await
        .expect("open");

    let a = Message::new("coordinator", "worker-1", MessageType::Proposal, "task a");
    let b = Message::new("coordinator", "worker-1", MessageType::Proposal, "task b");
    let a_id = a.id;
    let b_id = b.id;
    store.save(a).await.expect("save a");
    store.save(b).await.expect("save b");
    store.ack(a_id).await.expect("ack a");

    // Simulate a process restart: a fresh store instance opened against the
    // same index file must see exactly the persisted state.
    drop(store);
    let reopened = FileMessageStore::open(&path, RetryPolicy::default())
        .await
        .expect("reopen");

    let fetched_a = reopened.get(a_id).await.expect("get a");
    assert!(fetched_a.is_acked());
    let fetched_b = reopened.get(b_id).await.expect("get b");
    assert!(!fetched_b.is_acked());

    let pending = reopened.pending("worker-1", 10).await.expect("pending");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, b_id);
}

#[tokio::test]
async fn pending_selection_skips_items_not_yet_due_for_retry() {
    let policy = RetryPolicy {
        initial_backoff_secs: 3600,
        ..RetryPolicy::default()
    };
    let store = MemoryMessageStore::new(policy);

    let mut msg = Message::new("coordinator", "worker-1", MessageType::Proposal, "slow");
    msg.retry_count = 1;
    msg.last_retry_at = Some(chrono::Utc::now());
    let msg_id = msg.id;
    store.save(msg).await.expect("save");

    let pending = store.pending("worker-1", 10).await.expect("pending");
    assert!(
        pending.is_empty(),
        "message with an hour-long backoff and a retry a moment ago should not be pending yet"
    );

    // increment_retry bumps the counter but also resets last_retry_at to
    // now, so it remains not-yet-due under the same policy.
    store.increment_retry(msg_id).await.expect("increment");
    let fetched = store.get(msg_id).await.expect("get");
    assert_eq!(fetched.retry_count, 2);
}

#[tokio::test]
async fn save_batch_rejects_entirely_when_any_id_collides() {
    let store = MemoryMessageStore::new(RetryPolicy::default());

    let existing = Message::new("a", "worker-1", MessageType::Proposal, "first");
    store.save(existing.clone()).await.expect("save existing");

    let fresh_one = Message::new("a", "worker-1", MessageType::Proposal, "second");
    let fresh_two = Message::new("a", "worker-1", MessageType::Proposal, "third");
    let fresh_ids = [fresh_one.id, fresh_two.id];

    let result = store
        .save_batch(vec![fresh_one, existing, fresh_two])
        .await;
    assert!(result.is_err());

    for id in fresh_ids {
        assert!(
            store.get(id).await.is_err(),
            "no message from a rejected batch should be persisted"
        );
    }
}

#[tokio::test]
async fn list_cursor_pagination_terminates_with_empty_cursor() {
    let store = MemoryMessageStore::new(RetryPolicy::default());
    for i in 0..7 {
        store
            .save(Message::new(
                "a",
                "worker-1",
                MessageType::Proposal,
                format!("msg {i}"),
            ))
            .await
            .expect("save");
    }

    let mut cursor = Cursor::default();
    let mut seen = 0;
    loop {
        let page = store.list("worker-1", cursor, 3).await.expect("list");
        seen += page.messages.len();
        if page.next_cursor.0.is_empty() {
            break;
        }
        cursor = page.next_cursor;
    }
    assert_eq!(seen, 7);
}
