#![allow(clippy::expect_used, clippy::unwrap_used)]

use agentbus_task_store::{
    backends::MemoryTaskStore,
    store::{Cursor, TaskFilter, TaskStore},
    AsyncTask, TaskStatus,
};

#[tokio::test]
async fn full_lifecycle_through_terminal_status() {
    let store = MemoryTaskStore::new();
    let mut task = AsyncTask::new("worker-1");
    let id = task.id;
    store.save(task.clone()).await.expect("save");

    task.transition(TaskStatus::Running).unwrap();
    store.update(task.clone()).await.expect("update to running");
    let fetched = store.get(id).await.expect("get");
    assert_eq!(fetched.status, TaskStatus::Running);
    assert!(fetched.started_at.is_some());
    assert!(fetched.completed_at.is_none());

    task.transition(TaskStatus::Completed).unwrap();
    store.update(task).await.expect("update to completed");
    let fetched = store.get(id).await.expect("get");
    assert_eq!(fetched.status, TaskStatus::Completed);
    assert!(fetched.completed_at.is_some());
}

#[tokio::test]
async fn cannot_transition_out_of_terminal_status() {
    let mut task = AsyncTask::new("worker-1");
    task.transition(TaskStatus::Failed).unwrap();
    let err = task.transition(TaskStatus::Running).unwrap_err();
    assert!(err.to_string().contains("terminal"));
}

#[tokio::test]
async fn list_pagination_respects_filter_across_pages() {
    let store = MemoryTaskStore::new();
    for i in 0..10 {
        let mut task = AsyncTask::new(if i % 2 == 0 { "worker-a" } else { "worker-b" });
        if i % 2 == 0 {
            task.transition(TaskStatus::Running).unwrap();
        }
        store.save(task).await.unwrap();
    }

    let filter = TaskFilter {
        status: Some(TaskStatus::Running),
        ..Default::default()
    };

    let mut cursor = Cursor::default();
    let mut seen = 0;
    loop {
        let page = store.list(filter.clone(), cursor, 2).await.unwrap();
        assert!(page.tasks.iter().all(|t| t.status == TaskStatus::Running));
        seen += page.tasks.len();
        if page.next_cursor.0.is_empty() {
            break;
        }
        cursor = page.next_cursor;
    }
    assert_eq!(seen, 5);
}

#[tokio::test]
async fn list_filters_by_session_id() {
    let store = MemoryTaskStore::new();
    let mut in_session = AsyncTask::new("worker-a");
    in_session.session_id = Some("sess-1".into());
    let in_session_id = in_session.id;
    store.save(in_session).await.unwrap();

    let mut other_session = AsyncTask::new("worker-a");
    other_session.session_id = Some("sess-2".into());
    store.save(other_session).await.unwrap();

    let mut no_session = AsyncTask::new("worker-a");
    no_session.session_id = None;
    store.save(no_session).await.unwrap();

    let filter = TaskFilter {
        session_id: Some("sess-1".into()),
        ..Default::default()
    };
    let page = store.list(filter, Cursor::default(), 10).await.unwrap();
    assert_eq!(page.tasks.len(), 1);
    assert_eq!(page.tasks[0].id, in_session_id);
}

#[tokio::test]
async fn recoverable_returns_only_pending_and_running_ordered_by_priority() {
    let store = MemoryTaskStore::new();

    let mut low_priority_pending = AsyncTask::new("worker-a");
    low_priority_pending.priority = 1;
    let low_id = low_priority_pending.id;

    let mut high_priority_running = AsyncTask::new("worker-b");
    high_priority_running.priority = 5;
    high_priority_running.transition(TaskStatus::Running).unwrap();
    let high_id = high_priority_running.id;

    let mut done = AsyncTask::new("worker-c");
    done.transition(TaskStatus::Completed).unwrap();

    store.save(low_priority_pending).await.unwrap();
    store.save(high_priority_running).await.unwrap();
    store.save(done).await.unwrap();

    let recoverable = store.recoverable().await.unwrap();
    assert_eq!(recoverable.len(), 2);
    assert_eq!(recoverable[0].id, high_id);
    assert_eq!(recoverable[1].id, low_id);
}

#[tokio::test]
async fn update_status_and_update_progress_apply_through_the_trait() {
    let store = MemoryTaskStore::new();
    let task = AsyncTask::new("worker-1");
    let id = task.id;
    store.save(task).await.unwrap();

    store.update_progress(id, 42).await.unwrap();
    assert_eq!(store.get(id).await.unwrap().progress, 42);

    store
        .update_status(id, TaskStatus::Failed, None, Some("boom".into()))
        .await
        .unwrap();
    let fetched = store.get(id).await.unwrap();
    assert_eq!(fetched.status, TaskStatus::Failed);
    assert_eq!(fetched.error.as_deref(), Some("boom"));
}
