use std::sync::Arc;
use std::time::Duration;

use tasksync::backend::memory::MemoryBackend;
use tasksync::backend::{Backend, Task, TaskList};
use tasksync::storage::LocalStore;
use tasksync::{ConflictStrategy, SyncCoordinator, SyncEngine};

async fn setup(
    sync_interval_minutes: u64,
) -> (SyncCoordinator, Arc<SyncEngine>, Arc<LocalStore>, MemoryBackend) {
    let store = Arc::new(LocalStore::open_in_memory("memory").await.unwrap());
    let remote = MemoryBackend::new();
    let engine = Arc::new(SyncEngine::new(
        Arc::clone(&store),
        Arc::new(remote.clone()),
        ConflictStrategy::ServerWins,
    ));
    let coordinator = SyncCoordinator::new(Arc::clone(&engine), sync_interval_minutes);
    (coordinator, engine, store, remote)
}

/// Polls until the condition holds or a couple of seconds pass.
async fn wait_for<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..40 {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

#[tokio::test]
async fn never_synced_lists_are_stale() {
    let (coordinator, _engine, store, _remote) = setup(5).await;
    let list_id = store.create_task_list("Inbox", "", "").await.unwrap();

    assert!(coordinator.is_stale(&list_id).await.unwrap());
    assert!(coordinator.is_stale("unknown-list").await.unwrap());
}

#[tokio::test]
async fn freshly_synced_lists_are_not_stale() {
    let (coordinator, engine, _store, remote) = setup(5).await;
    let list_id = remote.create_task_list("Inbox", "", "");
    engine.sync().await;

    assert!(!coordinator.is_stale(&list_id).await.unwrap());
}

#[tokio::test]
async fn interval_zero_means_never_stale() {
    let (coordinator, _engine, store, _remote) = setup(0).await;
    let list_id = store.create_task_list("Inbox", "", "").await.unwrap();

    assert!(!coordinator.is_stale(&list_id).await.unwrap());
}

#[tokio::test]
async fn background_push_drains_the_queue() {
    let (coordinator, _engine, store, remote) = setup(5).await;
    let list_id = store.create_task_list("Inbox", "", "").await.unwrap();
    remote.register_list(TaskList {
        id: list_id.clone(),
        name: "Inbox".to_string(),
        ctag: "ctag-0".to_string(),
        ..Default::default()
    });

    store
        .add_task(
            &list_id,
            &Task {
                summary: "Background pushed".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    coordinator.trigger_push_sync();

    let drained = wait_for(|| {
        let store = Arc::clone(&store);
        async move { store.pending_operation_count().await.unwrap() == 0 }
    })
    .await;
    assert!(drained, "background push did not drain the queue");
    assert_eq!(remote.tasks_in(&list_id).len(), 1);
}

#[tokio::test]
async fn background_pull_fetches_remote_tasks() {
    let (coordinator, _engine, store, remote) = setup(5).await;
    let list_id = remote.create_task_list("Inbox", "", "");
    remote
        .add_task(
            &list_id,
            &Task {
                uid: "task-1".to_string(),
                summary: "From remote".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    coordinator.trigger_pull_sync(&list_id);

    let pulled = wait_for(|| {
        let store = Arc::clone(&store);
        let list_id = list_id.clone();
        async move {
            store
                .get_task(&list_id, "task-1")
                .await
                .unwrap()
                .is_some()
        }
    })
    .await;
    assert!(pulled, "background pull did not fetch the remote task");
}

#[tokio::test]
async fn triggers_are_ignored_after_shutdown() {
    let (coordinator, _engine, store, remote) = setup(5).await;
    let list_id = store.create_task_list("Inbox", "", "").await.unwrap();
    remote.register_list(TaskList {
        id: list_id.clone(),
        name: "Inbox".to_string(),
        ctag: "ctag-0".to_string(),
        ..Default::default()
    });
    store
        .add_task(
            &list_id,
            &Task {
                summary: "Never pushed".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    coordinator.shutdown(Duration::from_secs(1)).await;
    coordinator.trigger_push_sync();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(store.pending_operation_count().await.unwrap(), 1);
    assert!(remote.tasks_in(&list_id).is_empty());
}

#[tokio::test]
async fn memory_backend_reports_online() {
    let (coordinator, _engine, _store, _remote) = setup(5).await;
    assert!(coordinator.is_online().await);
}
