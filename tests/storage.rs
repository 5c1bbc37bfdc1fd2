use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use tasksync::backend::{Task, TaskFilter, TaskStatus};
use tasksync::storage::{LocalStore, QueueOperation, StoreError};

async fn open_store() -> Arc<LocalStore> {
    Arc::new(LocalStore::open_in_memory("memory").await.unwrap())
}

fn sample_task(uid: &str, summary: &str) -> Task {
    Task {
        uid: uid.to_string(),
        summary: summary.to_string(),
        ..Default::default()
    }
}

fn seconds(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap()
}

#[tokio::test]
async fn open_on_disk_creates_file_and_records_schema_version() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nested").join("tasks.db");

    let store = LocalStore::open("memory", Some(&db_path)).await.unwrap();
    assert!(db_path.exists(), "database file should be created");
    assert_eq!(store.schema_version().await.unwrap(), 1);
    store.close().await;

    // Re-opening must not insert a second version row.
    let store = LocalStore::open("memory", Some(&db_path)).await.unwrap();
    assert_eq!(store.schema_version().await.unwrap(), 1);
    store.vacuum().await.unwrap();
    assert!(store.stats().await.unwrap().database_size > 0);
    store.close().await;
}

#[tokio::test]
async fn add_task_round_trips_all_fields() {
    let store = open_store().await;
    let list_id = store.create_task_list("Inbox", "", "").await.unwrap();

    let task = Task {
        uid: "task-1".to_string(),
        summary: "Water the plants".to_string(),
        description: Some("the ones on the balcony".to_string()),
        status: TaskStatus::InProcess,
        priority: 2,
        created: Some(seconds(1_700_000_000)),
        modified: Some(seconds(1_700_000_100)),
        due_date: Some(seconds(1_700_086_400)),
        start_date: Some(seconds(1_700_000_000)),
        completed: None,
        parent_uid: None,
        categories: vec!["home".to_string(), "plants, etc".to_string()],
    };

    let uid = store.add_task(&list_id, &task).await.unwrap();
    assert_eq!(uid, "task-1");

    let tasks = store.get_tasks(&list_id, None).await.unwrap();
    assert_eq!(tasks.len(), 1);
    let stored = &tasks[0];
    assert_eq!(stored.summary, task.summary);
    assert_eq!(stored.description, task.description);
    assert_eq!(stored.status, TaskStatus::InProcess);
    assert_eq!(stored.priority, 2);
    assert_eq!(stored.created, task.created);
    assert_eq!(stored.modified, task.modified);
    assert_eq!(stored.due_date, task.due_date);
    assert_eq!(stored.start_date, task.start_date);
    assert_eq!(stored.completed, None);
    assert_eq!(stored.parent_uid, None);
    assert_eq!(stored.categories, task.categories);
}

#[tokio::test]
async fn add_task_without_uid_gets_a_pending_uid() {
    let store = open_store().await;
    let list_id = store.create_task_list("Inbox", "", "").await.unwrap();

    let uid = store
        .add_task(&list_id, &sample_task("", "No uid yet"))
        .await
        .unwrap();
    assert!(uid.starts_with("pending-"), "got {uid}");

    let stored = store.get_task(&list_id, &uid).await.unwrap();
    assert!(stored.is_some());
    // Timestamps are stamped on insert.
    let stored = stored.unwrap();
    assert!(stored.created.is_some());
    assert!(stored.modified.is_some());
}

#[tokio::test]
async fn add_task_marks_modified_and_enqueues_create() {
    let store = open_store().await;
    let list_id = store.create_task_list("Inbox", "", "").await.unwrap();
    let uid = store
        .add_task(&list_id, &sample_task("task-1", "A task"))
        .await
        .unwrap();

    assert!(store.is_task_locally_modified(&uid).await.unwrap());

    let ops = store.pending_operations().await.unwrap();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].task_uid, uid);
    assert_eq!(ops[0].operation, QueueOperation::Create);
    assert_eq!(ops[0].retry_count, 0);
}

#[tokio::test]
async fn re_adding_the_same_uid_leaves_a_single_create_row() {
    let store = open_store().await;
    let list_id = store.create_task_list("Inbox", "", "").await.unwrap();
    store
        .add_task(&list_id, &sample_task("task-1", "First"))
        .await
        .unwrap();

    // The UID is taken; the insert violates the schema and rolls back.
    let err = store
        .add_task(&list_id, &sample_task("task-1", "Second"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Schema(_)));

    let ops = store.pending_operations().await.unwrap();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].operation, QueueOperation::Create);

    let stored = store.get_task(&list_id, "task-1").await.unwrap().unwrap();
    assert_eq!(stored.summary, "First");
}

#[tokio::test]
async fn update_task_refreshes_modified_and_enqueues_update() {
    let store = open_store().await;
    let list_id = store.create_task_list("Inbox", "", "").await.unwrap();
    let uid = store
        .add_task(&list_id, &sample_task("task-1", "Before"))
        .await
        .unwrap();
    // Simulate a completed push so only the update remains queued.
    store.clear_sync_flags_and_queue(&uid).await.unwrap();

    let mut task = store.get_task(&list_id, &uid).await.unwrap().unwrap();
    task.summary = "After".to_string();
    store.update_task(&list_id, &task).await.unwrap();

    assert!(store.is_task_locally_modified(&uid).await.unwrap());
    let ops = store.pending_operations().await.unwrap();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].operation, QueueOperation::Update);

    let stored = store.get_task(&list_id, &uid).await.unwrap().unwrap();
    assert_eq!(stored.summary, "After");
}

#[tokio::test]
async fn update_of_missing_task_is_not_found() {
    let store = open_store().await;
    let list_id = store.create_task_list("Inbox", "", "").await.unwrap();

    let err = store
        .update_task(&list_id, &sample_task("ghost", "Nope"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::TaskNotFound { .. }));
}

#[tokio::test]
async fn update_enqueued_after_pending_create_keeps_both_rows() {
    let store = open_store().await;
    let list_id = store.create_task_list("Inbox", "", "").await.unwrap();
    let uid = store
        .add_task(&list_id, &sample_task("task-1", "Fresh"))
        .await
        .unwrap();

    let mut task = store.get_task(&list_id, &uid).await.unwrap().unwrap();
    task.summary = "Edited before first push".to_string();
    store.update_task(&list_id, &task).await.unwrap();

    // The create keeps its first-time-push meaning; the update coexists and
    // drains after it.
    let ops = store.pending_operations().await.unwrap();
    assert_eq!(ops.len(), 2);
    assert_eq!(ops[0].operation, QueueOperation::Create);
    assert_eq!(ops[1].operation, QueueOperation::Update);
}

#[tokio::test]
async fn enqueue_is_idempotent_per_operation() {
    let store = open_store().await;
    let list_id = store.create_task_list("Inbox", "", "").await.unwrap();
    let uid = store
        .add_task(&list_id, &sample_task("task-1", "A task"))
        .await
        .unwrap();
    store.clear_sync_flags_and_queue(&uid).await.unwrap();

    let mut task = store.get_task(&list_id, &uid).await.unwrap().unwrap();
    task.summary = "First edit".to_string();
    store.update_task(&list_id, &task).await.unwrap();
    task.summary = "Second edit".to_string();
    store.update_task(&list_id, &task).await.unwrap();

    let ops = store.pending_operations().await.unwrap();
    assert_eq!(ops.len(), 1, "same (uid, op) must collapse to one row");
    assert_eq!(ops[0].operation, QueueOperation::Update);
}

#[tokio::test]
async fn delete_task_supersedes_update_and_retains_uid_in_queue() {
    let store = open_store().await;
    let list_id = store.create_task_list("Inbox", "", "").await.unwrap();
    let uid = store
        .add_task(&list_id, &sample_task("task-1", "Doomed"))
        .await
        .unwrap();
    store.clear_sync_flags_and_queue(&uid).await.unwrap();

    let mut task = store.get_task(&list_id, &uid).await.unwrap().unwrap();
    task.summary = "Edited".to_string();
    store.update_task(&list_id, &task).await.unwrap();

    store.delete_task(&list_id, &uid).await.unwrap();

    // Task row and metadata are gone, the queue keeps the delete.
    assert!(store.get_task(&list_id, &uid).await.unwrap().is_none());
    assert!(!store.is_task_locally_modified(&uid).await.unwrap());

    let ops = store.pending_operations().await.unwrap();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].operation, QueueOperation::Delete);
    assert_eq!(ops[0].task_uid, uid);
}

#[tokio::test]
async fn delete_of_missing_task_is_not_found() {
    let store = open_store().await;
    let list_id = store.create_task_list("Inbox", "", "").await.unwrap();

    let err = store.delete_task(&list_id, "ghost").await.unwrap_err();
    assert!(matches!(err, StoreError::TaskNotFound { .. }));
}

#[tokio::test]
async fn get_tasks_orders_by_priority_with_undefined_last() {
    let store = open_store().await;
    let list_id = store.create_task_list("Inbox", "", "").await.unwrap();

    let mut unprioritized = sample_task("task-none", "No priority");
    unprioritized.created = Some(seconds(1_700_000_300));
    store.add_task(&list_id, &unprioritized).await.unwrap();

    let mut high = sample_task("task-high", "High");
    high.priority = 1;
    high.created = Some(seconds(1_700_000_100));
    store.add_task(&list_id, &high).await.unwrap();

    let mut low = sample_task("task-low", "Low");
    low.priority = 9;
    low.created = Some(seconds(1_700_000_200));
    store.add_task(&list_id, &low).await.unwrap();

    // Same priority, newer creation first.
    let mut old = sample_task("task-old", "Old");
    old.priority = 5;
    old.created = Some(seconds(1_700_000_000));
    store.add_task(&list_id, &old).await.unwrap();

    let mut new = sample_task("task-new", "New");
    new.priority = 5;
    new.created = Some(seconds(1_700_000_050));
    store.add_task(&list_id, &new).await.unwrap();

    let uids: Vec<String> = store
        .get_tasks(&list_id, None)
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.uid)
        .collect();
    assert_eq!(
        uids,
        vec!["task-high", "task-new", "task-old", "task-low", "task-none"]
    );
}

#[tokio::test]
async fn get_tasks_applies_filters() {
    let store = open_store().await;
    let list_id = store.create_task_list("Inbox", "", "").await.unwrap();

    let mut done = sample_task("task-done", "Done");
    done.status = TaskStatus::Completed;
    done.due_date = Some(seconds(1_700_000_000));
    store.add_task(&list_id, &done).await.unwrap();

    let mut open = sample_task("task-open", "Open");
    open.status = TaskStatus::NeedsAction;
    open.due_date = Some(seconds(1_700_200_000));
    store.add_task(&list_id, &open).await.unwrap();

    let filter = TaskFilter {
        statuses: Some(vec![TaskStatus::Completed]),
        ..Default::default()
    };
    let tasks = store.get_tasks(&list_id, Some(&filter)).await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].uid, "task-done");

    let filter = TaskFilter {
        due_after: Some(seconds(1_700_100_000)),
        ..Default::default()
    };
    let tasks = store.get_tasks(&list_id, Some(&filter)).await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].uid, "task-open");

    let filter = TaskFilter {
        statuses: Some(vec![TaskStatus::Completed]),
        due_before: Some(seconds(1_699_999_999)),
        ..Default::default()
    };
    let tasks = store.get_tasks(&list_id, Some(&filter)).await.unwrap();
    assert!(tasks.is_empty());
}

#[tokio::test]
async fn find_tasks_by_summary_puts_exact_match_first() {
    let store = open_store().await;
    let list_id = store.create_task_list("Inbox", "", "").await.unwrap();

    store
        .add_task(&list_id, &sample_task("task-1", "Buy milk tomorrow"))
        .await
        .unwrap();
    store
        .add_task(&list_id, &sample_task("task-2", "Milk"))
        .await
        .unwrap();
    store
        .add_task(&list_id, &sample_task("task-3", "Call mom"))
        .await
        .unwrap();

    let found = store.find_tasks_by_summary(&list_id, "milk").await.unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(found[0].uid, "task-2", "exact match (case-insensitive) first");
    assert_eq!(found[1].uid, "task-1");
}

#[tokio::test]
async fn clear_sync_flags_and_queue_leaves_task_in_sync() {
    let store = open_store().await;
    let list_id = store.create_task_list("Inbox", "", "").await.unwrap();
    let uid = store
        .add_task(&list_id, &sample_task("task-1", "A task"))
        .await
        .unwrap();

    // A fresh local task has no recorded remote timestamp.
    let stored = store.get_task(&list_id, &uid).await.unwrap().unwrap();
    assert!(store.is_task_remote_modified(&stored).await.unwrap());

    store.clear_sync_flags_and_queue(&uid).await.unwrap();

    assert!(!store.is_task_locally_modified(&uid).await.unwrap());
    assert_eq!(store.pending_operation_count().await.unwrap(), 0);

    // remote_modified_at now equals the task's own modified timestamp.
    assert!(!store.is_task_remote_modified(&stored).await.unwrap());

    let mut newer = stored.clone();
    newer.modified = Some(stored.modified.unwrap() + Duration::seconds(1));
    assert!(store.is_task_remote_modified(&newer).await.unwrap());
}

#[tokio::test]
async fn remote_modified_is_true_for_unknown_tasks() {
    let store = open_store().await;
    let task = sample_task("never-seen", "Unknown");
    assert!(store.is_task_remote_modified(&task).await.unwrap());
}

#[tokio::test]
async fn deleting_a_parent_nulls_the_childs_pointer() {
    let store = open_store().await;
    let list_id = store.create_task_list("Inbox", "", "").await.unwrap();

    store
        .add_task(&list_id, &sample_task("parent", "Parent"))
        .await
        .unwrap();
    let mut child = sample_task("child", "Child");
    child.parent_uid = Some("parent".to_string());
    store.add_task(&list_id, &child).await.unwrap();

    store.delete_task(&list_id, "parent").await.unwrap();

    let child = store.get_task(&list_id, "child").await.unwrap().unwrap();
    assert_eq!(child.parent_uid, None);
}

#[tokio::test]
async fn rebinding_a_uid_follows_children_and_clears_queue() {
    let store = open_store().await;
    let list_id = store.create_task_list("Inbox", "", "").await.unwrap();

    let parent_uid = store
        .add_task(&list_id, &sample_task("", "Parent"))
        .await
        .unwrap();
    let mut child = sample_task("child", "Child");
    child.parent_uid = Some(parent_uid.clone());
    store.add_task(&list_id, &child).await.unwrap();

    store
        .rebind_task_uid(&list_id, &parent_uid, "remote-42")
        .await
        .unwrap();

    assert!(store.get_task(&list_id, &parent_uid).await.unwrap().is_none());
    let parent = store.get_task(&list_id, "remote-42").await.unwrap().unwrap();
    assert_eq!(parent.summary, "Parent");

    // The child keeps pointing at the same row through the rewritten UID.
    let child = store.get_task(&list_id, "child").await.unwrap().unwrap();
    assert_eq!(child.parent_uid.as_deref(), Some("remote-42"));

    // No queue entry references either UID and the flags are clear.
    let ops = store.pending_operations().await.unwrap();
    assert!(ops.iter().all(|op| op.task_uid != parent_uid && op.task_uid != "remote-42"));
    assert!(!store.is_task_locally_modified("remote-42").await.unwrap());
}

#[tokio::test]
async fn rebinding_a_missing_task_is_not_found() {
    let store = open_store().await;
    let list_id = store.create_task_list("Inbox", "", "").await.unwrap();
    let err = store
        .rebind_task_uid(&list_id, "ghost", "remote-1")
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::TaskNotFound { .. }));
}

#[tokio::test]
async fn task_list_crud() {
    let store = open_store().await;

    let list_id = store
        .create_task_list("Groceries", "weekly shopping", "#00ff00")
        .await
        .unwrap();

    let lists = store.get_task_lists().await.unwrap();
    assert_eq!(lists.len(), 1);
    assert_eq!(lists[0].name, "Groceries");
    assert_eq!(lists[0].description.as_deref(), Some("weekly shopping"));
    assert_eq!(lists[0].color.as_deref(), Some("#00ff00"));
    assert_eq!(lists[0].ctag, "");

    store.rename_task_list(&list_id, "Food").await.unwrap();
    let lists = store.get_task_lists().await.unwrap();
    assert_eq!(lists[0].name, "Food");

    assert!(matches!(
        store.rename_task_list("ghost", "X").await.unwrap_err(),
        StoreError::ListNotFound(_)
    ));

    store
        .add_task(&list_id, &sample_task("task-1", "Eggs"))
        .await
        .unwrap();
    store.delete_task_list(&list_id).await.unwrap();

    assert!(store.get_task_lists().await.unwrap().is_empty());
    assert!(store.get_task(&list_id, "task-1").await.unwrap().is_none());

    assert!(matches!(
        store.delete_task_list(&list_id).await.unwrap_err(),
        StoreError::ListNotFound(_)
    ));
}

#[tokio::test]
async fn stats_count_tasks_lists_queue_and_modified() {
    let store = open_store().await;
    let list_id = store.create_task_list("Inbox", "", "").await.unwrap();
    store
        .add_task(&list_id, &sample_task("task-1", "One"))
        .await
        .unwrap();
    store
        .add_task(&list_id, &sample_task("task-2", "Two"))
        .await
        .unwrap();
    store.clear_sync_flags_and_queue("task-2").await.unwrap();

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.task_count, 2);
    assert_eq!(stats.list_count, 1);
    assert_eq!(stats.pending_sync_ops, 1);
    assert_eq!(stats.locally_modified, 1);
}

#[tokio::test]
async fn locally_modified_tasks_come_back_oldest_first() {
    let store = open_store().await;
    let list_id = store.create_task_list("Inbox", "", "").await.unwrap();
    store
        .add_task(&list_id, &sample_task("task-1", "One"))
        .await
        .unwrap();
    store
        .add_task(&list_id, &sample_task("task-2", "Two"))
        .await
        .unwrap();
    store
        .add_task(&list_id, &sample_task("task-3", "Three"))
        .await
        .unwrap();
    store.clear_sync_flags_and_queue("task-2").await.unwrap();

    let modified = store.locally_modified_tasks().await.unwrap();
    let uids: Vec<&str> = modified.iter().map(|t| t.uid.as_str()).collect();
    assert_eq!(uids, vec!["task-1", "task-3"]);
}

#[tokio::test]
async fn clear_sync_flags_without_queue_keeps_entries() {
    let store = open_store().await;
    let list_id = store.create_task_list("Inbox", "", "").await.unwrap();
    let uid = store
        .add_task(&list_id, &sample_task("task-1", "A task"))
        .await
        .unwrap();

    store.clear_sync_flags(&uid).await.unwrap();
    assert!(!store.is_task_locally_modified(&uid).await.unwrap());
    assert_eq!(store.pending_operation_count().await.unwrap(), 1);
}

#[tokio::test]
async fn remove_operation_is_surgical() {
    let store = open_store().await;
    let list_id = store.create_task_list("Inbox", "", "").await.unwrap();
    let uid = store
        .add_task(&list_id, &sample_task("task-1", "A task"))
        .await
        .unwrap();
    let mut task = store.get_task(&list_id, &uid).await.unwrap().unwrap();
    task.summary = "Edited".to_string();
    store.update_task(&list_id, &task).await.unwrap();

    store
        .remove_operation(&uid, QueueOperation::Update)
        .await
        .unwrap();

    let ops = store.pending_operations().await.unwrap();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].operation, QueueOperation::Create);
}

#[tokio::test]
async fn record_push_failure_bumps_retry_and_stores_error() {
    let store = open_store().await;
    let list_id = store.create_task_list("Inbox", "", "").await.unwrap();
    store
        .add_task(&list_id, &sample_task("task-1", "A task"))
        .await
        .unwrap();

    let entry = &store.pending_operations().await.unwrap()[0];
    store
        .record_push_failure(entry.id, "connection refused")
        .await
        .unwrap();

    let entry = &store.pending_operations().await.unwrap()[0];
    assert_eq!(entry.retry_count, 1);
    assert_eq!(entry.last_error.as_deref(), Some("connection refused"));
}

#[tokio::test]
async fn update_sync_metadata_records_remote_state() {
    let store = open_store().await;
    let list_id = store.create_task_list("Inbox", "", "").await.unwrap();
    let uid = store
        .add_task(&list_id, &sample_task("task-1", "A task"))
        .await
        .unwrap();

    let remote_modified = seconds(1_700_000_000);
    store
        .update_sync_metadata(&uid, &list_id, Some("etag-1"), remote_modified)
        .await
        .unwrap();

    let mut probe = sample_task(&uid, "A task");
    probe.modified = Some(remote_modified);
    assert!(!store.is_task_remote_modified(&probe).await.unwrap());

    probe.modified = Some(remote_modified + Duration::seconds(1));
    assert!(store.is_task_remote_modified(&probe).await.unwrap());

    // The locally_modified flag survives the metadata refresh.
    assert!(store.is_task_locally_modified(&uid).await.unwrap());
}
