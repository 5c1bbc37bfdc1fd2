use log::debug;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use super::db::LocalStore;
use super::StoreError;
use crate::backend::{Task, TaskFilter, TaskStatus};
use crate::constants::PENDING_UID_PREFIX;
use crate::utils::datetime;

/// Bind argument for dynamically assembled queries.
enum SqlArg {
    Text(String),
    Int(i64),
}

const TASK_COLUMNS: &str = "uid, list_id, summary, description, status, priority, \
     created_at, modified_at, due_date, start_date, completed_at, parent_uid, categories";

fn task_from_row(row: &SqliteRow) -> Task {
    let categories = row
        .get::<Option<String>, _>("categories")
        .and_then(|raw| serde_json::from_str::<Vec<String>>(&raw).ok())
        .unwrap_or_default();

    let status = row
        .get::<Option<String>, _>("status")
        .and_then(|raw| TaskStatus::from_caldav(&raw))
        .unwrap_or_default();

    Task {
        uid: row.get("uid"),
        summary: row.get("summary"),
        description: row.get("description"),
        status,
        priority: row.get("priority"),
        created: datetime::from_unix(row.get("created_at")),
        modified: datetime::from_unix(row.get("modified_at")),
        due_date: datetime::from_unix(row.get("due_date")),
        start_date: datetime::from_unix(row.get("start_date")),
        completed: datetime::from_unix(row.get("completed_at")),
        parent_uid: row.get("parent_uid"),
        categories,
    }
}

fn categories_to_json(categories: &[String]) -> Option<String> {
    if categories.is_empty() {
        None
    } else {
        serde_json::to_string(categories).ok()
    }
}

/// Adds WHERE clauses for the optional task filter.
fn apply_filter(sql: &mut String, args: &mut Vec<SqlArg>, filter: Option<&TaskFilter>) {
    let Some(filter) = filter else { return };

    if let Some(statuses) = &filter.statuses {
        if !statuses.is_empty() {
            let placeholders = vec!["?"; statuses.len()].join(",");
            sql.push_str(&format!(" AND status IN ({placeholders})"));
            for status in statuses {
                args.push(SqlArg::Text(status.as_caldav().to_string()));
            }
        }
    }

    if let Some(before) = filter.due_before {
        sql.push_str(" AND due_date <= ?");
        args.push(SqlArg::Int(before.timestamp()));
    }
    if let Some(after) = filter.due_after {
        sql.push_str(" AND due_date >= ?");
        args.push(SqlArg::Int(after.timestamp()));
    }
    if let Some(before) = filter.created_before {
        sql.push_str(" AND created_at <= ?");
        args.push(SqlArg::Int(before.timestamp()));
    }
    if let Some(after) = filter.created_after {
        sql.push_str(" AND created_at >= ?");
        args.push(SqlArg::Int(after.timestamp()));
    }
}

impl LocalStore {
    /// Inserts a task, its sync metadata (locally modified) and a `create`
    /// queue entry in one transaction. Generates a `pending-<n>` UID when the
    /// task carries none, and stamps missing created/modified timestamps.
    ///
    /// Returns the UID under which the task was stored.
    pub async fn add_task(&self, list_id: &str, task: &Task) -> Result<String, StoreError> {
        let mut task = task.clone();
        let now = datetime::now_seconds();
        if task.created.is_none() {
            task.created = Some(now);
        }
        if task.modified.is_none() {
            task.modified = Some(now);
        }

        let mut tx = self.pool.begin().await?;

        // The placeholder is unique so the insert cannot collide before the
        // real pending UID (derived from the row id) is known.
        let explicit_uid = !task.uid.is_empty();
        let insert_uid = if explicit_uid {
            task.uid.clone()
        } else {
            format!("{PENDING_UID_PREFIX}tmp-{}", Uuid::new_v4().simple())
        };

        let result = sqlx::query(
            r"
            INSERT INTO tasks (
                uid, backend_name, list_id, summary, description, status, priority,
                created_at, modified_at, due_date, start_date, completed_at,
                parent_uid, categories
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&insert_uid)
        .bind(&self.backend_name)
        .bind(list_id)
        .bind(&task.summary)
        .bind(&task.description)
        .bind(task.status.as_caldav())
        .bind(task.priority)
        .bind(datetime::to_unix(task.created))
        .bind(datetime::to_unix(task.modified))
        .bind(datetime::to_unix(task.due_date))
        .bind(datetime::to_unix(task.start_date))
        .bind(datetime::to_unix(task.completed))
        .bind(&task.parent_uid)
        .bind(categories_to_json(&task.categories))
        .execute(&mut *tx)
        .await?;

        let internal_id = result.last_insert_rowid();
        let uid = if explicit_uid {
            insert_uid
        } else {
            let uid = format!("{PENDING_UID_PREFIX}{internal_id}");
            sqlx::query("UPDATE tasks SET uid = ? WHERE internal_id = ?")
                .bind(&uid)
                .bind(internal_id)
                .execute(&mut *tx)
                .await?;
            uid
        };

        sqlx::query(
            r"
            INSERT INTO sync_metadata (
                task_internal_id, backend_name, list_id, locally_modified, local_modified_at
            ) VALUES (?, ?, ?, 1, ?)
            ",
        )
        .bind(internal_id)
        .bind(&self.backend_name)
        .bind(list_id)
        .bind(now.timestamp())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
            INSERT OR REPLACE INTO sync_queue (task_uid, list_id, operation, created_at)
            VALUES (?, ?, 'create', ?)
            ",
        )
        .bind(&uid)
        .bind(list_id)
        .bind(now.timestamp())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(uid)
    }

    /// Updates an existing task, refreshes its modified timestamp, marks it
    /// locally modified and upserts an `update` queue entry, all in one
    /// transaction.
    pub async fn update_task(&self, list_id: &str, task: &Task) -> Result<(), StoreError> {
        let now = datetime::now_seconds();

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r"
            UPDATE tasks
            SET summary = ?, description = ?, status = ?, priority = ?,
                modified_at = ?, due_date = ?, start_date = ?, completed_at = ?,
                parent_uid = ?, categories = ?
            WHERE uid = ? AND backend_name = ? AND list_id = ?
            ",
        )
        .bind(&task.summary)
        .bind(&task.description)
        .bind(task.status.as_caldav())
        .bind(task.priority)
        .bind(now.timestamp())
        .bind(datetime::to_unix(task.due_date))
        .bind(datetime::to_unix(task.start_date))
        .bind(datetime::to_unix(task.completed))
        .bind(&task.parent_uid)
        .bind(categories_to_json(&task.categories))
        .bind(&task.uid)
        .bind(&self.backend_name)
        .bind(list_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::TaskNotFound {
                uid: task.uid.clone(),
                list_id: list_id.to_string(),
            });
        }

        sqlx::query(
            r"
            UPDATE sync_metadata
            SET locally_modified = 1, local_modified_at = ?
            WHERE task_internal_id = (
                SELECT internal_id FROM tasks WHERE uid = ? AND backend_name = ?
            )
            ",
        )
        .bind(now.timestamp())
        .bind(&task.uid)
        .bind(&self.backend_name)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
            INSERT OR REPLACE INTO sync_queue (task_uid, list_id, operation, created_at)
            VALUES (?, ?, 'update', ?)
            ",
        )
        .bind(&task.uid)
        .bind(list_id)
        .bind(now.timestamp())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Deletes a task locally and enqueues the remote delete. The queue
    /// retains the UID after the row (and its metadata, via cascade) is
    /// gone; a pending `update` entry is superseded by the delete.
    pub async fn delete_task(&self, list_id: &str, uid: &str) -> Result<(), StoreError> {
        let now = datetime::now_seconds();

        let mut tx = self.pool.begin().await?;

        let internal_id: Option<i64> = sqlx::query_scalar(
            "SELECT internal_id FROM tasks WHERE uid = ? AND backend_name = ? AND list_id = ?",
        )
        .bind(uid)
        .bind(&self.backend_name)
        .bind(list_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(internal_id) = internal_id else {
            return Err(StoreError::TaskNotFound {
                uid: uid.to_string(),
                list_id: list_id.to_string(),
            });
        };

        sqlx::query(
            r"
            UPDATE sync_metadata
            SET locally_deleted = 1, local_modified_at = ?
            WHERE task_internal_id = ?
            ",
        )
        .bind(now.timestamp())
        .bind(internal_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
            INSERT OR REPLACE INTO sync_queue (task_uid, list_id, operation, created_at)
            VALUES (?, ?, 'delete', ?)
            ",
        )
        .bind(uid)
        .bind(list_id)
        .bind(now.timestamp())
        .execute(&mut *tx)
        .await?;

        // The task row is about to go away, so a queued update is moot.
        sqlx::query("DELETE FROM sync_queue WHERE task_uid = ? AND operation = 'update'")
            .bind(uid)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM tasks WHERE internal_id = ?")
            .bind(internal_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Retrieves tasks from a list with optional filtering. Ordered by
    /// priority ascending with 0 (undefined) last, ties broken by creation
    /// time descending.
    pub async fn get_tasks(
        &self,
        list_id: &str,
        filter: Option<&TaskFilter>,
    ) -> Result<Vec<Task>, StoreError> {
        let mut sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE backend_name = ? AND list_id = ?"
        );
        let mut args = vec![
            SqlArg::Text(self.backend_name.clone()),
            SqlArg::Text(list_id.to_string()),
        ];
        apply_filter(&mut sql, &mut args, filter);
        sql.push_str(
            " ORDER BY CASE WHEN priority = 0 THEN 1 ELSE 0 END, priority ASC, created_at DESC",
        );

        let mut query = sqlx::query(&sql);
        for arg in &args {
            query = match arg {
                SqlArg::Text(text) => query.bind(text),
                SqlArg::Int(int) => query.bind(int),
            };
        }

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(task_from_row).collect())
    }

    /// Retrieves a single task by UID.
    pub async fn get_task(&self, list_id: &str, uid: &str) -> Result<Option<Task>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE uid = ? AND backend_name = ? AND list_id = ?"
        ))
        .bind(uid)
        .bind(&self.backend_name)
        .bind(list_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(task_from_row))
    }

    /// Searches tasks by summary, case-insensitive substring match with
    /// exact matches first.
    pub async fn find_tasks_by_summary(
        &self,
        list_id: &str,
        summary: &str,
    ) -> Result<Vec<Task>, StoreError> {
        let pattern = format!("%{summary}%");
        let rows = sqlx::query(&format!(
            r"
            SELECT {TASK_COLUMNS} FROM tasks
            WHERE backend_name = ? AND list_id = ? AND LOWER(summary) LIKE LOWER(?)
            ORDER BY
                CASE WHEN LOWER(summary) = LOWER(?) THEN 0 ELSE 1 END,
                CASE WHEN priority = 0 THEN 1 ELSE 0 END,
                priority ASC,
                created_at DESC
            "
        ))
        .bind(&self.backend_name)
        .bind(list_id)
        .bind(&pattern)
        .bind(summary)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(task_from_row).collect())
    }

    /// Tasks flagged as locally modified, oldest modification first.
    pub async fn locally_modified_tasks(&self) -> Result<Vec<Task>, StoreError> {
        let rows = sqlx::query(
            r"
            SELECT t.uid, t.list_id, t.summary, t.description, t.status, t.priority,
                   t.created_at, t.modified_at, t.due_date, t.start_date, t.completed_at,
                   t.parent_uid, t.categories
            FROM tasks t
            INNER JOIN sync_metadata sm ON sm.task_internal_id = t.internal_id
            WHERE t.backend_name = ? AND sm.locally_modified = 1
            ORDER BY sm.local_modified_at ASC, t.internal_id ASC
            ",
        )
        .bind(&self.backend_name)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(task_from_row).collect())
    }

    /// Inserts a task pulled from the remote: task row plus clean sync
    /// metadata (not locally modified), no queue entry.
    pub async fn insert_remote_task(&self, list_id: &str, task: &Task) -> Result<(), StoreError> {
        let now = datetime::now_seconds();

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r"
            INSERT INTO tasks (
                uid, backend_name, list_id, summary, description, status, priority,
                created_at, modified_at, due_date, start_date, completed_at,
                parent_uid, categories
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&task.uid)
        .bind(&self.backend_name)
        .bind(list_id)
        .bind(&task.summary)
        .bind(&task.description)
        .bind(task.status.as_caldav())
        .bind(task.priority)
        .bind(datetime::to_unix(task.created))
        .bind(datetime::to_unix(task.modified))
        .bind(datetime::to_unix(task.due_date))
        .bind(datetime::to_unix(task.start_date))
        .bind(datetime::to_unix(task.completed))
        .bind(&task.parent_uid)
        .bind(categories_to_json(&task.categories))
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
            INSERT INTO sync_metadata (
                task_internal_id, backend_name, list_id, last_synced_at,
                remote_modified_at, locally_modified, locally_deleted
            ) VALUES (?, ?, ?, ?, ?, 0, 0)
            ",
        )
        .bind(result.last_insert_rowid())
        .bind(&self.backend_name)
        .bind(list_id)
        .bind(now.timestamp())
        .bind(datetime::to_unix(task.modified).unwrap_or(0))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Overwrites a local task with the remote version and resets its sync
    /// metadata to "in sync at the remote's modified timestamp".
    pub async fn apply_remote_task(&self, list_id: &str, task: &Task) -> Result<(), StoreError> {
        let now = datetime::now_seconds();

        let mut tx = self.pool.begin().await?;

        let internal_id: Option<i64> = sqlx::query_scalar(
            "SELECT internal_id FROM tasks WHERE uid = ? AND backend_name = ? AND list_id = ?",
        )
        .bind(&task.uid)
        .bind(&self.backend_name)
        .bind(list_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(internal_id) = internal_id else {
            return Err(StoreError::TaskNotFound {
                uid: task.uid.clone(),
                list_id: list_id.to_string(),
            });
        };

        sqlx::query(
            r"
            UPDATE tasks
            SET summary = ?, description = ?, status = ?, priority = ?,
                modified_at = ?, due_date = ?, start_date = ?, completed_at = ?,
                parent_uid = ?, categories = ?
            WHERE internal_id = ?
            ",
        )
        .bind(&task.summary)
        .bind(&task.description)
        .bind(task.status.as_caldav())
        .bind(task.priority)
        .bind(datetime::to_unix(task.modified))
        .bind(datetime::to_unix(task.due_date))
        .bind(datetime::to_unix(task.start_date))
        .bind(datetime::to_unix(task.completed))
        .bind(&task.parent_uid)
        .bind(categories_to_json(&task.categories))
        .bind(internal_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
            UPDATE sync_metadata
            SET last_synced_at = ?, remote_modified_at = ?,
                locally_modified = 0, locally_deleted = 0
            WHERE task_internal_id = ?
            ",
        )
        .bind(now.timestamp())
        .bind(datetime::to_unix(task.modified).unwrap_or(0))
        .bind(internal_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Deletes a task without touching the queue, for tasks that vanished
    /// from the remote. Sync metadata goes with it via cascade.
    pub async fn remove_local_task(&self, list_id: &str, uid: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM tasks WHERE uid = ? AND backend_name = ? AND list_id = ?")
            .bind(uid)
            .bind(&self.backend_name)
            .bind(list_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Rewrites a task's UID to the remote-assigned one, then clears its
    /// sync flags and queue entries, atomically.
    ///
    /// The internal row id never changes; child tasks follow via the
    /// ON UPDATE CASCADE on parent_uid, metadata is keyed by the internal
    /// id, and queue rows are rewritten here before being cleared.
    pub async fn rebind_task_uid(
        &self,
        list_id: &str,
        old_uid: &str,
        new_uid: &str,
    ) -> Result<(), StoreError> {
        debug!("Rebinding task UID {old_uid} -> {new_uid}");

        let mut tx = self.pool.begin().await?;

        let result =
            sqlx::query("UPDATE tasks SET uid = ? WHERE uid = ? AND backend_name = ? AND list_id = ?")
                .bind(new_uid)
                .bind(old_uid)
                .bind(&self.backend_name)
                .bind(list_id)
                .execute(&mut *tx)
                .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::TaskNotFound {
                uid: old_uid.to_string(),
                list_id: list_id.to_string(),
            });
        }

        sqlx::query("UPDATE sync_queue SET task_uid = ? WHERE task_uid = ?")
            .bind(new_uid)
            .bind(old_uid)
            .execute(&mut *tx)
            .await?;

        self.clear_flags_and_queue_in_tx(&mut tx, new_uid).await?;

        tx.commit().await?;
        Ok(())
    }
}
