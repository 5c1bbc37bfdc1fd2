use chrono::{DateTime, Utc};
use sqlx::Row;

use super::db::LocalStore;
use super::StoreError;
use crate::utils::datetime;

/// Operation kind carried by a queue entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueOperation {
    Create,
    Update,
    Delete,
}

impl QueueOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            QueueOperation::Create => "create",
            QueueOperation::Update => "update",
            QueueOperation::Delete => "delete",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(QueueOperation::Create),
            "update" => Some(QueueOperation::Update),
            "delete" => Some(QueueOperation::Delete),
            _ => None,
        }
    }
}

/// A pending sync operation waiting to be pushed to the remote.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub id: i64,
    pub task_uid: String,
    pub list_id: String,
    pub operation: QueueOperation,
    pub created_at: DateTime<Utc>,
    pub retry_count: i64,
    pub last_error: Option<String>,
}

impl LocalStore {
    /// Pending operations in FIFO order (creation time, then id).
    pub async fn pending_operations(&self) -> Result<Vec<QueueEntry>, StoreError> {
        let rows = sqlx::query(
            r"
            SELECT id, task_uid, list_id, operation, created_at, retry_count, last_error
            FROM sync_queue
            ORDER BY created_at ASC, id ASC
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let raw_op: String = row.get("operation");
            let operation = QueueOperation::parse(&raw_op).ok_or_else(|| {
                StoreError::Schema(format!("unknown queue operation: {raw_op}"))
            })?;
            entries.push(QueueEntry {
                id: row.get("id"),
                task_uid: row.get("task_uid"),
                list_id: row.get("list_id"),
                operation,
                created_at: datetime::from_unix(Some(row.get("created_at")))
                    .unwrap_or(DateTime::UNIX_EPOCH),
                retry_count: row.get("retry_count"),
                last_error: row.get("last_error"),
            });
        }
        Ok(entries)
    }

    /// Number of entries currently queued.
    pub async fn pending_operation_count(&self) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_queue")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Records a failed push attempt: bumps the retry counter and stores the
    /// error for diagnostics.
    pub async fn record_push_failure(&self, entry_id: i64, error: &str) -> Result<(), StoreError> {
        sqlx::query(
            r"
            UPDATE sync_queue
            SET retry_count = retry_count + 1, last_error = ?
            WHERE id = ?
            ",
        )
        .bind(error)
        .bind(entry_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Removes one (task, operation) entry from the queue.
    pub async fn remove_operation(
        &self,
        task_uid: &str,
        operation: QueueOperation,
    ) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM sync_queue WHERE task_uid = ? AND operation = ?")
            .bind(task_uid)
            .bind(operation.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
