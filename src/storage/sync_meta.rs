use chrono::{DateTime, Utc};
use sqlx::{Sqlite, Transaction};

use super::db::LocalStore;
use super::StoreError;
use crate::backend::Task;
use crate::utils::datetime;

impl LocalStore {
    /// Whether a task carries unsynced local changes. An absent metadata row
    /// counts as not modified.
    pub async fn is_task_locally_modified(&self, uid: &str) -> Result<bool, StoreError> {
        let modified: Option<i64> = sqlx::query_scalar(
            r"
            SELECT sm.locally_modified
            FROM sync_metadata sm
            INNER JOIN tasks t ON sm.task_internal_id = t.internal_id
            WHERE t.uid = ? AND t.backend_name = ?
            ",
        )
        .bind(uid)
        .bind(&self.backend_name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(modified.unwrap_or(0) == 1)
    }

    /// Whether a remote task changed since the last sync. True when no
    /// metadata exists or no remote timestamp was recorded; otherwise the
    /// remote's modified timestamp, truncated to seconds, must be strictly
    /// greater than the stored one.
    pub async fn is_task_remote_modified(&self, remote_task: &Task) -> Result<bool, StoreError> {
        let stored: Option<Option<i64>> = sqlx::query_scalar(
            r"
            SELECT sm.remote_modified_at
            FROM sync_metadata sm
            INNER JOIN tasks t ON sm.task_internal_id = t.internal_id
            WHERE t.uid = ? AND t.backend_name = ?
            ",
        )
        .bind(&remote_task.uid)
        .bind(&self.backend_name)
        .fetch_optional(&self.pool)
        .await?;

        match stored {
            None | Some(None) => Ok(true),
            Some(Some(stored)) => match remote_task.modified {
                Some(modified) => Ok(modified.timestamp() > stored),
                None => Ok(false),
            },
        }
    }

    /// Flags a task as locally modified.
    pub async fn mark_locally_modified(&self, uid: &str) -> Result<(), StoreError> {
        sqlx::query(
            r"
            UPDATE sync_metadata
            SET locally_modified = 1, local_modified_at = ?
            WHERE task_internal_id = (
                SELECT internal_id FROM tasks WHERE uid = ? AND backend_name = ?
            )
            ",
        )
        .bind(datetime::now_seconds().timestamp())
        .bind(uid)
        .bind(&self.backend_name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Clears the locally_modified/locally_deleted flags without touching
    /// the queue. Prefer [`LocalStore::clear_sync_flags_and_queue`] after a
    /// successful push.
    pub async fn clear_sync_flags(&self, uid: &str) -> Result<(), StoreError> {
        sqlx::query(
            r"
            UPDATE sync_metadata
            SET locally_modified = 0, locally_deleted = 0
            WHERE task_internal_id = (
                SELECT internal_id FROM tasks WHERE uid = ? AND backend_name = ?
            )
            ",
        )
        .bind(uid)
        .bind(&self.backend_name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Atomically clears the sync flags, advances remote_modified_at to the
    /// task's own modified timestamp, and drops every queue entry for the
    /// UID. For a task row that is already gone (pushed deletes) only the
    /// queue entries remain to remove.
    pub async fn clear_sync_flags_and_queue(&self, uid: &str) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        self.clear_flags_and_queue_in_tx(&mut tx, uid).await?;
        tx.commit().await?;
        Ok(())
    }

    pub(crate) async fn clear_flags_and_queue_in_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        uid: &str,
    ) -> Result<(), StoreError> {
        let row: Option<(i64, Option<i64>)> = sqlx::query_as(
            "SELECT internal_id, modified_at FROM tasks WHERE uid = ? AND backend_name = ?",
        )
        .bind(uid)
        .bind(&self.backend_name)
        .fetch_optional(&mut **tx)
        .await?;

        if let Some((internal_id, modified_at)) = row {
            sqlx::query(
                r"
                UPDATE sync_metadata
                SET locally_modified = 0, locally_deleted = 0, remote_modified_at = ?
                WHERE task_internal_id = ?
                ",
            )
            .bind(modified_at)
            .bind(internal_id)
            .execute(&mut **tx)
            .await?;
        }

        sqlx::query("DELETE FROM sync_queue WHERE task_uid = ?")
            .bind(uid)
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    /// Upserts sync metadata with fresh remote state for a task.
    pub async fn update_sync_metadata(
        &self,
        uid: &str,
        list_id: &str,
        etag: Option<&str>,
        remote_modified: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let internal_id: Option<i64> = sqlx::query_scalar(
            "SELECT internal_id FROM tasks WHERE uid = ? AND backend_name = ? AND list_id = ?",
        )
        .bind(uid)
        .bind(&self.backend_name)
        .bind(list_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(internal_id) = internal_id else {
            return Err(StoreError::TaskNotFound {
                uid: uid.to_string(),
                list_id: list_id.to_string(),
            });
        };

        sqlx::query(
            r"
            INSERT INTO sync_metadata (
                task_internal_id, backend_name, list_id, remote_etag, last_synced_at,
                remote_modified_at, locally_modified, locally_deleted
            ) VALUES (?, ?, ?, ?, ?, ?, 0, 0)
            ON CONFLICT(task_internal_id) DO UPDATE SET
                remote_etag = excluded.remote_etag,
                last_synced_at = excluded.last_synced_at,
                remote_modified_at = excluded.remote_modified_at
            ",
        )
        .bind(internal_id)
        .bind(&self.backend_name)
        .bind(list_id)
        .bind(etag)
        .bind(datetime::now_seconds().timestamp())
        .bind(remote_modified.timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
