use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use super::db::LocalStore;
use super::StoreError;
use crate::backend::TaskList;
use crate::utils::datetime;

/// Local bookkeeping row for a task list.
#[derive(Debug, Clone)]
pub struct ListRecord {
    pub list_id: String,
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
    /// Last CTag seen from the remote, empty if never synced.
    pub last_ctag: String,
    pub last_full_sync: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

fn record_from_row(row: &SqliteRow) -> ListRecord {
    ListRecord {
        list_id: row.get("list_id"),
        name: row.get("list_name"),
        description: row.get("list_description"),
        color: row.get("list_color"),
        last_ctag: row.get::<Option<String>, _>("last_ctag").unwrap_or_default(),
        last_full_sync: datetime::from_unix(row.get("last_full_sync")),
        deleted_at: datetime::from_unix(row.get("deleted_at")),
    }
}

const LIST_COLUMNS: &str = "list_id, list_name, list_description, list_color, \
     last_ctag, last_full_sync, deleted_at";

impl LocalStore {
    /// Creates a task list and returns its generated ID.
    pub async fn create_task_list(
        &self,
        name: &str,
        description: &str,
        color: &str,
    ) -> Result<String, StoreError> {
        let list_id = Uuid::new_v4().to_string();
        let now = datetime::now_seconds().timestamp();

        sqlx::query(
            r"
            INSERT INTO list_sync_metadata (
                list_id, backend_name, list_name, list_description, list_color,
                created_at, modified_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&list_id)
        .bind(&self.backend_name)
        .bind(name)
        .bind((!description.is_empty()).then_some(description))
        .bind((!color.is_empty()).then_some(color))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(list_id)
    }

    /// Removes a task list and all tasks within it.
    pub async fn delete_task_list(&self, list_id: &str) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM tasks WHERE backend_name = ? AND list_id = ?")
            .bind(&self.backend_name)
            .bind(list_id)
            .execute(&mut *tx)
            .await?;

        let result =
            sqlx::query("DELETE FROM list_sync_metadata WHERE backend_name = ? AND list_id = ?")
                .bind(&self.backend_name)
                .bind(list_id)
                .execute(&mut *tx)
                .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ListNotFound(list_id.to_string()));
        }

        tx.commit().await?;
        Ok(())
    }

    /// Renames a task list.
    pub async fn rename_task_list(&self, list_id: &str, new_name: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            r"
            UPDATE list_sync_metadata
            SET list_name = ?, modified_at = ?
            WHERE backend_name = ? AND list_id = ?
            ",
        )
        .bind(new_name)
        .bind(datetime::now_seconds().timestamp())
        .bind(&self.backend_name)
        .bind(list_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ListNotFound(list_id.to_string()));
        }
        Ok(())
    }

    /// All task lists known locally, soft-deleted ones excluded.
    pub async fn get_task_lists(&self) -> Result<Vec<TaskList>, StoreError> {
        let rows = sqlx::query(&format!(
            r"
            SELECT {LIST_COLUMNS} FROM list_sync_metadata
            WHERE backend_name = ? AND deleted_at IS NULL
            ORDER BY list_name ASC
            "
        ))
        .bind(&self.backend_name)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let record = record_from_row(row);
                TaskList {
                    id: record.list_id,
                    name: record.name,
                    description: record.description,
                    color: record.color,
                    ctag: record.last_ctag,
                    deleted_at: record.deleted_at,
                }
            })
            .collect())
    }

    /// The bookkeeping record of one list, if known locally.
    pub async fn get_list_record(&self, list_id: &str) -> Result<Option<ListRecord>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {LIST_COLUMNS} FROM list_sync_metadata WHERE backend_name = ? AND list_id = ?"
        ))
        .bind(&self.backend_name)
        .bind(list_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(record_from_row))
    }

    /// Registers a remote list locally, recording its current CTag.
    pub async fn insert_list_record(&self, list: &TaskList) -> Result<(), StoreError> {
        let now = datetime::now_seconds().timestamp();
        sqlx::query(
            r"
            INSERT INTO list_sync_metadata (
                list_id, backend_name, list_name, list_description, list_color,
                last_ctag, last_full_sync, created_at, modified_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&list.id)
        .bind(&self.backend_name)
        .bind(&list.name)
        .bind(&list.description)
        .bind(&list.color)
        .bind(&list.ctag)
        .bind(now)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Advances a list's CTag and full-sync timestamp.
    pub async fn update_list_ctag(&self, list_id: &str, ctag: &str) -> Result<(), StoreError> {
        sqlx::query(
            r"
            UPDATE list_sync_metadata
            SET last_ctag = ?, last_full_sync = ?
            WHERE backend_name = ? AND list_id = ?
            ",
        )
        .bind(ctag)
        .bind(datetime::now_seconds().timestamp())
        .bind(&self.backend_name)
        .bind(list_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Clears every list's CTag, forcing the next pull to enumerate all of
    /// them.
    pub async fn clear_all_ctags(&self) -> Result<(), StoreError> {
        sqlx::query("UPDATE list_sync_metadata SET last_ctag = '' WHERE backend_name = ?")
            .bind(&self.backend_name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// When the list was last fully synced, if ever.
    pub async fn last_full_sync(
        &self,
        list_id: &str,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let row: Option<Option<i64>> = sqlx::query_scalar(
            "SELECT last_full_sync FROM list_sync_metadata WHERE backend_name = ? AND list_id = ?",
        )
        .bind(&self.backend_name)
        .bind(list_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(datetime::from_unix(row.flatten()))
    }
}
