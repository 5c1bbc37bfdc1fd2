use log::{debug, info};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteSynchronous,
};
use sqlx::Connection;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use uuid::Uuid;

use super::StoreError;
use crate::constants::{APP_DIR, DB_FILE_NAME, SCHEMA_VERSION};
use crate::utils::datetime;

/// Durable local cache backed by SQLite.
///
/// One store instance covers one backend (identified by `backend_name`);
/// several instances may share the same database file.
pub struct LocalStore {
    pub(crate) pool: SqlitePool,
    pub(crate) backend_name: String,
    path: Option<PathBuf>,
    // Anchor connection outside the pool, keeps shared in-memory databases
    // alive even when the pool cycles its connections.
    _anchor: Option<SqliteConnection>,
}

impl LocalStore {
    /// Opens (creating if needed) the database at `db_path`, or at the
    /// XDG-compliant default location when no path is given.
    pub async fn open(backend_name: &str, db_path: Option<&Path>) -> Result<Self, StoreError> {
        let path = resolve_db_path(db_path)?;

        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .map_err(|e| StoreError::InvalidPath(format!("{}: {e}", dir.display())))?;
        }

        info!("Opening task database at {}", path.display());
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let store = LocalStore {
            pool,
            backend_name: backend_name.to_string(),
            path: Some(path),
            _anchor: None,
        };
        store.init_schema().await?;
        Ok(store)
    }

    /// Opens a private in-memory database, mainly for tests and ephemeral
    /// callers. Uses a uniquely named shared-cache database so all pool
    /// connections see the same data.
    pub async fn open_in_memory(backend_name: &str) -> Result<Self, StoreError> {
        let url = format!(
            "sqlite:file:tasksync-{}?mode=memory&cache=shared",
            Uuid::new_v4().simple()
        );
        let options = SqliteConnectOptions::from_str(&url)?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options.clone())
            .await?;

        let anchor = SqliteConnection::connect_with(&options).await?;

        let store = LocalStore {
            pool,
            backend_name: backend_name.to_string(),
            path: None,
            _anchor: Some(anchor),
        };
        store.init_schema().await?;
        Ok(store)
    }

    /// The backend this store instance is scoped to.
    pub fn backend_name(&self) -> &str {
        &self.backend_name
    }

    /// Filesystem path of the database, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Initialize tables, indexes and the schema version record.
    async fn init_schema(&self) -> Result<(), StoreError> {
        debug!("Initializing database schema");

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS tasks (
                internal_id INTEGER PRIMARY KEY AUTOINCREMENT,
                uid TEXT NOT NULL UNIQUE,
                backend_name TEXT NOT NULL,
                list_id TEXT NOT NULL,
                summary TEXT NOT NULL,
                description TEXT,
                status TEXT,
                priority INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER,
                modified_at INTEGER,
                due_date INTEGER,
                start_date INTEGER,
                completed_at INTEGER,
                parent_uid TEXT,
                categories TEXT,

                FOREIGN KEY (parent_uid) REFERENCES tasks(uid)
                    ON DELETE SET NULL ON UPDATE CASCADE
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS sync_metadata (
                task_internal_id INTEGER PRIMARY KEY,
                backend_name TEXT NOT NULL,
                list_id TEXT NOT NULL,

                remote_etag TEXT,
                last_synced_at INTEGER,

                locally_modified INTEGER NOT NULL DEFAULT 0,
                locally_deleted INTEGER NOT NULL DEFAULT 0,

                remote_modified_at INTEGER,
                local_modified_at INTEGER,

                FOREIGN KEY (task_internal_id) REFERENCES tasks(internal_id)
                    ON DELETE CASCADE
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS list_sync_metadata (
                list_id TEXT NOT NULL,
                backend_name TEXT NOT NULL,
                list_name TEXT NOT NULL,
                list_description TEXT,
                list_color TEXT,

                last_ctag TEXT,
                last_full_sync INTEGER,
                deleted_at INTEGER,

                created_at INTEGER,
                modified_at INTEGER,

                PRIMARY KEY (backend_name, list_id)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS sync_queue (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                task_uid TEXT NOT NULL,
                list_id TEXT NOT NULL,
                operation TEXT NOT NULL CHECK (operation IN ('create', 'update', 'delete')),
                created_at INTEGER NOT NULL,
                retry_count INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,

                UNIQUE (task_uid, operation)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        for index in [
            "CREATE INDEX IF NOT EXISTS idx_tasks_list_id ON tasks(list_id)",
            "CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status)",
            "CREATE INDEX IF NOT EXISTS idx_tasks_due_date ON tasks(due_date)",
            "CREATE INDEX IF NOT EXISTS idx_tasks_parent_uid ON tasks(parent_uid)",
            "CREATE INDEX IF NOT EXISTS idx_tasks_priority ON tasks(priority)",
            "CREATE INDEX IF NOT EXISTS idx_sync_metadata_locally_modified ON sync_metadata(locally_modified)",
            "CREATE INDEX IF NOT EXISTS idx_sync_metadata_locally_deleted ON sync_metadata(locally_deleted)",
            "CREATE INDEX IF NOT EXISTS idx_sync_metadata_list_id ON sync_metadata(list_id)",
            "CREATE INDEX IF NOT EXISTS idx_sync_queue_operation ON sync_queue(operation)",
            "CREATE INDEX IF NOT EXISTS idx_sync_queue_created_at ON sync_queue(created_at)",
            "CREATE INDEX IF NOT EXISTS idx_sync_queue_retry_count ON sync_queue(retry_count)",
        ] {
            sqlx::query(index).execute(&self.pool).await?;
        }

        self.record_schema_version().await
    }

    /// Records the current schema version, exactly once per version.
    async fn record_schema_version(&self) -> Result<(), StoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM schema_version WHERE version = ?")
                .bind(SCHEMA_VERSION)
                .fetch_one(&self.pool)
                .await?;
        if count > 0 {
            return Ok(());
        }

        sqlx::query("INSERT INTO schema_version (version, applied_at) VALUES (?, ?)")
            .bind(SCHEMA_VERSION)
            .bind(datetime::now_seconds().timestamp())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// The highest schema version recorded in the database.
    pub async fn schema_version(&self) -> Result<i64, StoreError> {
        let version: i64 = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
            .fetch_one(&self.pool)
            .await?;
        Ok(version)
    }

    /// Runs VACUUM to compact the database file.
    pub async fn vacuum(&self) -> Result<(), StoreError> {
        sqlx::query("VACUUM").execute(&self.pool).await?;
        Ok(())
    }

    /// Basic statistics about the cached data.
    pub async fn stats(&self) -> Result<DbStats, StoreError> {
        let task_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tasks WHERE backend_name = ?")
            .bind(&self.backend_name)
            .fetch_one(&self.pool)
            .await?;

        let list_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM list_sync_metadata WHERE backend_name = ?",
        )
        .bind(&self.backend_name)
        .fetch_one(&self.pool)
        .await?;

        let pending_sync_ops: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_queue")
            .fetch_one(&self.pool)
            .await?;

        let locally_modified: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sync_metadata WHERE backend_name = ? AND locally_modified = 1",
        )
        .bind(&self.backend_name)
        .fetch_one(&self.pool)
        .await?;

        let database_size = match &self.path {
            Some(path) => std::fs::metadata(path).map(|m| m.len()).unwrap_or(0),
            None => 0,
        };

        Ok(DbStats {
            task_count,
            list_count,
            pending_sync_ops,
            locally_modified,
            database_size,
        })
    }

    /// Closes the connection pool.
    pub async fn close(&self) {
        debug!("Closing database connection");
        self.pool.close().await;
    }
}

/// Resolves the database file location.
///
/// Priority: explicit path > `$XDG_DATA_HOME/tasksync/tasks.db` >
/// `$HOME/.local/share/tasksync/tasks.db`.
fn resolve_db_path(custom: Option<&Path>) -> Result<PathBuf, StoreError> {
    if let Some(path) = custom {
        return Ok(path.to_path_buf());
    }

    if let Ok(xdg_data_home) = std::env::var("XDG_DATA_HOME") {
        if !xdg_data_home.is_empty() {
            return Ok(PathBuf::from(xdg_data_home).join(APP_DIR).join(DB_FILE_NAME));
        }
    }

    match std::env::var("HOME") {
        Ok(home) if !home.is_empty() => Ok(PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(APP_DIR)
            .join(DB_FILE_NAME)),
        _ => Err(StoreError::InvalidPath(
            "no database path configured and neither XDG_DATA_HOME nor HOME is set".to_string(),
        )),
    }
}

/// Statistics about the cached data.
#[derive(Debug, Clone, Default)]
pub struct DbStats {
    pub task_count: i64,
    pub list_count: i64,
    pub pending_sync_ops: i64,
    pub locally_modified: i64,
    /// Database file size in bytes, 0 for in-memory stores.
    pub database_size: u64,
}

impl fmt::Display for DbStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let size_mb = self.database_size as f64 / (1024.0 * 1024.0);
        write!(
            f,
            "Tasks: {} | Lists: {} | Pending sync: {} | Modified: {} | Size: {size_mb:.2} MB",
            self.task_count, self.list_count, self.pending_sync_ops, self.locally_modified,
        )
    }
}
