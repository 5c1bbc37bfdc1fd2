//! Local storage module for the durable task cache.
//!
//! This module provides database operations over SQLite for:
//! - Tasks
//! - Task lists
//! - Per-task sync metadata
//! - The pending operation queue

pub mod db;
pub mod lists;
pub mod queue;
pub mod sync_meta;
pub mod tasks;

pub use db::{DbStats, LocalStore};
pub use lists::ListRecord;
pub use queue::{QueueEntry, QueueOperation};

/// Errors surfaced by the durable store.
///
/// Every mutation is transactional; a returned error implies the transaction
/// rolled back.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("task {uid} not found in list {list_id}")]
    TaskNotFound { uid: String, list_id: String },

    #[error("list {0} not found")]
    ListNotFound(String),

    #[error("schema integrity violation: {0}")]
    Schema(String),

    #[error("invalid database path: {0}")]
    InvalidPath(String),

    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl StoreError {
    /// Returns true if the error means the requested entity does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::TaskNotFound { .. } | StoreError::ListNotFound(_)
        )
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db)
                if db.is_unique_violation()
                    || db.is_foreign_key_violation()
                    || db.is_check_violation() =>
            {
                StoreError::Schema(db.message().to_string())
            }
            _ => StoreError::Database(err),
        }
    }
}
