//! Synchronization engine for the tasksync application.
//!
//! This module provides the [`SyncEngine`] struct which reconciles the
//! durable local cache with one remote task service. A sync runs the pull
//! phase to completion (remote changes applied locally, conflicts routed
//! through the configured resolution strategy), then drains the pending
//! operation queue in the push phase.
//!
//! The engine does not serialize concurrent `sync` calls on the same
//! instance; correctness under concurrency relies on the store's
//! transactional guarantees, and callers wanting strict isolation should
//! wrap calls in their own mutex (the background [`crate::SyncCoordinator`]
//! does exactly that with in-flight guards).

pub mod conflict;
pub mod hierarchy;
mod pull;
mod push;

pub use conflict::ConflictStrategy;

use log::{error, info};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::backend::Backend;
use crate::logger::Logger;
use crate::storage::{LocalStore, StoreError};

/// A structured sync failure: which operation failed, against what, and why.
#[derive(Debug)]
pub struct SyncError {
    operation: String,
    list_id: Option<String>,
    task_uid: Option<String>,
    source: anyhow::Error,
}

impl SyncError {
    pub fn new(operation: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self {
            operation: operation.into(),
            list_id: None,
            task_uid: None,
            source: source.into(),
        }
    }

    pub fn with_list(mut self, list_id: impl Into<String>) -> Self {
        self.list_id = Some(list_id.into());
        self
    }

    pub fn with_task(mut self, task_uid: impl Into<String>) -> Self {
        self.task_uid = Some(task_uid.into());
        self
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn list_id(&self) -> Option<&str> {
        self.list_id.as_deref()
    }

    pub fn task_uid(&self) -> Option<&str> {
        self.task_uid.as_deref()
    }

    pub fn cause(&self) -> &anyhow::Error {
        &self.source
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.list_id, &self.task_uid) {
            (Some(list), Some(task)) => write!(
                f,
                "{} failed for task {task} in list {list}: {}",
                self.operation, self.source
            ),
            (Some(list), None) => {
                write!(f, "{} failed for list {list}: {}", self.operation, self.source)
            }
            (None, Some(task)) => {
                write!(f, "{} failed for task {task}: {}", self.operation, self.source)
            }
            (None, None) => write!(f, "{} failed: {}", self.operation, self.source),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

/// Statistics about one sync run.
#[derive(Debug, Default)]
pub struct SyncResult {
    pub pulled: usize,
    pub pushed: usize,
    pub conflicts_found: usize,
    pub conflicts_resolved: usize,
    pub errors: Vec<SyncError>,
    pub duration: Duration,
}

impl SyncResult {
    /// True when the run finished without recording any error.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Current sync-related counters from the local cache.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    pub local_tasks: i64,
    pub local_lists: i64,
    pub pending_operations: i64,
    pub locally_modified: i64,
}

/// Engine reconciling the local cache with one remote backend.
///
/// Owns its collaborators explicitly: the store, the remote, and the
/// conflict resolution strategy fixed at construction.
pub struct SyncEngine {
    store: Arc<LocalStore>,
    remote: Arc<dyn Backend>,
    strategy: ConflictStrategy,
    logger: Logger,
}

impl SyncEngine {
    /// Creates a new sync engine.
    pub fn new(store: Arc<LocalStore>, remote: Arc<dyn Backend>, strategy: ConflictStrategy) -> Self {
        Self {
            store,
            remote,
            strategy,
            logger: Logger::new(),
        }
    }

    pub(crate) fn store(&self) -> &LocalStore {
        &self.store
    }

    pub(crate) fn remote(&self) -> &Arc<dyn Backend> {
        &self.remote
    }

    /// The conflict resolution strategy this engine was built with.
    pub fn strategy(&self) -> ConflictStrategy {
        self.strategy
    }

    /// In-memory sync activity log, for display in front-ends.
    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Performs bidirectional synchronization: pull, then push.
    ///
    /// A pull failure is recorded in the result but does not prevent the
    /// push phase from running.
    pub async fn sync(&self) -> SyncResult {
        let start = Instant::now();
        let mut result = SyncResult::default();

        info!("🔄 Starting sync with {} backend", self.remote.backend_type());
        self.logger.log("sync started".to_string());

        match self.pull().await {
            Ok(outcome) => {
                result.pulled = outcome.pulled;
                result.conflicts_found = outcome.conflicts_found;
                result.conflicts_resolved = outcome.conflicts_resolved;
                result.errors.extend(outcome.errors);
            }
            Err(e) => {
                error!("❌ Pull phase failed: {e}");
                self.logger.log(format!("pull phase failed: {e}"));
                result.errors.push(e);
            }
        }

        match self.push().await {
            Ok(outcome) => {
                result.pushed = outcome.pushed;
                result.errors.extend(outcome.errors);
            }
            Err(e) => {
                error!("❌ Push phase failed: {e}");
                self.logger.log(format!("push phase failed: {e}"));
                result.errors.push(e);
            }
        }

        result.duration = start.elapsed();
        info!(
            "✅ Sync finished: {} pulled, {} pushed, {}/{} conflicts resolved, {} errors in {:?}",
            result.pulled,
            result.pushed,
            result.conflicts_resolved,
            result.conflicts_found,
            result.errors.len(),
            result.duration
        );
        self.logger.log(format!(
            "sync finished: {} pulled, {} pushed, {} conflicts",
            result.pulled, result.pushed, result.conflicts_found
        ));
        result
    }

    /// Performs a complete synchronization, ignoring CTags: every list is
    /// enumerated even if its CTag is unchanged.
    pub async fn full_sync(&self) -> SyncResult {
        let start = Instant::now();
        if let Err(e) = self.store.clear_all_ctags().await {
            let mut result = SyncResult::default();
            result.errors.push(SyncError::new("full_sync", e));
            result.duration = start.elapsed();
            return result;
        }
        self.sync().await
    }

    /// Executes only the push phase, for background sync after local writes.
    pub async fn push_only(&self) -> SyncResult {
        let start = Instant::now();
        let mut result = SyncResult::default();

        match self.push().await {
            Ok(outcome) => {
                result.pushed = outcome.pushed;
                result.errors.extend(outcome.errors);
            }
            Err(e) => {
                error!("❌ Push phase failed: {e}");
                result.errors.push(e);
            }
        }

        result.duration = start.elapsed();
        result
    }

    /// Current sync statistics from the local cache.
    pub async fn sync_stats(&self) -> Result<SyncStats, StoreError> {
        let stats = self.store.stats().await?;
        Ok(SyncStats {
            local_tasks: stats.task_count,
            local_lists: stats.list_count,
            pending_operations: stats.pending_sync_ops,
            locally_modified: stats.locally_modified,
        })
    }
}
