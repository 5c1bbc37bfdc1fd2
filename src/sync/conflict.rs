//! Conflict detection outcome handling.
//!
//! A conflict exists when a task changed both locally and remotely since the
//! last sync. The strategy is fixed per engine instance; every resolver
//! mutates state strictly through the store.

use log::{debug, info};
use std::str::FromStr;
use uuid::Uuid;

use serde::{Deserialize, Serialize};

use super::{SyncEngine, SyncError};
use crate::backend::Task;
use crate::constants::LOCAL_COPY_SUFFIX;

/// How conflicting local and remote changes are reconciled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictStrategy {
    /// Discard local changes, use the server version.
    #[default]
    ServerWins,
    /// Keep the local version; it will overwrite the server on push.
    LocalWins,
    /// Combine non-conflicting fields and push the merged result.
    Merge,
    /// Accept the server version and keep the local one as a new task.
    KeepBoth,
}

impl ConflictStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            ConflictStrategy::ServerWins => "server-wins",
            ConflictStrategy::LocalWins => "local-wins",
            ConflictStrategy::Merge => "merge",
            ConflictStrategy::KeepBoth => "keep-both",
        }
    }
}

impl FromStr for ConflictStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "server-wins" => Ok(ConflictStrategy::ServerWins),
            "local-wins" => Ok(ConflictStrategy::LocalWins),
            "merge" => Ok(ConflictStrategy::Merge),
            "keep-both" => Ok(ConflictStrategy::KeepBoth),
            other => anyhow::bail!(
                "unknown conflict resolution strategy: {other} (valid: server-wins, local-wins, merge, keep-both)"
            ),
        }
    }
}

impl std::fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Combines two versions of a task, starting from the remote one.
///
/// The local description survives when the remote has none, the
/// higher-importance (numerically lower, non-zero) priority wins, categories
/// are unioned, and the later due date is kept.
pub(crate) fn merge_tasks(local: &Task, remote: &Task) -> Task {
    let mut merged = remote.clone();

    let remote_has_description = remote
        .description
        .as_deref()
        .is_some_and(|d| !d.is_empty());
    if !remote_has_description {
        if let Some(description) = &local.description {
            if !description.is_empty() {
                merged.description = Some(description.clone());
            }
        }
    }

    if local.priority > 0 && local.priority < remote.priority {
        merged.priority = local.priority;
    }

    for category in &local.categories {
        if !merged.categories.contains(category) {
            merged.categories.push(category.clone());
        }
    }

    if let Some(local_due) = local.due_date {
        if remote.due_date.map_or(true, |remote_due| local_due > remote_due) {
            merged.due_date = Some(local_due);
        }
    }

    merged
}

impl SyncEngine {
    /// Resolves one conflict according to the engine's strategy.
    pub(crate) async fn resolve_conflict(
        &self,
        list_id: &str,
        local_task: &Task,
        remote_task: &Task,
    ) -> Result<(), SyncError> {
        debug!(
            "Resolving conflict for task {} with strategy {}",
            remote_task.uid,
            self.strategy()
        );
        match self.strategy() {
            ConflictStrategy::ServerWins => self.resolve_server_wins(list_id, remote_task).await,
            ConflictStrategy::LocalWins => {
                self.resolve_local_wins(list_id, local_task, remote_task).await
            }
            ConflictStrategy::Merge => self.resolve_merge(list_id, local_task, remote_task).await,
            ConflictStrategy::KeepBoth => {
                self.resolve_keep_both(list_id, local_task, remote_task).await
            }
        }
    }

    /// Discards local changes: the remote version overwrites the local task
    /// and nothing remains queued for push.
    async fn resolve_server_wins(
        &self,
        list_id: &str,
        remote_task: &Task,
    ) -> Result<(), SyncError> {
        self.store()
            .apply_remote_task(list_id, remote_task)
            .await
            .map_err(|e| conflict_error(e, list_id, &remote_task.uid))?;

        self.store()
            .clear_sync_flags_and_queue(&remote_task.uid)
            .await
            .map_err(|e| conflict_error(e, list_id, &remote_task.uid))
    }

    /// Keeps the local version. Only the sync metadata is refreshed with the
    /// remote's modified timestamp so the remote change stops registering;
    /// the local task stays queued and wins on push.
    async fn resolve_local_wins(
        &self,
        list_id: &str,
        local_task: &Task,
        remote_task: &Task,
    ) -> Result<(), SyncError> {
        match remote_task.modified {
            Some(remote_modified) => self
                .store()
                .update_sync_metadata(&local_task.uid, list_id, None, remote_modified)
                .await
                .map_err(|e| conflict_error(e, list_id, &local_task.uid)),
            None => Ok(()),
        }
    }

    /// Writes the merged task locally and marks it modified so the merge
    /// propagates to the server through the still-queued operation.
    async fn resolve_merge(
        &self,
        list_id: &str,
        local_task: &Task,
        remote_task: &Task,
    ) -> Result<(), SyncError> {
        let merged = merge_tasks(local_task, remote_task);

        self.store()
            .apply_remote_task(list_id, &merged)
            .await
            .map_err(|e| conflict_error(e, list_id, &merged.uid))?;

        self.store()
            .mark_locally_modified(&merged.uid)
            .await
            .map_err(|e| conflict_error(e, list_id, &merged.uid))
    }

    /// Accepts the remote version under the original UID and re-creates the
    /// local version as a fresh task, which will push as a `create`.
    async fn resolve_keep_both(
        &self,
        list_id: &str,
        local_task: &Task,
        remote_task: &Task,
    ) -> Result<(), SyncError> {
        self.store()
            .apply_remote_task(list_id, remote_task)
            .await
            .map_err(|e| conflict_error(e, list_id, &remote_task.uid))?;

        let mut local_copy = local_task.clone();
        local_copy.uid = Uuid::new_v4().to_string();
        local_copy.summary = format!("{}{LOCAL_COPY_SUFFIX}", local_task.summary);

        let copy_uid = self
            .store()
            .add_task(list_id, &local_copy)
            .await
            .map_err(|e| conflict_error(e, list_id, &local_copy.uid))?;
        info!("Kept local version of {} as new task {copy_uid}", remote_task.uid);

        self.store()
            .clear_sync_flags_and_queue(&remote_task.uid)
            .await
            .map_err(|e| conflict_error(e, list_id, &remote_task.uid))
    }
}

fn conflict_error(err: crate::storage::StoreError, list_id: &str, uid: &str) -> SyncError {
    SyncError::new("resolve_conflict", err)
        .with_list(list_id)
        .with_task(uid)
}
