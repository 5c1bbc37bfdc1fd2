//! Push phase: drain the pending operation queue against the remote.

use log::{debug, info, warn};
use std::time::Duration;

use super::{SyncEngine, SyncError};
use crate::backend::BackendError;
use crate::constants::{BACKOFF_CAP_SECS, MAX_PUSH_RETRIES};
use crate::storage::{QueueEntry, QueueOperation};

/// Statistics collected by the push phase.
#[derive(Debug, Default)]
pub(crate) struct PushOutcome {
    pub pushed: usize,
    /// Failures worth surfacing to the caller (rejected credentials);
    /// transient failures only land in the queue entry's last_error.
    pub errors: Vec<SyncError>,
}

/// What happened to a single queue entry.
enum EntryOutcome {
    /// The operation reached the remote.
    Pushed,
    /// The entry was obsolete (task gone locally) and has been removed.
    Dropped,
}

impl SyncEngine {
    /// Sends queued local changes to the remote, in FIFO order.
    ///
    /// Entries that exhausted their retries are skipped permanently but kept
    /// for diagnostics. A failing entry gets its retry counter bumped and
    /// its error recorded, then the loop backs off exponentially and moves
    /// on to the next entry.
    pub(crate) async fn push(&self) -> Result<PushOutcome, SyncError> {
        let mut outcome = PushOutcome::default();

        let operations = self
            .store()
            .pending_operations()
            .await
            .map_err(|e| SyncError::new("push", e))?;
        debug!("Push: {} pending operations", operations.len());

        for entry in operations {
            if entry.retry_count >= MAX_PUSH_RETRIES {
                debug!(
                    "Skipping {} for task {} after {} retries",
                    entry.operation.as_str(),
                    entry.task_uid,
                    entry.retry_count
                );
                continue;
            }

            let result = match entry.operation {
                QueueOperation::Create => self.push_create(&entry).await,
                QueueOperation::Update => self.push_update(&entry).await,
                QueueOperation::Delete => self.push_delete(&entry).await,
            };

            match result {
                Ok(EntryOutcome::Pushed) => outcome.pushed += 1,
                Ok(EntryOutcome::Dropped) => {}
                Err(err) => {
                    warn!(
                        "❌ Push {} failed for task {}: {err}",
                        entry.operation.as_str(),
                        entry.task_uid
                    );
                    self.store()
                        .record_push_failure(entry.id, &err.to_string())
                        .await
                        .map_err(|e| SyncError::new("push", e).with_task(&entry.task_uid))?;

                    let unauthorized = err
                        .cause()
                        .downcast_ref::<BackendError>()
                        .is_some_and(BackendError::is_unauthorized);
                    if unauthorized {
                        // No amount of waiting fixes rejected credentials.
                        outcome.errors.push(err);
                        continue;
                    }

                    let backoff = backoff_seconds(entry.retry_count + 1);
                    debug!("Backing off {backoff}s before next queue entry");
                    tokio::time::sleep(Duration::from_secs(backoff)).await;
                }
            }
        }

        Ok(outcome)
    }

    /// Pushes a `create`: reads the current task state, sends it to the
    /// remote and rebinds the UID when the remote assigned its own.
    async fn push_create(&self, entry: &QueueEntry) -> Result<EntryOutcome, SyncError> {
        let task = self
            .store()
            .get_task(&entry.list_id, &entry.task_uid)
            .await
            .map_err(|e| push_error("AddTask", e, entry))?;

        let Some(task) = task else {
            // Deleted locally after being enqueued.
            self.store()
                .remove_operation(&entry.task_uid, QueueOperation::Create)
                .await
                .map_err(|e| push_error("AddTask", e, entry))?;
            return Ok(EntryOutcome::Dropped);
        };

        let assigned_uid = self
            .remote()
            .add_task(&entry.list_id, &task)
            .await
            .map_err(|e| push_error("AddTask", e, entry))?;

        if assigned_uid != task.uid {
            info!(
                "Remote assigned UID {assigned_uid} to task {}, rebinding",
                task.uid
            );
            self.store()
                .rebind_task_uid(&entry.list_id, &task.uid, &assigned_uid)
                .await
                .map_err(|e| push_error("AddTask", e, entry))?;
        } else {
            self.store()
                .clear_sync_flags_and_queue(&task.uid)
                .await
                .map_err(|e| push_error("AddTask", e, entry))?;
        }

        Ok(EntryOutcome::Pushed)
    }

    /// Pushes an `update` of the current task state.
    async fn push_update(&self, entry: &QueueEntry) -> Result<EntryOutcome, SyncError> {
        let task = self
            .store()
            .get_task(&entry.list_id, &entry.task_uid)
            .await
            .map_err(|e| push_error("UpdateTask", e, entry))?;

        let Some(task) = task else {
            self.store()
                .remove_operation(&entry.task_uid, QueueOperation::Update)
                .await
                .map_err(|e| push_error("UpdateTask", e, entry))?;
            return Ok(EntryOutcome::Dropped);
        };

        self.remote()
            .update_task(&entry.list_id, &task)
            .await
            .map_err(|e| push_error("UpdateTask", e, entry))?;

        self.store()
            .clear_sync_flags_and_queue(&task.uid)
            .await
            .map_err(|e| push_error("UpdateTask", e, entry))?;

        Ok(EntryOutcome::Pushed)
    }

    /// Pushes a `delete`. A remote NotFound means the task is already gone
    /// and counts as success.
    async fn push_delete(&self, entry: &QueueEntry) -> Result<EntryOutcome, SyncError> {
        match self
            .remote()
            .delete_task(&entry.list_id, &entry.task_uid)
            .await
        {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {
                debug!("Task {} already gone on remote", entry.task_uid);
            }
            Err(err) => return Err(push_error("DeleteTask", err, entry)),
        }

        self.store()
            .clear_sync_flags_and_queue(&entry.task_uid)
            .await
            .map_err(|e| push_error("DeleteTask", e, entry))?;

        Ok(EntryOutcome::Pushed)
    }
}

fn push_error(
    operation: &'static str,
    err: impl Into<anyhow::Error>,
    entry: &QueueEntry,
) -> SyncError {
    SyncError::new(operation, err)
        .with_list(&entry.list_id)
        .with_task(&entry.task_uid)
}

/// `min(2^retries, 300)` seconds.
fn backoff_seconds(retries: i64) -> u64 {
    let exponent = retries.clamp(0, 32) as u32;
    2u64.saturating_pow(exponent).min(BACKOFF_CAP_SECS)
}
