//! Pull phase: enumerate the remote, diff against the cache, apply changes
//! and route conflicts to the resolver.

use log::{debug, info, warn};
use std::collections::HashMap;

use super::hierarchy::sort_by_hierarchy;
use super::{SyncEngine, SyncError};
use crate::backend::{Task, TaskList};

/// Statistics collected by the pull phase.
#[derive(Debug, Default)]
pub(crate) struct PullOutcome {
    pub pulled: usize,
    pub conflicts_found: usize,
    pub conflicts_resolved: usize,
    /// Per-list failures that did not stop the rest of the pull.
    pub errors: Vec<SyncError>,
}

/// How far a pull failure reaches.
enum PullError {
    /// This list could not be processed; the pull continues with the next.
    ListSkipped(SyncError),
    /// The cache may be mid-write; the whole pull aborts.
    Fatal(SyncError),
}

impl From<SyncError> for PullError {
    fn from(err: SyncError) -> Self {
        PullError::Fatal(err)
    }
}

impl SyncEngine {
    /// Retrieves remote changes and applies them locally.
    pub(crate) async fn pull(&self) -> Result<PullOutcome, SyncError> {
        let mut outcome = PullOutcome::default();

        let remote_lists = self
            .remote()
            .get_task_lists()
            .await
            .map_err(|e| SyncError::new("pull", e))?;
        debug!("Pull: {} remote lists", remote_lists.len());

        for remote_list in remote_lists {
            match self.pull_list(&remote_list, &mut outcome).await {
                Ok(()) => {}
                Err(PullError::ListSkipped(e)) => {
                    warn!("⚠️  Skipping list {}: {e}", remote_list.id);
                    outcome.errors.push(e);
                }
                Err(PullError::Fatal(e)) => return Err(e),
            }
        }

        Ok(outcome)
    }

    /// Pulls a single remote list into the cache.
    async fn pull_list(
        &self,
        remote_list: &TaskList,
        outcome: &mut PullOutcome,
    ) -> Result<(), PullError> {
        let store = self.store();
        let list_id = remote_list.id.as_str();

        let record = store
            .get_list_record(list_id)
            .await
            .map_err(|e| SyncError::new("pull", e).with_list(list_id))?;

        match record {
            // A matching CTag is the one skip: nothing in the list changed.
            // An empty remote CTag carries no version information, so those
            // lists are always enumerated.
            Some(record)
                if !remote_list.ctag.is_empty() && record.last_ctag == remote_list.ctag =>
            {
                debug!("List {list_id} unchanged (ctag {}), skipping", remote_list.ctag);
                return Ok(());
            }
            Some(_) => {
                store
                    .update_list_ctag(list_id, &remote_list.ctag)
                    .await
                    .map_err(|e| SyncError::new("pull", e).with_list(list_id))?;
            }
            None => {
                store
                    .insert_list_record(remote_list)
                    .await
                    .map_err(|e| SyncError::new("pull", e).with_list(list_id))?;
            }
        }

        let remote_tasks = self
            .remote()
            .get_tasks(list_id, None)
            .await
            .map_err(|e| {
                PullError::ListSkipped(SyncError::new("GetTasks", e).with_list(list_id))
            })?;

        // Parents must land before children to satisfy the parent foreign
        // key on insert.
        let remote_tasks = sort_by_hierarchy(remote_tasks);

        let local_tasks = store
            .get_tasks(list_id, None)
            .await
            .map_err(|e| SyncError::new("pull", e).with_list(list_id))?;
        let mut local_map: HashMap<String, Task> = local_tasks
            .into_iter()
            .map(|task| (task.uid.clone(), task))
            .collect();

        for remote_task in remote_tasks {
            match local_map.remove(&remote_task.uid) {
                None => {
                    store
                        .insert_remote_task(list_id, &remote_task)
                        .await
                        .map_err(|e| {
                            SyncError::new("pull", e)
                                .with_list(list_id)
                                .with_task(&remote_task.uid)
                        })?;
                    outcome.pulled += 1;
                }
                Some(local_task) => {
                    let locally_modified = store
                        .is_task_locally_modified(&remote_task.uid)
                        .await
                        .map_err(|e| SyncError::new("pull", e).with_task(&remote_task.uid))?;
                    let remote_modified = store
                        .is_task_remote_modified(&remote_task)
                        .await
                        .map_err(|e| SyncError::new("pull", e).with_task(&remote_task.uid))?;

                    if locally_modified && remote_modified {
                        outcome.conflicts_found += 1;
                        info!(
                            "⚡ Conflict on task {} in list {list_id}",
                            remote_task.uid
                        );
                        self.resolve_conflict(list_id, &local_task, &remote_task)
                            .await?;
                        outcome.conflicts_resolved += 1;
                    } else if locally_modified {
                        // Only changed here; the push phase sends it out.
                    } else {
                        store
                            .apply_remote_task(list_id, &remote_task)
                            .await
                            .map_err(|e| {
                                SyncError::new("pull", e)
                                    .with_list(list_id)
                                    .with_task(&remote_task.uid)
                            })?;
                        outcome.pulled += 1;
                    }
                }
            }
        }

        // Whatever is left locally no longer exists on the remote. Locally
        // modified tasks survive; the push phase recreates them remotely.
        for uid in local_map.into_keys() {
            let locally_modified = store
                .is_task_locally_modified(&uid)
                .await
                .map_err(|e| SyncError::new("pull", e).with_task(&uid))?;
            if !locally_modified {
                debug!("Task {uid} gone from remote, deleting locally");
                store
                    .remove_local_task(list_id, &uid)
                    .await
                    .map_err(|e| {
                        SyncError::new("pull", e).with_list(list_id).with_task(&uid)
                    })?;
            }
        }

        Ok(())
    }
}
