//! Background synchronization coordinator.
//!
//! Wraps a [`SyncEngine`] with non-blocking triggers suited for interactive
//! front-ends: writes kick off a background push, reads kick off a
//! background pull when the cached data looks stale. In-flight guards make
//! sure at most one push and one pull per list run at a time, and failures
//! are logged rather than surfaced.

use log::{error, info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::constants::ONLINE_PROBE_TIMEOUT_SECS;
use crate::storage::StoreError;
use crate::sync::SyncEngine;

/// Coordinates automatic background synchronization for one engine.
pub struct SyncCoordinator {
    engine: Arc<SyncEngine>,
    /// Auto-sync interval in minutes; 0 means cached data is never stale.
    sync_interval_minutes: u64,

    push_syncing: Arc<AtomicBool>,
    pull_syncing: Arc<Mutex<HashMap<String, Arc<AtomicBool>>>>,
    in_flight: Arc<AtomicUsize>,
    shutdown: Arc<AtomicBool>,
}

impl SyncCoordinator {
    /// Creates a new sync coordinator.
    pub fn new(engine: Arc<SyncEngine>, sync_interval_minutes: u64) -> Self {
        Self {
            engine,
            sync_interval_minutes,
            push_syncing: Arc::new(AtomicBool::new(false)),
            pull_syncing: Arc::new(Mutex::new(HashMap::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Triggers a background push sync after a local write. Non-blocking;
    /// returns immediately. Skipped when one is already running.
    pub fn trigger_push_sync(&self) {
        if self.shutdown.load(Ordering::SeqCst) {
            return;
        }
        if self
            .push_syncing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let engine = Arc::clone(&self.engine);
        let push_syncing = Arc::clone(&self.push_syncing);
        let in_flight = Arc::clone(&self.in_flight);

        in_flight.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            if !is_online(&engine).await {
                info!("Skipping background push: offline");
            } else {
                let result = engine.push_only().await;
                if !result.is_success() {
                    for err in &result.errors {
                        error!("Background push error: {err}");
                    }
                } else if result.pushed > 0 {
                    info!("Background push completed: {} tasks synced", result.pushed);
                }
            }
            push_syncing.store(false, Ordering::SeqCst);
            in_flight.fetch_sub(1, Ordering::SeqCst);
        });
    }

    /// Triggers a background full sync for reads of the given list.
    /// Non-blocking; returns immediately. Skipped when a sync for the same
    /// list is already running.
    pub fn trigger_pull_sync(&self, list_id: &str) {
        if self.shutdown.load(Ordering::SeqCst) {
            return;
        }

        let pull_flag = {
            let mut map = self.pull_syncing.lock().unwrap();
            Arc::clone(
                map.entry(list_id.to_string())
                    .or_insert_with(|| Arc::new(AtomicBool::new(false))),
            )
        };
        if pull_flag
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let engine = Arc::clone(&self.engine);
        let in_flight = Arc::clone(&self.in_flight);

        in_flight.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            if !is_online(&engine).await {
                info!("Skipping background sync: offline");
            } else {
                let result = engine.sync().await;
                if !result.is_success() {
                    for err in &result.errors {
                        error!("Background sync error: {err}");
                    }
                } else if result.pulled > 0 || result.pushed > 0 {
                    info!(
                        "Background sync completed: {} pulled, {} pushed",
                        result.pulled, result.pushed
                    );
                }
            }
            pull_flag.store(false, Ordering::SeqCst);
            in_flight.fetch_sub(1, Ordering::SeqCst);
        });
    }

    /// Whether the cached data for a list is older than the configured sync
    /// interval. Interval 0 means never stale; a list that was never fully
    /// synced is always stale.
    pub async fn is_stale(&self, list_id: &str) -> Result<bool, StoreError> {
        if self.sync_interval_minutes == 0 {
            return Ok(false);
        }

        let last_sync = self.engine.store().last_full_sync(list_id).await?;
        match last_sync {
            None => Ok(true),
            Some(last_sync) => {
                let threshold = chrono::Duration::minutes(self.sync_interval_minutes as i64);
                Ok(chrono::Utc::now() - last_sync > threshold)
            }
        }
    }

    /// Probes the remote with a bounded, lightweight request.
    pub async fn is_online(&self) -> bool {
        is_online(&self.engine).await
    }

    /// Stops accepting triggers and waits (bounded) for in-flight syncs.
    pub async fn shutdown(&self, timeout: Duration) {
        self.shutdown.store(true, Ordering::SeqCst);

        let deadline = tokio::time::Instant::now() + timeout;
        while self.in_flight.load(Ordering::SeqCst) > 0 {
            if tokio::time::Instant::now() >= deadline {
                warn!("Pending background syncs did not complete within {timeout:?}");
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

async fn is_online(engine: &SyncEngine) -> bool {
    let probe = engine.remote().get_task_lists();
    matches!(
        tokio::time::timeout(Duration::from_secs(ONLINE_PROBE_TIMEOUT_SECS), probe).await,
        Ok(Ok(_))
    )
}
