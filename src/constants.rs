//! Constants used throughout the engine.
//!
//! This module centralizes directory names, sync tuning values, and other
//! constants to improve maintainability and consistency.

/// Application directory name under XDG data/config roots
pub const APP_DIR: &str = "tasksync";

/// Database file name inside the application data directory
pub const DB_FILE_NAME: &str = "tasks.db";

/// Config file name inside the XDG config directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Config file name looked up in the current directory
pub const LOCAL_CONFIG_FILE_NAME: &str = "tasksync.toml";

// Sync tuning

/// Queue entries at or above this retry count are skipped permanently
pub const MAX_PUSH_RETRIES: i64 = 5;

/// Upper bound for the exponential push backoff, in seconds
pub const BACKOFF_CAP_SECS: u64 = 300;

/// Timeout for the background coordinator's online probe, in seconds
pub const ONLINE_PROBE_TIMEOUT_SECS: u64 = 3;

/// Suffix appended to the local duplicate created by keep-both resolution
pub const LOCAL_COPY_SUFFIX: &str = " (local copy)";

/// Prefix of placeholder UIDs assigned before a remote names the task
pub const PENDING_UID_PREFIX: &str = "pending-";

/// Current schema version recorded in the schema_version table
pub const SCHEMA_VERSION: i64 = 1;

/// Upper bound for the configurable auto-sync interval (24 hours)
pub const MAX_SYNC_INTERVAL_MINUTES: u64 = 1440;
