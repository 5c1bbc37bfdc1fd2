//! tasksync - An offline-first task synchronization engine
//!
//! This library keeps a durable local cache of todo tasks and reconciles it
//! with remote task services (CalDAV-style servers, REST services that
//! assign their own IDs, local stores). Reads are always served from the
//! cache; writes are applied locally first, queued, and pushed on demand;
//! remote changes are pulled and merged under an explicit
//! conflict-resolution strategy.
//!
//! # Modules
//!
//! The library is organized into several key modules:
//!
//! * [`backend`] - Remote service abstraction and shared data types
//! * [`config`] - Application configuration management
//! * [`storage`] - Durable local cache, operation queue and sync metadata
//! * [`sync`] - The pull/push synchronization engine
//! * [`sync_coordinator`] - Background sync triggers for front-ends
//! * [`logger`] - Sync activity logging utilities
//! * [`utils`] - Utility functions and helpers

/// Backend abstraction layer for multi-backend support
pub mod backend;

/// Configuration module for managing application settings
pub mod config;

/// Application constants and default values
pub mod constants;

/// Logging utilities for sync history and file logging
pub mod logger;

/// Durable local storage layer for caching task data
pub mod storage;

/// Synchronization engine keeping local and remote data in sync
pub mod sync;

/// Background synchronization coordination
pub mod sync_coordinator;

/// Utility functions for date/time handling and other helpers
pub mod utils;

// Re-export the main types for convenient access
pub use backend::{Backend, BackendError, Task, TaskFilter, TaskList, TaskStatus};
pub use config::Config;
pub use logger::Logger;
pub use storage::{LocalStore, StoreError};
pub use sync::{ConflictStrategy, SyncEngine, SyncError, SyncResult, SyncStats};
pub use sync_coordinator::SyncCoordinator;
