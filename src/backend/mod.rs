//! Backend abstraction layer for multi-backend support.
//!
//! This module defines the common interface that every remote task service
//! must implement, along with the shared data types and error handling the
//! sync engine consumes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub mod memory;

/// Common error types for backend operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Backend error: {0}")]
    Other(String),
}

impl BackendError {
    /// Returns true if the error means the requested entity does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::NotFound(_))
    }

    /// Returns true if the error means credentials were rejected.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, BackendError::Unauthorized(_))
    }

    /// Returns true for transient 5xx-class failures worth retrying.
    pub fn is_server_error(&self) -> bool {
        matches!(self, BackendError::Server(_))
    }
}

/// Task status in the CalDAV canonical vocabulary.
///
/// Backends that store a different vocabulary translate at their boundary via
/// [`Backend::parse_status_flag`] and [`Backend::status_display_name`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    #[default]
    NeedsAction,
    InProcess,
    Completed,
    Cancelled,
}

impl TaskStatus {
    /// The canonical CalDAV name, as stored and sent over the wire.
    pub fn as_caldav(self) -> &'static str {
        match self {
            TaskStatus::NeedsAction => "NEEDS-ACTION",
            TaskStatus::InProcess => "IN-PROCESS",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Cancelled => "CANCELLED",
        }
    }

    /// The display name shown to users.
    pub fn display_name(self) -> &'static str {
        match self {
            TaskStatus::NeedsAction => "TODO",
            TaskStatus::InProcess => "PROCESSING",
            TaskStatus::Completed => "DONE",
            TaskStatus::Cancelled => "CANCELLED",
        }
    }

    /// Parses a canonical CalDAV status name.
    pub fn from_caldav(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "NEEDS-ACTION" => Some(TaskStatus::NeedsAction),
            "IN-PROCESS" => Some(TaskStatus::InProcess),
            "COMPLETED" => Some(TaskStatus::Completed),
            "CANCELLED" => Some(TaskStatus::Cancelled),
            _ => None,
        }
    }

    /// Parses a user-supplied status flag, accepting single-letter
    /// abbreviations, display names, and canonical names.
    pub fn parse_flag(flag: &str) -> Result<Self, BackendError> {
        match flag.to_uppercase().as_str() {
            "T" | "TODO" | "NEEDS-ACTION" => Ok(TaskStatus::NeedsAction),
            "D" | "DONE" | "COMPLETED" => Ok(TaskStatus::Completed),
            "P" | "PROCESSING" | "IN-PROCESS" => Ok(TaskStatus::InProcess),
            "C" | "CANCELLED" => Ok(TaskStatus::Cancelled),
            _ => Err(BackendError::InvalidData(format!(
                "invalid status flag: {flag} (valid: T/TODO, D/DONE, P/PROCESSING, C/CANCELLED)"
            ))),
        }
    }
}

static DISPLAY_TO_CANONICAL: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("TODO", "NEEDS-ACTION"),
        ("DONE", "COMPLETED"),
        ("PROCESSING", "IN-PROCESS"),
        ("CANCELLED", "CANCELLED"),
    ])
});

static CANONICAL_TO_DISPLAY: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("NEEDS-ACTION", "TODO"),
        ("COMPLETED", "DONE"),
        ("IN-PROCESS", "PROCESSING"),
        ("CANCELLED", "CANCELLED"),
    ])
});

/// Translates a list of display status names ("TODO", "DONE", ...) into the
/// canonical CalDAV vocabulary. Unknown names pass through untouched.
pub fn statuses_to_canonical(statuses: &[String]) -> Vec<String> {
    statuses
        .iter()
        .map(|s| {
            let upper = s.to_uppercase();
            DISPLAY_TO_CANONICAL
                .get(upper.as_str())
                .map_or_else(|| s.clone(), |t| (*t).to_string())
        })
        .collect()
}

/// Translates a list of canonical CalDAV status names into the display
/// vocabulary. Unknown names pass through untouched.
pub fn statuses_to_display(statuses: &[String]) -> Vec<String> {
    statuses
        .iter()
        .map(|s| {
            let upper = s.to_uppercase();
            CANONICAL_TO_DISPLAY
                .get(upper.as_str())
                .map_or_else(|| s.clone(), |t| (*t).to_string())
        })
        .collect()
}

/// Backend-agnostic task representation.
///
/// Timestamps carry second precision; the store persists them as Unix
/// seconds. `None` for `created`/`modified` means "not yet stamped" and the
/// store fills them in on insert.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Task {
    pub uid: String,
    pub summary: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    /// 0 = undefined, 1 = highest, 9 = lowest.
    pub priority: i32,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub start_date: Option<DateTime<Utc>>,
    pub completed: Option<DateTime<Utc>>,
    /// UID of the parent task, for subtasks. Must live in the same list.
    pub parent_uid: Option<String>,
    pub categories: Vec<String>,
}

/// Backend-agnostic task list representation.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TaskList {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
    /// Opaque per-list version token; empty when the backend has none.
    pub ctag: String,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Optional filters for task queries. All present fields are ANDed.
#[derive(Clone, Debug, Default)]
pub struct TaskFilter {
    pub statuses: Option<Vec<TaskStatus>>,
    pub due_before: Option<DateTime<Utc>>,
    pub due_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub created_after: Option<DateTime<Utc>>,
}

impl TaskFilter {
    /// Returns true when the task passes every filter that is set.
    pub fn matches(&self, task: &Task) -> bool {
        if let Some(statuses) = &self.statuses {
            if !statuses.contains(&task.status) {
                return false;
            }
        }
        if let Some(before) = self.due_before {
            match task.due_date {
                Some(due) if due <= before => {}
                _ => return false,
            }
        }
        if let Some(after) = self.due_after {
            match task.due_date {
                Some(due) if due >= after => {}
                _ => return false,
            }
        }
        if let Some(before) = self.created_before {
            match task.created {
                Some(created) if created <= before => {}
                _ => return false,
            }
        }
        if let Some(after) = self.created_after {
            match task.created {
                Some(created) if created >= after => {}
                _ => return false,
            }
        }
        true
    }
}

/// Backend trait that all remote task services implement.
///
/// The sync engine consumes remotes exclusively through this interface;
/// wire-level concerns (HTTP, XML, iCalendar) live behind it.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Returns the backend type identifier (e.g., "caldav", "memory").
    fn backend_type(&self) -> &str;

    /// Fetches all task lists, including the CTag when the remote provides
    /// one (empty string otherwise).
    async fn get_task_lists(&self) -> Result<Vec<TaskList>, BackendError>;

    /// Fetches all tasks currently present in a list. Deleted tasks simply
    /// do not appear. Each task carries its remote UID and modified
    /// timestamp.
    async fn get_tasks(
        &self,
        list_id: &str,
        filter: Option<&TaskFilter>,
    ) -> Result<Vec<Task>, BackendError>;

    /// Creates a task and returns the UID the remote assigned. Remotes that
    /// generate their own identifiers return a different UID than the one
    /// passed in; the engine treats the returned value as authoritative.
    async fn add_task(&self, list_id: &str, task: &Task) -> Result<String, BackendError>;

    /// Updates an existing task, matched by UID.
    async fn update_task(&self, list_id: &str, task: &Task) -> Result<(), BackendError>;

    /// Deletes a task. Must signal [`BackendError::NotFound`] distinctly so
    /// the engine can treat "already gone" as success.
    async fn delete_task(&self, list_id: &str, uid: &str) -> Result<(), BackendError>;

    /// Converts a user-supplied status flag into this backend's status.
    /// The default implementation uses the canonical CalDAV vocabulary.
    fn parse_status_flag(&self, flag: &str) -> Result<TaskStatus, BackendError> {
        TaskStatus::parse_flag(flag)
    }

    /// Converts a status into the display vocabulary.
    fn status_display_name(&self, status: TaskStatus) -> &'static str {
        status.display_name()
    }
}
