//! In-process backend keeping all state in memory.
//!
//! Serves two purposes: an ephemeral local backend for callers that want the
//! engine without any persistence on the remote side, and the reference
//! remote for the integration test suite. It supports CTag bumping on every
//! mutation, remote-assigned IDs, and error injection so retry behavior can
//! be exercised deterministically.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use super::{Backend, BackendError, Task, TaskFilter, TaskList};

#[derive(Default)]
struct MemoryState {
    lists: Vec<TaskList>,
    tasks: HashMap<String, Vec<Task>>,
    ctag_counters: HashMap<String, u64>,
    next_remote_id: u64,
    add_error: Option<BackendError>,
    update_error: Option<BackendError>,
    delete_error: Option<BackendError>,
}

/// An in-memory implementation of [`Backend`].
#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
    assign_remote_ids: bool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend that assigns its own `mem-<n>` identifiers on
    /// create, the way REST services with opaque IDs do.
    pub fn with_assigned_ids() -> Self {
        Self {
            assign_remote_ids: true,
            ..Self::default()
        }
    }

    /// Creates a task list and returns its generated ID.
    pub fn create_task_list(&self, name: &str, description: &str, color: &str) -> String {
        let mut state = self.state.lock().unwrap();
        let list_id = Uuid::new_v4().to_string();
        state.lists.push(TaskList {
            id: list_id.clone(),
            name: name.to_string(),
            description: (!description.is_empty()).then(|| description.to_string()),
            color: (!color.is_empty()).then(|| color.to_string()),
            ctag: "ctag-0".to_string(),
            deleted_at: None,
        });
        state.tasks.insert(list_id.clone(), Vec::new());
        state.ctag_counters.insert(list_id.clone(), 0);
        list_id
    }

    /// Registers a list with a caller-chosen ID and CTag. Replaces any
    /// existing list with the same ID, keeping its tasks.
    pub fn register_list(&self, list: TaskList) {
        let mut state = self.state.lock().unwrap();
        state.tasks.entry(list.id.clone()).or_default();
        state.ctag_counters.entry(list.id.clone()).or_insert(0);
        if let Some(existing) = state.lists.iter_mut().find(|l| l.id == list.id) {
            *existing = list;
        } else {
            state.lists.push(list);
        }
    }

    /// Overrides the CTag of a list.
    pub fn set_ctag(&self, list_id: &str, ctag: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(list) = state.lists.iter_mut().find(|l| l.id == list_id) {
            list.ctag = ctag.to_string();
        }
    }

    /// Makes every subsequent `add_task` fail with the given error until
    /// cleared with `None`.
    pub fn inject_add_error(&self, error: Option<BackendError>) {
        self.state.lock().unwrap().add_error = error;
    }

    /// Makes every subsequent `update_task` fail with the given error.
    pub fn inject_update_error(&self, error: Option<BackendError>) {
        self.state.lock().unwrap().update_error = error;
    }

    /// Makes every subsequent `delete_task` fail with the given error.
    pub fn inject_delete_error(&self, error: Option<BackendError>) {
        self.state.lock().unwrap().delete_error = error;
    }

    /// Snapshot of the tasks in a list, for assertions and inspection.
    pub fn tasks_in(&self, list_id: &str) -> Vec<Task> {
        let state = self.state.lock().unwrap();
        state.tasks.get(list_id).cloned().unwrap_or_default()
    }

    /// Current CTag of a list, empty if the list is unknown.
    pub fn ctag_of(&self, list_id: &str) -> String {
        let state = self.state.lock().unwrap();
        state
            .lists
            .iter()
            .find(|l| l.id == list_id)
            .map(|l| l.ctag.clone())
            .unwrap_or_default()
    }

    fn bump_ctag(state: &mut MemoryState, list_id: &str) {
        let counter = state.ctag_counters.entry(list_id.to_string()).or_insert(0);
        *counter += 1;
        let ctag = format!("ctag-{counter}");
        if let Some(list) = state.lists.iter_mut().find(|l| l.id == list_id) {
            list.ctag = ctag;
        }
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn backend_type(&self) -> &str {
        "memory"
    }

    async fn get_task_lists(&self) -> Result<Vec<TaskList>, BackendError> {
        let state = self.state.lock().unwrap();
        Ok(state.lists.clone())
    }

    async fn get_tasks(
        &self,
        list_id: &str,
        filter: Option<&TaskFilter>,
    ) -> Result<Vec<Task>, BackendError> {
        let state = self.state.lock().unwrap();
        let tasks = state.tasks.get(list_id).cloned().unwrap_or_default();
        match filter {
            Some(filter) => Ok(tasks.into_iter().filter(|t| filter.matches(t)).collect()),
            None => Ok(tasks),
        }
    }

    async fn add_task(&self, list_id: &str, task: &Task) -> Result<String, BackendError> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = &state.add_error {
            return Err(err.clone());
        }

        let mut task = task.clone();
        if self.assign_remote_ids || task.uid.is_empty() {
            state.next_remote_id += 1;
            task.uid = format!("mem-{}", state.next_remote_id);
        }
        let uid = task.uid.clone();

        let tasks = state.tasks.entry(list_id.to_string()).or_default();
        match tasks.iter_mut().find(|t| t.uid == uid) {
            Some(existing) => *existing = task,
            None => tasks.push(task),
        }

        Self::bump_ctag(&mut state, list_id);
        Ok(uid)
    }

    async fn update_task(&self, list_id: &str, task: &Task) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = &state.update_error {
            return Err(err.clone());
        }

        // PUT semantics: an update for an unknown UID stores the task, the
        // way CalDAV recreates resources. Push relies on this to restore
        // locally modified tasks that were deleted remotely.
        let tasks = state.tasks.entry(list_id.to_string()).or_default();
        match tasks.iter_mut().find(|t| t.uid == task.uid) {
            Some(existing) => *existing = task.clone(),
            None => tasks.push(task.clone()),
        }

        Self::bump_ctag(&mut state, list_id);
        Ok(())
    }

    async fn delete_task(&self, list_id: &str, uid: &str) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = &state.delete_error {
            return Err(err.clone());
        }

        let tasks = state
            .tasks
            .get_mut(list_id)
            .ok_or_else(|| BackendError::NotFound(format!("list {list_id} not found")))?;
        let before = tasks.len();
        tasks.retain(|t| t.uid != uid);
        if tasks.len() == before {
            return Err(BackendError::NotFound(format!(
                "task {uid} not found in list {list_id}"
            )));
        }

        Self::bump_ctag(&mut state, list_id);
        Ok(())
    }
}
