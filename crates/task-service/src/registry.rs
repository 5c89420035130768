//! Task id → record map plus the current-task pointer

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{Error, Result};
use crate::task::Task;

/// Shared handle to one task record.
///
/// Each record has its own lock so log appends from a running job never
/// contend with registry lookups.
pub type TaskHandle = Arc<Mutex<Task>>;

/// Lock a task record, recovering from a poisoned lock.
pub(crate) fn lock_task(handle: &TaskHandle) -> std::sync::MutexGuard<'_, Task> {
    handle.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: HashMap<String, TaskHandle>,
    current: Option<String>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of the current task if it has not reached a terminal state.
    pub fn active(&self) -> Option<String> {
        let handle = self.current_handle()?;
        let task = lock_task(handle);
        (!task.status.is_terminal()).then(|| task.id.clone())
    }

    /// Register `task` and make it the current one.
    pub fn insert_current(&mut self, task: Task) -> Result<TaskHandle> {
        if self.tasks.contains_key(&task.id) {
            return Err(Error::DuplicateTask(task.id));
        }
        let id = task.id.clone();
        let handle = Arc::new(Mutex::new(task));
        self.tasks.insert(id.clone(), handle.clone());
        self.current = Some(id);
        Ok(handle)
    }

    pub fn get(&self, id: &str) -> Option<Task> {
        self.tasks.get(id).map(|h| lock_task(h).clone())
    }

    pub fn current(&self) -> Option<Task> {
        self.current_handle().map(|h| lock_task(h).clone())
    }

    fn current_handle(&self) -> Option<&TaskHandle> {
        self.current.as_ref().and_then(|id| self.tasks.get(id))
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
