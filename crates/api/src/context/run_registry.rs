//! Live run handles keyed by task id

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use calsync_core::RunControl;

/// Controls of the runs executing in this process.
///
/// A task id is present from the moment its run starts until its outcome has
/// been recorded.
#[derive(Default)]
pub struct RunRegistry {
    runs: RwLock<HashMap<String, RunControl>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh control for `task_id` and return it
    pub fn register(&self, task_id: &str) -> RunControl {
        let control = RunControl::new();
        self.insert(task_id, control.clone());
        control
    }

    /// Track a control created elsewhere, e.g. by the scheduler
    pub fn insert(&self, task_id: &str, control: RunControl) {
        self.runs.write().unwrap_or_else(PoisonError::into_inner).insert(task_id.to_string(), control);
    }

    pub fn get(&self, task_id: &str) -> Option<RunControl> {
        self.runs.read().unwrap_or_else(PoisonError::into_inner).get(task_id).cloned()
    }

    pub fn remove(&self, task_id: &str) -> Option<RunControl> {
        self.runs.write().unwrap_or_else(PoisonError::into_inner).remove(task_id)
    }

    pub fn is_live(&self, task_id: &str) -> bool {
        self.runs.read().unwrap_or_else(PoisonError::into_inner).contains_key(task_id)
    }

    /// Cancel every live run; used on shutdown
    pub fn cancel_all(&self) -> usize {
        let runs = self.runs.read().unwrap_or_else(PoisonError::into_inner);
        for control in runs.values() {
            control.cancel();
        }
        runs.len()
    }
}
