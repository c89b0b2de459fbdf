// src/activity.rs
// Append-only audit trail of control actions, read by the dashboard.

use chrono::{DateTime, Utc};
use log::info;
use serde::Serialize;
use std::sync::{Mutex, MutexGuard};

/// One control action and what came of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityEntry {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub outcome: String,
}

/// Time-ordered record of every poll failure, scale, dispatch and delete.
///
/// Entries are never mutated or removed once written. Growth is unbounded;
/// trimming what is shown is left to whoever renders the snapshot.
#[derive(Debug, Default)]
pub struct ActivityLog {
    entries: Mutex<Vec<ActivityEntry>>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, action: impl Into<String>, outcome: impl Into<String>) {
        let action = action.into();
        let outcome = outcome.into();
        info!("[activity] {} => {}", action, outcome.replace('\n', " | "));

        let mut entries = self.lock();
        entries.push(ActivityEntry {
            timestamp: Utc::now(),
            action,
            outcome,
        });
    }

    /// Copy of every entry appended before this call, in append order.
    pub fn snapshot(&self) -> Vec<ActivityEntry> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // push is the only mutation, so a poisoned log is still consistent
    fn lock(&self) -> MutexGuard<'_, Vec<ActivityEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
