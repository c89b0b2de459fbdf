// src/control/registry.rs

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::activity::ActivityLog;
use crate::cluster::OrchestratorClient;
use crate::control::types::{Worker, WorkerPhase};
use crate::error::{ControlError, ControlResult};

/// The worker set as of one successful refresh.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkerSnapshot {
    pub workers: Vec<Worker>,
    /// None until the first refresh succeeds.
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl WorkerSnapshot {
    pub fn get(&self, name: &str) -> Option<&Worker> {
        self.workers.iter().find(|w| w.name == name)
    }

    pub fn ready_count(&self) -> usize {
        self.workers.iter().filter(|w| w.ready).count()
    }

    pub fn count_in_phase(&self, phase: WorkerPhase) -> usize {
        self.workers.iter().filter(|w| w.phase == phase).count()
    }
}

/// Known workers of the workload, rebuilt from the orchestrator on every refresh.
///
/// The published snapshot is swapped as a whole, so readers see either the
/// previous set or the new one and never a mix.
pub struct WorkerRegistry {
    client: Arc<dyn OrchestratorClient>,
    name_pattern: Regex,
    activity: Arc<ActivityLog>,
    published: RwLock<Arc<WorkerSnapshot>>,
}

impl WorkerRegistry {
    pub fn new(
        client: Arc<dyn OrchestratorClient>,
        name_pattern: Regex,
        activity: Arc<ActivityLog>,
    ) -> Self {
        Self {
            client,
            name_pattern,
            activity,
            published: RwLock::new(Arc::new(WorkerSnapshot::default())),
        }
    }

    /// Full refresh from the orchestrator.
    ///
    /// On failure the published set is left exactly as it was and the error is
    /// recorded in the activity log.
    pub async fn refresh(&self) -> ControlResult<Arc<WorkerSnapshot>> {
        let raw = match self.client.list_workers(&self.name_pattern).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Worker refresh failed, keeping previous set: {}", e);
                self.activity
                    .append(self.client.describe_list(), format!("Error: {}", e));
                return Err(e);
            }
        };

        let mut seen = HashSet::with_capacity(raw.len());
        let mut workers = Vec::with_capacity(raw.len());
        for record in &raw {
            if !seen.insert(record.name.as_str()) {
                warn!("Orchestrator reported worker {} twice, keeping the first", record.name);
                continue;
            }
            workers.push(Worker::from_raw(record));
        }

        let snapshot = Arc::new(WorkerSnapshot {
            workers,
            refreshed_at: Some(Utc::now()),
        });

        {
            let mut published = self.published.write().await;
            *published = snapshot.clone();
        }

        debug!(
            "Refreshed workers: {} known, {} ready, {} terminating",
            snapshot.workers.len(),
            snapshot.ready_count(),
            snapshot.count_in_phase(WorkerPhase::Terminating)
        );
        Ok(snapshot)
    }

    /// The most recently published worker set.
    pub async fn snapshot(&self) -> Arc<WorkerSnapshot> {
        self.published.read().await.clone()
    }

    pub async fn get(&self, name: &str) -> Option<Worker> {
        self.snapshot().await.get(name).cloned()
    }

    /// Asks the orchestrator to remove one worker.
    ///
    /// Does not wait for the pod to go away; the next refresh shows it as
    /// terminating until the orchestrator stops reporting it.
    pub async fn delete(&self, name: &str) -> ControlResult<()> {
        if name.is_empty() || name.starts_with('-') || name.contains(char::is_whitespace) {
            let err = ControlError::InvalidWorkerName(name.to_string());
            self.activity
                .append(format!("delete worker {:?}", name), format!("Error: {}", err));
            return Err(err);
        }

        let action = self.client.describe_delete(name);
        self.activity.append(action.clone(), "requested");

        match self.client.delete_worker(name).await {
            Ok(()) => {
                info!("Deletion of worker {} accepted", name);
                self.activity.append(action, "deletion accepted");
                Ok(())
            }
            Err(e) => {
                warn!("Failed to delete worker {}: {}", name, e);
                self.activity.append(action, format!("Error: {}", e));
                Err(e)
            }
        }
    }
}
