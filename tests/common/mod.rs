// tests/common/mod.rs
// In-memory stand-ins for the orchestrator, deployment tool and worker pool.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures::StreamExt;
use regex::Regex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use mlfleet_lib::activity::ActivityLog;
use mlfleet_lib::cluster::{
    DeploymentTool, OrchestratorClient, RawWorker, ResultLines, WorkerPool,
};
use mlfleet_lib::control::{
    DispatchCoordinator, ReplicaBounds, ReplicaController, WorkItem, WorkerRegistry,
};
use mlfleet_lib::error::{ControlError, ControlResult};

/// Ordered record of external calls, shared by the fakes.
pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn events(log: &EventLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

pub fn raw_worker(name: &str, phase: &str, ready: bool, deleting: bool) -> RawWorker {
    RawWorker {
        name: name.to_string(),
        phase: Some(phase.to_string()),
        ready: Some(ready),
        deletion_requested: deleting,
        created_at: Utc.with_ymd_and_hms(2024, 11, 2, 10, 15, 0).unwrap(),
    }
}

pub fn result_line(item: &str, worker: &str) -> String {
    format!(
        r#"{{"filename": "{}", "class": "お", "confidence": 0.87, "processingPod": "{}"}}"#,
        item, worker
    )
}

#[derive(Default)]
pub struct FakeOrchestrator {
    pub workers: Mutex<Vec<RawWorker>>,
    pub fail_lists: AtomicBool,
    pub fail_deletes: AtomicBool,
    pub list_calls: AtomicUsize,
    pub deleted: Mutex<Vec<String>>,
}

impl FakeOrchestrator {
    pub fn with_workers(workers: Vec<RawWorker>) -> Self {
        Self {
            workers: Mutex::new(workers),
            ..Self::default()
        }
    }

    pub fn set_workers(&self, workers: Vec<RawWorker>) {
        *self.workers.lock().unwrap() = workers;
    }
}

#[async_trait]
impl OrchestratorClient for FakeOrchestrator {
    async fn list_workers(&self, pattern: &Regex) -> ControlResult<Vec<RawWorker>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_lists.load(Ordering::SeqCst) {
            return Err(ControlError::OrchestratorUnavailable(
                "connection refused".to_string(),
            ));
        }
        Ok(self
            .workers
            .lock()
            .unwrap()
            .iter()
            .filter(|w| pattern.is_match(&w.name))
            .cloned()
            .collect())
    }

    async fn delete_worker(&self, name: &str) -> ControlResult<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(ControlError::OrchestratorUnavailable(
                "forbidden".to_string(),
            ));
        }
        self.deleted.lock().unwrap().push(name.to_string());
        Ok(())
    }
}

pub struct FakeDeployment {
    pub events: EventLog,
    pub calls: Mutex<Vec<ReplicaBounds>>,
    /// Bounds the tool refuses to apply.
    pub reject: Mutex<Vec<ReplicaBounds>>,
}

impl FakeDeployment {
    pub fn new(events: EventLog) -> Self {
        Self {
            events,
            calls: Mutex::new(Vec::new()),
            reject: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<ReplicaBounds> {
        self.calls.lock().unwrap().clone()
    }

    pub fn reject(&self, bounds: ReplicaBounds) {
        self.reject.lock().unwrap().push(bounds);
    }
}

#[async_trait]
impl DeploymentTool for FakeDeployment {
    async fn set_replica_bounds(&self, bounds: ReplicaBounds) -> ControlResult<()> {
        self.calls.lock().unwrap().push(bounds);
        self.events
            .lock()
            .unwrap()
            .push(format!("scale {}..{}", bounds.min, bounds.max));
        if self.reject.lock().unwrap().contains(&bounds) {
            return Err(ControlError::ScaleFailed("release not found".to_string()));
        }
        Ok(())
    }

    fn describe(&self, bounds: ReplicaBounds) -> String {
        format!("$ helm upgrade min={} max={}", bounds.min, bounds.max)
    }
}

/// Scripted reply for one submitted batch.
pub enum PoolReply {
    Lines(Vec<String>),
    /// Lines followed by a transport failure.
    Broken(Vec<String>, String),
    Unreachable(String),
    /// The submitting task dies.
    Panic(String),
}

pub struct FakePool {
    pub events: EventLog,
    pub replies: Mutex<VecDeque<PoolReply>>,
    pub submissions: AtomicUsize,
    /// When set, submit waits on it before replying.
    pub gate: Option<Arc<Notify>>,
}

impl FakePool {
    pub fn new(events: EventLog) -> Self {
        Self {
            events,
            replies: Mutex::new(VecDeque::new()),
            submissions: AtomicUsize::new(0),
            gate: None,
        }
    }

    pub fn gated(events: EventLog, gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(events)
        }
    }

    pub fn reply(&self, reply: PoolReply) {
        self.replies.lock().unwrap().push_back(reply);
    }
}

#[async_trait]
impl WorkerPool for FakePool {
    async fn submit(&self, items: &[WorkItem]) -> ControlResult<ResultLines> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        let names: Vec<&str> = items.iter().map(WorkItem::name).collect();
        self.events
            .lock()
            .unwrap()
            .push(format!("submit {}", names.join(",")));

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(PoolReply::Lines(lines)) => {
                Ok(futures::stream::iter(lines.into_iter().map(Ok)).boxed())
            }
            Some(PoolReply::Broken(lines, message)) => {
                let items = lines
                    .into_iter()
                    .map(Ok)
                    .chain(std::iter::once(Err(ControlError::DispatchTransport(message))));
                Ok(futures::stream::iter(items).boxed())
            }
            Some(PoolReply::Unreachable(message)) => Err(ControlError::DispatchTransport(message)),
            Some(PoolReply::Panic(message)) => panic!("{}", message),
            None => Ok(futures::stream::empty().boxed()),
        }
    }

    fn describe(&self, items: &[WorkItem]) -> String {
        let names: Vec<&str> = items.iter().map(WorkItem::name).collect();
        format!("$ python client.py {}", names.join(" "))
    }
}

/// Fully wired control loop over fakes.
pub struct Harness {
    pub events: EventLog,
    pub activity: Arc<ActivityLog>,
    pub orchestrator: Arc<FakeOrchestrator>,
    pub deployment: Arc<FakeDeployment>,
    pub pool: Arc<FakePool>,
    pub registry: Arc<WorkerRegistry>,
    pub replicas: Arc<ReplicaController>,
    pub dispatcher: Arc<DispatchCoordinator>,
}

impl Harness {
    pub fn new(min: u32, max: u32) -> Self {
        let events = event_log();
        Self::with_pool(min, max, FakePool::new(events.clone()), events)
    }

    pub fn with_pool(min: u32, max: u32, pool: FakePool, events: EventLog) -> Self {
        let activity = Arc::new(ActivityLog::new());
        let orchestrator = Arc::new(FakeOrchestrator::default());
        let deployment = Arc::new(FakeDeployment::new(events.clone()));
        let pool = Arc::new(pool);

        let registry = Arc::new(WorkerRegistry::new(
            orchestrator.clone(),
            Regex::new("^w-.*$").unwrap(),
            activity.clone(),
        ));
        let replicas = Arc::new(ReplicaController::new(
            deployment.clone(),
            activity.clone(),
            ReplicaBounds::new(min, max).unwrap(),
        ));
        let dispatcher = Arc::new(DispatchCoordinator::new(
            pool.clone(),
            replicas.clone(),
            activity.clone(),
        ));

        Self {
            events,
            activity,
            orchestrator,
            deployment,
            pool,
            registry,
            replicas,
            dispatcher,
        }
    }

    pub fn scale_downs(&self, min: u32) -> usize {
        self.deployment
            .calls()
            .iter()
            .filter(|b| b.min == min && b.max == min)
            .count()
    }
}
