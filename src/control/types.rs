// src/control/types.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::cluster::RawWorker;
use crate::error::{ControlError, ControlResult};

/// Lifecycle phase of a worker pod.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerPhase {
    Pending,
    Running,
    Terminating,
    Failed,
    Succeeded,
    Unknown,
}

impl WorkerPhase {
    /// A recorded deletion request wins over whatever phase the pod reports.
    pub fn from_raw(phase: Option<&str>, deletion_requested: bool) -> Self {
        if deletion_requested {
            return WorkerPhase::Terminating;
        }

        match phase.map(str::trim) {
            Some(p) if p.eq_ignore_ascii_case("pending") => WorkerPhase::Pending,
            Some(p) if p.eq_ignore_ascii_case("running") => WorkerPhase::Running,
            Some(p) if p.eq_ignore_ascii_case("failed") => WorkerPhase::Failed,
            Some(p) if p.eq_ignore_ascii_case("succeeded") => WorkerPhase::Succeeded,
            _ => WorkerPhase::Unknown,
        }
    }
}

impl fmt::Display for WorkerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerPhase::Pending => "pending",
            WorkerPhase::Running => "running",
            WorkerPhase::Terminating => "terminating",
            WorkerPhase::Failed => "failed",
            WorkerPhase::Succeeded => "succeeded",
            WorkerPhase::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// One running or terminating replica of the workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Worker {
    pub name: String,
    pub phase: WorkerPhase,
    pub ready: bool,
    pub created_at: DateTime<Utc>,
}

impl Worker {
    pub fn from_raw(raw: &RawWorker) -> Self {
        Self {
            name: raw.name.clone(),
            phase: WorkerPhase::from_raw(raw.phase.as_deref(), raw.deletion_requested),
            ready: raw.ready.unwrap_or(false),
            created_at: raw.created_at,
        }
    }
}

/// Minimum and maximum replica count for the workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaBounds {
    pub min: u32,
    pub max: u32,
}

impl ReplicaBounds {
    pub fn new(min: u32, max: u32) -> ControlResult<Self> {
        if min < 1 || max < min {
            return Err(ControlError::InvalidBounds { min, max });
        }
        Ok(Self { min, max })
    }

    /// Both bounds pinned to the same count.
    pub fn pinned(count: u32) -> ControlResult<Self> {
        Self::new(count, count)
    }

    /// True when there is no headroom to scale into around a batch.
    pub fn is_fixed(&self) -> bool {
        self.min == self.max
    }
}

impl fmt::Display for ReplicaBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "min={}, max={}", self.min, self.max)
    }
}

/// An opaque named unit of input, one image per item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkItem {
    name: String,
}

impl WorkItem {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// One user-triggered group of items, alive for a single dispatch call.
#[derive(Debug, Clone)]
pub struct Batch {
    pub id: Uuid,
    pub items: Vec<WorkItem>,
    pub submitted_at: DateTime<Utc>,
}

impl Batch {
    /// Rejects empty batches, blank names and repeated names.
    pub fn new(names: Vec<String>) -> ControlResult<Self> {
        if names.is_empty() {
            return Err(ControlError::InvalidBatch("no items submitted".to_string()));
        }

        let mut seen = HashSet::with_capacity(names.len());
        for name in &names {
            if name.trim().is_empty() {
                return Err(ControlError::InvalidBatch("empty item name".to_string()));
            }
            if !seen.insert(name.as_str()) {
                return Err(ControlError::InvalidBatch(format!(
                    "duplicate item name {}",
                    name
                )));
            }
        }

        Ok(Self {
            id: Uuid::new_v4(),
            items: names.into_iter().map(WorkItem::new).collect(),
            submitted_at: Utc::now(),
        })
    }

    pub fn names(&self) -> Vec<&str> {
        self.items.iter().map(WorkItem::name).collect()
    }
}

/// Classification of one item, as emitted by the worker that handled it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemResult {
    #[serde(rename = "filename", alias = "itemName")]
    pub item_name: String,
    #[serde(rename = "class", alias = "label")]
    pub label: String,
    pub confidence: f64,
    #[serde(rename = "processingPod", alias = "processingWorker")]
    pub processing_worker: String,
    #[serde(rename = "elapsedMs", default)]
    pub elapsed_ms: f64,
}

impl ItemResult {
    /// Parses one line of worker pool output.
    pub fn parse_line(line: &str) -> ControlResult<Self> {
        let result: ItemResult = serde_json::from_str(line.trim()).map_err(|e| {
            ControlError::DispatchProtocol(format!("malformed result line {:?}: {}", line, e))
        })?;

        if result.item_name.is_empty() {
            return Err(ControlError::DispatchProtocol(
                "result without item name".to_string(),
            ));
        }
        if result.processing_worker.is_empty() {
            return Err(ControlError::DispatchProtocol(format!(
                "result for {} has no processing worker",
                result.item_name
            )));
        }
        if !result.confidence.is_finite() || !(0.0..=1.0).contains(&result.confidence) {
            return Err(ControlError::DispatchProtocol(format!(
                "result for {} has confidence {} outside [0, 1]",
                result.item_name, result.confidence
            )));
        }

        Ok(result)
    }
}

/// Outcome of one successful dispatch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub batch_id: Uuid,
    /// In the order the items were submitted.
    pub results: Vec<ItemResult>,
    /// Submit-to-last-result round trip.
    pub elapsed_ms: u64,
    /// Items handled per worker.
    pub per_worker: BTreeMap<String, usize>,
}

impl BatchReport {
    pub fn new(batch_id: Uuid, results: Vec<ItemResult>, elapsed: Duration) -> Self {
        let mut per_worker = BTreeMap::new();
        for result in &results {
            *per_worker
                .entry(result.processing_worker.clone())
                .or_insert(0) += 1;
        }

        Self {
            batch_id,
            results,
            elapsed_ms: elapsed.as_millis() as u64,
            per_worker,
        }
    }

    /// Process time followed by one `<worker>: <n> msgs` line per worker.
    pub fn summary(&self) -> String {
        let mut lines = vec![format!("Process time: {}ms", self.elapsed_ms)];
        lines.extend(
            self.per_worker
                .iter()
                .map(|(worker, count)| format!("{}: {} msgs", worker, count)),
        );
        lines.join("\n")
    }
}
