// src/control/dispatch.rs

use futures::StreamExt;
use log::{error, info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, Semaphore};

use crate::activity::ActivityLog;
use crate::cluster::{ResultLines, WorkerPool};
use crate::control::replicas::{ReplicaController, ReplicaStatus};
use crate::control::stats::DispatchStats;
use crate::control::types::{Batch, BatchReport, ItemResult, ReplicaBounds, WorkItem};
use crate::error::{ControlError, ControlResult};

/// Sends batches to the worker pool, scaling capacity up around each one.
pub struct DispatchCoordinator {
    pool: Arc<dyn WorkerPool>,
    replicas: Arc<ReplicaController>,
    activity: Arc<ActivityLog>,
    // single slot shared by dispatches and policy changes; contenders are turned away
    in_flight: Semaphore,
    stats: Mutex<DispatchStats>,
}

impl DispatchCoordinator {
    pub fn new(
        pool: Arc<dyn WorkerPool>,
        replicas: Arc<ReplicaController>,
        activity: Arc<ActivityLog>,
    ) -> Self {
        Self {
            pool,
            replicas,
            activity,
            in_flight: Semaphore::new(1),
            stats: Mutex::new(DispatchStats::new()),
        }
    }

    /// Dispatches one batch and returns its results in submission order.
    ///
    /// When the replica policy leaves headroom (min != max) the workload is
    /// pinned to max before submitting and pinned back to min afterwards. The
    /// scale-down runs exactly once per call whatever happened before it.
    pub async fn dispatch(&self, names: Vec<String>) -> ControlResult<BatchReport> {
        let batch = match Batch::new(names) {
            Ok(batch) => batch,
            Err(e) => {
                self.activity.append("dispatch batch", format!("Error: {}", e));
                return Err(e);
            }
        };

        let _permit = match self.in_flight.try_acquire() {
            Ok(permit) => permit,
            Err(_) => {
                let e = ControlError::DispatchInProgress;
                warn!("Rejected batch {}: {}", batch.id, e);
                self.activity
                    .append(self.pool.describe(&batch.items), format!("Error: {}", e));
                return Err(e);
            }
        };

        let policy = self.replicas.policy().await;
        info!(
            "Dispatching batch {} with {} items (replica policy {})",
            batch.id,
            batch.items.len(),
            policy
        );

        let outcome = self.run_batch(&batch, policy).await;

        if !policy.is_fixed() {
            if let Err(e) = self.replicas.set_bounds(policy.min, policy.min).await {
                error!(
                    "Batch {}: capacity not released back to {}: {}",
                    batch.id, policy.min, e
                );
            }
        }

        let mut stats = self.stats.lock().await;
        match outcome {
            Ok(report) => {
                stats.record_success(&report);
                info!(
                    "Batch {} completed: {} results in {}ms",
                    batch.id,
                    report.results.len(),
                    report.elapsed_ms
                );
                self.activity
                    .append(self.pool.describe(&batch.items), report.summary());
                Ok(report)
            }
            Err(e) => {
                stats.record_failure();
                error!("Batch {} failed: {}", batch.id, e);
                self.activity
                    .append(self.pool.describe(&batch.items), format!("Error: {}", e));
                Err(e)
            }
        }
    }

    /// Runs `dispatch` on its own task so that dropping the caller's future
    /// cannot skip the scale-down.
    pub async fn dispatch_detached(
        self: Arc<Self>,
        names: Vec<String>,
    ) -> ControlResult<BatchReport> {
        let coordinator = self.clone();
        let handle = tokio::spawn(async move { coordinator.dispatch(names).await });
        match handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                let e = ControlError::DispatchTransport(format!("dispatch task failed: {}", e));
                error!("{}", e);
                self.activity.append("dispatch batch", format!("Error: {}", e));
                Err(e)
            }
        }
    }

    /// Changes the replica policy while no batch is in flight.
    ///
    /// Shares the dispatch slot, so a running batch cannot scale back down to a
    /// floor that was replaced while it ran.
    pub async fn configure_replicas(&self, min: u32, max: u32) -> ControlResult<ReplicaStatus> {
        let _permit = match self.in_flight.try_acquire() {
            Ok(permit) => permit,
            Err(_) => {
                let e = ControlError::DispatchInProgress;
                warn!("Rejected replica change min={} max={}: {}", min, max, e);
                self.activity.append(
                    format!("set replica bounds min={} max={}", min, max),
                    format!("Error: {}", e),
                );
                return Err(e);
            }
        };

        self.replicas.configure(min, max).await
    }

    pub fn is_dispatching(&self) -> bool {
        self.in_flight.available_permits() == 0
    }

    pub async fn stats(&self) -> DispatchStats {
        self.stats.lock().await.clone()
    }

    async fn run_batch(&self, batch: &Batch, policy: ReplicaBounds) -> ControlResult<BatchReport> {
        if !policy.is_fixed() {
            // workers that are not Ready yet would get no traffic
            self.replicas.set_bounds(policy.max, policy.max).await?;
        }

        let started = Instant::now();
        let lines = self.pool.submit(&batch.items).await?;
        let results = collect_results(&batch.items, lines).await?;
        let elapsed = started.elapsed();

        Ok(BatchReport::new(batch.id, results, elapsed))
    }
}

/// Correlates result lines with the submitted items by name.
///
/// Every item must get exactly one result; unknown, duplicate or missing names
/// fail the whole batch.
pub async fn collect_results(
    items: &[WorkItem],
    mut lines: ResultLines,
) -> ControlResult<Vec<ItemResult>> {
    let expected: HashSet<&str> = items.iter().map(WorkItem::name).collect();
    let mut received: HashMap<String, ItemResult> = HashMap::with_capacity(items.len());

    while let Some(line) = lines.next().await {
        let result = ItemResult::parse_line(&line?)?;

        if !expected.contains(result.item_name.as_str()) {
            return Err(ControlError::DispatchProtocol(format!(
                "result for unexpected item {}",
                result.item_name
            )));
        }
        if received.contains_key(&result.item_name) {
            return Err(ControlError::DispatchProtocol(format!(
                "duplicate result for {}",
                result.item_name
            )));
        }
        received.insert(result.item_name.clone(), result);
    }

    let missing: Vec<&str> = items
        .iter()
        .map(WorkItem::name)
        .filter(|name| !received.contains_key(*name))
        .collect();
    if !missing.is_empty() {
        return Err(ControlError::DispatchProtocol(format!(
            "no result for {}",
            missing.join(", ")
        )));
    }

    Ok(items
        .iter()
        .filter_map(|item| received.remove(item.name()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn items(names: &[&str]) -> Vec<WorkItem> {
        names.iter().map(|n| WorkItem::new(*n)).collect()
    }

    fn line(item: &str, worker: &str) -> ControlResult<String> {
        Ok(format!(
            r#"{{"filename": "{}", "class": "は", "confidence": 0.91, "processingPod": "{}"}}"#,
            item, worker
        ))
    }

    #[tokio::test]
    async fn test_results_come_back_in_request_order() {
        let lines = stream::iter(vec![line("b.png", "w-2"), line("a.png", "w-1")]).boxed();
        let results = collect_results(&items(&["a.png", "b.png"]), lines)
            .await
            .unwrap();

        assert_eq!(results[0].item_name, "a.png");
        assert_eq!(results[0].processing_worker, "w-1");
        assert_eq!(results[1].item_name, "b.png");
    }

    #[tokio::test]
    async fn test_duplicate_result_is_protocol_error() {
        let lines = stream::iter(vec![line("a.png", "w-1"), line("a.png", "w-2")]).boxed();
        let err = collect_results(&items(&["a.png"]), lines).await.unwrap_err();
        assert!(matches!(err, ControlError::DispatchProtocol(_)));
    }

    #[tokio::test]
    async fn test_missing_result_is_protocol_error() {
        let lines = stream::iter(vec![line("a.png", "w-1")]).boxed();
        let err = collect_results(&items(&["a.png", "b.png"]), lines)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ControlError::DispatchProtocol("no result for b.png".to_string())
        );
    }

    #[tokio::test]
    async fn test_transport_error_mid_stream_is_surfaced() {
        let lines = stream::iter(vec![
            line("a.png", "w-1"),
            Err(ControlError::DispatchTransport("pipe closed".to_string())),
        ])
        .boxed();
        let err = collect_results(&items(&["a.png", "b.png"]), lines)
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::DispatchTransport(_)));
    }
}
