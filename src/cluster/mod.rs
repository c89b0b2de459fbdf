// src/cluster/mod.rs
// Narrow interfaces to the external services the control loop drives.

pub mod command_pool;
pub mod helm;
pub mod kubectl;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use regex::Regex;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;

use crate::control::types::{ReplicaBounds, WorkItem};
use crate::error::ControlResult;

pub use command_pool::CommandWorkerPool;
pub use helm::HelmDeployment;
pub use kubectl::KubectlClient;

/// Worker record as reported by the orchestrator, before interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawWorker {
    pub name: String,
    pub phase: Option<String>,
    /// Latest Ready condition, if the orchestrator reported one.
    pub ready: Option<bool>,
    pub deletion_requested: bool,
    pub created_at: DateTime<Utc>,
}

/// Lists and deletes worker pods.
#[async_trait]
pub trait OrchestratorClient: Send + Sync {
    /// Every worker whose name matches `pattern`.
    async fn list_workers(&self, pattern: &Regex) -> ControlResult<Vec<RawWorker>>;

    /// Requests removal of one worker. Returns once the request is accepted.
    async fn delete_worker(&self, name: &str) -> ControlResult<()>;

    /// Human-readable form of the list call, used in the activity log.
    fn describe_list(&self) -> String {
        "$ kubectl get pods".to_string()
    }

    fn describe_delete(&self, name: &str) -> String {
        format!("$ kubectl delete pod {}", name)
    }
}

/// Changes the replica bounds of the workload it was built for.
#[async_trait]
pub trait DeploymentTool: Send + Sync {
    async fn set_replica_bounds(&self, bounds: ReplicaBounds) -> ControlResult<()>;

    fn describe(&self, bounds: ReplicaBounds) -> String;
}

/// Result lines of one batch; end of stream means the batch is complete.
pub type ResultLines = BoxStream<'static, ControlResult<String>>;

/// Submits batches to the worker replicas.
#[async_trait]
pub trait WorkerPool: Send + Sync {
    async fn submit(&self, items: &[WorkItem]) -> ControlResult<ResultLines>;

    fn describe(&self, items: &[WorkItem]) -> String;
}

/// Runs an external tool to completion with a deadline.
///
/// Returns the raw output on exit status 0; otherwise a message carrying the
/// exit status and trimmed stderr.
pub(crate) async fn run_tool(
    command: &mut Command,
    timeout: Duration,
) -> Result<Output, String> {
    command.kill_on_drop(true);
    let program = command.as_std().get_program().to_string_lossy().into_owned();

    let result = tokio::time::timeout(timeout, command.output()).await;
    let output = match result {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return Err(format!("failed to run {}: {}", program, e)),
        Err(_) => {
            return Err(format!(
                "{} did not finish within {}s",
                program,
                timeout.as_secs()
            ));
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("{}: {}", output.status, stderr.trim()));
    }

    Ok(output)
}
