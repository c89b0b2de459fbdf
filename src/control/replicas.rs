// src/control/replicas.rs

use log::{error, info};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::activity::ActivityLog;
use crate::cluster::DeploymentTool;
use crate::control::types::ReplicaBounds;
use crate::error::{ControlError, ControlResult};

/// Applied bounds alongside the configured policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReplicaStatus {
    /// Last bounds the deployment tool accepted.
    pub applied: ReplicaBounds,
    /// Floor and ceiling used around dispatches.
    pub policy: ReplicaBounds,
}

/// Sole owner of the workload's replica bounds.
pub struct ReplicaController {
    tool: Arc<dyn DeploymentTool>,
    activity: Arc<ActivityLog>,
    applied: RwLock<ReplicaBounds>,
    policy: RwLock<ReplicaBounds>,
}

impl ReplicaController {
    pub fn new(
        tool: Arc<dyn DeploymentTool>,
        activity: Arc<ActivityLog>,
        initial: ReplicaBounds,
    ) -> Self {
        Self {
            tool,
            activity,
            applied: RwLock::new(initial),
            policy: RwLock::new(initial),
        }
    }

    /// Validates and applies new bounds through the deployment tool.
    ///
    /// The cached bounds only change once the tool reports success.
    pub async fn set_bounds(&self, min: u32, max: u32) -> ControlResult<ReplicaBounds> {
        let bounds = match ReplicaBounds::new(min, max) {
            Ok(bounds) => bounds,
            Err(e) => {
                self.activity.append(
                    format!("set replica bounds min={} max={}", min, max),
                    format!("Error: {}", e),
                );
                return Err(e);
            }
        };

        let action = self.tool.describe(bounds);
        match self.tool.set_replica_bounds(bounds).await {
            Ok(()) => {
                *self.applied.write().await = bounds;
                info!("Replica bounds set to {}", bounds);
                self.activity.append(action, "ok");
                Ok(bounds)
            }
            Err(e) => {
                let e = if matches!(e, ControlError::ScaleFailed(_)) {
                    e
                } else {
                    ControlError::ScaleFailed(e.to_string())
                };
                error!("Failed to set replica bounds to {}: {}", bounds, e);
                self.activity.append(action, format!("Error: {}", e));
                Err(e)
            }
        }
    }

    /// Applies new bounds and, once accepted, adopts them as the policy.
    pub async fn configure(&self, min: u32, max: u32) -> ControlResult<ReplicaStatus> {
        let bounds = self.set_bounds(min, max).await?;
        *self.policy.write().await = bounds;
        Ok(self.status().await)
    }

    pub async fn applied(&self) -> ReplicaBounds {
        *self.applied.read().await
    }

    pub async fn policy(&self) -> ReplicaBounds {
        *self.policy.read().await
    }

    pub async fn status(&self) -> ReplicaStatus {
        ReplicaStatus {
            applied: self.applied().await,
            policy: self.policy().await,
        }
    }
}
