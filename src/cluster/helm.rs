// src/cluster/helm.rs

use async_trait::async_trait;
use log::warn;
use std::time::Duration;
use tokio::process::Command;

use crate::cluster::{DeploymentTool, run_tool};
use crate::control::types::ReplicaBounds;
use crate::error::{ControlError, ControlResult};

/// Sets autoscaler bounds by upgrading the workload's helm release.
#[derive(Debug, Clone)]
pub struct HelmDeployment {
    binary: String,
    release: String,
    chart: String,
    /// Also set the event-driven scaler's replica counts.
    scaled_object: bool,
    timeout: Duration,
}

impl HelmDeployment {
    pub fn new(
        binary: impl Into<String>,
        release: impl Into<String>,
        chart: impl Into<String>,
        scaled_object: bool,
        timeout: Duration,
    ) -> Self {
        Self {
            binary: binary.into(),
            release: release.into(),
            chart: chart.into(),
            scaled_object,
            timeout,
        }
    }

    fn set_values(&self, bounds: ReplicaBounds) -> String {
        let mut values = format!(
            "autoscaling.minReplicas={},autoscaling.maxReplicas={}",
            bounds.min, bounds.max
        );
        if self.scaled_object {
            values.push_str(&format!(
                ",scaledObject.minReplicaCount={},scaledObject.maxReplicaCount={}",
                bounds.min, bounds.max
            ));
        }
        values
    }
}

#[async_trait]
impl DeploymentTool for HelmDeployment {
    async fn set_replica_bounds(&self, bounds: ReplicaBounds) -> ControlResult<()> {
        let mut command = Command::new(&self.binary);
        command
            .arg("upgrade")
            .arg("--set")
            .arg(self.set_values(bounds))
            .arg(&self.release)
            .arg(&self.chart);

        let output = run_tool(&mut command, self.timeout)
            .await
            .map_err(ControlError::ScaleFailed)?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            warn!("helm upgrade {} ({}): {}", self.release, bounds, stderr.trim());
        }
        Ok(())
    }

    fn describe(&self, bounds: ReplicaBounds) -> String {
        format!(
            "$ {} upgrade --set {} {} {}",
            self.binary,
            self.set_values(bounds),
            self.release,
            self.chart
        )
    }
}
