// src/cluster/kubectl.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use regex::Regex;
use serde::Deserialize;
use std::time::Duration;
use tokio::process::Command;

use crate::cluster::{OrchestratorClient, RawWorker, run_tool};
use crate::error::{ControlError, ControlResult};

/// Orchestrator client backed by the `kubectl` CLI.
#[derive(Debug, Clone)]
pub struct KubectlClient {
    binary: String,
    namespace: Option<String>,
    timeout: Duration,
}

impl KubectlClient {
    pub fn new(binary: impl Into<String>, namespace: Option<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            namespace,
            timeout,
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.binary);
        if let Some(ns) = &self.namespace {
            command.arg("-n").arg(ns);
        }
        command
    }
}

#[async_trait]
impl OrchestratorClient for KubectlClient {
    async fn list_workers(&self, pattern: &Regex) -> ControlResult<Vec<RawWorker>> {
        let mut command = self.command();
        command.args(["get", "pods", "-o", "json"]);

        let output = run_tool(&mut command, self.timeout)
            .await
            .map_err(ControlError::OrchestratorUnavailable)?;

        parse_pod_list(&output.stdout, pattern)
    }

    async fn delete_worker(&self, name: &str) -> ControlResult<()> {
        let mut command = self.command();
        command.args(["delete", "pod", name, "--grace-period=0", "--force"]);

        let output = run_tool(&mut command, self.timeout)
            .await
            .map_err(ControlError::OrchestratorUnavailable)?;

        // kubectl warns about forced deletion on stderr even when it succeeds
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            debug!("kubectl delete pod {}: {}", name, stderr.trim());
        }
        Ok(())
    }

    fn describe_list(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("$ {} -n {} get pods", self.binary, ns),
            None => format!("$ {} get pods", self.binary),
        }
    }

    fn describe_delete(&self, name: &str) -> String {
        match &self.namespace {
            Some(ns) => format!(
                "$ {} -n {} delete pod {} --grace-period=0 --force",
                self.binary, ns, name
            ),
            None => format!("$ {} delete pod {} --grace-period=0 --force", self.binary, name),
        }
    }
}

#[derive(Deserialize)]
struct PodList {
    items: Vec<Pod>,
}

#[derive(Deserialize)]
struct Pod {
    metadata: PodMetadata,
    #[serde(default)]
    status: PodStatus,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PodMetadata {
    name: String,
    creation_timestamp: DateTime<Utc>,
    #[serde(default)]
    deletion_timestamp: Option<DateTime<Utc>>,
}

#[derive(Deserialize, Default)]
struct PodStatus {
    #[serde(default)]
    phase: Option<String>,
    #[serde(default)]
    conditions: Vec<PodCondition>,
}

#[derive(Deserialize)]
struct PodCondition {
    #[serde(rename = "type")]
    kind: String,
    status: String,
}

/// Parses `kubectl get pods -o json` output, keeping pods whose name matches.
pub fn parse_pod_list(json: &[u8], pattern: &Regex) -> ControlResult<Vec<RawWorker>> {
    let list: PodList = serde_json::from_slice(json).map_err(|e| {
        warn!("Unparseable pod list: {}", e);
        ControlError::OrchestratorUnavailable(format!("malformed pod list: {}", e))
    })?;

    let workers = list
        .items
        .into_iter()
        .filter(|pod| pattern.is_match(&pod.metadata.name))
        .map(|pod| {
            let ready = pod
                .status
                .conditions
                .iter()
                .find(|c| c.kind == "Ready")
                .map(|c| c.status == "True");

            RawWorker {
                name: pod.metadata.name,
                phase: pod.status.phase,
                ready,
                deletion_requested: pod.metadata.deletion_timestamp.is_some(),
                created_at: pod.metadata.creation_timestamp,
            }
        })
        .collect();

    Ok(workers)
}

#[cfg(test)]
mod tests {
    use super::*;

    const POD_LIST: &str = r#"{
        "apiVersion": "v1",
        "items": [
            {
                "metadata": {"name": "ml-service-5d8f-aaaaa", "creationTimestamp": "2024-11-02T10:15:00Z"},
                "status": {"phase": "Running", "conditions": [
                    {"type": "Initialized", "status": "True"},
                    {"type": "Ready", "status": "True"}
                ]}
            },
            {
                "metadata": {"name": "ml-service-5d8f-bbbbb", "creationTimestamp": "2024-11-02T10:16:30Z",
                             "deletionTimestamp": "2024-11-02T10:20:00Z"},
                "status": {"phase": "Running", "conditions": [{"type": "Ready", "status": "False"}]}
            },
            {
                "metadata": {"name": "ml-service-5d8f-ccccc", "creationTimestamp": "2024-11-02T10:17:00Z"},
                "status": {"phase": "Pending"}
            },
            {
                "metadata": {"name": "my-redis-master-0", "creationTimestamp": "2024-11-01T08:00:00Z"},
                "status": {"phase": "Running"}
            }
        ]
    }"#;

    fn pattern() -> Regex {
        Regex::new("^ml-service-.*$").unwrap()
    }

    #[test]
    fn test_parse_pod_list_filters_and_maps() {
        let workers = parse_pod_list(POD_LIST.as_bytes(), &pattern()).unwrap();
        assert_eq!(workers.len(), 3);

        assert_eq!(workers[0].name, "ml-service-5d8f-aaaaa");
        assert_eq!(workers[0].ready, Some(true));
        assert!(!workers[0].deletion_requested);

        assert!(workers[1].deletion_requested);
        assert_eq!(workers[1].ready, Some(false));

        assert_eq!(workers[2].phase.as_deref(), Some("Pending"));
        assert_eq!(workers[2].ready, None);
    }

    #[test]
    fn test_parse_pod_list_rejects_garbage() {
        let err = parse_pod_list(b"error: You must be logged in", &pattern()).unwrap_err();
        assert!(matches!(err, ControlError::OrchestratorUnavailable(_)));
    }

    #[test]
    fn test_describe_includes_namespace() {
        let client = KubectlClient::new("kubectl", Some("ml".to_string()), Duration::from_secs(5));
        assert_eq!(client.describe_list(), "$ kubectl -n ml get pods");
        assert_eq!(
            client.describe_delete("ml-service-1"),
            "$ kubectl -n ml delete pod ml-service-1 --grace-period=0 --force"
        );
    }
}
