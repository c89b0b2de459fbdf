// src/config.rs

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::control::types::ReplicaBounds;

pub const DEFAULT_PORT: u16 = 3002;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_WORKER_NAME_PATTERN: &str = "^ml-service-.*$";
pub const DEFAULT_RESULT_IDLE_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 60;

/// Runtime configuration for the control loop.
#[derive(Debug, Clone)]
pub struct ControlConfig {
    pub port: u16,
    pub poll_interval: Duration,
    pub worker_name_pattern: String,
    pub kubectl_bin: String,
    pub namespace: Option<String>,
    pub helm_bin: String,
    pub helm_release: String,
    pub helm_chart: String,
    pub helm_scaled_object: bool,
    pub worker_pool_command: Vec<String>,
    pub worker_pool_dir: Option<PathBuf>,
    pub result_idle_timeout: Duration,
    pub tool_timeout: Duration,
    pub min_replicas: u32,
    pub max_replicas: u32,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            worker_name_pattern: DEFAULT_WORKER_NAME_PATTERN.to_string(),
            kubectl_bin: "kubectl".to_string(),
            namespace: None,
            helm_bin: "helm".to_string(),
            helm_release: "ml-service".to_string(),
            helm_chart: "../server/ml-service".to_string(),
            helm_scaled_object: false,
            worker_pool_command: vec!["python".to_string(), "client.py".to_string()],
            worker_pool_dir: None,
            result_idle_timeout: Duration::from_secs(DEFAULT_RESULT_IDLE_TIMEOUT_SECS),
            tool_timeout: Duration::from_secs(DEFAULT_TOOL_TIMEOUT_SECS),
            min_replicas: 1,
            max_replicas: 1,
        }
    }
}

impl ControlConfig {
    /// Reads configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from any key lookup, falling back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let worker_pool_command = match get("WORKER_POOL_COMMAND") {
            Some(cmd) => cmd.split_whitespace().map(str::to_string).collect(),
            None => defaults.worker_pool_command,
        };

        let config = Self {
            port: parse_or(&get, "PORT", defaults.port)?,
            poll_interval: Duration::from_secs(parse_or(
                &get,
                "POLL_INTERVAL_SECS",
                DEFAULT_POLL_INTERVAL_SECS,
            )?),
            worker_name_pattern: get("WORKER_NAME_PATTERN").unwrap_or(defaults.worker_name_pattern),
            kubectl_bin: get("KUBECTL_BIN").unwrap_or(defaults.kubectl_bin),
            namespace: get("KUBE_NAMESPACE"),
            helm_bin: get("HELM_BIN").unwrap_or(defaults.helm_bin),
            helm_release: get("HELM_RELEASE").unwrap_or(defaults.helm_release),
            helm_chart: get("HELM_CHART").unwrap_or(defaults.helm_chart),
            helm_scaled_object: parse_or(&get, "HELM_SCALED_OBJECT", defaults.helm_scaled_object)?,
            worker_pool_command,
            worker_pool_dir: get("WORKER_POOL_DIR").map(PathBuf::from),
            result_idle_timeout: Duration::from_secs(parse_or(
                &get,
                "RESULT_IDLE_TIMEOUT_SECS",
                DEFAULT_RESULT_IDLE_TIMEOUT_SECS,
            )?),
            tool_timeout: Duration::from_secs(parse_or(
                &get,
                "TOOL_TIMEOUT_SECS",
                DEFAULT_TOOL_TIMEOUT_SECS,
            )?),
            min_replicas: parse_or(&get, "MIN_REPLICAS", defaults.min_replicas)?,
            max_replicas: parse_or(&get, "MAX_REPLICAS", defaults.max_replicas)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(anyhow!("POLL_INTERVAL_SECS must be greater than zero"));
        }
        if self.worker_pool_command.is_empty() {
            return Err(anyhow!("WORKER_POOL_COMMAND must not be empty"));
        }
        self.name_regex()?;
        self.initial_bounds()?;
        Ok(())
    }

    pub fn name_regex(&self) -> Result<Regex> {
        Regex::new(&self.worker_name_pattern).with_context(|| {
            format!("Invalid WORKER_NAME_PATTERN {:?}", self.worker_name_pattern)
        })
    }

    pub fn initial_bounds(&self) -> Result<ReplicaBounds> {
        ReplicaBounds::new(self.min_replicas, self.max_replicas)
            .context("Invalid MIN_REPLICAS/MAX_REPLICAS")
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
    }
}
