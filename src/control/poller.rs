// src/control/poller.rs

use log::{error, info, warn};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::control::registry::WorkerRegistry;

/// Commands that can be sent to the poller task
pub enum PollerCommand {
    /// Refresh now instead of waiting for the next tick
    RefreshNow,

    /// Stop polling
    Shutdown,
}

/// Status of the poller task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollerStatus {
    Running,
    ShutDown,
}

/// Background task that refreshes the worker registry on a fixed cadence,
/// independent of any request handling.
pub struct RegistryPoller {
    command_tx: mpsc::Sender<PollerCommand>,
    handle: Mutex<Option<JoinHandle<()>>>,
    status: Arc<RwLock<PollerStatus>>,
    ticks: Arc<AtomicU64>,
}

impl RegistryPoller {
    /// Spawns the polling task. The first refresh runs immediately.
    pub fn spawn(registry: Arc<WorkerRegistry>, interval: Duration) -> Self {
        let (command_tx, command_rx) = mpsc::channel(8);
        let status = Arc::new(RwLock::new(PollerStatus::Running));
        let ticks = Arc::new(AtomicU64::new(0));

        let task_status = status.clone();
        let task_ticks = ticks.clone();
        let handle = tokio::spawn(async move {
            Self::poll_task(registry, interval, command_rx, task_status, task_ticks).await;
        });

        Self {
            command_tx,
            handle: Mutex::new(Some(handle)),
            status,
            ticks,
        }
    }

    pub async fn status(&self) -> PollerStatus {
        *self.status.read().await
    }

    /// Number of refresh attempts made so far, failed ones included.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Requests an out-of-schedule refresh without waiting for it.
    pub fn refresh_now(&self) {
        // a full queue already holds a pending refresh
        if let Err(e) = self.command_tx.try_send(PollerCommand::RefreshNow) {
            warn!("Refresh request not queued: {}", e);
        }
    }

    /// Stops the task and waits for it to exit.
    pub async fn shutdown(&self) {
        if self.command_tx.send(PollerCommand::Shutdown).await.is_err() {
            warn!("Poller task already stopped");
        }

        let handle = self.handle.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Poller task ended abnormally: {}", e);
            }
        }
    }

    async fn poll_task(
        registry: Arc<WorkerRegistry>,
        interval: Duration,
        mut command_rx: mpsc::Receiver<PollerCommand>,
        status: Arc<RwLock<PollerStatus>>,
        ticks: Arc<AtomicU64>,
    ) {
        let mut interval = tokio::time::interval(interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = command_rx.recv() => {
                    match command {
                        Some(PollerCommand::RefreshNow) => {
                            ticks.fetch_add(1, Ordering::Relaxed);
                            // failures are already logged by the registry
                            let _ = registry.refresh().await;
                        }
                        Some(PollerCommand::Shutdown) | None => {
                            info!("Shutting down worker poller");
                            break;
                        }
                    }
                }

                _ = interval.tick() => {
                    ticks.fetch_add(1, Ordering::Relaxed);
                    let _ = registry.refresh().await;
                }
            }
        }

        *status.write().await = PollerStatus::ShutDown;
        info!("Worker poller has shut down");
    }
}
