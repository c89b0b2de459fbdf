// src/control/mod.rs
pub mod dispatch;
pub mod poller;
pub mod registry;
pub mod replicas;
pub mod stats;
pub mod types;

pub use dispatch::DispatchCoordinator;
pub use poller::{PollerCommand, PollerStatus, RegistryPoller};
pub use registry::{WorkerRegistry, WorkerSnapshot};
pub use replicas::{ReplicaController, ReplicaStatus};
pub use stats::DispatchStats;
pub use types::{
    Batch, BatchReport, ItemResult, ReplicaBounds, WorkItem, Worker, WorkerPhase,
};
