// src/error.rs

use thiserror::Error;

/// Errors surfaced by the control loop components.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    /// Listing or deleting workers failed. Retried only by the next scheduled poll.
    #[error("orchestrator unavailable: {0}")]
    OrchestratorUnavailable(String),

    /// The deployment tool rejected or failed a replica bounds change.
    #[error("scale failed: {0}")]
    ScaleFailed(String),

    #[error("invalid replica bounds: min={min}, max={max} (need min >= 1 and max >= min)")]
    InvalidBounds { min: u32, max: u32 },

    /// Worker pool output did not match the submitted batch.
    #[error("dispatch protocol error: {0}")]
    DispatchProtocol(String),

    /// The worker pool could not be reached or did not finish the batch.
    #[error("dispatch transport error: {0}")]
    DispatchTransport(String),

    #[error("invalid batch: {0}")]
    InvalidBatch(String),

    #[error("invalid worker name: {0:?}")]
    InvalidWorkerName(String),

    #[error("a dispatch is already in flight")]
    DispatchInProgress,
}

pub type ControlResult<T> = std::result::Result<T, ControlError>;
