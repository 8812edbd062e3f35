//! Harness error types

use thiserror::Error;
use tracecollect::CollectorError;

/// Failures talking to the experiment controller
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Invalid controller URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Controller request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Controller returned {status} for {path}")]
    Status { status: u16, path: String },

    #[error("Malformed controller response: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Specification values the harness cannot run
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpecError {
    #[error("concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("bytes per log {requested} exceeds payload size {max}")]
    LogTooLarge { requested: usize, max: usize },
}

/// Top-level error returned by the control loop
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("Controller communication failed: {0}")]
    Controller(#[from] ControllerError),

    #[error("Flush to collector failed: {0}")]
    Collector(#[from] CollectorError),

    #[error("Invalid specification: {0}")]
    InvalidSpecification(#[from] SpecError),

    #[error("Worker {worker} panicked")]
    WorkerPanicked { worker: usize },

    #[error("Failed to spawn worker {worker}: {source}")]
    Spawn { worker: usize, source: std::io::Error },

    #[error("Experiment task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl HarnessError {
    /// Whether the run cannot continue with the current controller link
    ///
    /// A broken controller link invalidates every later experiment.
    pub fn is_fatal(&self) -> bool {
        matches!(self, HarnessError::Controller(_))
    }
}
