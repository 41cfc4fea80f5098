//! Typed error taxonomy for the daemon's fallible operations.

use thiserror::Error;

/// Errors surfaced by the orchestrator API boundary and the control loop
/// built on top of it.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("pod {namespace}/{name} vanished before it could be committed")]
    PodGone { namespace: String, name: String },

    #[error("failed to parse resource quantity: {0}")]
    Quantity(#[from] crate::quantity::ParseError),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
