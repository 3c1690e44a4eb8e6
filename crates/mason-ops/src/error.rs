use mason_placement::{PlacementError, SourceError};
use thiserror::Error;

/// Failures raised by remote brick execution.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("remote execution failed on {host}: {reason}")]
    Remote { host: String, reason: String },

    #[error("volume {0} not known to the remote side")]
    UnknownVolume(String),
}

/// Failures raised by cluster operations.
#[derive(Debug, Error)]
pub enum OpError {
    /// Another operation already claims the same entry.
    #[error("a conflicting operation is already pending")]
    Conflict,

    /// The device to drain is not administratively offline.
    #[error("device must be offline before removal")]
    DeviceNotOffline,

    /// No device in the cluster can take over a brick.
    #[error("no replacement brick could be placed")]
    NoReplacement,

    #[error("entry not found: {0}")]
    NotFound(String),

    /// Self-heal still has entries outstanding on the brick's set; the
    /// caller should retry once healing settles.
    #[error("self-heal has not finished; retry later")]
    HealPending,

    /// Too few healthy peers remain in the brick's set to take one out.
    #[error("brick set too degraded to replace a member")]
    DegradedSet,

    #[error(transparent)]
    Placement(#[from] PlacementError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),
}
