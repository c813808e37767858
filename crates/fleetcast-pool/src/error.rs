use fleetcast_types::ClientId;
use thiserror::Error;

/// Errors surfaced by the fleet dispatcher.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("no eligible client for this job's filters")]
    NoClient,

    #[error("job queue is full (max {max})")]
    QueueFull { max: usize },

    #[error("pool has been destroyed")]
    Destroyed,

    #[error("client {0} is not registered with this pool")]
    UnknownClient(ClientId),

    #[error("job execution failed: {0}")]
    Execution(String),
}
