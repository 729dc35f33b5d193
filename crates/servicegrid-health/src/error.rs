//! Health pass error types.

use thiserror::Error;

/// Errors that abort a health pass.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("registry error: {0}")]
    Registry(#[from] servicegrid_state::StateError),

    #[error("queue error: {0}")]
    Queue(#[from] servicegrid_queue::QueueError),
}

pub type CoordinatorResult<T> = Result<T, CoordinatorError>;
