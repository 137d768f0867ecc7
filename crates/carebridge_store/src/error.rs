//! Error types for the store.

use thiserror::Error;
use uuid::Uuid;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A row lookup by id found nothing.
    #[error("no {entity} row with id {id:?}")]
    RowNotFound {
        /// Entity type name.
        entity: String,
        /// Row id.
        id: String,
    },

    /// A job lookup by id found nothing.
    #[error("no job with id {0}")]
    JobNotFound(Uuid),

    /// A job state transition was not permitted.
    ///
    /// Raised when a complete/fail targets a job that is not running
    /// or is owned by a different worker.
    #[error("job {id} cannot move from {from} to {to}")]
    InvalidJobTransition {
        /// Job id.
        id: Uuid,
        /// Current state.
        from: String,
        /// Attempted state.
        to: String,
    },

    /// A worker registration lookup found nothing.
    #[error("no worker registered with id {0}")]
    WorkerNotFound(Uuid),
}
