//! Error types for the worker pool.

use thiserror::Error;

/// Result type for worker operations.
pub type WorkerResult<T> = Result<T, WorkerError>;

/// Errors that can occur in the worker pool lifecycle.
#[derive(Error, Debug)]
pub enum WorkerError {
    /// `start` was called on a pool that is already running.
    #[error("worker pool is already running")]
    AlreadyRunning,

    /// Underlying store error.
    #[error(transparent)]
    Store(#[from] carebridge_store::StoreError),
}
