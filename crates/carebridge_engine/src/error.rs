//! Error types for the sync engine.

use carebridge_protocol::ClientVersion;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Which side of the version range the client fell off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionDirection {
    /// The client is older than the server's minimum; the client
    /// needs an upgrade.
    ClientTooOld,
    /// The client is newer than the server's maximum; the server
    /// needs an upgrade.
    ClientTooNew,
}

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Credentials rejected, or a 401 that survived one re-login.
    #[error("authentication failed: {0}")]
    BadAuthentication(String),

    /// The server's version gate rejected this client.
    #[error("{}", version_message(*bound, *direction))]
    VersionIncompatible {
        /// The violated bound of the server's accepted range.
        bound: ClientVersion,
        /// Which side of the range was violated.
        direction: VersionDirection,
    },

    /// The request did not complete within the configured timeout.
    #[error("remote call timed out")]
    Timeout,

    /// The server answered with a non-success status.
    #[error("remote call failed with status {status}: {message}")]
    RemoteCallFailed {
        /// HTTP status code.
        status: u16,
        /// Server-provided message, if any.
        message: String,
    },

    /// The request never produced an HTTP response.
    #[error("transport error: {0}")]
    Transport(String),

    /// A response body did not decode as the expected message.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Applying pulled records failed.
    #[error(transparent)]
    Plan(#[from] carebridge_plan::PlanError),

    /// Local store error.
    #[error(transparent)]
    Store(#[from] carebridge_store::StoreError),

    /// The sync run was cancelled between pages.
    #[error("sync cancelled")]
    Cancelled,
}

fn version_message(bound: ClientVersion, direction: VersionDirection) -> String {
    match direction {
        VersionDirection::ClientTooOld => {
            format!("client too old, minimum accepted version is {bound}; please upgrade")
        }
        VersionDirection::ClientTooNew => {
            format!("client too new, maximum accepted version is {bound}; the server needs an upgrade")
        }
    }
}

impl EngineError {
    /// True if a later retry of the same call could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Timeout | EngineError::Transport(_) => true,
            EngineError::RemoteCallFailed { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
