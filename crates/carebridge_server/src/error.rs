//! Error types for the central server.

use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur while handling a sync request.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid request shape or parameters.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Missing or invalid bearer token.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Client version outside the accepted range.
    #[error("incompatible client version: {supplied}")]
    IncompatibleClientVersion {
        /// The version the client sent.
        supplied: String,
    },

    /// The requested channel does not map to a known entity.
    #[error("unknown sync channel: {0}")]
    UnknownChannel(String),

    /// A record in the request could not be applied.
    #[error(transparent)]
    Plan(#[from] carebridge_plan::PlanError),

    /// Store error.
    #[error(transparent)]
    Store(#[from] carebridge_store::StoreError),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// HTTP status code for this error.
    pub fn status(&self) -> u16 {
        match self {
            ServerError::InvalidRequest(_) | ServerError::IncompatibleClientVersion { .. } => 400,
            ServerError::AuthenticationFailed(_) => 401,
            ServerError::UnknownChannel(_) => 404,
            ServerError::Plan(_) => 400,
            ServerError::Store(_) | ServerError::Internal(_) => 500,
        }
    }

    /// True if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(ServerError::InvalidRequest("bad".into()).status(), 400);
        assert_eq!(
            ServerError::AuthenticationFailed("no token".into()).status(),
            401
        );
        assert_eq!(ServerError::UnknownChannel("nope".into()).status(), 404);
        assert_eq!(ServerError::Internal("oops".into()).status(), 500);
    }

    #[test]
    fn client_error_classification() {
        assert!(ServerError::UnknownChannel("x".into()).is_client_error());
        assert!(!ServerError::Internal("x".into()).is_client_error());
    }
}
