//! # Carebridge Protocol
//!
//! Wire types for the facility ↔ central sync protocol.
//!
//! The protocol is JSON over HTTP with a versioned path prefix:
//!
//! - `POST /{version}/login` — credentials in, bearer token out
//! - `GET /{version}/whoami` — identity echo
//! - `GET /{version}/sync/{channel}?since=&limit=&page=` — pull
//! - `POST /{version}/sync/{channel}` — push
//!
//! Records travel as [`SyncRecord`]s: one entity's scalar columns
//! plus nested child relations, with an optional tombstone marker.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod channel;
mod messages;
mod record;
mod version;

pub use channel::Channel;
pub use messages::{
    ErrorBody, LoginRequest, LoginResponse, PullResponse, PushRequest, PushResponse, UserInfo,
    INVALID_CLIENT_VERSION,
};
pub use record::SyncRecord;
pub use version::ClientVersion;

/// `Authorization` header name.
pub const HEADER_AUTHORIZATION: &str = "Authorization";
/// Client version header, sent on every request.
pub const HEADER_CLIENT_VERSION: &str = "X-Version";
/// Minimum accepted client version, returned on a version-gate 400.
pub const HEADER_MIN_CLIENT_VERSION: &str = "X-Min-Client-Version";
/// Maximum accepted client version, returned on a version-gate 400.
pub const HEADER_MAX_CLIENT_VERSION: &str = "X-Max-Client-Version";

use thiserror::Error;

/// Result type for protocol parsing.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while parsing protocol data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A client version string did not parse as `major.minor.patch`.
    #[error("malformed client version: {0:?}")]
    MalformedVersion(String),

    /// A channel path was empty or contained an empty segment.
    #[error("malformed channel path: {0:?}")]
    MalformedChannel(String),
}
