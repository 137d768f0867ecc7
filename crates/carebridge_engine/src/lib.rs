//! # Carebridge Engine
//!
//! Facility-side sync engine for Carebridge.
//!
//! This crate provides:
//! - An authenticated connection to the central server, with single
//!   in-flight login and one transparent re-login on 401
//! - The client side of the version compatibility gate
//! - Pull-then-push channel synchronization with per-channel cursors
//! - An HTTP client abstraction (reqwest-backed by default, mockable
//!   for tests)
//!
//! ## Architecture
//!
//! The engine implements **pull-then-push** synchronization:
//! 1. Pull remote changes for every channel (central is
//!    authoritative)
//! 2. Apply each page atomically to the local store
//! 3. Export dirty record graphs and push them, clearing the dirty
//!    flag only after the server's acknowledgement
//!
//! ## Key invariants
//!
//! - The pull cursor advances only after a channel drains completely
//! - Applying a pulled page is atomic and idempotent
//! - A record graph is pushed with its children nested in one record
//! - At most one login is in flight at any time

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod http;
mod manager;
mod remote;

pub use config::{ConnectionConfig, SyncConfig};
pub use error::{EngineError, EngineResult, VersionDirection};
pub use http::{HttpClient, HttpRequest, HttpResponse, Method, MockHttpClient};
#[cfg(feature = "reqwest")]
pub use http::ReqwestClient;
pub use manager::{SyncManager, SyncOutcome};
pub use remote::RemoteConnection;
