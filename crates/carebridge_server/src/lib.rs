//! # Carebridge Server
//!
//! Reference central sync server for Carebridge.
//!
//! This crate provides:
//! - Typed handlers for login, whoami, pull and push
//! - Route dispatch over a transport-agnostic request model
//! - Bearer token authentication
//! - The client version compatibility gate
//!
//! # Architecture
//!
//! The server keeps authoritative state in the same
//! [`carebridge_store`] the clients use and serves incremental pull
//! from the store's monotonic write tick. The HTTP layer is pluggable:
//! [`CentralServer::dispatch`] consumes an already-decoded
//! [`ApiRequest`], so tests drive it in-process through a loopback
//! client while deployments put a real listener in front.
//!
//! # Protocol
//!
//! Facilities sync pull-then-push per channel:
//! 1. Client logs in and holds a bearer token
//! 2. Client pulls changes written after its per-channel cursor
//! 3. Client pushes its dirty record graphs
//! 4. Both directions carry nested child relations in one record

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod auth;
mod config;
mod error;
mod handler;
mod server;

pub use auth::TokenStore;
pub use config::{ServerConfig, UserAccount};
pub use error::{ServerError, ServerResult};
pub use handler::RequestHandler;
pub use server::{ApiRequest, ApiResponse, CentralServer};
