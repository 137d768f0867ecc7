//! # Carebridge Worker
//!
//! Background job worker pool for Carebridge.
//!
//! This crate provides:
//! - A concurrency-bounded [`WorkerPool`] running per-topic async
//!   handlers over the store's persisted job table
//! - Fair-share capacity division across topics, so one saturated
//!   topic cannot starve the others
//! - A bounded [`FrontQueue`] that lets interactively triggered jobs
//!   jump ahead of the backlog scan
//! - Heartbeat-based liveness registration
//!
//! ## Architecture
//!
//! Jobs live in the store (`queued → running → {done | failed}`);
//! the pool only ever moves them through atomic single-operation
//! transitions, so any number of pools can share one store and a job
//! still runs exactly once. Failed jobs become retry-eligible again
//! on the pool's periodic backlog scan.
//!
//! ## Key invariants
//!
//! - A job is owned by at most one worker at a time
//! - With backlog on every topic, no topic runs more than its fair
//!   share while another topic is waiting
//! - `stop` drains in-flight handlers; it never cancels one
//! - Heartbeat failures are logged, never fatal

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod front_queue;
mod handler;
mod pool;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use front_queue::FrontQueue;
pub use handler::{JobContext, JobHandler};
pub use pool::WorkerPool;
