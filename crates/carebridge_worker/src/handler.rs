//! The per-topic job handler contract.

use async_trait::async_trait;
use carebridge_store::{Job, Store};
use uuid::Uuid;

/// Context passed to every handler invocation.
#[derive(Clone)]
pub struct JobContext {
    /// The store the job was claimed from. Handlers use it for their
    /// own reads and writes, including submitting follow-up jobs.
    pub store: Store,
    /// Id of the worker running the job.
    pub worker_id: Uuid,
}

/// An async handler for one job topic.
///
/// A returned `Err` marks the job failed with the given message; the
/// worker itself keeps running. Panics are caught by the pool and
/// treated the same way.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Processes one claimed job.
    async fn run(&self, job: Job, ctx: JobContext) -> Result<(), String>;
}
