//! The persisted job table.
//!
//! Jobs are the unit of asynchronous materialization work. The only
//! mutation path is the state machine `queued → running → {done |
//! failed}`; every transition is a single conditional operation under
//! the store lock, so a job is owned by at most one worker at a time
//! even with many pools claiming concurrently.

use crate::error::{StoreError, StoreResult};
use crate::store::Store;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Priority for interactively triggered work.
pub const JOB_PRIORITY_HIGH: i32 = 1000;
/// Default priority.
pub const JOB_PRIORITY_DEFAULT: i32 = 0;
/// Priority for bulk backfill work.
pub const JOB_PRIORITY_LOW: i32 = -1000;

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Waiting for a worker.
    Queued,
    /// Claimed and executing.
    Running,
    /// Handler finished successfully.
    Done,
    /// Handler raised; `error` holds the message.
    Failed,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Done => "done",
            JobState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A persisted background job.
#[derive(Debug, Clone)]
pub struct Job {
    /// Job id.
    pub id: Uuid,
    /// Handler dispatch key.
    pub topic: String,
    /// Unit-of-work identifier within the topic; duplicate queued
    /// `(topic, discriminant)` pairs coalesce.
    pub discriminant: String,
    /// Handler input.
    pub payload: serde_json::Value,
    /// Claim ordering: higher first, then FIFO.
    pub priority: i32,
    /// Lifecycle state.
    pub state: JobState,
    /// Worker that currently owns the job, while running.
    pub worker_id: Option<Uuid>,
    /// Submission time.
    pub created_at: DateTime<Utc>,
    /// Times the job has been claimed.
    pub attempts: u32,
    /// Error text from the last failed attempt.
    pub error: Option<String>,
}

/// Options for [`Store::job_submit`].
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    /// Claim priority; defaults to [`JOB_PRIORITY_DEFAULT`].
    pub priority: Option<i32>,
    /// Coalescing key; defaults to a random UUID (no coalescing).
    pub discriminant: Option<String>,
}

#[derive(Debug, Default)]
pub(crate) struct JobTable {
    jobs: BTreeMap<Uuid, Job>,
}

impl JobTable {
    fn queued_for_topic(&mut self, topic: &str) -> Option<&mut Job> {
        self.jobs
            .values_mut()
            .filter(|j| j.state == JobState::Queued && j.topic == topic)
            .min_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then(a.created_at.cmp(&b.created_at))
                    .then(a.id.cmp(&b.id))
            })
    }
}

impl Store {
    /// Enqueues a job.
    ///
    /// Returns `None` when a queued job with the same `(topic,
    /// discriminant)` already exists — the duplicate submit collapses
    /// into the existing logical unit of work.
    pub fn job_submit(
        &self,
        topic: &str,
        payload: serde_json::Value,
        options: SubmitOptions,
    ) -> Option<Uuid> {
        let mut inner = self.inner.write();
        let discriminant = options
            .discriminant
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let duplicate = inner.jobs.jobs.values().any(|j| {
            j.state == JobState::Queued && j.topic == topic && j.discriminant == discriminant
        });
        if duplicate {
            tracing::debug!(topic, %discriminant, "job submit coalesced");
            return None;
        }

        let job = Job {
            id: Uuid::new_v4(),
            topic: topic.to_string(),
            discriminant,
            payload,
            priority: options.priority.unwrap_or(JOB_PRIORITY_DEFAULT),
            state: JobState::Queued,
            worker_id: None,
            created_at: Utc::now(),
            attempts: 0,
            error: None,
        };
        let id = job.id;
        inner.jobs.jobs.insert(id, job);
        Some(id)
    }

    /// Atomically claims the best queued job for a topic.
    ///
    /// Highest priority first, FIFO within a priority. The claim and
    /// the transition to running happen under one lock acquisition;
    /// no two workers can observe the same job as claimable.
    pub fn job_claim(&self, topic: &str, worker_id: Uuid) -> Option<Job> {
        let mut inner = self.inner.write();
        let job = inner.jobs.queued_for_topic(topic)?;
        job.state = JobState::Running;
        job.worker_id = Some(worker_id);
        job.attempts += 1;
        Some(job.clone())
    }

    /// Atomically claims one specific job, if it is still queued.
    ///
    /// Used by the front queue: the id was observed earlier and may
    /// have been taken by another worker since.
    pub fn job_claim_by_id(&self, id: Uuid, worker_id: Uuid) -> Option<Job> {
        let mut inner = self.inner.write();
        let job = inner.jobs.jobs.get_mut(&id)?;
        if job.state != JobState::Queued {
            return None;
        }
        job.state = JobState::Running;
        job.worker_id = Some(worker_id);
        job.attempts += 1;
        Some(job.clone())
    }

    /// Marks a running job done. Fails unless the job is running and
    /// owned by `worker_id`.
    pub fn job_complete(&self, id: Uuid, worker_id: Uuid) -> StoreResult<()> {
        self.finish_job(id, worker_id, JobState::Done, None)
    }

    /// Marks a running job failed, recording the error text.
    pub fn job_fail(&self, id: Uuid, worker_id: Uuid, error: impl Into<String>) -> StoreResult<()> {
        self.finish_job(id, worker_id, JobState::Failed, Some(error.into()))
    }

    fn finish_job(
        &self,
        id: Uuid,
        worker_id: Uuid,
        to: JobState,
        error: Option<String>,
    ) -> StoreResult<()> {
        let mut inner = self.inner.write();
        let job = inner
            .jobs
            .jobs
            .get_mut(&id)
            .ok_or(StoreError::JobNotFound(id))?;
        if job.state != JobState::Running || job.worker_id != Some(worker_id) {
            return Err(StoreError::InvalidJobTransition {
                id,
                from: job.state.to_string(),
                to: to.to_string(),
            });
        }
        job.state = to;
        job.worker_id = None;
        job.error = error;
        Ok(())
    }

    /// Number of queued jobs for a topic.
    pub fn job_backlog(&self, topic: &str) -> usize {
        self.inner
            .read()
            .jobs
            .jobs
            .values()
            .filter(|j| j.state == JobState::Queued && j.topic == topic)
            .count()
    }

    /// Returns failed jobs for a topic to the queue. Called by the
    /// backlog scan so failures become retry-eligible without letting
    /// a permanently failing job spin the claim loop.
    pub fn job_requeue_failed(&self, topic: &str) -> usize {
        let mut inner = self.inner.write();
        let mut moved = 0;
        for job in inner.jobs.jobs.values_mut() {
            if job.state == JobState::Failed && job.topic == topic {
                job.state = JobState::Queued;
                moved += 1;
            }
        }
        moved
    }

    /// Returns a job by id.
    pub fn job_get(&self, id: Uuid) -> Option<Job> {
        self.inner.read().jobs.jobs.get(&id).cloned()
    }
}
