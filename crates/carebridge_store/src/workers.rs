//! Worker pool registrations.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;
use uuid::Uuid;

/// A live worker-pool registration.
///
/// Created when a pool starts, heartbeated on a configurable
/// interval, deleted on graceful stop. A registration that missed
/// several heartbeats must be treated as dead by any external
/// liveness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerRegistration {
    /// Worker id.
    pub id: Uuid,
    /// Hostname of the process.
    pub hostname: String,
    /// Client software version.
    pub version: String,
    /// Last successful heartbeat.
    pub last_heartbeat_at: DateTime<Utc>,
}

impl WorkerRegistration {
    /// Creates a fresh registration heartbeated at now.
    pub fn new(id: Uuid, hostname: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id,
            hostname: hostname.into(),
            version: version.into(),
            last_heartbeat_at: Utc::now(),
        }
    }

    /// True if the worker missed `missed_beats` consecutive
    /// heartbeats of `interval` as of `now`.
    pub fn is_stale(&self, interval: Duration, missed_beats: u32, now: DateTime<Utc>) -> bool {
        let allowance = ChronoDuration::from_std(interval * missed_beats)
            .unwrap_or_else(|_| ChronoDuration::MAX);
        now - self.last_heartbeat_at > allowance
    }
}
