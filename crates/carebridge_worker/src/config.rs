//! Configuration for the worker pool.

use std::time::Duration;

/// Configuration for a [`crate::WorkerPool`].
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum number of concurrently running job handlers.
    pub concurrency: usize,
    /// Interval between liveness heartbeats.
    pub heartbeat_interval: Duration,
    /// Interval between backlog scans when no completion wakes the
    /// pool earlier. Failed jobs become retry-eligible on this tick.
    pub poll_interval: Duration,
    /// Capacity of the in-memory front queue.
    pub front_queue_capacity: usize,
    /// Hostname recorded in the worker registration.
    pub hostname: String,
    /// Software version recorded in the worker registration.
    pub version: String,
}

impl WorkerConfig {
    /// Creates a configuration with default intervals and capacity.
    pub fn new() -> Self {
        Self {
            concurrency: 4,
            heartbeat_interval: Duration::from_secs(10),
            poll_interval: Duration::from_millis(500),
            front_queue_capacity: 32,
            hostname: "unknown-host".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Sets the maximum number of concurrent handlers.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Sets the heartbeat interval.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Sets the backlog scan interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the front queue capacity.
    pub fn with_front_queue_capacity(mut self, capacity: usize) -> Self {
        self.front_queue_capacity = capacity;
        self
    }

    /// Sets the hostname recorded in the worker registration.
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::new()
    }
}
