//! Configuration for the remote connection and the sync manager.

use carebridge_protocol::{Channel, ClientVersion};
use std::time::Duration;

/// Configuration for a [`crate::RemoteConnection`].
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Central server base URL, without a trailing slash.
    pub base_url: String,
    /// Leading path segment of every route (`/v1/...`).
    pub api_prefix: String,
    /// Login email.
    pub email: String,
    /// Login password.
    pub password: String,
    /// Version this client reports in `X-Version`.
    pub client_version: ClientVersion,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl ConnectionConfig {
    /// Creates a connection configuration.
    pub fn new(
        base_url: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
        client_version: ClientVersion,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_prefix: "v1".to_string(),
            email: email.into(),
            password: password.into(),
            client_version,
            timeout: Duration::from_secs(30),
        }
    }

    /// Sets the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the route prefix.
    pub fn with_api_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.api_prefix = prefix.into();
        self
    }
}

/// Configuration for a [`crate::SyncManager`].
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Channels synced on every run, in order.
    pub channels: Vec<Channel>,
    /// Page size requested on pull.
    pub pull_limit: usize,
    /// Page size exported on push.
    pub push_limit: usize,
}

impl SyncConfig {
    /// Creates a configuration with default page sizes.
    pub fn new() -> Self {
        Self {
            channels: Vec::new(),
            pull_limit: 100,
            push_limit: 100,
        }
    }

    /// Adds a channel to every sync run.
    pub fn with_channel(mut self, channel: Channel) -> Self {
        self.channels.push(channel);
        self
    }

    /// Sets the pull page size.
    pub fn with_pull_limit(mut self, limit: usize) -> Self {
        self.pull_limit = limit;
        self
    }

    /// Sets the push page size.
    pub fn with_push_limit(mut self, limit: usize) -> Self {
        self.push_limit = limit;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}
