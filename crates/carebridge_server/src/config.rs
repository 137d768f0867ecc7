//! Server configuration.

use carebridge_protocol::{ClientVersion, UserInfo};

/// A provisioned user account.
#[derive(Debug, Clone)]
pub struct UserAccount {
    /// Login email.
    pub email: String,
    /// Login password.
    pub password: String,
    /// Identity returned by login and `whoami`.
    pub user: UserInfo,
}

/// Configuration for the central server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Leading path segment of every route (`/v1/...`).
    pub api_prefix: String,
    /// Oldest client version accepted by the gate.
    pub min_client_version: ClientVersion,
    /// Newest client version accepted by the gate.
    pub max_client_version: ClientVersion,
    /// Page size used when the client does not send `limit`.
    pub default_page_limit: usize,
    /// Upper bound on the `limit` query parameter.
    pub max_page_limit: usize,
    /// Provisioned accounts.
    pub users: Vec<UserAccount>,
}

impl ServerConfig {
    /// Creates a configuration with the default version range and
    /// page limits.
    pub fn new() -> Self {
        Self {
            api_prefix: "v1".to_string(),
            min_client_version: ClientVersion::new(1, 0, 0),
            max_client_version: ClientVersion::new(99, 0, 0),
            default_page_limit: 100,
            max_page_limit: 1000,
            users: Vec::new(),
        }
    }

    /// Sets the accepted client version range.
    pub fn with_version_range(mut self, min: ClientVersion, max: ClientVersion) -> Self {
        self.min_client_version = min;
        self.max_client_version = max;
        self
    }

    /// Sets the default and maximum page limits.
    pub fn with_page_limits(mut self, default: usize, max: usize) -> Self {
        self.default_page_limit = default;
        self.max_page_limit = max;
        self
    }

    /// Provisions a user account.
    pub fn with_user(
        mut self,
        email: impl Into<String>,
        password: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        let email = email.into();
        self.users.push(UserAccount {
            user: UserInfo {
                id: format!("user-{}", self.users.len() + 1),
                display_name: display_name.into(),
            },
            email,
            password: password.into(),
        });
        self
    }

    /// True if `version` falls inside the accepted range.
    pub fn accepts_version(&self, version: ClientVersion) -> bool {
        self.min_client_version <= version && version <= self.max_client_version
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}
