//! Request and response bodies.

use crate::SyncRecord;
use serde::{Deserialize, Serialize};

/// Error marker returned with HTTP 400 when the client version falls
/// outside the server's accepted range.
pub const INVALID_CLIENT_VERSION: &str = "InvalidClientVersion";

/// `POST /{version}/login` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    /// User email.
    pub email: String,
    /// User password.
    pub password: String,
}

/// `POST /{version}/login` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    /// Bearer token for subsequent requests.
    pub token: String,
    /// The authenticated user.
    pub user: UserInfo,
}

/// Minimal user identity, returned by login and `whoami`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    /// User id.
    pub id: String,
    /// Human-readable name.
    pub display_name: String,
}

/// `GET /{version}/sync/{channel}` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    /// The page of records.
    pub records: Vec<SyncRecord>,
    /// Total records pending for this cursor position across all
    /// pages.
    pub count: u64,
    /// Server logical write tick at which the snapshot was taken;
    /// becomes the client's next pull cursor.
    pub requested_at: i64,
}

/// `POST /{version}/sync/{channel}` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushRequest {
    /// Records to apply on the server.
    pub records: Vec<SyncRecord>,
}

/// `POST /{version}/sync/{channel}` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResponse {
    /// Number of records the server applied.
    pub count: u64,
    /// Server logical write tick at which the push was accepted.
    pub requested_at: i64,
}

/// Error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable error marker.
    pub error: String,
    /// Human-readable message.
    pub message: String,
}

impl ErrorBody {
    /// Creates an error body.
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }

    /// True if this is the version-gate marker.
    pub fn is_version_gate(&self) -> bool {
        self.error == INVALID_CLIENT_VERSION
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pull_response_wire_keys() {
        let body = PullResponse {
            records: vec![],
            count: 0,
            requested_at: 1700000000000,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("requestedAt").is_some());
        assert!(json.get("requested_at").is_none());
    }

    #[test]
    fn version_gate_marker() {
        let body = ErrorBody::new(INVALID_CLIENT_VERSION, "client too old");
        assert!(body.is_version_gate());
        assert!(!ErrorBody::new("Forbidden", "no").is_version_gate());
    }

    #[test]
    fn login_round_trip() {
        let body = LoginResponse {
            token: "t".into(),
            user: UserInfo {
                id: "u1".into(),
                display_name: "Dr Who".into(),
            },
        };
        let parsed: LoginResponse =
            serde_json::from_str(&serde_json::to_string(&body).unwrap()).unwrap();
        assert_eq!(parsed.user.display_name, "Dr Who");
    }
}
