//! The authenticated connection to the central server.

use crate::config::ConnectionConfig;
use crate::error::{EngineError, EngineResult, VersionDirection};
use crate::http::{HttpClient, HttpRequest, HttpResponse, Method};
use carebridge_protocol::{
    Channel, ClientVersion, ErrorBody, LoginRequest, LoginResponse, PullResponse, PushRequest,
    PushResponse, SyncRecord, UserInfo, HEADER_AUTHORIZATION, HEADER_CLIENT_VERSION,
    HEADER_MAX_CLIENT_VERSION, HEADER_MIN_CLIENT_VERSION,
};
use parking_lot::Mutex;

/// A logged-in session against the central server.
///
/// Owns the bearer token and the rules around it: one login in flight
/// at a time, and exactly one transparent re-login when a request
/// comes back 401. A second 401 on the same call surfaces as
/// [`EngineError::BadAuthentication`].
pub struct RemoteConnection<C> {
    config: ConnectionConfig,
    client: C,
    token: Mutex<Option<String>>,
    user: Mutex<Option<UserInfo>>,
    connect_lock: tokio::sync::Mutex<()>,
}

impl<C: HttpClient> RemoteConnection<C> {
    /// Creates a connection. No network traffic happens until the
    /// first call.
    pub fn new(config: ConnectionConfig, client: C) -> Self {
        Self {
            config,
            client,
            token: Mutex::new(None),
            user: Mutex::new(None),
            connect_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// The connection configuration.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// True once a login has succeeded and the token is held.
    pub fn is_connected(&self) -> bool {
        self.token.lock().is_some()
    }

    /// Logs in, deduplicating concurrent attempts.
    ///
    /// Callers that queue behind an in-flight connect reuse its
    /// token instead of issuing another login.
    pub async fn connect(&self) -> EngineResult<UserInfo> {
        let _guard = self.connect_lock.lock().await;
        if self.is_connected() {
            if let Some(user) = self.user.lock().clone() {
                return Ok(user);
            }
        }

        let body = serde_json::to_value(LoginRequest {
            email: self.config.email.clone(),
            password: self.config.password.clone(),
        })
        .map_err(|e| EngineError::Protocol(e.to_string()))?;
        let request = self.build_request(Method::Post, self.route("login"), body);
        let response = self.send(request).await?;
        let response = self.check(response)?;

        let login: LoginResponse = decode(response.body)?;
        *self.token.lock() = Some(login.token);
        *self.user.lock() = Some(login.user.clone());
        tracing::info!(user = %login.user.id, "connected to central");
        Ok(login.user)
    }

    /// Drops the session token; the next call logs in again.
    pub fn disconnect(&self) {
        *self.token.lock() = None;
        *self.user.lock() = None;
    }

    /// `GET /whoami`.
    pub async fn whoami(&self) -> EngineResult<UserInfo> {
        let response = self
            .call(Method::Get, self.route("whoami"), serde_json::Value::Null)
            .await?;
        decode(response.body)
    }

    /// Pulls one page from a channel.
    pub async fn pull(
        &self,
        channel: &Channel,
        since: i64,
        limit: usize,
        page: usize,
    ) -> EngineResult<PullResponse> {
        let path = format!(
            "{}?since={since}&limit={limit}&page={page}",
            self.route(&format!("sync/{channel}"))
        );
        let response = self.call(Method::Get, path, serde_json::Value::Null).await?;
        decode(response.body)
    }

    /// Pushes one page of records to a channel.
    pub async fn push(
        &self,
        channel: &Channel,
        records: Vec<SyncRecord>,
    ) -> EngineResult<PushResponse> {
        let body = serde_json::to_value(PushRequest { records })
            .map_err(|e| EngineError::Protocol(e.to_string()))?;
        let response = self
            .call(Method::Post, self.route(&format!("sync/{channel}")), body)
            .await?;
        decode(response.body)
    }

    /// Sends an authenticated request, logging in first if needed and
    /// retrying exactly once after a 401.
    async fn call(
        &self,
        method: Method,
        path: String,
        body: serde_json::Value,
    ) -> EngineResult<HttpResponse> {
        if !self.is_connected() {
            self.connect().await?;
        }

        let request = self.build_request(method, path.clone(), body.clone());
        let response = self.send(request).await?;
        if response.status != 401 {
            return self.check(response);
        }

        // stale or revoked token: one re-login, one retry
        tracing::debug!(path, "token rejected, re-authenticating");
        self.disconnect();
        self.connect().await?;
        let retry = self.build_request(method, path, body);
        let response = self.send(retry).await?;
        if response.status == 401 {
            return Err(EngineError::BadAuthentication(
                "request rejected after re-login".into(),
            ));
        }
        self.check(response)
    }

    fn route(&self, endpoint: &str) -> String {
        format!("/{}/{endpoint}", self.config.api_prefix)
    }

    fn build_request(&self, method: Method, path: String, body: serde_json::Value) -> HttpRequest {
        let mut headers = vec![(
            HEADER_CLIENT_VERSION.to_string(),
            self.config.client_version.to_string(),
        )];
        if let Some(token) = self.token.lock().as_deref() {
            headers.push((HEADER_AUTHORIZATION.to_string(), format!("Bearer {token}")));
        }
        HttpRequest {
            method,
            path,
            headers,
            body,
        }
    }

    async fn send(&self, request: HttpRequest) -> EngineResult<HttpResponse> {
        match tokio::time::timeout(self.config.timeout, self.client.send(request)).await {
            Err(_) => Err(EngineError::Timeout),
            Ok(Err(message)) => Err(EngineError::Transport(message)),
            Ok(Ok(response)) => Ok(response),
        }
    }

    /// Maps non-success statuses to typed errors.
    fn check(&self, response: HttpResponse) -> EngineResult<HttpResponse> {
        if response.is_success() {
            return Ok(response);
        }

        let error_body: Option<ErrorBody> = serde_json::from_value(response.body.clone()).ok();
        if response.status == 400 {
            if let Some(body) = &error_body {
                if body.is_version_gate() {
                    return Err(self.version_gate_error(&response));
                }
            }
        }
        if response.status == 401 {
            return Err(EngineError::BadAuthentication(
                error_body
                    .map(|b| b.message)
                    .unwrap_or_else(|| "credentials rejected".into()),
            ));
        }
        Err(EngineError::RemoteCallFailed {
            status: response.status,
            message: error_body
                .map(|b| b.message)
                .unwrap_or_else(|| "no error body".into()),
        })
    }

    fn version_gate_error(&self, response: &HttpResponse) -> EngineError {
        let parse = |name: &str| -> Option<ClientVersion> {
            response.header(name).and_then(|v| v.parse().ok())
        };
        let ours = self.config.client_version;
        if let Some(min) = parse(HEADER_MIN_CLIENT_VERSION) {
            if ours < min {
                return EngineError::VersionIncompatible {
                    bound: min,
                    direction: VersionDirection::ClientTooOld,
                };
            }
        }
        if let Some(max) = parse(HEADER_MAX_CLIENT_VERSION) {
            return EngineError::VersionIncompatible {
                bound: max,
                direction: VersionDirection::ClientTooNew,
            };
        }
        EngineError::RemoteCallFailed {
            status: response.status,
            message: "version gate response without bounds headers".into(),
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(body: serde_json::Value) -> EngineResult<T> {
    serde_json::from_value(body).map_err(|e| EngineError::Protocol(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::MockHttpClient;
    use serde_json::json;
    use std::time::Duration;

    fn config() -> ConnectionConfig {
        ConnectionConfig::new(
            "http://central.test",
            "a@clinic.test",
            "pw",
            ClientVersion::new(1, 2, 0),
        )
    }

    fn login_body(token: &str) -> serde_json::Value {
        json!({
            "token": token,
            "user": {"id": "u1", "displayName": "Dr A"}
        })
    }

    #[tokio::test]
    async fn connect_sends_version_header_and_stores_token() {
        let mock = std::sync::Arc::new(MockHttpClient::new());
        mock.push_json(200, login_body("t1"));
        mock.push_json(200, json!({"id": "u1", "displayName": "Dr A"}));
        let remote = RemoteConnection::new(config(), mock.clone());

        let user = remote.connect().await.unwrap();
        assert_eq!(user.id, "u1");
        assert!(remote.is_connected());
        remote.whoami().await.unwrap();

        let requests = mock.requests();
        assert_eq!(requests[0].path, "/v1/login");
        assert!(requests[0]
            .headers
            .iter()
            .any(|(n, v)| n == HEADER_CLIENT_VERSION && v == "1.2.0"));
        // no token yet on the login request itself
        assert!(!requests[0].headers.iter().any(|(n, _)| n == HEADER_AUTHORIZATION));
        assert!(requests[1]
            .headers
            .iter()
            .any(|(n, v)| n == HEADER_AUTHORIZATION && v == "Bearer t1"));
    }

    #[tokio::test]
    async fn second_connect_reuses_session() {
        let mock = MockHttpClient::new();
        mock.push_json(200, login_body("t1"));
        let remote = RemoteConnection::new(config(), mock);

        remote.connect().await.unwrap();
        // no scripted response left; a second login would error
        let user = remote.connect().await.unwrap();
        assert_eq!(user.id, "u1");
    }

    #[tokio::test]
    async fn stale_token_triggers_one_relogin() {
        let mock = MockHttpClient::new();
        mock.push_json(200, login_body("t1")); // initial login
        mock.push_json(401, json!({"error": "BadAuthentication", "message": "expired"}));
        mock.push_json(200, login_body("t2")); // re-login
        mock.push_json(200, json!({"id": "u1", "displayName": "Dr A"}));
        let remote = RemoteConnection::new(config(), mock);

        let user = remote.whoami().await.unwrap();
        assert_eq!(user.id, "u1");
    }

    #[tokio::test]
    async fn persistent_401_is_bad_authentication() {
        let mock = MockHttpClient::new();
        mock.push_json(200, login_body("t1"));
        mock.push_json(401, json!({"error": "BadAuthentication", "message": "expired"}));
        mock.push_json(200, login_body("t2"));
        mock.push_json(401, json!({"error": "BadAuthentication", "message": "expired"}));
        let remote = RemoteConnection::new(config(), mock);

        let err = remote.whoami().await.unwrap_err();
        assert!(matches!(err, EngineError::BadAuthentication(_)));
    }

    #[tokio::test]
    async fn version_gate_too_old() {
        let mock = MockHttpClient::new();
        mock.push_response(HttpResponse {
            status: 400,
            headers: vec![
                (HEADER_MIN_CLIENT_VERSION.into(), "2.0.0".into()),
                (HEADER_MAX_CLIENT_VERSION.into(), "3.0.0".into()),
            ],
            body: json!({"error": "InvalidClientVersion", "message": "too old"}),
        });
        let remote = RemoteConnection::new(config(), mock);

        let err = remote.connect().await.unwrap_err();
        match err {
            EngineError::VersionIncompatible { bound, direction } => {
                assert_eq!(bound, ClientVersion::new(2, 0, 0));
                assert_eq!(direction, VersionDirection::ClientTooOld);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn version_gate_too_new() {
        let mock = MockHttpClient::new();
        mock.push_response(HttpResponse {
            status: 400,
            headers: vec![
                (HEADER_MIN_CLIENT_VERSION.into(), "0.1.0".into()),
                (HEADER_MAX_CLIENT_VERSION.into(), "1.0.0".into()),
            ],
            body: json!({"error": "InvalidClientVersion", "message": "too new"}),
        });
        let remote = RemoteConnection::new(config(), mock);

        let err = remote.connect().await.unwrap_err();
        match err {
            EngineError::VersionIncompatible { bound, direction } => {
                assert_eq!(bound, ClientVersion::new(1, 0, 0));
                assert_eq!(direction, VersionDirection::ClientTooNew);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn login_rejection_is_bad_authentication() {
        let mock = MockHttpClient::new();
        mock.push_json(401, json!({"error": "BadAuthentication", "message": "bad credentials"}));
        let remote = RemoteConnection::new(config(), mock);

        let err = remote.connect().await.unwrap_err();
        assert!(matches!(err, EngineError::BadAuthentication(_)));
    }

    #[tokio::test]
    async fn transport_failure_is_not_a_remote_call_failure() {
        let mock = MockHttpClient::new();
        mock.push_transport_error("connection refused");
        let remote = RemoteConnection::new(config(), mock);

        let err = remote.connect().await.unwrap_err();
        assert!(matches!(err, EngineError::Transport(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_request_times_out() {
        struct StalledClient;

        #[async_trait::async_trait]
        impl HttpClient for StalledClient {
            async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, String> {
                std::future::pending().await
            }
        }

        let config = config().with_timeout(Duration::from_millis(50));
        let remote = RemoteConnection::new(config, StalledClient);
        let err = remote.connect().await.unwrap_err();
        assert!(matches!(err, EngineError::Timeout));
    }

    #[tokio::test]
    async fn server_error_carries_status() {
        let mock = MockHttpClient::new();
        mock.push_json(200, login_body("t1"));
        mock.push_json(503, json!({"error": "Unavailable", "message": "maintenance"}));
        let remote = RemoteConnection::new(config(), mock);

        let err = remote.whoami().await.unwrap_err();
        match err {
            EngineError::RemoteCallFailed { status, message } => {
                assert_eq!(status, 503);
                assert_eq!(message, "maintenance");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
