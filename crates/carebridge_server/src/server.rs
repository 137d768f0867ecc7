//! Route dispatch over the typed handlers.
//!
//! The server core is transport-agnostic: [`ApiRequest`] and
//! [`ApiResponse`] model just enough of HTTP (method, path, headers,
//! JSON body) for a real listener or an in-process loopback client to
//! drive the same code path.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::RequestHandler;
use carebridge_plan::PlanCache;
use carebridge_protocol::{
    Channel, ErrorBody, LoginRequest, PushRequest, HEADER_AUTHORIZATION, HEADER_CLIENT_VERSION,
    HEADER_MAX_CLIENT_VERSION, HEADER_MIN_CLIENT_VERSION, INVALID_CLIENT_VERSION,
};
use carebridge_store::Store;

/// One inbound request, already decoded from the transport.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// HTTP method, uppercase.
    pub method: String,
    /// Path including the query string (`/v1/sync/patient?since=0`).
    pub path: String,
    /// Header name/value pairs; names matched case-insensitively.
    pub headers: Vec<(String, String)>,
    /// Decoded JSON body, `Null` when absent.
    pub body: serde_json::Value,
}

impl ApiRequest {
    /// Builds a request.
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            headers: Vec::new(),
            body: serde_json::Value::Null,
        }
    }

    /// Adds a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the JSON body.
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = body;
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn split_path(&self) -> (&str, &str) {
        match self.path.split_once('?') {
            Some((path, query)) => (path, query),
            None => (self.path.as_str(), ""),
        }
    }

    fn query_param(&self, name: &str) -> Option<&str> {
        let (_, query) = self.split_path();
        query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v)
    }
}

/// One outbound response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: Vec<(String, String)>,
    /// JSON body.
    pub body: serde_json::Value,
}

impl ApiResponse {
    fn ok<T: serde::Serialize>(body: &T) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: serde_json::to_value(body).unwrap_or(serde_json::Value::Null),
        }
    }
}

/// The central sync server core.
pub struct CentralServer {
    handler: RequestHandler,
}

impl CentralServer {
    /// Creates a server over a store and plan cache.
    pub fn new(config: ServerConfig, store: Store, plans: PlanCache) -> Self {
        Self {
            handler: RequestHandler::new(config, store, plans),
        }
    }

    /// The typed handlers, for callers bypassing route dispatch.
    pub fn handler(&self) -> &RequestHandler {
        &self.handler
    }

    /// The server configuration.
    pub fn config(&self) -> &ServerConfig {
        self.handler.config()
    }

    /// Dispatches one request, mapping handler errors to status
    /// codes. Never returns `Err`; failures become error responses.
    pub fn dispatch(&self, request: &ApiRequest) -> ApiResponse {
        match self.route(request) {
            Ok(response) => response,
            Err(e) => self.error_response(e),
        }
    }

    fn route(&self, request: &ApiRequest) -> ServerResult<ApiResponse> {
        // the version gate runs before anything else, login included
        self.handler
            .check_version(request.header(HEADER_CLIENT_VERSION))?;

        let (path, _) = request.split_path();
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        let prefix = self.config().api_prefix.as_str();
        let auth = request.header(HEADER_AUTHORIZATION);

        match (request.method.as_str(), segments.as_slice()) {
            ("POST", [p, "login"]) if *p == prefix => {
                let body: LoginRequest = decode_body(&request.body)?;
                Ok(ApiResponse::ok(&self.handler.handle_login(body)?))
            }
            ("GET", [p, "whoami"]) if *p == prefix => {
                Ok(ApiResponse::ok(&self.handler.handle_whoami(auth)?))
            }
            ("GET", [p, "sync", rest @ ..]) if *p == prefix && !rest.is_empty() => {
                let channel = parse_channel(rest)?;
                let since = parse_param(request, "since")?.unwrap_or(0);
                let limit = parse_param(request, "limit")?;
                let page = parse_param(request, "page")?.unwrap_or(0);
                let response = self
                    .handler
                    .handle_pull(auth, &channel, since, limit, page)?;
                Ok(ApiResponse::ok(&response))
            }
            ("POST", [p, "sync", rest @ ..]) if *p == prefix && !rest.is_empty() => {
                let channel = parse_channel(rest)?;
                let body: PushRequest = decode_body(&request.body)?;
                Ok(ApiResponse::ok(&self.handler.handle_push(auth, &channel, body)?))
            }
            _ => Err(ServerError::InvalidRequest(format!(
                "no route for {} {}",
                request.method, path
            ))),
        }
    }

    fn error_response(&self, error: ServerError) -> ApiResponse {
        let status = error.status();
        if status >= 500 {
            tracing::error!(%error, "request failed");
        } else {
            tracing::debug!(%error, status, "request rejected");
        }

        let mut headers = Vec::new();
        let body = match &error {
            ServerError::IncompatibleClientVersion { supplied } => {
                headers.push((
                    HEADER_MIN_CLIENT_VERSION.to_string(),
                    self.config().min_client_version.to_string(),
                ));
                headers.push((
                    HEADER_MAX_CLIENT_VERSION.to_string(),
                    self.config().max_client_version.to_string(),
                ));
                ErrorBody::new(
                    INVALID_CLIENT_VERSION,
                    format!("client version {supplied} is outside the accepted range"),
                )
            }
            other => ErrorBody::new(variant_name(other), other.to_string()),
        };
        ApiResponse {
            status,
            headers,
            body: serde_json::to_value(&body).unwrap_or(serde_json::Value::Null),
        }
    }
}

fn decode_body<T: serde::de::DeserializeOwned>(body: &serde_json::Value) -> ServerResult<T> {
    serde_json::from_value(body.clone())
        .map_err(|e| ServerError::InvalidRequest(format!("bad request body: {e}")))
}

fn parse_channel(segments: &[&str]) -> ServerResult<Channel> {
    Channel::parse(segments.join("/"))
        .map_err(|e| ServerError::InvalidRequest(e.to_string()))
}

fn parse_param<T: std::str::FromStr>(request: &ApiRequest, name: &str) -> ServerResult<Option<T>> {
    match request.query_param(name) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ServerError::InvalidRequest(format!("bad query param {name}={raw}"))),
    }
}

fn variant_name(error: &ServerError) -> &'static str {
    match error {
        ServerError::InvalidRequest(_) => "InvalidRequest",
        ServerError::AuthenticationFailed(_) => "BadAuthentication",
        ServerError::IncompatibleClientVersion { .. } => INVALID_CLIENT_VERSION,
        ServerError::UnknownChannel(_) => "UnknownChannel",
        ServerError::Plan(_) => "MalformedRecord",
        ServerError::Store(_) | ServerError::Internal(_) => "InternalError",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carebridge_testkit::demo_plan_cache;
    use serde_json::json;

    fn server() -> CentralServer {
        let config = ServerConfig::new().with_user("a@clinic.test", "pw", "Dr A");
        CentralServer::new(config, Store::new(), demo_plan_cache())
    }

    fn login(server: &CentralServer) -> String {
        let response = server.dispatch(
            &ApiRequest::new("POST", "/v1/login")
                .with_header(HEADER_CLIENT_VERSION, "1.2.0")
                .with_body(json!({"email": "a@clinic.test", "password": "pw"})),
        );
        assert_eq!(response.status, 200);
        format!("Bearer {}", response.body["token"].as_str().unwrap())
    }

    #[test]
    fn login_and_whoami_round_trip() {
        let server = server();
        let auth = login(&server);

        let response = server.dispatch(
            &ApiRequest::new("GET", "/v1/whoami")
                .with_header(HEADER_CLIENT_VERSION, "1.2.0")
                .with_header(HEADER_AUTHORIZATION, auth),
        );
        assert_eq!(response.status, 200);
        assert_eq!(response.body["displayName"], "Dr A");
    }

    #[test]
    fn version_gate_sets_bounds_headers() {
        let server = server();
        let response = server.dispatch(
            &ApiRequest::new("GET", "/v1/whoami").with_header(HEADER_CLIENT_VERSION, "0.1.0"),
        );
        assert_eq!(response.status, 400);
        assert_eq!(response.body["error"], INVALID_CLIENT_VERSION);
        assert!(response
            .headers
            .iter()
            .any(|(n, _)| n == HEADER_MIN_CLIENT_VERSION));
        assert!(response
            .headers
            .iter()
            .any(|(n, _)| n == HEADER_MAX_CLIENT_VERSION));
    }

    #[test]
    fn push_then_pull_over_dispatch() {
        let server = server();
        let auth = login(&server);

        let push = server.dispatch(
            &ApiRequest::new("POST", "/v1/sync/patient")
                .with_header(HEADER_CLIENT_VERSION, "1.2.0")
                .with_header(HEADER_AUTHORIZATION, auth.clone())
                .with_body(json!({
                    "records": [{"data": {"id": "p1", "first_name": "Ana"}}]
                })),
        );
        assert_eq!(push.status, 200);
        assert_eq!(push.body["count"], 1);

        let pull = server.dispatch(
            &ApiRequest::new("GET", "/v1/sync/patient?since=0&limit=10&page=0")
                .with_header(HEADER_CLIENT_VERSION, "1.2.0")
                .with_header(HEADER_AUTHORIZATION, auth),
        );
        assert_eq!(pull.status, 200);
        assert_eq!(pull.body["count"], 1);
        assert_eq!(pull.body["records"][0]["data"]["id"], "p1");
    }

    #[test]
    fn unauthenticated_sync_is_401() {
        let server = server();
        let response = server.dispatch(
            &ApiRequest::new("GET", "/v1/sync/patient").with_header(HEADER_CLIENT_VERSION, "1.2.0"),
        );
        assert_eq!(response.status, 401);
    }

    #[test]
    fn unknown_route_is_400() {
        let server = server();
        let response = server.dispatch(
            &ApiRequest::new("GET", "/v1/metrics").with_header(HEADER_CLIENT_VERSION, "1.2.0"),
        );
        assert_eq!(response.status, 400);
    }

    #[test]
    fn bad_query_param_is_400() {
        let server = server();
        let auth = login(&server);
        let response = server.dispatch(
            &ApiRequest::new("GET", "/v1/sync/patient?since=yesterday")
                .with_header(HEADER_CLIENT_VERSION, "1.2.0")
                .with_header(HEADER_AUTHORIZATION, auth),
        );
        assert_eq!(response.status, 400);
    }
}
