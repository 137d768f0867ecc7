//! HTTP client abstraction.
//!
//! The engine never talks to a socket directly; it builds
//! [`HttpRequest`]s and hands them to an [`HttpClient`]. This keeps
//! the connection logic (auth, retries, the version gate) testable
//! against a mock or an in-process server.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET.
    Get,
    /// POST.
    Post,
}

impl Method {
    /// The method name as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// One outbound request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: Method,
    /// Path relative to the client's base URL, query included.
    pub path: String,
    /// Header name/value pairs.
    pub headers: Vec<(String, String)>,
    /// JSON body, `Null` for none.
    pub body: serde_json::Value,
}

/// One inbound response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: Vec<(String, String)>,
    /// Decoded JSON body, `Null` when empty or not JSON.
    pub body: serde_json::Value,
}

impl HttpResponse {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// True for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The transport seam.
///
/// `Err` means the request never produced an HTTP response (DNS
/// failure, refused connection); HTTP-level failures come back as
/// `Ok` with a non-success status.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends one request.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, String>;
}

#[async_trait]
impl<C: HttpClient + ?Sized> HttpClient for std::sync::Arc<C> {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, String> {
        (**self).send(request).await
    }
}

/// A scripted client for tests.
///
/// Responses are served in the order they were pushed; every sent
/// request is recorded for assertions.
#[derive(Default)]
pub struct MockHttpClient {
    responses: Mutex<VecDeque<Result<HttpResponse, String>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockHttpClient {
    /// Creates an empty mock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response.
    pub fn push_response(&self, response: HttpResponse) {
        self.responses.lock().push_back(Ok(response));
    }

    /// Queues a transport failure.
    pub fn push_transport_error(&self, message: impl Into<String>) {
        self.responses.lock().push_back(Err(message.into()));
    }

    /// Queues a JSON response with the given status.
    pub fn push_json(&self, status: u16, body: serde_json::Value) {
        self.push_response(HttpResponse {
            status,
            headers: Vec::new(),
            body,
        });
    }

    /// All requests sent so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, String> {
        self.requests.lock().push(request);
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err("no scripted response".into()))
    }
}

/// [`HttpClient`] backed by `reqwest`.
#[cfg(feature = "reqwest")]
pub struct ReqwestClient {
    base_url: String,
    client: reqwest::Client,
}

#[cfg(feature = "reqwest")]
impl ReqwestClient {
    /// Creates a client for the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[cfg(feature = "reqwest")]
#[async_trait]
impl HttpClient for ReqwestClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, String> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if !request.body.is_null() {
            builder = builder.json(&request.body);
        }

        let response = builder.send().await.map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.to_string(), v.to_string()))
            })
            .collect();
        let text = response.text().await.map_err(|e| e.to_string())?;
        let body = serde_json::from_str(&text).unwrap_or(serde_json::Value::Null);
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
