//! Request-issuing primitive for contract scenarios

use std::time::{Duration, Instant};

use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{E2eError, E2eResult};

/// A parsed response plus the latency of the round trip
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    /// `Value::Null` when the body is empty (e.g. `204`)
    pub body: Value,
    pub elapsed: Duration,
}

/// HTTP client bound to a single project's base address.
///
/// A new client (and with it a new connection pool) is built for every attempt.
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> E2eResult<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Bound applied to calls that do not pass their own
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn get(&self, path: &str) -> E2eResult<ApiResponse> {
        self.send(Method::GET, path, None, self.timeout).await
    }

    pub async fn get_with_timeout(&self, path: &str, timeout: Duration) -> E2eResult<ApiResponse> {
        self.send(Method::GET, path, None, timeout).await
    }

    pub async fn post_json<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> E2eResult<ApiResponse> {
        let body = serde_json::to_value(body)?;
        self.send(Method::POST, path, Some(body), self.timeout).await
    }

    pub async fn put_json<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> E2eResult<ApiResponse> {
        let body = serde_json::to_value(body)?;
        self.send(Method::PUT, path, Some(body), self.timeout).await
    }

    pub async fn delete(&self, path: &str) -> E2eResult<ApiResponse> {
        self.send(Method::DELETE, path, None, self.timeout).await
    }

    async fn send(&self, method: Method, path: &str, body: Option<Value>, bound: Duration) -> E2eResult<ApiResponse> {
        let label = format!("{} {}", method, path);
        let mut request = self.client.request(method, self.url(path)).timeout(bound);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let start = Instant::now();
        let exchange = async move {
            let response = request.send().await?;
            let status = response.status().as_u16();
            let bytes = response.bytes().await?;
            Ok::<_, reqwest::Error>((status, bytes))
        };

        let (status, bytes) = match tokio::time::timeout(bound, exchange).await {
            Err(_) => return Err(E2eError::timeout("Request", label, bound)),
            Ok(Err(e)) if e.is_timeout() => return Err(E2eError::timeout("Request", label, bound)),
            Ok(Err(e)) => return Err(E2eError::Http(e)),
            Ok(Ok(exchange)) => exchange,
        };
        let elapsed = start.elapsed();

        debug!(request = %label, status, elapsed_ms = elapsed.as_millis() as u64, "response received");

        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).map_err(|e| {
                E2eError::AssertionFailed(format!("{} returned a non-JSON body: {}", label, e))
            })?
        };

        Ok(ApiResponse { status, body, elapsed })
    }
}
