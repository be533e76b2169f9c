//! Single-shot HTTP requests over an injectable transport, plus the
//! fixed-delay retry helper used by every outbound call site.

use crate::{
    config::RetryPolicy,
    error::{Error, Result},
};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Method, StatusCode, Url};
use std::future::Future;
use std::sync::Arc;
use tracing::warn;

/// Outbound HTTP request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method
    pub method: Method,
    /// Target URL
    pub url: Url,
    /// JSON body, if any
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    /// Create a request without a body
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            body: None,
        }
    }

    /// Attach a JSON body
    pub fn json<T: serde::Serialize>(mut self, body: &T) -> Result<Self> {
        self.body = Some(serde_json::to_vec(body)?);
        Ok(self)
    }
}

/// Fully-read HTTP response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Response status
    pub status: StatusCode,
    /// Response body
    pub body: Bytes,
}

/// Transport that executes a request and reads the whole response
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Execute the request; transport-level failures map to `Error::Transport`
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// Production transport backed by a shared `reqwest::Client`
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport with a default client
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport around an existing client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut builder = self.client.request(request.method, request.url);
        if let Some(body) = request.body {
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        // Consuming the body returns the connection to the pool
        let body = response.bytes().await?;

        Ok(HttpResponse { status, body })
    }
}

/// Stateless request sender shared by client and server call sites
#[derive(Clone)]
pub struct Requestor {
    transport: Arc<dyn HttpTransport>,
}

impl Default for Requestor {
    fn default() -> Self {
        Self::new(Arc::new(ReqwestTransport::new()))
    }
}

impl Requestor {
    /// Create a requestor over the given transport
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// Send a request and return the body if the status equals `expected`
    pub async fn send(&self, request: HttpRequest, expected: StatusCode) -> Result<Bytes> {
        let response = self.transport.execute(request).await?;
        if response.status != expected {
            return Err(Error::BadStatus {
                expected: expected.as_u16(),
                actual: response.status.as_u16(),
            });
        }
        Ok(response.body)
    }
}

/// Run `attempt` until it succeeds or the policy's attempts are used up.
///
/// Attempts are spaced by the policy's fixed delay. Exhaustion is returned as
/// `Error::RetriesExhausted`; callers route it to their error sink for logging.
pub async fn retry<T, F, Fut>(policy: RetryPolicy, operation: &str, mut attempt: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    for n in 1..=policy.attempts {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                warn!("{} attempt {}/{} failed: {}", operation, n, policy.attempts, e);
                if n < policy.attempts {
                    tokio::time::sleep(policy.delay).await;
                }
            }
        }
    }

    Err(Error::RetriesExhausted {
        operation: operation.to_string(),
        attempts: policy.attempts,
    })
}
