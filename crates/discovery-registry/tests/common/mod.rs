//! Common test utilities for registry end-to-end tests

use async_trait::async_trait;
use discovery_registry::{
    ClientAgent, ClientConfig, HttpTransport, RegistryServer, Result, RetryPolicy, ServerConfig,
    requestor::{HttpRequest, HttpResponse, ReqwestTransport},
};
use reqwest::StatusCode;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;

/// Retry policy that keeps failing tests fast
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(10))
}

/// Start a registry server on an ephemeral localhost port
pub async fn start_server(
    sweep_interval: Duration,
    transport: Option<Arc<dyn HttpTransport>>,
) -> RegistryServer {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind server listener");

    let mut config = ServerConfig::new(8079).expect("Invalid server config");
    config.sweep_interval = sweep_interval;
    config.retry = fast_retry();

    let mut server =
        RegistryServer::with_listener(config, listener).expect("Failed to create server");
    if let Some(transport) = transport {
        server = server.with_requestor(discovery_registry::Requestor::new(transport));
    }
    server.start().expect("Failed to start server");
    server
}

/// Base URL of a running server
pub fn base_url(addr: SocketAddr) -> String {
    format!("http://{}", addr)
}

/// Start a client against `server` whose callback points at its real listener
pub async fn start_client(server: SocketAddr, name: &str) -> ClientAgent {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind callback listener");
    let callback = base_url(listener.local_addr().expect("No callback address"));

    let config = ClientConfig::new(base_url(server), callback, name, 9000)
        .expect("Invalid client config")
        .with_retry(fast_retry());

    let mut client = ClientAgent::new(config).expect("Failed to create client");
    client
        .start_with_listener(listener)
        .await
        .expect("Failed to start client");
    client
}

/// Transport that counts successful probe responses
#[derive(Default)]
pub struct CountingTransport {
    inner: ReqwestTransport,
    /// Responses with status 200
    pub ok: AtomicUsize,
}

impl CountingTransport {
    /// Number of 200 responses seen so far
    pub fn ok_count(&self) -> usize {
        self.ok.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpTransport for CountingTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let response = self.inner.execute(request).await?;
        if response.status == StatusCode::OK {
            self.ok.fetch_add(1, Ordering::SeqCst);
        }
        Ok(response)
    }
}
