//! Client registration agent
//!
//! Registers a service with a registry server, answers the server's liveness
//! probes on `/callback`, and unregisters on shutdown.
//!
//! Startup binds the callback listener, registers, then starts the control
//! loop. Shutdown unregisters, stops the control loop and waits for it, then
//! aborts the callback listener. Probes arriving while the unregister call is
//! in flight are still answered.

use crate::{
    api::{ApiError, require_method, required_param},
    config::{ClientConfig, RetryPolicy},
    control::{ControlHandle, ControlLoop, ErrorSink},
    error::{Error, Result},
    models::{ClientIdentity, RegisterRequest, RegisterResponse},
    requestor::{HttpRequest, HttpTransport, Requestor, retry},
};
use axum::{
    Router,
    extract::State,
    http::{Method, StatusCode, Uri},
    routing::any,
};
use reqwest::Url;
use std::net::SocketAddr;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Path the callback listener answers probes on
pub const CALLBACK_PATH: &str = "/callback";

type SharedIdentity = Arc<RwLock<ClientIdentity>>;

/// Build the callback listener's router
pub fn callback_router(identity: SharedIdentity) -> Router {
    Router::new()
        .route(CALLBACK_PATH, any(callback_handler))
        .with_state(identity)
}

async fn callback_handler(
    method: Method,
    uri: Uri,
    State(identity): State<SharedIdentity>,
) -> std::result::Result<StatusCode, ApiError> {
    require_method(&method, Method::GET)?;
    let hash = required_param(&uri, "hash")?;

    check_token(&identity, &hash).map_err(|e| ApiError::NotFound(e.to_string()))?;
    Ok(StatusCode::OK)
}

fn check_token(identity: &RwLock<ClientIdentity>, hash: &str) -> Result<()> {
    let identity = identity.read().unwrap_or_else(PoisonError::into_inner);
    if !identity.is_registered() || identity.token != hash {
        return Err(Error::NotFound("hash mismatch".to_string()));
    }
    Ok(())
}

fn registry_endpoint(base: &str, path: &str) -> Result<Url> {
    let joined = format!("{}/{}", base.trim_end_matches('/'), path);
    Url::parse(&joined).map_err(|e| Error::InvalidInput(format!("registrator {}: {}", base, e)))
}

struct Running {
    callback: JoinHandle<()>,
    callback_addr: SocketAddr,
    control: ControlHandle,
}

/// Registration agent for one service
pub struct ClientAgent {
    identity: SharedIdentity,
    requestor: Requestor,
    retry: RetryPolicy,
    sink: ErrorSink,
    control: Option<ControlLoop>,
    running: Option<Running>,
}

impl ClientAgent {
    /// Create an agent from a validated configuration
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let identity = ClientIdentity {
            name: config.name,
            port: config.port,
            callback_base_url: config.callback,
            registrator_url: config.address,
            token: String::new(),
        };
        let control = ControlLoop::new(format!("registry-client {}", identity.name));

        Ok(Self {
            identity: Arc::new(RwLock::new(identity)),
            requestor: Requestor::default(),
            retry: config.retry,
            sink: control.sink(),
            control: Some(control),
            running: None,
        })
    }

    /// Create an agent that sends through `transport`
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn HttpTransport>) -> Result<Self> {
        let mut agent = Self::new(config)?;
        agent.requestor = Requestor::new(transport);
        Ok(agent)
    }

    /// Snapshot of the current identity
    pub fn identity(&self) -> ClientIdentity {
        self.identity
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Token issued by the registry, if registration succeeded
    pub fn token(&self) -> Option<String> {
        let identity = self.identity();
        identity.is_registered().then_some(identity.token)
    }

    /// Compare a probe's hash against the stored token
    pub fn check_token(&self, hash: &str) -> Result<()> {
        check_token(&self.identity, hash)
    }

    /// Address of the callback listener once started
    pub fn callback_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.callback_addr)
    }

    /// Bind the callback listener on all interfaces and start
    pub async fn start(&mut self) -> Result<()> {
        let port = self.identity().port;
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        self.start_with_listener(listener).await
    }

    /// Start with an already-bound callback listener
    pub async fn start_with_listener(&mut self, listener: TcpListener) -> Result<()> {
        let Some(control) = self.control.take() else {
            return Err(Error::InvalidInput("client already started".to_string()));
        };

        let callback_addr = listener.local_addr()?;
        let app = callback_router(Arc::clone(&self.identity));
        let sink = self.sink.clone();
        let callback = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                sink.report(Error::Io(e));
            }
        });
        info!("Callback listener started at {}", callback_addr);

        self.register().await;

        self.running = Some(Running {
            callback,
            callback_addr,
            control: control.spawn(),
        });
        Ok(())
    }

    /// Register with the registry unless a token is already held.
    ///
    /// Failure is reported to the control loop and leaves the token empty.
    pub async fn register(&self) {
        if self.token().is_some() {
            warn!("Client already has hash, skipping registration");
            return;
        }

        match self.try_register().await {
            Ok(token) => {
                let mut identity = self.identity.write().unwrap_or_else(PoisonError::into_inner);
                identity.token = token;
                info!("Service {} was registered", identity.name);
            }
            Err(e) => self.sink.report(e),
        }
    }

    async fn try_register(&self) -> Result<String> {
        let identity = self.identity();
        let url = registry_endpoint(&identity.registrator_url, "set")?;
        let body = RegisterRequest {
            callback: format!(
                "{}{}",
                identity.callback_base_url.trim_end_matches('/'),
                CALLBACK_PATH
            ),
            name: identity.name,
            port: identity.port,
        };
        let request = HttpRequest::new(Method::POST, url).json(&body)?;

        let request = &request;
        let requestor = &self.requestor;
        retry(self.retry, "register", || async move {
            let bytes = requestor.send(request.clone(), StatusCode::CREATED).await?;
            let response: RegisterResponse = serde_json::from_slice(&bytes)?;
            if response.hash.is_empty() {
                return Err(Error::InvalidInput("empty hash in response".to_string()));
            }
            Ok::<_, Error>(response.hash)
        })
        .await
    }

    /// Ask the registry to drop this service; the outcome is only logged
    pub async fn unregister(&self) {
        match self.try_unregister().await {
            Ok(()) => info!("Service {} was unregistered", self.identity().name),
            Err(e) => self.sink.report(e),
        }
    }

    async fn try_unregister(&self) -> Result<()> {
        let identity = self.identity();
        let mut url = registry_endpoint(&identity.registrator_url, "delete")?;
        url.query_pairs_mut().append_pair("name", &identity.name);
        let request = HttpRequest::new(Method::DELETE, url);

        retry(self.retry, "unregister", || {
            self.requestor.send(request.clone(), StatusCode::NO_CONTENT)
        })
        .await
        .map(|_| ())
    }

    /// Unregister, stop the control loop and wait for it, then stop listening.
    ///
    /// Tearing down the callback listener here goes beyond the bare
    /// unregister-then-stop sequence: the listener task is aborted only after
    /// the control loop has exited, so callbacks arriving while the unregister
    /// request is in flight are still answered.
    pub async fn shutdown(mut self) {
        if let Some(running) = self.running.take() {
            self.unregister().await;
            running.control.stop().await;
            running.callback.abort();
        } else {
            warn!("Client shutdown requested before start");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requestor::tests::ScriptedTransport;
    use axum::body::Body;
    use axum::http::Request;
    use std::time::Duration;
    use tower::util::ServiceExt;

    fn config() -> ClientConfig {
        ClientConfig::new("http://registry:8079/", "http://cb", "svc-a", 9000)
            .unwrap()
            .with_retry(RetryPolicy::new(5, Duration::from_millis(1)))
    }

    fn agent(transport: &Arc<ScriptedTransport>) -> ClientAgent {
        ClientAgent::with_transport(config(), transport.clone()).unwrap()
    }

    async fn call(agent: &ClientAgent, method: Method, uri: &str) -> StatusCode {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        callback_router(Arc::clone(&agent.identity))
            .oneshot(request)
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_register_stores_token() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.push_status(StatusCode::CREATED, r#"{"hash":"tok-1"}"#);
        let agent = agent(&transport);

        agent.register().await;
        assert_eq!(agent.token().as_deref(), Some("tok-1"));

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent[0].method, Method::POST);
        assert_eq!(sent[0].url.as_str(), "http://registry:8079/set");
        let body: RegisterRequest =
            serde_json::from_slice(sent[0].body.as_deref().unwrap()).unwrap();
        assert_eq!(
            body,
            RegisterRequest {
                callback: "http://cb/callback".to_string(),
                name: "svc-a".to_string(),
                port: 9000,
            }
        );
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.push_status(StatusCode::CREATED, r#"{"hash":"tok-1"}"#);
        let agent = agent(&transport);

        agent.register().await;
        agent.register().await;
        assert_eq!(transport.sent_count(), 1);
        assert_eq!(agent.token().as_deref(), Some("tok-1"));
    }

    #[tokio::test]
    async fn test_register_retries_bad_responses() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.push_error("connection refused");
        transport.push_status(StatusCode::CREATED, "not json");
        transport.push_status(StatusCode::CREATED, r#"{"hash":"tok-2"}"#);
        let agent = agent(&transport);

        agent.register().await;
        assert_eq!(transport.sent_count(), 3);
        assert_eq!(agent.token().as_deref(), Some("tok-2"));
    }

    #[tokio::test]
    async fn test_register_exhaustion_leaves_token_empty() {
        let transport = Arc::new(ScriptedTransport::default());
        let agent = agent(&transport);

        agent.register().await;
        assert_eq!(transport.sent_count(), 5);
        assert!(agent.token().is_none());
        assert!(!agent.identity().is_registered());
    }

    #[tokio::test]
    async fn test_unregister_request() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.push_status(StatusCode::NO_CONTENT, "");
        let agent = agent(&transport);

        agent.unregister().await;

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].method, Method::DELETE);
        assert_eq!(sent[0].url.as_str(), "http://registry:8079/delete?name=svc-a");
        assert!(sent[0].body.is_none());
    }

    #[tokio::test]
    async fn test_callback_handler() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.push_status(StatusCode::CREATED, r#"{"hash":"tok-1"}"#);
        let agent = agent(&transport);

        // Nothing matches before registration
        assert_eq!(call(&agent, Method::GET, "/callback?hash=tok-1").await, StatusCode::NOT_FOUND);

        agent.register().await;
        assert_eq!(call(&agent, Method::GET, "/callback?hash=tok-1").await, StatusCode::OK);
        assert_eq!(call(&agent, Method::GET, "/callback?hash=wrong").await, StatusCode::NOT_FOUND);
        assert_eq!(call(&agent, Method::GET, "/callback").await, StatusCode::BAD_REQUEST);
        assert_eq!(
            call(&agent, Method::POST, "/callback?hash=tok-1").await,
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(
            call(&agent, Method::DELETE, "/callback").await,
            StatusCode::METHOD_NOT_ALLOWED
        );
    }

    #[test]
    fn test_check_token() {
        let agent = ClientAgent::new(config()).unwrap();
        assert!(agent.check_token("").is_err());
        agent.identity.write().unwrap().token = "tok".to_string();
        assert!(agent.check_token("tok").is_ok());
        assert!(matches!(agent.check_token("other"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = config();
        config.name.clear();
        assert!(matches!(ClientAgent::new(config), Err(Error::Config(_))));
    }
}
