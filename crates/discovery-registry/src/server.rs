//! Registry server: HTTP API over the directory plus the liveness sweep

use crate::{
    api::{ApiError, require_method, required_param},
    config::{RetryPolicy, ServerConfig},
    control::{ControlHandle, ControlLoop, ErrorSink},
    directory::Directory,
    error::{Error, Result},
    models::{RegisterRequest, RegisterResponse, ServiceRecord},
    requestor::{HttpRequest, Requestor, retry},
};
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{Method, StatusCode, Uri},
    routing::any,
};
use futures::StreamExt;
use reqwest::Url;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Build the registry HTTP API over `directory`
pub fn router(directory: Arc<Directory>) -> Router {
    Router::new()
        .route("/set", any(set_handler))
        .route("/get", any(get_handler))
        .route("/getall", any(get_all_handler))
        .route("/delete", any(delete_handler))
        .with_state(directory)
}

async fn set_handler(
    method: Method,
    State(directory): State<Arc<Directory>>,
    body: Bytes,
) -> std::result::Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    require_method(&method, Method::POST)?;

    let req: RegisterRequest = serde_json::from_slice(&body).map_err(|_| {
        error!("invalid input");
        ApiError::BadRequest("invalid input".to_string())
    })?;

    if req.name.is_empty() || req.callback.is_empty() {
        error!("name and callback are required");
        return Err(ApiError::BadRequest(
            "name and callback are required".to_string(),
        ));
    }

    // Duplicate names surface as 500, not 409
    let hash = directory.insert(&req.name, &req.callback).map_err(|e| {
        error!("failed to set service: {}", e);
        ApiError::Internal(format!("failed to set service: {}", e))
    })?;

    Ok((StatusCode::CREATED, Json(RegisterResponse { hash })))
}

async fn get_handler(
    method: Method,
    uri: Uri,
    State(directory): State<Arc<Directory>>,
) -> std::result::Result<Json<ServiceRecord>, ApiError> {
    require_method(&method, Method::GET)?;
    let name = required_param(&uri, "name")?;

    directory
        .get(&name)
        .map(Json)
        .map_err(|e| ApiError::NotFound(e.to_string()))
}

async fn get_all_handler(
    method: Method,
    State(directory): State<Arc<Directory>>,
) -> std::result::Result<Json<Vec<ServiceRecord>>, ApiError> {
    require_method(&method, Method::GET)?;
    Ok(Json(directory.get_all()))
}

async fn delete_handler(
    method: Method,
    uri: Uri,
    State(directory): State<Arc<Directory>>,
) -> std::result::Result<StatusCode, ApiError> {
    require_method(&method, Method::DELETE)?;
    let name = required_param(&uri, "name")?;

    directory.delete(&name).map_err(|e| {
        error!("failed to delete service: {}", e);
        ApiError::Internal("Failed to delete service".to_string())
    })?;

    Ok(StatusCode::NO_CONTENT)
}

/// Probes every registered service's callback.
///
/// Probe failures are only reported to the error sink; services are never
/// evicted from the directory.
#[derive(Clone)]
struct Sweeper {
    directory: Arc<Directory>,
    requestor: Requestor,
    sink: ErrorSink,
    retry: RetryPolicy,
    max_concurrent: usize,
}

impl Sweeper {
    fn sweep(&self) -> JoinHandle<()> {
        let records = self.directory.get_all();
        let this = self.clone();

        tokio::spawn(async move {
            futures::stream::iter(records)
                .for_each_concurrent(this.max_concurrent, |record| {
                    let this = &this;
                    async move { this.probe(record).await }
                })
                .await;
        })
    }

    async fn probe(&self, record: ServiceRecord) {
        debug!("Checking availability of service {}", record.name);

        let url = match probe_url(&record) {
            Ok(url) => url,
            Err(e) => {
                self.sink.report(e);
                return;
            }
        };
        let request = HttpRequest::new(Method::GET, url);
        let operation = format!("probe {}", record.name);

        if let Err(e) = retry(self.retry, &operation, || {
            self.requestor.send(request.clone(), StatusCode::OK)
        })
        .await
        {
            self.sink.report(e);
        }
    }
}

fn probe_url(record: &ServiceRecord) -> Result<Url> {
    Url::parse_with_params(&record.callback_url, &[("hash", record.token.as_str())]).map_err(|e| {
        Error::InvalidInput(format!(
            "callback {} for {}: {}",
            record.callback_url, record.name, e
        ))
    })
}

struct Running {
    http: JoinHandle<()>,
    control: ControlHandle,
}

/// Registry server instance
pub struct RegistryServer {
    config: ServerConfig,
    directory: Arc<Directory>,
    sweeper: Sweeper,
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    control: Option<ControlLoop>,
    running: Option<Running>,
}

impl RegistryServer {
    /// Validate `config` and bind the API listener on all interfaces
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        config.validate()?;
        let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
        Self::with_listener(config, listener)
    }

    /// Use an already-bound listener; `config.port` is not used for binding
    pub fn with_listener(config: ServerConfig, listener: TcpListener) -> Result<Self> {
        let local_addr = listener.local_addr()?;
        let directory = Arc::new(Directory::new());
        let control = ControlLoop::new("registry-server");
        let sweeper = Sweeper {
            directory: Arc::clone(&directory),
            requestor: Requestor::default(),
            sink: control.sink(),
            retry: config.retry,
            max_concurrent: config.max_concurrent_probes,
        };

        Ok(Self {
            config,
            directory,
            sweeper,
            listener: Some(listener),
            local_addr,
            control: Some(control),
            running: None,
        })
    }

    /// Replace the requestor used for liveness probes
    pub fn with_requestor(mut self, requestor: Requestor) -> Self {
        self.sweeper.requestor = requestor;
        self
    }

    /// Address the API listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The directory owned by this server
    pub fn directory(&self) -> &Arc<Directory> {
        &self.directory
    }

    /// Start serving the API and run the control loop with the periodic sweep
    pub fn start(&mut self) -> Result<()> {
        let (Some(listener), Some(control)) = (self.listener.take(), self.control.take()) else {
            return Err(Error::InvalidInput("server already started".to_string()));
        };

        let app = router(Arc::clone(&self.directory));
        let sink = control.sink();
        let http = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                sink.report(Error::Io(e));
            }
        });
        info!("Server was started at {}", self.local_addr);

        let sweeper = self.sweeper.clone();
        let control = control
            .with_ticker(self.config.sweep_interval, move || {
                // Detached: the next tick does not wait for outstanding probes
                drop(sweeper.sweep());
            })
            .spawn();

        self.running = Some(Running { http, control });
        Ok(())
    }

    /// Run one liveness sweep now, returning the handle of its fan-out task
    pub fn sweep(&self) -> JoinHandle<()> {
        self.sweeper.sweep()
    }

    /// Stop the control loop, waiting for it to exit, then the API listener
    pub async fn stop(mut self) {
        if let Some(running) = self.running.take() {
            running.control.stop().await;
            running.http.abort();
            info!("Server at {} stopped", self.local_addr);
        }
    }
}
