//! Minimal service-discovery registry over HTTP
//!
//! A registry server keeps an in-memory directory of services keyed by name.
//! Services register through a [`ClientAgent`], receive an opaque token, and
//! answer the server's periodic liveness probes on their own callback
//! endpoint by echoing that token back.
//!
//! # Example
//!
//! ```no_run
//! use discovery_registry::{ClientAgent, ClientConfig, RegistryServer, ServerConfig};
//!
//! # async fn example() -> discovery_registry::Result<()> {
//! let mut server = RegistryServer::bind(ServerConfig::new(8079)?).await?;
//! server.start()?;
//!
//! let config = ClientConfig::new(
//!     "http://127.0.0.1:8079",
//!     "http://127.0.0.1:9000",
//!     "svc-a",
//!     9000,
//! )?;
//! let mut client = ClientAgent::new(config)?;
//! client.start().await?;
//!
//! // ...
//!
//! client.shutdown().await;
//! server.stop().await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod api;
pub mod client;
pub mod config;
pub mod control;
pub mod directory;
pub mod error;
pub mod models;
pub mod requestor;
pub mod server;

pub use client::ClientAgent;
pub use config::{ClientConfig, RetryPolicy, ServerConfig};
pub use directory::Directory;
pub use error::{Error, Result};
pub use models::*;
pub use requestor::{HttpTransport, ReqwestTransport, Requestor};
pub use server::RegistryServer;

/// Re-export key types for convenience
pub mod prelude {
    pub use crate::{
        ClientAgent,
        ClientConfig,
        Error,
        RegistryServer,
        Result,
        ServerConfig,
        ServiceRecord,
    };
}
