//! Data models for the discovery registry

use serde::{Deserialize, Serialize};

/// A registered service as held by the registry server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    /// Unique service name
    pub name: String,

    /// Opaque token issued at registration
    #[serde(rename = "hash")]
    pub token: String,

    /// URL the registry probes for liveness
    #[serde(rename = "callback")]
    pub callback_url: String,
}

/// Body of a registration request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    /// Full callback URL, including the callback path
    pub callback: String,
    /// Service name
    pub name: String,
    /// Callback listener port
    pub port: u16,
}

/// Body of a successful registration response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterResponse {
    /// Token issued for the service
    pub hash: String,
}

/// Client-side view of its own registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    /// Service name
    pub name: String,
    /// Callback listener port
    pub port: u16,
    /// Base URL the callback listener is reachable under
    pub callback_base_url: String,
    /// Base URL of the registry server
    pub registrator_url: String,
    /// Token issued by the registry, empty until registration succeeds
    pub token: String,
}

impl ClientIdentity {
    /// Whether a token has been issued
    pub fn is_registered(&self) -> bool {
        !self.token.is_empty()
    }
}
