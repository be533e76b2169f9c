//! Error types for the discovery registry

use thiserror::Error;

/// Discovery registry error type
#[derive(Error, Debug)]
pub enum Error {
    /// Network or connection failure while talking to a peer
    #[error("Transport error: {0}")]
    Transport(String),

    /// Peer answered with a status other than the one the call expects
    #[error("Bad status code: expected {expected}, got {actual}")]
    BadStatus {
        /// Status the call treats as success
        expected: u16,
        /// Status the peer actually returned
        actual: u16,
    },

    /// Service not found
    #[error("Service not found: {0}")]
    NotFound(String),

    /// Service already exists
    #[error("Service already exists: {0}")]
    AlreadyExists(String),

    /// Malformed or missing input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP method does not match the endpoint
    #[error("method not allowed")]
    MethodNotAllowed,

    /// A retried operation never succeeded
    #[error("{operation} failed after {attempts} attempts")]
    RetriesExhausted {
        /// Logical operation name (register, unregister, probe)
        operation: String,
        /// Number of attempts made
        attempts: u32,
    },

    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization error
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
