//! Configuration structures for registry servers and clients

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default interval between liveness sweeps
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Default cap on probes in flight during one sweep
pub const DEFAULT_MAX_CONCURRENT_PROBES: usize = 32;

/// Retry policy shared by register, unregister and probe calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    /// Fixed delay between attempts
    #[serde(
        rename = "delay_secs",
        with = "duration_secs",
        default = "default_delay"
    )]
    pub delay: Duration,
}

fn default_attempts() -> u32 {
    5
}

fn default_delay() -> Duration {
    Duration::from_secs(1)
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            delay: default_delay(),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the given attempt count and delay
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    fn validate(&self) -> Result<()> {
        if self.attempts == 0 {
            return Err(Error::Config("retry attempts must be positive".to_string()));
        }
        Ok(())
    }
}

/// Registry server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// TCP port the HTTP API listens on
    pub port: u16,
    /// Interval between liveness sweeps
    #[serde(
        rename = "sweep_interval_secs",
        with = "duration_secs",
        default = "default_sweep_interval"
    )]
    pub sweep_interval: Duration,
    /// Maximum number of probes in flight per sweep
    #[serde(default = "default_max_concurrent_probes")]
    pub max_concurrent_probes: usize,
    /// Retry policy for liveness probes
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_sweep_interval() -> Duration {
    DEFAULT_SWEEP_INTERVAL
}

fn default_max_concurrent_probes() -> usize {
    DEFAULT_MAX_CONCURRENT_PROBES
}

impl ServerConfig {
    /// Create a validated configuration with default sweep settings
    pub fn new(port: u16) -> Result<Self> {
        let config = Self {
            port,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            max_concurrent_probes: DEFAULT_MAX_CONCURRENT_PROBES,
            retry: RetryPolicy::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check field invariants
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(Error::Config("port invalid".to_string()));
        }
        if self.sweep_interval.is_zero() {
            return Err(Error::Config("sweep interval must be positive".to_string()));
        }
        if self.max_concurrent_probes == 0 {
            return Err(Error::Config(
                "max concurrent probes must be positive".to_string(),
            ));
        }
        self.retry.validate()
    }

    /// Load configuration from a YAML or JSON file
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let config: Self = load(path.as_ref()).await?;
        config.validate()?;
        Ok(config)
    }
}

/// Registering client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the registry server
    pub address: String,
    /// Base URL under which this client's callback listener is reachable
    pub callback: String,
    /// Service name to register under
    pub name: String,
    /// Port of the local callback listener
    pub port: u16,
    /// Retry policy for register and unregister
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl ClientConfig {
    /// Create a validated configuration with an explicit service name
    pub fn new(
        address: impl Into<String>,
        callback: impl Into<String>,
        name: impl Into<String>,
        port: u16,
    ) -> Result<Self> {
        let config = Self {
            address: address.into(),
            callback: callback.into(),
            name: name.into(),
            port,
            retry: RetryPolicy::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Create a validated configuration with a random service name
    pub fn with_generated_name(
        address: impl Into<String>,
        callback: impl Into<String>,
        port: u16,
    ) -> Result<Self> {
        Self::new(address, callback, uuid::Uuid::new_v4().to_string(), port)
    }

    /// Replace the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Check field invariants
    pub fn validate(&self) -> Result<()> {
        if self.callback.is_empty() {
            return Err(Error::Config("callback address invalid".to_string()));
        }
        if self.address.is_empty() {
            return Err(Error::Config("registrator address invalid".to_string()));
        }
        if self.name.is_empty() {
            return Err(Error::Config("name invalid".to_string()));
        }
        if self.port == 0 {
            return Err(Error::Config("port invalid".to_string()));
        }
        self.retry.validate()
    }

    /// Load configuration from a YAML or JSON file
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let config: Self = load(path.as_ref()).await?;
        config.validate()?;
        Ok(config)
    }
}

async fn load<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = tokio::fs::read_to_string(path).await?;

    // Try YAML by extension, JSON otherwise
    match path.extension().and_then(|s| s.to_str()) {
        Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(&contents)?),
        _ => Ok(serde_json::from_str(&contents)?),
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
