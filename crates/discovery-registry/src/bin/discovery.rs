//! Run a registry server or a registering client until Ctrl-C

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use discovery_registry::{ClientAgent, ClientConfig, RegistryServer, ServerConfig};
use std::path::PathBuf;
use tracing::{Level, info};

#[derive(Parser)]
#[command(name = "discovery")]
#[command(about = "Minimal service-discovery registry")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the registry server
    Server {
        /// Port for the HTTP API
        #[arg(short, long, default_value_t = 8079)]
        port: u16,

        /// Load settings from a YAML or JSON file instead
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Register a service and answer liveness probes
    Client {
        /// Registry base URL
        #[arg(long, required_unless_present = "config")]
        address: Option<String>,

        /// Base URL this client's callback listener is reachable under
        #[arg(long, required_unless_present = "config")]
        callback: Option<String>,

        /// Callback listener port
        #[arg(short, long, required_unless_present = "config")]
        port: Option<u16>,

        /// Service name (random if omitted)
        #[arg(short, long)]
        name: Option<String>,

        /// Load settings from a YAML or JSON file instead
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Server { port, config } => {
            let config = match config {
                Some(path) => ServerConfig::from_file(&path)
                    .await
                    .with_context(|| format!("Failed to load {:?}", path))?,
                None => ServerConfig::new(port)?,
            };
            run_server(config).await
        }
        Commands::Client {
            address,
            callback,
            port,
            name,
            config,
        } => {
            let config = match config {
                Some(path) => ClientConfig::from_file(&path)
                    .await
                    .with_context(|| format!("Failed to load {:?}", path))?,
                None => {
                    let address = address.context("--address is required")?;
                    let callback = callback.context("--callback is required")?;
                    let port = port.context("--port is required")?;
                    match name {
                        Some(name) => ClientConfig::new(address, callback, name, port)?,
                        None => ClientConfig::with_generated_name(address, callback, port)?,
                    }
                }
            };
            run_client(config).await
        }
    }
}

async fn run_server(config: ServerConfig) -> Result<()> {
    let mut server = RegistryServer::bind(config)
        .await
        .context("Failed to bind registry server")?;
    server.start()?;

    tokio::signal::ctrl_c().await?;
    info!("Interrupted, stopping server");
    server.stop().await;
    Ok(())
}

async fn run_client(config: ClientConfig) -> Result<()> {
    let mut client = ClientAgent::new(config)?;
    client
        .start()
        .await
        .context("Failed to start callback listener")?;

    tokio::signal::ctrl_c().await?;
    info!("Interrupted, stopping client");
    client.shutdown().await;
    Ok(())
}
