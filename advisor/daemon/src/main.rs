//! Advisor Daemon
//!
//! HTTP front end for the streaming advice pipeline. Clients `POST /chat`
//! with `{"prompt": "..."}` and read the answer document as it is generated.
//!
//! # Usage
//!
//! ```bash
//! # Defaults: Ollama on localhost:11434, listening on 127.0.0.1:8787
//! advisor-daemon
//!
//! # Custom config file, address and model
//! advisor-daemon --config ./advisor.toml --listen 0.0.0.0:9000 --model llama3.1
//!
//! # With verbose logging
//! RUST_LOG=debug advisor-daemon
//! ```
//!
//! # Environment Variables
//!
//! - `ADVISOR_CONFIG`: configuration file path
//! - `ADVISOR_PROVIDER`, `ADVISOR_MODEL`, `ADVISOR_LISTEN`: see the config docs
//! - `OPENAI_API_KEY`: credential for OpenAI-compatible providers
//! - `OLLAMA_HOST`, `OLLAMA_PORT`: Ollama server location
//! - `RUST_LOG`: log level (trace, debug, info, warn, error)
//!
//! # Signals
//!
//! - SIGTERM/SIGINT: stop accepting connections and finish in-flight answers

mod server;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

use advisor_core::{
    backend, default_config_path, load_config_from_path, ConfigOverrides, ProviderKind,
};

use crate::server::AppState;

/// Streaming financial advice over HTTP
#[derive(Debug, Parser)]
#[command(name = "advisor-daemon", version, about)]
struct Args {
    /// Configuration file (default: $XDG_CONFIG_HOME/finance-advisor/advisor.toml)
    #[arg(long, env = "ADVISOR_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Model name passed to the provider
    #[arg(long)]
    model: Option<String>,

    /// Provider: ollama, openai or chat
    #[arg(long)]
    provider: Option<ProviderKind>,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(provider) = self.provider {
            overrides = overrides.with_provider(provider);
        }
        if let Some(ref model) = self.model {
            overrides = overrides.with_model(model.clone());
        }
        if let Some(listen) = self.listen {
            overrides = overrides.with_listen(listen);
        }
        overrides
    }
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("advisor_daemon=info".parse()?)
                .add_directive("advisor_core=info".parse()?),
        )
        .with_target(true)
        .init();

    let args = Args::parse();

    let config_path = args.config.clone().or_else(default_config_path);
    let mut config = load_config_from_path(config_path.clone())
        .with_context(|| format!("Failed to load configuration from {config_path:?}"))?;
    args.overrides().apply(&mut config);

    info!(
        source = %config.source(),
        provider = ?config.provider,
        model = %config.model,
        "Starting Advisor Daemon"
    );

    let client = backend::build_client(config.connect_timeout, config.read_timeout)?;
    let backend = backend::from_config(&config.backend_config(), client)
        .context("Failed to configure provider backend")?;

    if !backend.health_check().await {
        warn!(backend = backend.name(), "Provider is not reachable yet; serving anyway");
    }

    let listener = TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("Failed to listen on {}", config.listen))?;
    info!(addr = %config.listen, backend = backend.name(), "Listening for requests");

    let state = Arc::new(AppState::new(backend, config.advisor_config()));
    server::serve(listener, state, shutdown_signal()).await?;

    info!("Shutdown complete");
    Ok(())
}
