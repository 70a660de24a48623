//! Advisor CLI
//!
//! Asks one question and renders the structured answer while it streams.
//!
//! # Usage
//!
//! ```bash
//! # Through a running advisor-daemon (default: the configured chat_url)
//! advisor-cli ask "How do I build an emergency fund?"
//! advisor-cli ask --server http://127.0.0.1:8787 "Should I pay off debt first?"
//!
//! # Straight to the configured provider
//! advisor-cli ask --direct "How much should I invest each month?"
//!
//! # Final answer as JSON
//! advisor-cli ask --json "Budget tips for students"
//! ```

mod render;

use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::debug;

use advisor_core::backend::{self, ChatEndpointBackend, LlmBackend};
use advisor_core::{
    default_config_path, load_config_from_path, Advisor, AdvisorConfigFile, ConfigOverrides,
    SessionOutcome,
};

use crate::render::Renderer;

/// Terminal client for streamed financial advice
#[derive(Debug, Parser)]
#[command(name = "advisor-cli", version, about)]
struct Cli {
    /// Configuration file (default: $XDG_CONFIG_HOME/finance-advisor/advisor.toml)
    #[arg(long, global = true, env = "ADVISOR_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Ask a question and watch the answer arrive
    Ask {
        /// The question
        #[arg(required = true, num_args = 1..)]
        prompt: Vec<String>,

        /// Daemon base URL
        #[arg(long, env = "ADVISOR_SERVER", conflicts_with = "direct")]
        server: Option<String>,

        /// Call the configured provider directly instead of a daemon
        #[arg(long)]
        direct: bool,

        /// Model for --direct
        #[arg(long, requires = "direct")]
        model: Option<String>,

        /// Print the final session as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check whether the backend is reachable
    Health {
        /// Daemon base URL
        #[arg(long, env = "ADVISOR_SERVER", conflicts_with = "direct")]
        server: Option<String>,

        /// Check the configured provider instead of a daemon
        #[arg(long)]
        direct: bool,
    },
}

fn connect(
    config: &AdvisorConfigFile,
    server: Option<&str>,
    direct: bool,
) -> anyhow::Result<Arc<dyn LlmBackend>> {
    let client = backend::build_client(config.connect_timeout, config.read_timeout)?;
    if direct {
        Ok(backend::from_config(&config.backend_config(), client)?)
    } else {
        let url = server.unwrap_or(config.chat_url.as_str());
        Ok(Arc::new(ChatEndpointBackend::new(url, client)))
    }
}

/// Exit codes
const EXIT_DEGRADED: i32 = 2;
const EXIT_FAILED: i32 = 1;

/// Run one session to completion; returns the process exit code
async fn ask(
    config: &AdvisorConfigFile,
    backend: Arc<dyn LlmBackend>,
    prompt: &str,
    json: bool,
) -> anyhow::Result<i32> {
    let mut advisor =
        Advisor::with_stream_config(backend, config.advisor_config(), config.stream_config());
    debug!(backend = advisor.backend_name(), "Submitting prompt");

    let session_id = match advisor.submit(prompt).await {
        Ok(id) => id,
        Err(e) => {
            eprintln!("✗ failed: {e}");
            return Ok(EXIT_FAILED);
        }
    };
    let mut snapshots = advisor
        .subscribe(&session_id)
        .context("session ended before it could be observed")?;

    let stdout = io::stdout();
    let interactive = !json && stdout.is_terminal();
    let (cols, rows) = crossterm::terminal::size().unwrap_or((80, 24));
    let mut renderer = Renderer::new(
        stdout.lock(),
        usize::from(cols).saturating_sub(1),
        usize::from(rows),
        interactive,
    );

    while advisor.is_active(&session_id) {
        advisor.next_events(&session_id).await;
        if snapshots.has_changed().unwrap_or(false) {
            let view = snapshots.borrow_and_update().clone();
            renderer.draw(&view)?;
        }
    }

    let last = snapshots.borrow().clone();
    if json {
        drop(renderer);
        println!("{}", serde_json::to_string_pretty(&last)?);
    } else {
        renderer.finish(&last)?;
    }

    match last.outcome {
        Some(SessionOutcome::Validated { .. }) => Ok(0),
        _ => Ok(EXIT_DEGRADED),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("advisor_cli=warn".parse()?)
                .add_directive("advisor_core=warn".parse()?),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.clone().or_else(default_config_path);
    let mut config = load_config_from_path(config_path.clone())
        .with_context(|| format!("Failed to load configuration from {config_path:?}"))?;

    match cli.command {
        Command::Ask {
            prompt,
            server,
            direct,
            model,
            json,
        } => {
            if let Some(model) = model {
                ConfigOverrides::new().with_model(model).apply(&mut config);
            }
            let backend = connect(&config, server.as_deref(), direct)?;
            let code = ask(&config, backend, &prompt.join(" "), json).await?;
            if code != 0 {
                std::process::exit(code);
            }
        }
        Command::Health { server, direct } => {
            let backend = connect(&config, server.as_deref(), direct)?;
            if backend.health_check().await {
                println!("{}: ok", backend.name());
            } else {
                println!("{}: unreachable", backend.name());
                std::process::exit(EXIT_FAILED);
            }
        }
    }

    Ok(())
}
