//! fleetterm agent
//!
//! Runs on a remote machine and serves execute and file transfer
//! requests from the control plane.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ft_agent::{AgentServer, AgentState, ShellEngine};
use ft_core::config::{self, AgentConfig};

#[derive(Parser)]
#[command(name = "ft-agent")]
#[command(about = "fleetterm remote agent")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address (overrides config)
    #[arg(short, long)]
    bind: Option<String>,

    /// Shared secret callers must present (overrides config)
    #[arg(long, env = "FT_AGENT_SECRET", hide_env_values = true)]
    secret: Option<String>,

    /// Run in foreground with verbose output
    #[arg(short, long)]
    foreground: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.foreground { "debug" } else { &args.log_level };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("fleetterm agent starting...");

    let config: AgentConfig = match &args.config {
        Some(path) => config::load_config(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => config::load_or_default(&config::default_agent_config_path())
            .context("Failed to load agent config")?,
    };

    let bind_addr = args.bind.unwrap_or_else(|| config.bind_address.clone());
    let secret = args
        .secret
        .or_else(|| config.secret.clone())
        .context("No agent secret configured (use --secret or FT_AGENT_SECRET)")?;

    let shell = ShellEngine::start(config.shell.clone())
        .await
        .context("Failed to start persistent shell")?;
    let shell = Arc::new(shell);
    let state = Arc::new(AgentState::new(config, secret, Arc::clone(&shell)));

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, initiating shutdown...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, initiating shutdown...");
            }
        }

        cancel_clone.cancel();
    });

    let server = AgentServer::bind(&bind_addr, state, cancel).await?;
    server.run().await?;

    shell.shutdown().await;
    tracing::info!("Agent shutdown complete");
    Ok(())
}
