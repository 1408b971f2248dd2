//! jobswipe notification daemon
//!
//! Accepts WebSocket connections from job seekers and company accounts,
//! authenticates them and pushes notifications to every live session.
//!
//! # Usage
//!
//! ```bash
//! # Serve (foreground)
//! jobswiped serve --config /etc/jobswipe/notify.toml
//!
//! # Override the listen address
//! jobswiped serve --bind 0.0.0.0:8000
//!
//! # Mint an access token for local testing
//! jobswiped token --subject 6f1c... --ttl-secs 3600
//! ```

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use jobswiped::auth::{AuthGate, InMemoryPrincipalStore, JwtAuthOracle};
use jobswiped::config::NotifyConfig;
use jobswiped::registry::spawn_registry;
use jobswiped::server::NotifyServer;

/// jobswipe notification daemon
#[derive(Parser, Debug)]
#[command(name = "jobswiped", version, about)]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long, global = true, env = "JOBSWIPE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the notification server
    Serve {
        /// Listen address (overrides config and JOBSWIPE_BIND)
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Mint an access token signed with the configured secret
    Token {
        /// Principal id to put in the `sub` claim
        #[arg(long)]
        subject: Uuid,

        /// Token lifetime in seconds
        #[arg(long, default_value_t = 3600)]
        ttl_secs: u64,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = NotifyConfig::load(args.config.as_deref()).context("Failed to load config")?;

    match args.command.unwrap_or(Command::Serve { bind: None }) {
        Command::Serve { bind } => {
            if let Some(bind) = bind {
                config.bind = bind;
            }
            run_server(config)
        }
        Command::Token { subject, ttl_secs } => {
            let oracle = JwtAuthOracle::with_token_type(
                config.jwt_secret()?.as_bytes(),
                config.token_type.clone(),
            );
            let token = oracle.issue(&subject.to_string(), Duration::from_secs(ttl_secs))?;
            println!("{token}");
            Ok(())
        }
    }
}

#[tokio::main]
async fn run_server(config: NotifyConfig) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("jobswiped=info".parse()?)
                .add_directive("jobswipe_core=info".parse()?)
                .add_directive("jobswipe_protocol=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "jobswipe notification daemon starting"
    );

    let oracle = JwtAuthOracle::with_token_type(
        config.jwt_secret()?.as_bytes(),
        config.token_type.clone(),
    );

    let store = match &config.principals_file {
        Some(path) => InMemoryPrincipalStore::from_file(path)
            .with_context(|| format!("Failed to load principals from {}", path.display()))?,
        None => {
            warn!("No principals file configured; every handshake will be rejected");
            InMemoryPrincipalStore::new()
        }
    };
    info!(principals = store.len(), "Principal store loaded");

    let gate = AuthGate::new(Arc::new(oracle), Arc::new(store));

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let registry = spawn_registry();
    info!("Connection registry started");

    let server = NotifyServer::bind(&config.bind, registry, gate, cancel_token)
        .await?
        .with_settings(config.connection_settings())
        .with_write_timeout(config.write_timeout())
        .with_internal_token(config.internal_token.clone());

    if config.internal_token.is_none() {
        warn!("No internal token configured; producer routes are disabled");
    }

    info!(addr = %server.local_addr(), "Starting server");

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("jobswipe notification daemon stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
