#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use clap::Parser;
use cxps::admin::{start_admin_server, HealthState};
use cxps::config::{Args, ServerConfig};
use cxps::credentials::CredentialDirectory;
use cxps::liveness::run_liveness_listener;
use cxps::run_with_shutdown;
use cxps::server::ServerState;
use std::sync::Arc;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: u8) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let directive = match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        EnvFilter::new(directive)
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config: ServerConfig = args.clone().into();

    // Validate configuration before starting
    if let Err(e) = config.validate() {
        anyhow::bail!("configuration error: {}", e);
    }

    let credentials = match args.credentials {
        Some(ref path) => CredentialDirectory::load(path)
            .with_context(|| format!("failed to load credentials from {}", path.display()))?,
        None => {
            warn!("no credentials file given, using built-in campus directory");
            CredentialDirectory::default()
        }
    };
    info!(campuses = ?credentials.names(), "credential directory loaded");

    let state = Arc::new(ServerState::new(config.clone(), credentials).await?);

    let listener = TcpListener::bind(config.listen).await?;
    info!("bound to {}", config.listen);
    let liveness_socket = UdpSocket::bind(config.liveness).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let liveness = tokio::spawn(run_liveness_listener(
        liveness_socket,
        Arc::clone(&state.registry),
        shutdown_rx.clone(),
    ));

    let health_state = HealthState::new();

    tokio::spawn({
        let health_state = health_state.clone();
        let state = Arc::clone(&state);
        async move {
            if let Err(e) = start_admin_server(config.admin_addr, state, health_state).await {
                warn!("admin server error: {}", e);
            }
        }
    });

    let mut server = tokio::spawn(run_with_shutdown(listener, state, shutdown_rx));

    tokio::select! {
        result = &mut server => {
            match result {
                Ok(Err(e)) => error!("server error: {}", e),
                Err(e) => error!("server task failed: {}", e),
                Ok(Ok(())) => {}
            }
            return Ok(());
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
        }
    }

    health_state.set_ready(false);
    let _ = shutdown_tx.send(());
    match server.await {
        Ok(Err(e)) => error!("server error: {}", e),
        Err(e) => error!("server task failed: {}", e),
        Ok(Ok(())) => {}
    }
    let _ = liveness.await;

    Ok(())
}
