use crate::broadcast::BroadcastDispatcher;
use crate::config::ServerConfig;
use crate::connection::handle_connection;
use crate::credentials::CredentialDirectory;
use crate::error::CxpsError;
use crate::registry::SessionRegistry;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Shared state for the relay server.
pub struct ServerState {
    /// Runtime server configuration.
    pub config: ServerConfig,
    /// Campus names and their shared secrets.
    pub credentials: CredentialDirectory,
    /// Campus name to session mapping.
    pub registry: Arc<SessionRegistry>,
    /// Outbound UDP announcements.
    pub broadcaster: BroadcastDispatcher,
}

impl ServerState {
    /// Build server state with an empty registry and a broadcast socket on
    /// an ephemeral port of the same address family as the liveness socket.
    ///
    /// # Errors
    ///
    /// Returns an error if the broadcast socket cannot be bound.
    pub async fn new(
        config: ServerConfig,
        credentials: CredentialDirectory,
    ) -> Result<Self, CxpsError> {
        let registry = Arc::new(SessionRegistry::new());
        let bind_addr: SocketAddr = if config.liveness.is_ipv6() {
            SocketAddr::from(([0u16; 8], 0))
        } else {
            SocketAddr::from(([0, 0, 0, 0], 0))
        };
        let broadcaster = BroadcastDispatcher::bind(bind_addr, Arc::clone(&registry)).await?;
        Ok(Self {
            config,
            credentials,
            registry,
            broadcaster,
        })
    }
}

/// # Errors
///
/// Returns an error if the accept loop encounters an I/O failure.
pub async fn run(listener: TcpListener, state: Arc<ServerState>) -> Result<(), CxpsError> {
    let (_shutdown_tx, shutdown_rx) = watch::channel(());
    run_with_shutdown(listener, state, shutdown_rx).await
}

/// Run the server accept loop with an externally-controlled shutdown signal.
///
/// When the sender behind `shutdown_rx` fires or is dropped, the accept loop
/// stops taking new connections and waits up to the configured drain timeout
/// for in-flight connections before aborting them.
///
/// # Errors
///
/// Returns an error if the listener's local address cannot be read.
pub async fn run_with_shutdown(
    listener: TcpListener,
    state: Arc<ServerState>,
    mut shutdown_rx: watch::Receiver<()>,
) -> Result<(), CxpsError> {
    let local_addr = listener.local_addr().map_err(CxpsError::Io)?;
    info!("server listening on {}", local_addr);
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        let state = Arc::clone(&state);
                        connections.spawn(async move {
                            match handle_connection(stream, addr, state).await {
                                Ok(()) => debug!("connection from {} closed", addr),
                                Err(e) => debug!("connection from {} closed: {}", addr, e),
                            }
                        });
                    }
                    Err(e) => {
                        error!("failed to accept connection: {}", e);
                    }
                }
            }
            Some(joined) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = joined {
                    error!("connection task failed: {}", e);
                }
            }
            _ = shutdown_rx.changed() => {
                info!("shutdown signal received, draining {} connections", connections.len());
                break;
            }
        }
    }

    drop(listener);
    let drain = async { while connections.join_next().await.is_some() {} };
    if tokio::time::timeout(state.config.drain_duration(), drain)
        .await
        .is_err()
    {
        warn!(
            "drain timeout reached with {} connections still active",
            connections.len()
        );
        connections.shutdown().await;
    }

    info!("server shut down gracefully");
    Ok(())
}
