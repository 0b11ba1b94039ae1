use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// CLI arguments for the relay server.
#[derive(Parser, Debug, Clone)]
#[command(name = "cxps")]
#[command(about = "Campus Exchange Protocol relay server")]
#[command(version)]
pub struct Args {
    /// Socket address for the control channel (WebSocket over TCP).
    #[arg(long, default_value = "0.0.0.0:8080", env = "CXPS_LISTEN")]
    pub listen: SocketAddr,
    /// UDP socket address for incoming heartbeats.
    #[arg(long, default_value = "0.0.0.0:8081", env = "CXPS_LIVENESS")]
    pub liveness: SocketAddr,
    /// Socket address for the operator HTTP endpoint (metrics, broadcast).
    #[arg(long, default_value = "127.0.0.1:9090", env = "CXPS_ADMIN")]
    pub admin_addr: SocketAddr,
    /// TOML file with a `[campuses]` table; the built-in campuses are used otherwise.
    #[arg(long, env = "CXPS_CREDENTIALS")]
    pub credentials: Option<PathBuf>,
    /// Maximum control message size in bytes.
    #[arg(long, default_value = "4096", env = "CXPS_MAX_MESSAGE")]
    pub max_message: usize,
    /// Per-session delivery queue depth.
    #[arg(long, default_value = "256", env = "CXPS_QUEUE_DEPTH")]
    pub queue_depth: usize,
    /// Seconds to wait for open connections on shutdown.
    #[arg(long, default_value = "30", env = "CXPS_DRAIN_TIMEOUT")]
    pub drain_timeout: u64,
    /// Increase log verbosity (repeat for more detail).
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Runtime configuration derived from [`Args`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the control channel.
    pub listen: SocketAddr,
    /// UDP socket address for incoming heartbeats.
    pub liveness: SocketAddr,
    /// Socket address for the operator HTTP endpoint.
    pub admin_addr: SocketAddr,
    /// Maximum control message size in bytes.
    pub max_message: usize,
    /// Per-session delivery queue depth.
    pub queue_depth: usize,
    /// Seconds to wait for open connections on shutdown.
    pub drain_timeout: u64,
}

impl ServerConfig {
    /// Validates the configuration values are within acceptable bounds.
    /// Returns Ok(()) if valid, Err with description otherwise.
    pub fn validate(&self) -> Result<(), String> {
        const MAX_ALLOWED_MESSAGE: usize = 65_536;
        if self.max_message == 0 {
            return Err("max_message must be greater than 0".to_string());
        }
        if self.max_message > MAX_ALLOWED_MESSAGE {
            return Err(format!(
                "max_message exceeds maximum allowed ({MAX_ALLOWED_MESSAGE} bytes)"
            ));
        }

        if self.queue_depth == 0 {
            return Err("queue_depth must be greater than 0".to_string());
        }
        if self.queue_depth > 65_536 {
            return Err("queue_depth exceeds reasonable limit (65536)".to_string());
        }

        if self.drain_timeout == 0 {
            return Err("drain_timeout must be greater than 0".to_string());
        }
        if self.drain_timeout > 3600 {
            return Err("drain_timeout exceeds reasonable limit (3600 seconds)".to_string());
        }

        if self.listen == self.admin_addr {
            return Err("listen and admin_addr must differ".to_string());
        }
        Ok(())
    }

    /// Drain timeout as a [`Duration`].
    #[must_use]
    pub const fn drain_duration(&self) -> Duration {
        Duration::from_secs(self.drain_timeout)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], cxp_common::types::DEFAULT_CONTROL_PORT)),
            liveness: SocketAddr::from(([0, 0, 0, 0], cxp_common::types::DEFAULT_LIVENESS_PORT)),
            admin_addr: SocketAddr::from(([127, 0, 0, 1], 9090)),
            max_message: cxp_common::types::MAX_MESSAGE_SIZE,
            queue_depth: 256,
            drain_timeout: 30,
        }
    }
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        Self {
            listen: args.listen,
            liveness: args.liveness,
            admin_addr: args.admin_addr,
            max_message: args.max_message,
            queue_depth: args.queue_depth,
            drain_timeout: args.drain_timeout,
        }
    }
}
