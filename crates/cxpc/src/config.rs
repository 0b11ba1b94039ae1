use clap::Parser;
use cxp_common::types::{DEFAULT_CONTROL_PORT, DEFAULT_LIVENESS_PORT, HEARTBEAT_INTERVAL_SECS};
use std::net::SocketAddr;
use std::time::Duration;

/// Command-line interface for the campus client.
#[derive(Parser, Debug, Clone)]
#[command(name = "cxpc", about = "Campus Exchange Protocol client", version)]
pub struct Cli {
    /// Campus name to log in as.
    #[arg(long, env = "CXPC_CAMPUS")]
    pub campus: String,

    /// Campus password.
    #[arg(long, env = "CXPC_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Relay control channel URL.
    #[arg(long, default_value = "ws://127.0.0.1:8080", env = "CXPC_RELAY")]
    pub relay: String,

    /// Relay liveness (heartbeat) UDP address.
    #[arg(long, default_value = "127.0.0.1:8081", env = "CXPC_LIVENESS")]
    pub liveness: SocketAddr,

    /// Local UDP address for heartbeats and announcements; port 0 picks one.
    #[arg(long, default_value = "0.0.0.0:0", env = "CXPC_UDP_BIND")]
    pub udp_bind: SocketAddr,

    /// Seconds between heartbeats.
    #[arg(long, default_value_t = HEARTBEAT_INTERVAL_SECS)]
    pub heartbeat_interval: u64,

    /// Increase log verbosity (repeat for more detail).
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Campus name to log in as.
    pub campus: String,
    /// Campus password.
    pub password: String,
    /// WebSocket URL of the relay control channel.
    pub relay: String,
    /// UDP address heartbeats are sent to.
    pub liveness: SocketAddr,
    /// Local UDP bind address.
    pub udp_bind: SocketAddr,
    /// Interval between heartbeats.
    pub heartbeat_interval: Duration,
}

impl ClientConfig {
    /// Config for `campus` against a relay on localhost with default ports.
    #[must_use]
    pub fn local(campus: &str, password: &str) -> Self {
        Self {
            campus: campus.to_string(),
            password: password.to_string(),
            relay: format!("ws://127.0.0.1:{DEFAULT_CONTROL_PORT}"),
            liveness: SocketAddr::from(([127, 0, 0, 1], DEFAULT_LIVENESS_PORT)),
            udp_bind: SocketAddr::from(([0, 0, 0, 0], 0)),
            heartbeat_interval: Duration::from_secs(HEARTBEAT_INTERVAL_SECS),
        }
    }

    /// Check the configuration before connecting.
    pub fn validate(&self) -> Result<(), String> {
        if self.campus.is_empty() {
            return Err("campus name must not be empty".to_string());
        }
        // These characters delimit fields in auth, route and heartbeat lines.
        if let Some(c) = self.campus.chars().find(|c| matches!(c, ',' | ':' | '|')) {
            return Err(format!("campus name must not contain '{c}'"));
        }
        if !self.relay.starts_with("ws://") {
            return Err(format!(
                "relay URL must start with ws://, got: {}",
                self.relay
            ));
        }
        if self.heartbeat_interval.is_zero() {
            return Err("heartbeat interval must be greater than 0".to_string());
        }
        Ok(())
    }
}

impl From<Cli> for ClientConfig {
    fn from(cli: Cli) -> Self {
        Self {
            campus: cli.campus,
            password: cli.password,
            relay: cli.relay,
            liveness: cli.liveness,
            udp_bind: cli.udp_bind,
            heartbeat_interval: Duration::from_secs(cli.heartbeat_interval),
        }
    }
}
