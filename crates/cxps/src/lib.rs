//! CXP relay server: authenticates campuses, routes their messages, tracks
//! UDP heartbeats and fans out operator announcements.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Operator HTTP endpoint: health, metrics, campus listing, broadcast.
pub mod admin;
/// UDP announcement fan-out.
pub mod broadcast;
/// CLI argument parsing and server configuration.
pub mod config;
mod connection;
/// Campus credential directory.
pub mod credentials;
/// Error types for relay server operations.
pub mod error;
/// UDP heartbeat listener.
pub mod liveness;
/// Prometheus metric helpers.
pub mod metrics;
/// Campus name to session mapping.
pub mod registry;
/// Accept loop and shared server state.
pub mod server;

pub use server::{run, run_with_shutdown, ServerState};
