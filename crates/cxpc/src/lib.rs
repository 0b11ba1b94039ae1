//! CXP campus client: authenticated relay connection, heartbeats and
//! announcement listener.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Relay connection and background tasks.
pub mod client;
/// CLI parsing and client configuration.
pub mod config;

pub use client::{CampusClient, ClientError, Event, InboundMsg};
