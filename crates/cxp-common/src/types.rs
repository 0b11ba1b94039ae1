//! Core type definitions and protocol constants for CXP.

/// A registered campus name, used as the routing key.
pub type CampusName = String;

/// Default TCP port for the control channel.
pub const DEFAULT_CONTROL_PORT: u16 = 8080;

/// Default UDP port the relay listens on for heartbeats.
pub const DEFAULT_LIVENESS_PORT: u16 = 8081;

/// Conventional UDP port a campus listens on for broadcasts.
/// Clients normally bind an ephemeral port and advertise it instead.
pub const DEFAULT_BROADCAST_PORT: u16 = 8082;

/// Maximum size of a single control or liveness message, in bytes.
pub const MAX_MESSAGE_SIZE: usize = 4096;

/// Seconds between heartbeats sent by a campus.
pub const HEARTBEAT_INTERVAL_SECS: u64 = 10;

/// Literal tokens used on the wire.
pub mod token {
    /// Prefix of an authentication request.
    pub const CAMPUS: &str = "Campus:";
    /// Separator between campus name and secret.
    pub const PASS: &str = ",Pass:";
    /// Authentication accepted.
    pub const AUTH_SUCCESS: &str = "AUTH_SUCCESS";
    /// Authentication rejected.
    pub const AUTH_FAILED: &str = "AUTH_FAILED";
    /// Campus already holds an active session.
    pub const ALREADY_CONNECTED: &str = "ALREADY_CONNECTED";
    /// Prefix of a routed message.
    pub const TARGET: &str = "TARGET:";
    /// Department separator in a routed message.
    pub const DEPT: &str = "|DEPT:";
    /// Source separator in a routed message.
    pub const FROM: &str = "|FROM:";
    /// Body separator in a routed message.
    pub const MSG: &str = "|MSG:";
    /// Prefix of a delivery acknowledgement.
    pub const ACK: &str = "ACK:";
    /// Prefix of a delivery failure notice.
    pub const ERROR: &str = "ERROR:";
    /// Prefix of a liveness signal.
    pub const HEARTBEAT: &str = "HEARTBEAT:";
    /// Prefix of an operator announcement.
    pub const BROADCAST: &str = "BROADCAST:";
}
