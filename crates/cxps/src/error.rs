use thiserror::Error;

/// Errors that can occur during relay server operation.
#[derive(Error, Debug)]
pub enum CxpsError {
    /// The first control message was not a well-formed authentication request.
    #[error("malformed authentication request")]
    MalformedAuth,
    /// Unknown campus name or wrong secret.
    #[error("invalid credentials for campus {0:?}")]
    InvalidCredential(String),
    /// The campus already holds an active session.
    #[error("campus {0} already has an active session")]
    DuplicateSession(String),
    /// A relayed message lacked its routing tokens and was dropped.
    #[error("malformed route message")]
    MalformedRoute,
    /// The destination campus is not active or cannot accept deliveries.
    #[error("destination {0} unavailable")]
    DestinationUnavailable(String),
    /// The control channel was closed by the remote peer.
    #[error("connection closed")]
    TransportClosed,
    /// WebSocket transport error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    /// Underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The credentials file could not be parsed.
    #[error("credentials error: {0}")]
    Credentials(#[from] toml::de::Error),
}
