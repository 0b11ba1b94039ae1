//! CXP text frame serialization and parsing.
//!
//! Every frame is a single UTF-8 string. The leading literal token
//! identifies the frame; fields are split positionally on fixed
//! delimiters with no escaping, so a delimiter embedded in a field
//! corrupts the frame. Parsing never fails: input that does not match
//! any known shape becomes [`Frame::Malformed`].

use crate::types::token;

/// Fields of a routed application message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMessage {
    /// Destination campus.
    pub target: String,
    /// Destination department tag. Opaque to the relay.
    pub dept: String,
    /// Source campus as written by the sender.
    pub from: String,
    /// Message body, everything after `|MSG:`.
    pub body: String,
}

impl RouteMessage {
    /// Returns the body with any echoed acknowledgement suffix removed.
    ///
    /// A receiver can see an `ACK:` notice glued to the end of a delivered
    /// body; everything from the first `ACK:` onwards is dropped.
    ///
    /// # Examples
    ///
    /// ```
    /// use cxp_common::frame::Frame;
    /// let Frame::Route(msg) = Frame::parse("TARGET:B|DEPT:IT|FROM:A|MSG:hiACK:Message delivered to B") else {
    ///     unreachable!()
    /// };
    /// assert_eq!(msg.body_without_echoed_ack(), "hi");
    /// ```
    #[must_use]
    pub fn body_without_echoed_ack(&self) -> &str {
        match self.body.find(token::ACK) {
            Some(pos) => &self.body[..pos],
            None => &self.body,
        }
    }
}

/// A parsed CXP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Campus → relay: `Campus:<name>,Pass:<secret>`.
    AuthRequest {
        /// Campus name.
        campus: String,
        /// Shared secret.
        secret: String,
    },
    /// Relay → campus: authentication accepted.
    AuthSuccess,
    /// Relay → campus: authentication rejected.
    AuthFailed,
    /// Relay → campus: the campus already holds an active session.
    AlreadyConnected,
    /// Campus → relay → campus: routed application message.
    Route(RouteMessage),
    /// Relay → campus: delivery acknowledgement.
    Ack(String),
    /// Relay → campus: delivery failure notice.
    Error(String),
    /// Campus → relay over the liveness channel.
    Heartbeat {
        /// Campus name.
        campus: String,
        /// UDP port the campus listens on for broadcasts.
        port: u16,
    },
    /// Relay → campus over the liveness channel: operator announcement.
    Broadcast(String),
    /// Anything that does not match a known frame shape.
    Malformed,
}

impl Frame {
    /// Creates an `AuthRequest` frame.
    #[must_use]
    pub fn auth(campus: &str, secret: &str) -> Self {
        Self::AuthRequest {
            campus: campus.to_string(),
            secret: secret.to_string(),
        }
    }

    /// Creates a `Route` frame.
    #[must_use]
    pub fn route(target: &str, dept: &str, from: &str, body: &str) -> Self {
        Self::Route(RouteMessage {
            target: target.to_string(),
            dept: dept.to_string(),
            from: from.to_string(),
            body: body.to_string(),
        })
    }

    /// Creates a `Heartbeat` frame.
    #[must_use]
    pub fn heartbeat(campus: &str, port: u16) -> Self {
        Self::Heartbeat {
            campus: campus.to_string(),
            port,
        }
    }

    /// Creates a `Broadcast` frame.
    #[must_use]
    pub fn broadcast(text: &str) -> Self {
        Self::Broadcast(text.to_string())
    }

    /// Acknowledgement sent to a sender after a successful hand-off.
    #[must_use]
    pub fn delivered(target: &str) -> Self {
        Self::Ack(format!("Message delivered to {target}"))
    }

    /// Failure notice sent to a sender when the target is unavailable.
    #[must_use]
    pub fn undeliverable(target: &str) -> Self {
        Self::Error(format!("Unable to deliver message to {target}"))
    }

    /// Serializes this frame into its wire text.
    ///
    /// `Malformed` has no wire form and serializes to an empty string.
    ///
    /// # Examples
    ///
    /// ```
    /// use cxp_common::frame::Frame;
    /// let text = Frame::route("Lahore", "IT", "Karachi", "hello").serialize();
    /// assert_eq!(text, "TARGET:Lahore|DEPT:IT|FROM:Karachi|MSG:hello");
    /// ```
    #[must_use]
    pub fn serialize(&self) -> String {
        match self {
            Self::AuthRequest { campus, secret } => {
                format!("{}{campus}{}{secret}", token::CAMPUS, token::PASS)
            }
            Self::AuthSuccess => token::AUTH_SUCCESS.to_string(),
            Self::AuthFailed => token::AUTH_FAILED.to_string(),
            Self::AlreadyConnected => token::ALREADY_CONNECTED.to_string(),
            Self::Route(m) => format!(
                "{}{}{}{}{}{}{}{}",
                token::TARGET,
                m.target,
                token::DEPT,
                m.dept,
                token::FROM,
                m.from,
                token::MSG,
                m.body
            ),
            Self::Ack(text) => format!("{}{text}", token::ACK),
            Self::Error(text) => format!("{}{text}", token::ERROR),
            Self::Heartbeat { campus, port } => format!("{}{campus}:{port}", token::HEARTBEAT),
            Self::Broadcast(text) => format!("{}{text}", token::BROADCAST),
            Self::Malformed => String::new(),
        }
    }

    /// Parses wire text into a typed `Frame`.
    ///
    /// # Examples
    ///
    /// ```
    /// use cxp_common::frame::Frame;
    /// assert_eq!(Frame::parse("AUTH_SUCCESS"), Frame::AuthSuccess);
    /// assert_eq!(Frame::parse("TARGET:B|MSG:x"), Frame::Malformed);
    /// ```
    #[must_use]
    pub fn parse(text: &str) -> Self {
        match text {
            token::AUTH_SUCCESS => return Self::AuthSuccess,
            token::AUTH_FAILED => return Self::AuthFailed,
            token::ALREADY_CONNECTED => return Self::AlreadyConnected,
            _ => {}
        }

        if let Some(rest) = text.strip_prefix(token::CAMPUS) {
            return parse_auth(rest).unwrap_or(Self::Malformed);
        }
        if let Some(rest) = text.strip_prefix(token::TARGET) {
            return parse_route(rest).map_or(Self::Malformed, Self::Route);
        }
        if let Some(rest) = text.strip_prefix(token::HEARTBEAT) {
            return parse_heartbeat(rest).unwrap_or(Self::Malformed);
        }
        if let Some(rest) = text.strip_prefix(token::ACK) {
            return Self::Ack(rest.to_string());
        }
        if let Some(rest) = text.strip_prefix(token::ERROR) {
            return Self::Error(rest.to_string());
        }
        if let Some(rest) = text.strip_prefix(token::BROADCAST) {
            return Self::Broadcast(rest.to_string());
        }
        Self::Malformed
    }

    /// Short lowercase name of the frame kind, for logs and metric labels.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::AuthRequest { .. } => "auth_request",
            Self::AuthSuccess => "auth_success",
            Self::AuthFailed => "auth_failed",
            Self::AlreadyConnected => "already_connected",
            Self::Route(_) => "route",
            Self::Ack(_) => "ack",
            Self::Error(_) => "error",
            Self::Heartbeat { .. } => "heartbeat",
            Self::Broadcast(_) => "broadcast",
            Self::Malformed => "malformed",
        }
    }
}

fn parse_auth(rest: &str) -> Option<Frame> {
    let (campus, secret) = rest.split_once(token::PASS)?;
    Some(Frame::AuthRequest {
        campus: campus.to_string(),
        secret: secret.to_string(),
    })
}

// Tokens must appear in this order; each split continues after the previous one.
fn parse_route(rest: &str) -> Option<RouteMessage> {
    let (target, rest) = rest.split_once(token::DEPT)?;
    let (dept, rest) = rest.split_once(token::FROM)?;
    let (from, body) = rest.split_once(token::MSG)?;
    Some(RouteMessage {
        target: target.to_string(),
        dept: dept.to_string(),
        from: from.to_string(),
        body: body.to_string(),
    })
}

fn parse_heartbeat(rest: &str) -> Option<Frame> {
    let (campus, port) = rest.split_once(':')?;
    let port = port.trim().parse::<u16>().ok()?;
    Some(Frame::Heartbeat {
        campus: campus.to_string(),
        port,
    })
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn field() -> impl Strategy<Value = String> {
        "[A-Za-z0-9 _.-]{0,24}"
    }

    proptest! {
        #[test]
        fn parse_never_panics(text in ".{0,256}") {
            let _ = Frame::parse(&text);
        }

        #[test]
        fn route_fields_survive_serialization(
            target in field(),
            dept in field(),
            from in field(),
            body in ".{0,128}"
        ) {
            let frame = Frame::route(&target, &dept, &from, &body);
            prop_assert_eq!(Frame::parse(&frame.serialize()), frame);
        }

        #[test]
        fn heartbeat_port_survives_serialization(campus in "[A-Za-z]{1,16}", port in any::<u16>()) {
            let frame = Frame::heartbeat(&campus, port);
            prop_assert_eq!(Frame::parse(&frame.serialize()), frame);
        }
    }
}
