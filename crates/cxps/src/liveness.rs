use crate::metrics::counters;
use crate::registry::{LivenessUpdate, SessionRegistry};
use chrono::Utc;
use cxp_common::types::MAX_MESSAGE_SIZE;
use cxp_common::Frame;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Apply one liveness datagram to the registry.
///
/// The broadcast return address combines the packet's source host with
/// the port named in the payload, since a campus sends from an ephemeral
/// port that differs from the one it listens on. Returns `None` for
/// anything that is not a heartbeat.
pub fn apply_heartbeat(
    registry: &SessionRegistry,
    data: &[u8],
    src: SocketAddr,
) -> Option<LivenessUpdate> {
    let Ok(text) = std::str::from_utf8(data) else {
        return None;
    };
    let Frame::Heartbeat { campus, port } = Frame::parse(text) else {
        return None;
    };

    let addr = SocketAddr::new(src.ip(), port);
    let outcome = registry.update_liveness(&campus, addr, Utc::now());
    match outcome {
        LivenessUpdate::Applied => debug!(campus = %campus, addr = %addr, "heartbeat"),
        LivenessUpdate::UnknownSession => {
            debug!(campus = %campus, src = %src, "heartbeat for unknown campus dropped");
        }
    }
    Some(outcome)
}

/// Receive heartbeats until `shutdown_rx` fires.
///
/// Nothing is ever sent back to the campus.
pub async fn run_liveness_listener(
    socket: UdpSocket,
    registry: Arc<SessionRegistry>,
    mut shutdown_rx: watch::Receiver<()>,
) {
    match socket.local_addr() {
        Ok(addr) => info!("liveness listener on {}", addr),
        Err(e) => warn!(error = %e, "liveness listener started on unknown address"),
    }
    let mut buf = vec![0u8; MAX_MESSAGE_SIZE];

    loop {
        tokio::select! {
            result = socket.recv_from(&mut buf) => {
                match result {
                    Ok((n, src)) => {
                        let status = match apply_heartbeat(&registry, &buf[..n], src) {
                            Some(LivenessUpdate::Applied) => "applied",
                            Some(LivenessUpdate::UnknownSession) => "unknown",
                            None => {
                                debug!(src = %src, len = n, "ignoring non-heartbeat datagram");
                                "malformed"
                            }
                        };
                        counters::heartbeats_total(status);
                    }
                    Err(e) => {
                        warn!(error = %e, "liveness receive error");
                    }
                }
            }
            _ = shutdown_rx.changed() => {
                info!("liveness listener shutting down");
                break;
            }
        }
    }
}
