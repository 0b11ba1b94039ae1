use crate::metrics::counters;
use crate::registry::SessionRegistry;
use cxp_common::Frame;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::{info, warn};

/// Fans operator announcements out to every live campus over UDP.
#[derive(Debug)]
pub struct BroadcastDispatcher {
    socket: UdpSocket,
    registry: Arc<SessionRegistry>,
}

impl BroadcastDispatcher {
    /// Bind the outbound broadcast socket.
    ///
    /// # Errors
    ///
    /// Returns an error if the UDP socket cannot be bound.
    pub async fn bind(addr: SocketAddr, registry: Arc<SessionRegistry>) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self::new(socket, registry))
    }

    /// Wrap an already-bound socket.
    #[must_use]
    pub fn new(socket: UdpSocket, registry: Arc<SessionRegistry>) -> Self {
        Self { socket, registry }
    }

    /// Send `BROADCAST:<text>` to each active campus with a known liveness
    /// address and return how many sends were attempted.
    ///
    /// Campuses that never sent a heartbeat are skipped. A failed send is
    /// logged and the fan-out continues; nothing is retried.
    pub async fn broadcast(&self, text: &str) -> usize {
        let recipients = self.registry.snapshot_active_with_address();
        let payload = Frame::broadcast(text).serialize();

        for (campus, addr) in &recipients {
            if let Err(e) = self.socket.send_to(payload.as_bytes(), addr).await {
                warn!(campus = %campus, addr = %addr, error = %e, "broadcast send failed");
            }
        }

        counters::broadcast(recipients.len() as u64);
        info!(recipients = recipients.len(), "broadcast sent");
        recipients.len()
    }
}
