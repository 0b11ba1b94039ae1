use crate::config::ClientConfig;
use chrono::{DateTime, Utc};
use cxp_common::types::MAX_MESSAGE_SIZE;
use cxp_common::Frame;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const EVENT_QUEUE_DEPTH: usize = 256;

/// Errors returned while connecting to or talking with the relay.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The relay rejected the campus name or password.
    #[error("authentication failed: invalid credentials")]
    AuthFailed,
    /// Another session for this campus is already active.
    #[error("campus is already connected")]
    AlreadyConnected,
    /// The relay answered the login with something unexpected.
    #[error("unexpected response from relay: {0:?}")]
    UnexpectedResponse(String),
    /// The relay closed the control channel.
    #[error("connection closed by relay")]
    ConnectionClosed,
    /// WebSocket protocol or transport error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    /// I/O error on the UDP socket.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A message routed to this campus by another one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMsg {
    /// Sending campus, as written by the sender.
    pub from: String,
    /// Department tag.
    pub dept: String,
    /// Message body with any echoed acknowledgement removed.
    pub body: String,
    /// Local time the message arrived.
    pub received_at: DateTime<Utc>,
}

/// Something the relay told this campus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Incoming message from another campus.
    Message(InboundMsg),
    /// A sent message was handed to its destination.
    Delivered(String),
    /// A sent message could not be delivered.
    Undeliverable(String),
    /// Operator announcement received over UDP.
    Announcement(String),
    /// The control channel is gone; no further events follow.
    Disconnected,
}

/// Map one control-channel text message to an event.
///
/// Returns `None` for anything a campus does not act on.
#[must_use]
pub fn event_from_control(text: &str) -> Option<Event> {
    match Frame::parse(text) {
        Frame::Route(route) => Some(Event::Message(InboundMsg {
            body: route.body_without_echoed_ack().to_string(),
            from: route.from,
            dept: route.dept,
            received_at: Utc::now(),
        })),
        Frame::Ack(notice) => Some(Event::Delivered(notice)),
        Frame::Error(notice) => Some(Event::Undeliverable(notice)),
        other => {
            debug!(kind = other.kind(), "ignoring control message");
            None
        }
    }
}

/// An authenticated campus session with its background tasks.
pub struct CampusClient {
    campus: String,
    udp_port: u16,
    ws_tx: SplitSink<WsStream, Message>,
    shutdown_tx: watch::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl CampusClient {
    /// Connect, authenticate and start the heartbeat, announcement and
    /// control-reader tasks. Events arrive on the returned receiver.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::AuthFailed`] or [`ClientError::AlreadyConnected`]
    /// when the relay refuses the login, and transport errors otherwise.
    pub async fn connect(
        config: &ClientConfig,
    ) -> Result<(Self, mpsc::Receiver<Event>), ClientError> {
        let (ws, _) = tokio_tungstenite::connect_async(config.relay.as_str()).await?;
        let (mut ws_tx, mut ws_rx) = ws.split();

        let auth = Frame::auth(&config.campus, &config.password);
        ws_tx.send(Message::Text(auth.serialize())).await?;

        let reply = recv_text(&mut ws_rx).await?;
        match Frame::parse(&reply) {
            Frame::AuthSuccess => {}
            Frame::AuthFailed => return Err(ClientError::AuthFailed),
            Frame::AlreadyConnected => return Err(ClientError::AlreadyConnected),
            _ => return Err(ClientError::UnexpectedResponse(reply)),
        }
        info!(campus = %config.campus, relay = %config.relay, "authenticated");

        let udp = Arc::new(UdpSocket::bind(config.udp_bind).await?);
        let udp_port = udp.local_addr()?.port();
        info!(port = udp_port, "listening for announcements");

        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let (shutdown_tx, shutdown_rx) = watch::channel(());

        let tasks = vec![
            tokio::spawn(send_heartbeats(
                Arc::clone(&udp),
                config.liveness,
                Frame::heartbeat(&config.campus, udp_port).serialize(),
                config.heartbeat_interval,
                shutdown_rx.clone(),
            )),
            tokio::spawn(listen_for_announcements(
                udp,
                events_tx.clone(),
                shutdown_rx.clone(),
            )),
            tokio::spawn(read_control(ws_rx, events_tx, shutdown_rx)),
        ];

        Ok((
            Self {
                campus: config.campus.clone(),
                udp_port,
                ws_tx,
                shutdown_tx,
                tasks,
            },
            events_rx,
        ))
    }

    /// Campus name this session is logged in as.
    #[must_use]
    pub fn campus(&self) -> &str {
        &self.campus
    }

    /// UDP port advertised in heartbeats.
    #[must_use]
    pub fn udp_port(&self) -> u16 {
        self.udp_port
    }

    /// Send a message to `dept` at campus `target`.
    ///
    /// The outcome arrives later as [`Event::Delivered`] or
    /// [`Event::Undeliverable`].
    ///
    /// # Errors
    ///
    /// Returns an error if the control channel is closed.
    pub async fn send(&mut self, target: &str, dept: &str, body: &str) -> Result<(), ClientError> {
        let route = Frame::route(target, dept, &self.campus, body);
        self.ws_tx.send(Message::Text(route.serialize())).await?;
        Ok(())
    }

    /// Stop background tasks and close the control channel.
    pub async fn close(mut self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.ws_tx.close().await {
            debug!(error = %e, "error closing control channel");
        }
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

async fn recv_text(ws_rx: &mut SplitStream<WsStream>) -> Result<String, ClientError> {
    loop {
        match ws_rx.next().await {
            Some(Ok(Message::Text(text))) => return Ok(text),
            Some(Ok(Message::Binary(data))) => {
                return Ok(String::from_utf8_lossy(&data).into_owned())
            }
            Some(Ok(Message::Close(_))) | None => return Err(ClientError::ConnectionClosed),
            Some(Err(e)) => return Err(e.into()),
            Some(Ok(_)) => {}
        }
    }
}

async fn send_heartbeats(
    socket: Arc<UdpSocket>,
    liveness: SocketAddr,
    heartbeat: String,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = socket.send_to(heartbeat.as_bytes(), liveness).await {
                    warn!(error = %e, "heartbeat send failed");
                }
            }
            _ = shutdown_rx.changed() => break,
        }
    }
}

async fn listen_for_announcements(
    socket: Arc<UdpSocket>,
    events_tx: mpsc::Sender<Event>,
    mut shutdown_rx: watch::Receiver<()>,
) {
    let mut buf = vec![0u8; MAX_MESSAGE_SIZE];
    loop {
        tokio::select! {
            result = socket.recv_from(&mut buf) => {
                match result {
                    Ok((n, src)) => {
                        let text = String::from_utf8_lossy(&buf[..n]);
                        if let Frame::Broadcast(announcement) = Frame::parse(&text) {
                            if events_tx.send(Event::Announcement(announcement)).await.is_err() {
                                break;
                            }
                        } else {
                            debug!(src = %src, "ignoring datagram");
                        }
                    }
                    Err(e) => warn!(error = %e, "announcement receive error"),
                }
            }
            _ = shutdown_rx.changed() => break,
        }
    }
}

async fn read_control(
    mut ws_rx: SplitStream<WsStream>,
    events_tx: mpsc::Sender<Event>,
    mut shutdown_rx: watch::Receiver<()>,
) {
    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Binary(data))) => String::from_utf8_lossy(&data).into_owned(),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!(error = %e, "control channel error");
                        break;
                    }
                    Some(Ok(_)) => continue,
                };
                if let Some(event) = event_from_control(&text) {
                    if events_tx.send(event).await.is_err() {
                        return;
                    }
                }
            }
            _ = shutdown_rx.changed() => return,
        }
    }
    info!("disconnected from relay");
    let _ = events_tx.send(Event::Disconnected).await;
}
