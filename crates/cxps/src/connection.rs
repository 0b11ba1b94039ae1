use crate::error::CxpsError;
use crate::metrics::{counters, gauges, histograms};
use crate::registry::{ControlHandle, Registration, SessionRegistry};
use crate::server::ServerState;
use cxp_common::{Frame, RouteMessage};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

type WsSink<S> = SplitSink<WebSocketStream<S>, Message>;
type WsRecv<S> = SplitStream<WebSocketStream<S>>;

/// Marks the session inactive when the connection task ends, however it ends.
struct SessionGuard {
    registry: Arc<SessionRegistry>,
    campus: String,
    epoch: u64,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.deactivate(&self.campus, self.epoch);
        gauges::dec_sessions_active();
        info!(campus = %self.campus, "campus disconnected");
    }
}

async fn send_frame<T>(ws_tx: &mut T, frame: &Frame) -> Result<(), CxpsError>
where
    T: futures_util::Sink<Message> + Unpin,
    T::Error: std::fmt::Debug,
{
    ws_tx
        .send(Message::Text(frame.serialize()))
        .await
        .map_err(|_| CxpsError::TransportClosed)
}

/// Wait for the first data message, answering pings on the way.
async fn recv_auth_text<S>(
    ws_tx: &mut WsSink<S>,
    ws_rx: &mut WsRecv<S>,
) -> Result<String, CxpsError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        match ws_rx.next().await {
            Some(Ok(Message::Text(text))) => return Ok(text),
            Some(Ok(Message::Binary(data))) => {
                return Ok(String::from_utf8_lossy(&data).into_owned())
            }
            Some(Ok(Message::Ping(data))) => {
                if let Err(e) = ws_tx.send(Message::Pong(data)).await {
                    debug!("failed to send pong: {}", e);
                }
            }
            Some(Ok(Message::Close(_))) | None => return Err(CxpsError::TransportClosed),
            Some(Err(e)) => return Err(CxpsError::WebSocket(e)),
            Some(Ok(_)) => {}
        }
    }
}

/// Read one authentication request and check it against the credential
/// directory. On failure `AUTH_FAILED` is sent and the registry is untouched.
async fn perform_authentication<S>(
    ws_tx: &mut WsSink<S>,
    ws_rx: &mut WsRecv<S>,
    state: &ServerState,
) -> Result<String, CxpsError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let text = recv_auth_text(ws_tx, ws_rx).await?;

    let result = match Frame::parse(&text) {
        Frame::AuthRequest { campus, secret } => {
            if state.credentials.verify(&campus, &secret) {
                Ok(campus)
            } else {
                Err(CxpsError::InvalidCredential(campus))
            }
        }
        _ => Err(CxpsError::MalformedAuth),
    };

    if let Err(ref e) = result {
        counters::auth_total(match e {
            CxpsError::MalformedAuth => "malformed",
            _ => "invalid",
        });
        warn!(error = %e, "authentication failed");
        let _ = send_frame(ws_tx, &Frame::AuthFailed).await;
        let _ = ws_tx.close().await;
    }
    result
}

/// Drive the relay loop for an authenticated campus.
async fn run_message_loop<S>(
    ws_tx: &mut WsSink<S>,
    ws_rx: &mut WsRecv<S>,
    deliver_rx: &mut mpsc::Receiver<String>,
    state: &ServerState,
    campus: &str,
) -> Result<(), CxpsError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        process_message(&text, state, campus, ws_tx).await?;
                    }
                    Some(Ok(Message::Binary(data))) => {
                        let text = String::from_utf8_lossy(&data);
                        process_message(&text, state, campus, ws_tx).await?;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = ws_tx.send(Message::Pong(data)).await {
                            debug!("failed to send pong: {}", e);
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Err(e)) => return Err(CxpsError::WebSocket(e)),
                    Some(Ok(_)) => {}
                }
            }
            Some(text) = deliver_rx.recv() => {
                ws_tx.send(Message::Text(text)).await.map_err(CxpsError::WebSocket)?;
            }
        }
    }
}

/// Serve one control connection from handshake to close.
///
/// # Errors
///
/// Returns the reason the connection ended early: a failed handshake,
/// rejected authentication, a duplicate session, or a transport error.
/// An orderly close after relaying returns `Ok(())`.
pub async fn handle_connection<S>(
    stream: S,
    peer_addr: SocketAddr,
    state: Arc<ServerState>,
) -> Result<(), CxpsError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let ws_config = WebSocketConfig {
        max_message_size: Some(state.config.max_message),
        max_frame_size: Some(state.config.max_message),
        ..WebSocketConfig::default()
    };
    let ws_stream = tokio_tungstenite::accept_async_with_config(stream, Some(ws_config))
        .await
        .map_err(CxpsError::WebSocket)?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let campus = perform_authentication(&mut ws_tx, &mut ws_rx, &state).await?;

    let (deliver_tx, mut deliver_rx) = mpsc::channel::<String>(state.config.queue_depth);
    let epoch = match state
        .registry
        .register(&campus, ControlHandle::new(deliver_tx))
    {
        Registration::Registered { epoch } => epoch,
        Registration::AlreadyActive => {
            counters::auth_total("duplicate");
            warn!(campus = %campus, peer = %peer_addr, "campus already connected");
            let _ = send_frame(&mut ws_tx, &Frame::AlreadyConnected).await;
            let _ = ws_tx.close().await;
            return Err(CxpsError::DuplicateSession(campus));
        }
    };

    gauges::inc_sessions_active();
    let _guard = SessionGuard {
        registry: Arc::clone(&state.registry),
        campus: campus.clone(),
        epoch,
    };

    counters::auth_total("success");
    send_frame(&mut ws_tx, &Frame::AuthSuccess).await?;
    info!(campus = %campus, peer = %peer_addr, "campus authenticated");

    run_message_loop(&mut ws_tx, &mut ws_rx, &mut deliver_rx, &state, &campus).await
}

fn parse_route(text: &str) -> Result<RouteMessage, CxpsError> {
    match Frame::parse(text) {
        Frame::Route(route) => Ok(route),
        _ => Err(CxpsError::MalformedRoute),
    }
}

/// Hand the raw text to the destination's delivery queue.
fn route_message(
    registry: &SessionRegistry,
    route: &RouteMessage,
    raw: &str,
) -> Result<(), CxpsError> {
    let unavailable = || CxpsError::DestinationUnavailable(route.target.clone());

    let Some(dest) = registry.lookup_active(&route.target) else {
        counters::messages_failed_total("offline");
        return Err(unavailable());
    };

    match dest.tx.try_send(raw.to_string()) {
        Ok(()) => Ok(()),
        Err(TrySendError::Full(_)) => {
            counters::messages_failed_total("queue_full");
            Err(unavailable())
        }
        Err(TrySendError::Closed(_)) => {
            counters::messages_failed_total("offline");
            Err(unavailable())
        }
    }
}

/// Handle one inbound message from an authenticated campus.
///
/// Non-route input is dropped without a reply. A route message always
/// produces exactly one `ACK:` or `ERROR:` back to the sender.
async fn process_message<T>(
    text: &str,
    state: &ServerState,
    campus: &str,
    ws_tx: &mut T,
) -> Result<(), CxpsError>
where
    T: futures_util::Sink<Message> + Unpin,
    T::Error: std::fmt::Debug,
{
    let route = match parse_route(text) {
        Ok(route) => route,
        Err(e) => {
            counters::messages_dropped_total("malformed");
            debug!(campus = %campus, error = %e, "dropping message");
            return Ok(());
        }
    };

    if route.from != campus {
        debug!(campus = %campus, from = %route.from, "FROM field differs from session campus");
    }

    let start = Instant::now();
    let reply = match route_message(&state.registry, &route, text) {
        Ok(()) => {
            counters::messages_routed_total();
            histograms::route_latency_seconds(start.elapsed().as_secs_f64());
            info!(from = %campus, to = %route.target, dept = %route.dept, "message routed");
            Frame::delivered(&route.target)
        }
        Err(e) => {
            info!(from = %campus, error = %e, "message not delivered");
            Frame::undeliverable(&route.target)
        }
    };
    send_frame(ws_tx, &reply).await
}
