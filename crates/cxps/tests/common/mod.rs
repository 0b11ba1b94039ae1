#![allow(dead_code)]

use cxp_common::Frame;
use cxps::config::ServerConfig;
use cxps::credentials::CredentialDirectory;
use cxps::liveness::run_liveness_listener;
use cxps::server::ServerState;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;

pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

pub fn test_config(listen: SocketAddr, liveness: SocketAddr) -> ServerConfig {
    ServerConfig {
        listen,
        liveness,
        admin_addr: "127.0.0.1:0".parse().unwrap(),
        max_message: 4096,
        queue_depth: 64,
        drain_timeout: 1,
    }
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub liveness_addr: SocketAddr,
    pub state: Arc<ServerState>,
    pub shutdown_tx: watch::Sender<()>,
}

pub struct TestClient {
    pub ws_tx: futures_util::stream::SplitSink<WsStream, Message>,
    pub ws_rx: futures_util::stream::SplitStream<WsStream>,
}

impl TestClient {
    /// Open a control connection without authenticating.
    pub async fn connect_raw(addr: &SocketAddr) -> Self {
        let url = format!("ws://{addr}");
        let (ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
        let (ws_tx, ws_rx) = ws.split();
        Self { ws_tx, ws_rx }
    }

    /// Connect and authenticate, asserting `AUTH_SUCCESS`.
    pub async fn connect(addr: &SocketAddr, campus: &str, secret: &str) -> Self {
        let mut client = Self::connect_raw(addr).await;
        client.send_text(&Frame::auth(campus, secret).serialize()).await;
        let reply = client.recv_frame().await;
        assert_eq!(reply, Frame::AuthSuccess, "expected AUTH_SUCCESS for {campus}");
        client
    }

    pub async fn send_text(&mut self, text: &str) {
        self.ws_tx
            .send(Message::Text(text.to_string()))
            .await
            .unwrap();
    }

    pub async fn send_route(&mut self, target: &str, dept: &str, from: &str, body: &str) {
        let text = Frame::route(target, dept, from, body).serialize();
        self.send_text(&text).await;
    }

    pub async fn recv_text(&mut self) -> String {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), self.ws_rx.next())
                .await
                .expect("timeout waiting for message")
                .unwrap()
                .unwrap();
            match msg {
                Message::Text(text) => return text,
                Message::Ping(_) | Message::Pong(_) => {}
                other => panic!("expected text message, got {other:?}"),
            }
        }
    }

    pub async fn recv_frame(&mut self) -> Frame {
        Frame::parse(&self.recv_text().await)
    }

    /// Next text message, or `None` if nothing arrives in `timeout`.
    pub async fn recv_text_timeout(&mut self, timeout: Duration) -> Option<String> {
        tokio::time::timeout(timeout, self.recv_text()).await.ok()
    }

    /// Wait for the server to close the connection.
    pub async fn expect_closed(&mut self) {
        loop {
            let next = tokio::time::timeout(Duration::from_secs(5), self.ws_rx.next())
                .await
                .expect("timeout waiting for close");
            match next {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return,
                Some(Ok(_)) => {}
            }
        }
    }

    pub async fn close(mut self) {
        let _ = self.ws_tx.close().await;
    }
}

pub async fn start_server() -> TestServer {
    start_server_with(CredentialDirectory::default(), 64).await
}

pub async fn start_server_with(credentials: CredentialDirectory, queue_depth: usize) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let liveness_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let liveness_addr = liveness_socket.local_addr().unwrap();

    let mut config = test_config(addr, liveness_addr);
    config.queue_depth = queue_depth;
    let state = Arc::new(ServerState::new(config, credentials).await.unwrap());

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    tokio::spawn(run_liveness_listener(
        liveness_socket,
        Arc::clone(&state.registry),
        shutdown_rx.clone(),
    ));

    let state_clone = Arc::clone(&state);
    tokio::spawn(async move {
        if let Err(e) = cxps::run_with_shutdown(listener, state_clone, shutdown_rx).await {
            eprintln!("server error in test: {e}");
        }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;

    TestServer {
        addr,
        liveness_addr,
        state,
        shutdown_tx,
    }
}

/// Poll `cond` until it holds or two seconds pass.
pub async fn wait_until<F: Fn() -> bool>(cond: F, what: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !cond() {
        assert!(tokio::time::Instant::now() < deadline, "timed out: {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
