use crate::registry::SessionSummary;
use crate::server::ServerState;
use axum::extract::State;
use axum::{
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Readiness check response.
#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    ready: bool,
}

/// Operator announcement request body.
#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    /// Announcement text, sent as `BROADCAST:<message>`.
    pub message: String,
}

/// Operator announcement result.
#[derive(Debug, Serialize)]
pub struct BroadcastResponse {
    /// Number of campuses a datagram was sent to.
    pub recipients: usize,
}

/// Shared readiness state.
#[derive(Clone, Default)]
pub struct HealthState {
    ready: Arc<AtomicBool>,
}

impl HealthState {
    /// Create a new health state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Mark the service as ready.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Relaxed);
    }

    /// Check if the service is ready.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }
}

/// Build the operator router.
///
/// `/metrics` is only mounted when a Prometheus handle is supplied.
pub fn admin_router(
    server: Arc<ServerState>,
    health_state: HealthState,
    prometheus: Option<PrometheusHandle>,
) -> Router {
    let mut app = Router::new()
        .route("/campuses", get(campuses_handler))
        .route("/broadcast", post(broadcast_handler))
        .with_state(server)
        .route("/health", get(health_handler))
        .route("/ready", get(move || ready_handler(health_state.clone())));

    if let Some(handle) = prometheus {
        app = app.route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        );
    }
    app
}

/// # Errors
///
/// Returns an error if the recorder cannot be installed or binding the
/// admin HTTP server fails.
pub async fn start_admin_server(
    addr: SocketAddr,
    server: Arc<ServerState>,
    health_state: HealthState,
) -> anyhow::Result<()> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    let app = admin_router(server, health_state, Some(handle));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("admin server listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn campuses_handler(State(server): State<Arc<ServerState>>) -> Json<Vec<SessionSummary>> {
    Json(server.registry.list())
}

async fn broadcast_handler(
    State(server): State<Arc<ServerState>>,
    Json(req): Json<BroadcastRequest>,
) -> Json<BroadcastResponse> {
    let recipients = server.broadcaster.broadcast(&req.message).await;
    Json(BroadcastResponse { recipients })
}

/// Health check handler - returns 200 if server is running.
async fn health_handler() -> (StatusCode, Json<HealthResponse>) {
    (StatusCode::OK, Json(HealthResponse { status: "healthy" }))
}

/// Readiness check handler - returns 200 if ready, 503 if not.
async fn ready_handler(state: HealthState) -> (StatusCode, Json<ReadyResponse>) {
    if state.is_ready() {
        (
            StatusCode::OK,
            Json(ReadyResponse {
                status: "ready",
                ready: true,
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyResponse {
                status: "not ready",
                ready: false,
            }),
        )
    }
}
