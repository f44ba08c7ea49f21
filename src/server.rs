//! HTTP server for receiving editor events.
//!
//! Editors that cannot pipe to the agent's stdin can POST their document
//! events here instead.
//!
//! ```text
//! Editor plugin ──→ POST /events ──→ aggregator ──→ (every 60s) ──→ plugin manager
//! ```

use crate::delivery::DeliverySink;
use crate::feed::EditorEvent;
use crate::scheduler::KeystrokeService;
use crate::stats::StatsSnapshot;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 for random)
    pub port: u16,
}

impl ServerConfig {
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

/// One event or a batch of them.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EventBatch {
    Many(Vec<EditorEvent>),
    One(EditorEvent),
}

impl EventBatch {
    fn into_events(self) -> Vec<EditorEvent> {
        match self {
            EventBatch::Many(events) => events,
            EventBatch::One(event) => vec![event],
        }
    }
}

/// Response from the events endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    pub status: String,
    pub accepted: usize,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Summary of one in-flight record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectStatus {
    pub project: String,
    pub files: usize,
    pub total_keystrokes: u64,
    pub has_activity: bool,
}

/// Response from the status endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub projects: Vec<ProjectStatus>,
    pub stats: StatsSnapshot,
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
    })
}

/// POST /events
async fn ingest<S: DeliverySink>(
    State(service): State<Arc<KeystrokeService<S>>>,
    body: Bytes,
) -> Result<Json<IngestResponse>, (StatusCode, Json<ErrorResponse>)> {
    let batch: EventBatch = serde_json::from_slice(&body).map_err(|e| {
        tracing::warn!("rejected event payload: {}", e);
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: format!("Invalid event data: {}", e),
                code: "INVALID_EVENT".to_string(),
            }),
        )
    })?;

    let events = batch.into_events();
    for event in &events {
        service.handle_event(event);
    }

    Ok(Json(IngestResponse {
        status: "ok".to_string(),
        accepted: events.len(),
    }))
}

/// GET /status
async fn status<S: DeliverySink>(
    State(service): State<Arc<KeystrokeService<S>>>,
) -> Json<StatusResponse> {
    let mut projects: Vec<ProjectStatus> = service.with_aggregator(|agg| {
        agg.records()
            .map(|record| ProjectStatus {
                project: record.project_key.clone(),
                files: record.files.len(),
                total_keystrokes: record.total_keystrokes,
                has_activity: record.has_activity(),
            })
            .collect()
    });
    projects.sort_by(|a, b| a.project.cmp(&b.project));

    Json(StatusResponse {
        projects,
        stats: service.stats().snapshot(),
    })
}

/// Build the router without binding it.
pub fn router<S: DeliverySink>(service: Arc<KeystrokeService<S>>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/events", post(ingest::<S>))
        .route("/status", get(status::<S>))
        .layer(
            CorsLayer::new()
                .allow_origin([
                    HeaderValue::from_static("http://localhost"),
                    HeaderValue::from_static("http://127.0.0.1"),
                ])
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(service)
}

/// Run the HTTP server
pub async fn run<S: DeliverySink>(
    config: ServerConfig,
    service: Arc<KeystrokeService<S>>,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let app = router(service);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Event server listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}
