// ABOUTME: HTTP control plane - health, manual chat send, stubbed engagement endpoints, metrics.
// ABOUTME: A thin layer over the chat connector; sends are best-effort like every other send.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::metrics;
use crate::twitch::TwitchConnector;

/// Service identifier reported by /health.
const SERVICE_NAME: &str = "twitch_service";

#[derive(Clone)]
pub struct ServerState {
    pub twitch: TwitchConnector,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct SendMessagePayload {
    pub message: String,
    #[serde(default)]
    pub username: Option<String>,
}

fn default_poll_duration() -> u32 {
    60
}

#[derive(Debug, Deserialize)]
pub struct PollPayload {
    pub title: String,
    pub choices: Vec<String>,
    #[serde(default = "default_poll_duration")]
    pub duration_seconds: u32,
}

fn default_prediction_window() -> u32 {
    120
}

#[derive(Debug, Deserialize)]
pub struct PredictionPayload {
    pub title: String,
    pub outcomes: Vec<String>,
    #[serde(default = "default_prediction_window")]
    pub prediction_window: u32,
}

fn default_redeem_enabled() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct RedeemPayload {
    pub title: String,
    pub cost: u32,
    #[serde(default = "default_redeem_enabled")]
    pub is_enabled: bool,
}

/// Build the control-plane router. Separated from `start_server` so tests can
/// serve the route table with an injected metrics handle instead of the
/// global recorder.
pub fn router(state: ServerState, metrics_handle: PrometheusHandle) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/chat/send", post(send_chat_handler))
        .route("/poll/create", post(create_poll_handler))
        .route("/prediction/create", post(create_prediction_handler))
        .route("/redeem/create", post(create_redeem_handler))
        .with_state(Arc::new(state));

    // Metrics endpoint - renders Prometheus text format
    let metrics_routes = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(Arc::new(metrics_handle));

    api_routes
        .merge(metrics_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Start the control-plane HTTP server. Installs the global metrics recorder,
/// so call it once.
pub async fn start_server(host: &str, port: u16, twitch: TwitchConnector) -> Result<()> {
    let metrics_handle =
        metrics::init_metrics().context("Failed to initialize Prometheus metrics")?;

    let state = ServerState { twitch, port };
    let app = router(state, metrics_handle);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(addr = %addr, "Starting control server");
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_handler(State(state): State<Arc<ServerState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": SERVICE_NAME,
        "port": state.port,
    }))
}

/// Manually push a message into the channel, optionally addressed to a user.
async fn send_chat_handler(
    State(state): State<Arc<ServerState>>,
    Json(payload): Json<SendMessagePayload>,
) -> Json<Value> {
    let message = match payload.username.as_deref() {
        Some(username) if !username.is_empty() => {
            format!("@{} {}", username, payload.message)
        }
        _ => payload.message.clone(),
    };

    tracing::info!(chars = message.chars().count(), "Manual chat send requested");
    let queued = state.twitch.send_message(message.clone());
    metrics::record_chat_send_request(if queued { "queued" } else { "not_ready" });

    Json(json!({"ok": true, "sent": message}))
}

async fn create_poll_handler(Json(payload): Json<PollPayload>) -> (StatusCode, Json<Value>) {
    tracing::info!(
        title = %payload.title,
        choices = payload.choices.len(),
        duration_seconds = payload.duration_seconds,
        "Poll creation requested"
    );
    (
        StatusCode::NOT_IMPLEMENTED,
        Json(json!({"detail": "Poll creation coming soon"})),
    )
}

async fn create_prediction_handler(
    Json(payload): Json<PredictionPayload>,
) -> (StatusCode, Json<Value>) {
    tracing::info!(
        title = %payload.title,
        outcomes = payload.outcomes.len(),
        prediction_window = payload.prediction_window,
        "Prediction creation requested"
    );
    (
        StatusCode::NOT_IMPLEMENTED,
        Json(json!({"detail": "Prediction creation coming soon"})),
    )
}

async fn create_redeem_handler(Json(payload): Json<RedeemPayload>) -> (StatusCode, Json<Value>) {
    tracing::info!(
        title = %payload.title,
        cost = payload.cost,
        is_enabled = payload.is_enabled,
        "Redeem creation requested"
    );
    (
        StatusCode::NOT_IMPLEMENTED,
        Json(json!({"detail": "Redeem creation coming soon"})),
    )
}

async fn metrics_handler(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}

// =============================================================================
// Tests
// =============================================================================
