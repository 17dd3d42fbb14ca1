//! HTTP API over the reasoning engine
//!
//! Topology and diagnostics are computed fresh per request; a failed build
//! surfaces as 502 rather than stale data. Loop results return 404 until
//! the first completed tick.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{info, warn};

use topolens_engine::{
    ContextBuffer, DiagnosticRunner, ProviderError, QueryError, ReasoningLoop, TopologyBuilder,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub builder: Arc<TopologyBuilder>,
    pub runner: DiagnosticRunner,
    pub buffer: Arc<Mutex<ContextBuffer>>,
    pub reasoning_loop: Arc<ReasoningLoop>,
    pub restart_lookback_hours: i64,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    detail: String,
}

fn bad_gateway(err: ProviderError) -> (StatusCode, Json<ErrorBody>) {
    warn!(error = %err, resource = err.resource(), "Topology build failed");
    (
        StatusCode::BAD_GATEWAY,
        Json(ErrorBody {
            error: "no current topology available".to_string(),
            detail: err.to_string(),
        }),
    )
}

fn not_found(err: QueryError) -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            error: err.to_string(),
            detail: "start the reasoning loop and wait for a tick".to_string(),
        }),
    )
}

async fn get_topology(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.builder.build().await {
        Ok(graph) => Json(graph).into_response(),
        Err(e) => bad_gateway(e).into_response(),
    }
}

async fn get_diagnostics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let topology = match state.builder.build().await {
        Ok(graph) => graph,
        Err(e) => return bad_gateway(e).into_response(),
    };

    let history = {
        let buffer = state.buffer.lock().await;
        buffer.restart_deltas(state.restart_lookback_hours)
    };

    let report = state.runner.run_all_checks(&topology, &history);
    Json(report).into_response()
}

async fn start_reasoning(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.reasoning_loop.start().await;
    Json(state.reasoning_loop.status().await)
}

async fn stop_reasoning(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.reasoning_loop.stop().await;
    Json(state.reasoning_loop.status().await)
}

async fn reasoning_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.reasoning_loop.status().await)
}

async fn last_observation(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.reasoning_loop.last_observation().await {
        Ok(observation) => Json(observation).into_response(),
        Err(e) => not_found(e).into_response(),
    }
}

async fn last_reasoning(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.reasoning_loop.last_reasoning().await {
        Ok(reasoning) => Json(reasoning).into_response(),
        Err(e) => not_found(e).into_response(),
    }
}

async fn last_action_plan(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.reasoning_loop.last_action_plan().await {
        Ok(plan) => Json(plan).into_response(),
        Err(e) => not_found(e).into_response(),
    }
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, Vec::new()).into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/topology", get(get_topology))
        .route("/api/v1/diagnostics", get(get_diagnostics))
        .route("/api/v1/reasoning/start", post(start_reasoning))
        .route("/api/v1/reasoning/stop", post(stop_reasoning))
        .route("/api/v1/reasoning/status", get(reasoning_status))
        .route("/api/v1/reasoning/observation", get(last_observation))
        .route("/api/v1/reasoning/reasoning", get(last_reasoning))
        .route("/api/v1/reasoning/action-plan", get(last_action_plan))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
