//! HTTP gateway for PatchPilot.
//!
//! Endpoints:
//! - GET  /health      - liveness
//! - POST /query       - forward a question to the agent and log the exchange
//! - POST /multiagent  - run assessment, diagnostics, and remediation planning
//!
//! All responses use Content-Type: application/json.

pub mod clients;
mod handlers;
pub mod state;

pub use clients::{HttpAgentClient, HttpInventoryProvider};
pub use handlers::{MultiagentRequest, QueryRequest, QueryResponse};
pub use state::AppState;

use anyhow::Context;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use handlers::{handle_health, handle_multiagent, handle_not_found, handle_query};
use log::info;
use std::net::SocketAddr;
use std::sync::Arc;

/// Initialize logging from `RUST_LOG`. Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::try_init();
}

/// Construct a JSON error response with the given status code and message.
fn json_error(status: StatusCode, message: &str) -> impl IntoResponse {
    (status, Json(serde_json::json!({ "error": message })))
}

/// Routes bound to `state`.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/query", post(handle_query))
        .route("/multiagent", post(handle_multiagent))
        .fallback(handle_not_found)
        .with_state(state)
}

/// Serve until the listener fails.
pub async fn serve(state: Arc<AppState>, bind: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!("patchpilot gateway listening (addr={})", bind);
    axum::serve(listener, router(state))
        .await
        .context("server terminated")
}
