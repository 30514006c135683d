//! Route handlers: health, agent query, multi-agent orchestration.

use crate::json_error;
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use log::{debug, info, warn};
use patchpilot_core::{OrchestrationRequest, PatchCoreError, extract_entities};
use patchpilot_knowledge::{LogOutcome, ResponseEntry};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

const NO_RESPONSE: &str = "No response";

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryResponse {
    pub response: String,
    pub conversation_id: String,
    pub status: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct MultiagentRequest {
    #[serde(default)]
    pub subscription_id: Option<String>,
    #[serde(default)]
    pub resource_group: Option<String>,
    #[serde(default)]
    pub configuration_name: Option<String>,
    #[serde(default)]
    pub enable_diagnostics: Option<bool>,
    #[serde(default)]
    pub enable_remediation: Option<bool>,
}

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "not found")
}

/// GET /health
pub(crate) async fn handle_health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

fn with_context(query: &str, state: &AppState) -> String {
    let mut full = query.to_string();
    if let Some(subscription_id) = state.defaults.subscription_id.as_deref() {
        full.push_str(&format!("\n\nContext: subscription_id={subscription_id}"));
        if let Some(resource_group) = state.defaults.resource_group.as_deref() {
            full.push_str(&format!(", resource_group={resource_group}"));
        }
    }
    full
}

/// POST /query
pub(crate) async fn handle_query(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            return json_error(StatusCode::BAD_REQUEST, &rejection.body_text()).into_response();
        }
    };
    let Some(query) = request.query.filter(|query| !query.is_empty()) else {
        return json_error(StatusCode::BAD_REQUEST, "Missing 'query' field").into_response();
    };

    let full_query = with_context(&query, &state);
    let ctx = state.context();
    let reply = match ctx
        .agent
        .submit(request.conversation_id.as_deref(), &full_query)
        .await
    {
        Ok(reply) => reply,
        Err(err) => {
            warn!("agent query failed (error={})", err);
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string())
                .into_response();
        }
    };
    let response = if reply.response.trim().is_empty() {
        NO_RESPONSE.to_string()
    } else {
        reply.response
    };
    let status = reply.status.to_string();
    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    let entry = ResponseEntry {
        extracted_entities: extract_entities(&query, &response),
        query,
        content: response.clone(),
        conversation_id: reply.thread_id.clone(),
        status: status.clone(),
        execution_time_ms: Some(elapsed_ms),
    };
    match ctx.logger.log_response(entry).await {
        Ok(LogOutcome::Logged { path }) => debug!("query response logged (path={})", path),
        Ok(LogOutcome::Disabled) => {}
        Err(err) => warn!("failed to log query response (error={})", err),
    }
    info!(
        "query answered (conversation_id={}, status={}, elapsed_ms={})",
        reply.thread_id, status, elapsed_ms
    );

    (
        StatusCode::OK,
        Json(QueryResponse {
            response,
            conversation_id: reply.thread_id,
            status,
        }),
    )
        .into_response()
}

/// POST /multiagent
pub(crate) async fn handle_multiagent(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<MultiagentRequest>, JsonRejection>,
) -> Response {
    let body = match payload {
        Ok(Json(body)) => body,
        Err(rejection) => {
            return json_error(StatusCode::BAD_REQUEST, &rejection.body_text()).into_response();
        }
    };
    let Some(subscription_id) = body
        .subscription_id
        .or_else(|| state.defaults.subscription_id.clone())
        .filter(|id| !id.is_empty())
    else {
        return json_error(StatusCode::BAD_REQUEST, "Missing 'subscription_id' field")
            .into_response();
    };
    let request = OrchestrationRequest {
        subscription_id,
        resource_group: body
            .resource_group
            .or_else(|| state.defaults.resource_group.clone()),
        configuration_name: body.configuration_name,
        enable_diagnostics: body.enable_diagnostics.unwrap_or(true),
        enable_remediation: body.enable_remediation.unwrap_or(true),
    };

    match state.orchestrator.run(&request).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(PatchCoreError::Validation(message)) => {
            json_error(StatusCode::BAD_REQUEST, &message).into_response()
        }
        Err(PatchCoreError::Collaborator(err)) => {
            warn!("patch status assessment failed (error={})", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Failed to get VM patch status",
                    "details": err.to_string(),
                })),
            )
                .into_response()
        }
        Err(err) => {
            warn!("orchestration failed (error={})", err);
            json_error(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string()).into_response()
        }
    }
}
