//! Route-level tests driving the router in-process.

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use patchpilot_config::AzureConfig;
use patchpilot_core::{PatchContext, PatchSettings};
use patchpilot_knowledge::{
    InMemoryKnowledgeStore, KnowledgeStore, ResponseLogSettings, ResponseRecord,
};
use patchpilot_protocol::{AgentClient, CollaboratorError, InventoryProvider};
use patchpilot_server::{AppState, QueryResponse, router};
use patchpilot_test_utils::{FailingAgent, ScriptedAgent, StubInventory, failed_vm, vm_entry};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

fn state(
    inventory: Arc<dyn InventoryProvider>,
    agent: Arc<dyn AgentClient>,
    store: Arc<InMemoryKnowledgeStore>,
    defaults: AzureConfig,
) -> Arc<AppState> {
    let ctx = PatchContext::new(
        inventory,
        agent,
        store,
        ResponseLogSettings::default(),
        PatchSettings::default(),
    );
    Arc::new(AppState::new(ctx, defaults))
}

fn defaults(subscription_id: Option<&str>, resource_group: Option<&str>) -> AzureConfig {
    AzureConfig {
        subscription_id: subscription_id.map(str::to_string),
        resource_group: resource_group.map(str::to_string),
    }
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

async fn send(state: Arc<AppState>, request: Request<Body>) -> (StatusCode, Value) {
    let response = router(state).oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    (status, serde_json::from_slice(&bytes).expect("json body"))
}

/// The health probe answers without touching collaborators.
#[tokio::test]
async fn health_reports_healthy() {
    let state = state(
        Arc::new(StubInventory::new()),
        Arc::new(FailingAgent),
        Arc::new(InMemoryKnowledgeStore::new()),
        AzureConfig::default(),
    );
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .expect("request");

    let (status, body) = send(state, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "healthy" }));
}

/// A body without `query` is rejected before the agent is called.
#[tokio::test]
async fn query_without_text_is_rejected() {
    let agent = Arc::new(ScriptedAgent::new("unused"));
    let state = state(
        Arc::new(StubInventory::new()),
        agent.clone(),
        Arc::new(InMemoryKnowledgeStore::new()),
        AzureConfig::default(),
    );

    let (status, body) = send(state, post_json("/query", json!({}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Missing 'query' field" }));
    assert!(agent.prompts().is_empty());
}

/// Default scope is appended to the prompt and the exchange is logged.
#[tokio::test]
async fn query_appends_context_and_logs_exchange() {
    let agent = Arc::new(ScriptedAgent::new("web-01 failed its last assessment."));
    let store = Arc::new(InMemoryKnowledgeStore::new());
    let state = state(
        Arc::new(StubInventory::new()),
        agent.clone(),
        store.clone(),
        defaults(Some("sub-1"), Some("rg-a")),
    );

    let (status, body) = send(
        state,
        post_json("/query", json!({ "query": "Which VMs failed patching?" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let reply: QueryResponse = serde_json::from_value(body).expect("query response");
    assert_eq!(
        reply,
        QueryResponse {
            response: "web-01 failed its last assessment.".to_string(),
            conversation_id: "thread-1".to_string(),
            status: "completed".to_string(),
        }
    );
    assert_eq!(
        agent.prompts(),
        vec![
            "Which VMs failed patching?\n\nContext: subscription_id=sub-1, resource_group=rg-a"
                .to_string()
        ]
    );

    let objects = store.list_by_prefix("responses/").await.expect("list");
    assert_eq!(objects.len(), 1);
    let bytes = store.get(&objects[0].path).await.expect("get");
    let record: ResponseRecord = serde_json::from_slice(&bytes).expect("record");
    assert_eq!(record.request.query, "Which VMs failed patching?");
    assert_eq!(record.conversation_id, "thread-1");
}

/// Agent failures surface as a 500 with the error text.
#[tokio::test]
async fn query_agent_failure_is_server_error() {
    let state = state(
        Arc::new(StubInventory::new()),
        Arc::new(FailingAgent),
        Arc::new(InMemoryKnowledgeStore::new()),
        AzureConfig::default(),
    );

    let (status, body) = send(state, post_json("/query", json!({ "query": "status?" }))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body,
        json!({ "error": "request failed: agent unavailable" })
    );
}

/// Without a request or configured subscription the orchestrator is not run.
#[tokio::test]
async fn multiagent_requires_subscription() {
    let inventory = Arc::new(StubInventory::new());
    let state = state(
        inventory.clone(),
        Arc::new(ScriptedAgent::new("unused")),
        Arc::new(InMemoryKnowledgeStore::new()),
        AzureConfig::default(),
    );

    let (status, body) = send(state, post_json("/multiagent", json!({}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Missing 'subscription_id' field" }));
    assert!(inventory.queries().is_empty());
}

/// A whitespace-only subscription is a client error, not a server failure.
#[tokio::test]
async fn multiagent_blank_subscription_is_bad_request() {
    let state = state(
        Arc::new(StubInventory::new()),
        Arc::new(ScriptedAgent::new("unused")),
        Arc::new(InMemoryKnowledgeStore::new()),
        AzureConfig::default(),
    );

    let (status, body) = send(
        state,
        post_json("/multiagent", json!({ "subscription_id": "   " })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "subscription_id must not be empty" }));
}

/// A failed patch status assessment is reported with details.
#[tokio::test]
async fn multiagent_assessment_failure_has_details() {
    let inventory = StubInventory::new()
        .with_list_error(CollaboratorError::Request("inventory offline".to_string()));
    let state = state(
        Arc::new(inventory),
        Arc::new(ScriptedAgent::new("unused")),
        Arc::new(InMemoryKnowledgeStore::new()),
        defaults(Some("sub-1"), None),
    );

    let (status, body) = send(state, post_json("/multiagent", json!({}))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body,
        json!({
            "error": "Failed to get VM patch status",
            "details": "request failed: inventory offline",
        })
    );
}

/// A full run returns the orchestration result as JSON.
#[tokio::test]
async fn multiagent_runs_all_phases() {
    let inventory = StubInventory::new().with_vms(vec![
        vm_entry("web-01", "rg-a", "Succeeded"),
        failed_vm("web-02", "rg-a"),
    ]);
    let state = state(
        Arc::new(inventory),
        Arc::new(ScriptedAgent::new("web-02 failed.")),
        Arc::new(InMemoryKnowledgeStore::new()),
        AzureConfig::default(),
    );

    let (status, body) = send(
        state,
        post_json(
            "/multiagent",
            json!({ "subscription_id": "sub-1", "resource_group": "rg-a" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["vm_status_summary"]["total_vms"], json!(2));
    assert_eq!(body["patch_status_response"], json!("web-02 failed."));
    assert_eq!(body["diagnostic_results"][0]["vm_name"], json!("web-02"));
    assert_eq!(body["remediation_plans"][0]["vm_name"], json!("web-02"));
}

/// Unknown paths get a JSON 404.
#[tokio::test]
async fn unknown_route_is_not_found() {
    let state = state(
        Arc::new(StubInventory::new()),
        Arc::new(FailingAgent),
        Arc::new(InMemoryKnowledgeStore::new()),
        AzureConfig::default(),
    );
    let request = Request::builder()
        .uri("/nope")
        .body(Body::empty())
        .expect("request");

    let (status, body) = send(state, request).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "error": "not found" }));
}
