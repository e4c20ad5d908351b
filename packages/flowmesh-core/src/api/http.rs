//! HTTP route handlers.
//!
//! All handlers are thin - they delegate to the runtime for business logic
//! and lean on `FlowError`'s `IntoResponse` for error bodies.

use axum::extract::{Path, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::{sse, ws, AppState};
use crate::component::ComponentDescriptor;
use crate::error::FlowResult;
use crate::graph::EdgeSpec;
use crate::protocol_constants::SERVICE_ID;
use crate::scheduler::NodeView;

/// Builds the control-surface router.
///
/// CORS is permissive: the graph editor is a browser app served from a
/// different origin.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/component", get(list_components))
        .route("/graph/nodes", get(list_nodes).post(add_node))
        .route("/graph/nodes/{id}", delete(remove_node))
        .route(
            "/graph/edges",
            get(list_edges).post(add_edge).delete(remove_edge),
        )
        .route("/graph/start", post(start_pipeline))
        .route("/graph/stop", post(stop_pipeline))
        .route("/metrics", get(sse::metrics_stream))
        .route("/frames", get(sse::frames_stream))
        .route("/events", get(sse::events_stream))
        .route("/video/ws/{node_id}", get(ws::video_ws))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": SERVICE_ID,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn list_components(State(state): State<AppState>) -> Json<Vec<ComponentDescriptor>> {
    Json(state.registry.list())
}

async fn list_nodes(State(state): State<AppState>) -> Json<Vec<NodeView>> {
    Json(state.runtime.list_nodes())
}

/// Body of `POST /graph/nodes`.
#[derive(Debug, Deserialize)]
pub struct AddNodeRequest {
    /// Component name.
    #[serde(rename = "type")]
    pub component: String,
    /// Optional explicit node id.
    #[serde(default)]
    pub id: Option<String>,
    /// Constructor arguments, shaped per the component's init schema.
    #[serde(default)]
    pub init: Option<Value>,
}

async fn add_node(
    State(state): State<AppState>,
    Json(body): Json<AddNodeRequest>,
) -> FlowResult<Json<NodeView>> {
    let init = body.init.unwrap_or(Value::Null);
    let view = state.runtime.add_node(&body.component, &init, body.id)?;
    Ok(Json(view))
}

async fn remove_node(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> FlowResult<Json<Value>> {
    state.runtime.remove_node(&id).await?;
    Ok(Json(json!({})))
}

async fn list_edges(State(state): State<AppState>) -> Json<Vec<EdgeSpec>> {
    Json(state.runtime.list_edges())
}

async fn add_edge(
    State(state): State<AppState>,
    Json(edge): Json<EdgeSpec>,
) -> FlowResult<Json<EdgeSpec>> {
    let edge = state.runtime.add_edge(edge)?;
    Ok(Json(edge))
}

async fn remove_edge(
    State(state): State<AppState>,
    Json(edge): Json<EdgeSpec>,
) -> FlowResult<Json<Value>> {
    state.runtime.remove_edge(&edge)?;
    Ok(Json(json!({})))
}

async fn start_pipeline(State(state): State<AppState>) -> FlowResult<Json<Value>> {
    let count = state.runtime.start_all()?;
    log::info!("[Api] Pipeline start requested, {} node(s)", count);
    Ok(Json(json!({"status": "running"})))
}

async fn stop_pipeline(State(state): State<AppState>) -> Json<Value> {
    state.runtime.stop_all().await;
    Json(json!({"status": "stopped"}))
}
