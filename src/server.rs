//! JSON HTTP surface for the query engine.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/query` | Run one question through the agent |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! `bad_request` (400) for invalid arguments, `capability_failure` (502)
//! when an outbound model call fails, `internal` (500) otherwise. A failed
//! request never takes the process down; subsequent requests are served
//! normally.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::agent::QueryEngine;
use crate::config::Config;
use crate::error::RagError;
use crate::models::QueryRequest;

#[derive(Clone)]
struct AppState {
    engine: Arc<QueryEngine>,
}

/// Start serving. The retrieval index must already be built or loaded;
/// this function only binds the listener and dispatches requests.
pub async fn run_server(config: &Config, engine: Arc<QueryEngine>) -> anyhow::Result<()> {
    let app = router(engine);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}

fn router(engine: Arc<QueryEngine>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/query", post(query))
        .layer(cors)
        .with_state(AppState { engine })
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn query(State(state): State<AppState>, Json(req): Json<QueryRequest>) -> Response {
    let request_id = Uuid::new_v4();
    tracing::info!(%request_id, "query received");

    match state.engine.run_query(&req.question).await {
        Ok(response) => {
            tracing::info!(%request_id, agent = response.agent_used.as_str(), "query answered");
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => {
            tracing::warn!(%request_id, error = %e, "query failed");
            error_response(&e)
        }
    }
}

fn error_response(err: &anyhow::Error) -> Response {
    let (status, code) = match err.downcast_ref::<RagError>() {
        Some(RagError::InvalidArgument(_)) => (StatusCode::BAD_REQUEST, "bad_request"),
        Some(RagError::Capability(_)) => (StatusCode::BAD_GATEWAY, "capability_failure"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    };

    (
        status,
        Json(json!({
            "error": { "code": code, "message": err.to_string() }
        })),
    )
        .into_response()
}
