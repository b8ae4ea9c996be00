//! # routes: ops endpoints
//!
//! | Method | Path      | Description                    |
//! |--------|-----------|--------------------------------|
//! | GET    | `/health` | liveness + whether engine runs |
//! | GET    | `/stats`  | engine counters                |

use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::engine::EngineStats;

pub fn router(stats: Arc<EngineStats>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(get_stats))
        .layer(TraceLayer::new_for_http())
        .with_state(stats)
}

/// GET /health
pub async fn health_check(State(stats): State<Arc<EngineStats>>) -> impl IntoResponse {
    let snapshot = stats.snapshot();
    Json(json!({
        "ok":      true,
        "running": snapshot.running,
    }))
}

/// GET /stats
pub async fn get_stats(State(stats): State<Arc<EngineStats>>) -> impl IntoResponse {
    let snapshot = stats.snapshot();
    Json(json!({
        "ok":    true,
        "stats": snapshot,
    }))
}
