//! HTTP/WS facade.
//!
//! A thin boundary: every handler calls exactly one coordinator. Domain
//! errors map to JSON `{"detail": ...}` with standard status codes.

pub mod affect;
pub mod memory;
pub mod missions;
pub mod state;
pub mod swarm;
pub mod work_queue;
pub mod ws;

use axum::routing::get;
use axum::{Json, Router};

pub use state::{ApiError, ApiResult, AppState};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(work_queue::routes())
        .merge(missions::routes())
        .merge(swarm::routes())
        .merge(memory::routes())
        .merge(affect::routes())
        .merge(ws::routes())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
