//! Core memory endpoints.

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::models::{CoreMemoryBlock, CoreMemoryVersion, MemoryBlockType, MemoryScope};

use super::state::{ApiError, ApiResult, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/memory/core", get(get_blocks))
        .route("/memory/core/edit", post(edit_block))
        .route("/memory/core/history", get(get_history))
        .route("/memory/core/rollback", post(rollback_block))
}

fn parse_scope(user_id: Option<String>, session_id: Option<Uuid>) -> Result<MemoryScope, ApiError> {
    MemoryScope::from_ids(user_id, session_id)
        .map_err(|e| ApiError(DomainError::Validation(e)))
}

fn parse_block_type(s: &str) -> Result<MemoryBlockType, ApiError> {
    MemoryBlockType::from_str(s)
        .ok_or_else(|| ApiError(DomainError::Validation(format!("Invalid block type: {s}"))))
}

#[derive(Deserialize)]
struct ScopeQuery {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    session_id: Option<Uuid>,
}

async fn get_blocks(
    State(state): State<AppState>,
    Query(query): Query<ScopeQuery>,
) -> ApiResult<Json<Vec<CoreMemoryBlock>>> {
    let scope = parse_scope(query.user_id, query.session_id)?;
    Ok(Json(state.memory.get(&scope).await?))
}

#[derive(Deserialize)]
struct EditBody {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    session_id: Option<Uuid>,
    block_type: String,
    content: String,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    char_limit: Option<u32>,
}

async fn edit_block(
    State(state): State<AppState>,
    Json(body): Json<EditBody>,
) -> ApiResult<Json<CoreMemoryBlock>> {
    let scope = parse_scope(body.user_id, body.session_id)?;
    let block_type = parse_block_type(&body.block_type)?;
    let block = state
        .memory
        .edit(scope, block_type, body.content, body.reason, body.char_limit)
        .await?;
    Ok(Json(block))
}

#[derive(Deserialize)]
struct HistoryQuery {
    block_id: Uuid,
}

async fn get_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<CoreMemoryVersion>>> {
    Ok(Json(state.memory.history(query.block_id).await?))
}

#[derive(Deserialize)]
struct RollbackBody {
    block_id: Uuid,
    version: u32,
}

async fn rollback_block(
    State(state): State<AppState>,
    Json(body): Json<RollbackBody>,
) -> ApiResult<Json<CoreMemoryBlock>> {
    Ok(Json(state.memory.rollback(body.block_id, body.version).await?))
}
