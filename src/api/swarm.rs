//! Swarm endpoints, including the scratchpad.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::models::{AgentSpec, ScratchpadEntry, Swarm, SwarmAgent, SwarmStatus};
use crate::services::CreateSwarm;

use super::state::{ApiError, ApiResult, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/swarm/create", post(create_swarm))
        .route("/swarm", get(list_swarms))
        .route("/swarm/:id", get(get_swarm))
        .route("/swarm/:id/start", post(start_swarm))
        .route("/swarm/:id/cancel", post(cancel_swarm))
        .route("/swarm/:id/merge", post(merge_swarm))
        .route("/swarm/:id/wait", post(wait_for_swarm))
        .route("/swarm/:id/agent/:name", get(get_agent))
        .route("/swarm/:id/scratchpad", get(list_scratchpad))
        .route(
            "/swarm/:id/scratchpad/*key",
            put(put_scratchpad).get(get_scratchpad).delete(delete_scratchpad),
        )
}

#[derive(Deserialize)]
struct CreateSwarmBody {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parent_session_id: Option<Uuid>,
    working_dir: String,
    agents: Vec<AgentSpec>,
    #[serde(default)]
    git_branch_prefix: Option<String>,
    #[serde(default)]
    base_branch: Option<String>,
    #[serde(default)]
    auto_synthesize: bool,
    #[serde(default)]
    synthesis_prompt: Option<String>,
    #[serde(default)]
    skip_synthesis_on_failure: bool,
    #[serde(default = "default_auto_start")]
    auto_start: bool,
}

fn default_auto_start() -> bool {
    true
}

async fn create_swarm(
    State(state): State<AppState>,
    Json(body): Json<CreateSwarmBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let auto_start = body.auto_start;
    let (swarm, agents) = state
        .swarm
        .create_swarm(CreateSwarm {
            name: body.name,
            description: body.description,
            parent_session_id: body.parent_session_id,
            working_dir: body.working_dir,
            agents: body.agents,
            git_branch_prefix: body.git_branch_prefix,
            base_branch: body.base_branch,
            auto_synthesize: body.auto_synthesize,
            synthesis_prompt: body.synthesis_prompt,
            skip_synthesis_on_failure: body.skip_synthesis_on_failure,
        })
        .await?;

    if auto_start {
        state.swarm.start_swarm(swarm.id).await?;
    }

    let agent_info: Vec<serde_json::Value> = agents
        .iter()
        .map(|a| serde_json::json!({ "id": a.id, "name": a.name, "status": a.status }))
        .collect();
    Ok(Json(serde_json::json!({
        "swarm_id": swarm.id,
        "name": swarm.name,
        "status": swarm.status,
        "agents": agent_info,
    })))
}

#[derive(Deserialize)]
struct ListSwarmsQuery {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

async fn list_swarms(
    State(state): State<AppState>,
    Query(query): Query<ListSwarmsQuery>,
) -> ApiResult<Json<Vec<Swarm>>> {
    let status = query
        .status
        .as_deref()
        .map(|s| {
            SwarmStatus::from_str(s)
                .ok_or_else(|| DomainError::Validation(format!("Invalid status: {s}")))
        })
        .transpose()
        .map_err(ApiError)?;
    Ok(Json(state.swarm.list_swarms(status, query.limit.unwrap_or(50)).await?))
}

async fn get_swarm(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let swarm = state.swarm.get_swarm(id).await?;
    let agents = state.swarm.agents(id).await?;
    Ok(Json(serde_json::json!({ "swarm": swarm, "agents": agents })))
}

async fn start_swarm(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    state.swarm.start_swarm(id).await?;
    Ok(Json(serde_json::json!({ "status": "started", "swarm_id": id })))
}

async fn cancel_swarm(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    state.swarm.cancel_swarm(id).await?;
    Ok(Json(serde_json::json!({ "status": "cancelled", "swarm_id": id })))
}

#[derive(Deserialize)]
struct MergeBody {
    target_branch: String,
    #[serde(default)]
    order: Option<Vec<String>>,
}

async fn merge_swarm(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<MergeBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let outcomes = state.swarm.merge_branches(id, &body.target_branch, body.order).await?;
    Ok(Json(serde_json::json!({ "merges": outcomes })))
}

#[derive(Deserialize)]
struct WaitBody {
    #[serde(default)]
    agent_names: Option<Vec<String>>,
    #[serde(default = "default_wait_timeout")]
    timeout_seconds: u64,
}

fn default_wait_timeout() -> u64 {
    300
}

async fn wait_for_swarm(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<WaitBody>,
) -> ApiResult<Json<Vec<SwarmAgent>>> {
    let agents = state
        .swarm
        .wait_for_agents(id, body.agent_names, Duration::from_secs(body.timeout_seconds))
        .await?;
    Ok(Json(agents))
}

async fn get_agent(
    State(state): State<AppState>,
    Path((id, name)): Path<(Uuid, String)>,
) -> ApiResult<Json<SwarmAgent>> {
    Ok(Json(state.swarm.agent_output(id, &name).await?))
}

#[derive(Deserialize)]
struct ScratchpadListQuery {
    #[serde(default)]
    prefix: Option<String>,
}

async fn list_scratchpad(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ScratchpadListQuery>,
) -> ApiResult<Json<Vec<ScratchpadEntry>>> {
    Ok(Json(state.swarm.scratchpad_list(id, query.prefix.as_deref()).await?))
}

async fn get_scratchpad(
    State(state): State<AppState>,
    Path((id, key)): Path<(Uuid, String)>,
) -> ApiResult<Json<ScratchpadEntry>> {
    Ok(Json(state.swarm.scratchpad_get(id, &key).await?))
}

#[derive(Deserialize)]
struct ScratchpadPutBody {
    value: serde_json::Value,
    #[serde(default)]
    agent_id: Option<Uuid>,
    #[serde(default)]
    agent_name: Option<String>,
}

async fn put_scratchpad(
    State(state): State<AppState>,
    Path((id, key)): Path<(Uuid, String)>,
    Json(body): Json<ScratchpadPutBody>,
) -> ApiResult<Json<ScratchpadEntry>> {
    let entry = state
        .swarm
        .scratchpad_put(id, &key, body.value, body.agent_id, body.agent_name)
        .await?;
    Ok(Json(entry))
}

async fn delete_scratchpad(
    State(state): State<AppState>,
    Path((id, key)): Path<(Uuid, String)>,
) -> ApiResult<Json<serde_json::Value>> {
    state.swarm.scratchpad_delete(id, &key).await?;
    Ok(Json(serde_json::json!({ "deleted": true, "key": key })))
}
