//! Mission endpoints.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::models::{Mission, MissionExecution, MissionStatus};
use crate::services::{CreateMission, UpdateMission};

use super::state::{ApiError, ApiResult, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/missions", post(create_mission).get(list_missions))
        .route(
            "/missions/:id",
            get(get_mission).patch(update_mission).delete(delete_mission),
        )
        .route("/missions/:id/pause", post(pause_mission))
        .route("/missions/:id/resume", post(resume_mission))
        .route("/missions/:id/execute", post(execute_mission))
        .route("/missions/:id/executions", get(list_executions))
        .route("/missions/:id/executions/:exec_id", get(get_execution))
}

#[derive(Deserialize)]
struct CreateMissionBody {
    name: String,
    prompt: String,
    #[serde(default)]
    cron_expression: Option<String>,
    #[serde(default)]
    schedule: Option<String>,
    #[serde(default)]
    timezone: Option<String>,
    working_dir: String,
    #[serde(default)]
    personality: Option<String>,
    #[serde(default)]
    allowed_tools: Vec<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    sandbox_mode: bool,
}

async fn create_mission(
    State(state): State<AppState>,
    Json(body): Json<CreateMissionBody>,
) -> ApiResult<Json<Mission>> {
    let mission = state
        .missions
        .create_mission(CreateMission {
            name: body.name,
            prompt: body.prompt,
            cron_expression: body.cron_expression,
            schedule_natural: body.schedule,
            timezone: body.timezone,
            working_dir: body.working_dir,
            personality: body.personality,
            allowed_tools: body.allowed_tools,
            model: body.model,
            user_id: body.user_id,
            sandbox_mode: body.sandbox_mode,
        })
        .await?;
    Ok(Json(mission))
}

#[derive(Deserialize)]
struct ListMissionsQuery {
    #[serde(default)]
    status: Option<String>,
}

async fn list_missions(
    State(state): State<AppState>,
    Query(query): Query<ListMissionsQuery>,
) -> ApiResult<Json<Vec<Mission>>> {
    let status = query
        .status
        .as_deref()
        .map(|s| {
            MissionStatus::from_str(s)
                .ok_or_else(|| DomainError::Validation(format!("Invalid status: {s}")))
        })
        .transpose()
        .map_err(ApiError)?;
    Ok(Json(state.missions.list_missions(status).await?))
}

async fn get_mission(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Mission>> {
    Ok(Json(state.missions.get_mission(id).await?))
}

#[derive(Deserialize)]
struct UpdateMissionBody {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    cron_expression: Option<String>,
    #[serde(default)]
    timezone: Option<String>,
    #[serde(default)]
    personality: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    allowed_tools: Option<Vec<String>>,
}

async fn update_mission(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateMissionBody>,
) -> ApiResult<Json<Mission>> {
    let mission = state
        .missions
        .update_mission(
            id,
            UpdateMission {
                name: body.name,
                prompt: body.prompt,
                cron_expression: body.cron_expression,
                timezone: body.timezone,
                personality: body.personality,
                model: body.model,
                allowed_tools: body.allowed_tools,
            },
        )
        .await?;
    Ok(Json(mission))
}

async fn delete_mission(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    if !state.missions.delete_mission(id).await? {
        return Err(ApiError(DomainError::MissionNotFound(id)));
    }
    Ok(Json(serde_json::json!({ "deleted": true })))
}

async fn pause_mission(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Mission>> {
    Ok(Json(state.missions.pause_mission(id).await?))
}

async fn resume_mission(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Mission>> {
    Ok(Json(state.missions.resume_mission(id).await?))
}

#[derive(Deserialize, Default)]
struct ExecuteBody {
    #[serde(default)]
    triggered_by: Option<String>,
}

async fn execute_mission(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<ExecuteBody>>,
) -> ApiResult<Json<serde_json::Value>> {
    let triggered_by = body.and_then(|Json(b)| b.triggered_by);
    let execution_id = state.scheduler.trigger_now(id, triggered_by).await?;
    Ok(Json(serde_json::json!({ "execution_id": execution_id, "status": "running" })))
}

#[derive(Deserialize)]
struct ExecutionsQuery {
    #[serde(default)]
    limit: Option<usize>,
}

async fn list_executions(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ExecutionsQuery>,
) -> ApiResult<Json<Vec<MissionExecution>>> {
    Ok(Json(
        state.missions.list_executions(id, query.limit.unwrap_or(20)).await?,
    ))
}

async fn get_execution(
    State(state): State<AppState>,
    Path((_, exec_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<MissionExecution>> {
    Ok(Json(state.missions.get_execution(exec_id).await?))
}
