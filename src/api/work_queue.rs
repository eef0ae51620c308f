//! Work-queue endpoints.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::models::{ProjectTask, TaskClaimant, TaskStatus};
use crate::domain::ports::TaskFilter;
use crate::services::{CreateTask, UpdateTask};

use super::state::{ApiError, ApiResult, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/work-queue/tasks", post(create_task).get(list_tasks))
        .route("/work-queue/tasks/ready", get(ready_tasks))
        .route(
            "/work-queue/tasks/:id",
            get(get_task).patch(update_task).delete(delete_task),
        )
        .route("/work-queue/tasks/:id/claim", post(claim_task))
        .route("/work-queue/tasks/:id/release", post(release_task))
        .route("/work-queue/tasks/:id/follow-up", post(add_follow_up))
}

#[derive(Deserialize)]
struct CreateTaskBody {
    working_dir: String,
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    acceptance_criteria: Option<String>,
    #[serde(default)]
    context_summary: Option<String>,
    #[serde(default)]
    scope_paths: Vec<String>,
    #[serde(default)]
    required_tools: Vec<String>,
    #[serde(default)]
    task_type: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    estimated_effort: Option<String>,
    #[serde(default)]
    priority: i64,
    #[serde(default)]
    blocked_by: Vec<Uuid>,
    #[serde(default)]
    related_task_ids: Vec<Uuid>,
    #[serde(default)]
    created_by_session_id: Option<Uuid>,
    #[serde(default)]
    created_by_agent_id: Option<Uuid>,
    #[serde(default)]
    discovered_from_task_id: Option<Uuid>,
    #[serde(default)]
    discovery_reason: Option<String>,
    #[serde(default)]
    extra: Option<serde_json::Value>,
}

async fn create_task(
    State(state): State<AppState>,
    Json(body): Json<CreateTaskBody>,
) -> ApiResult<Json<ProjectTask>> {
    let task = state
        .work_queue
        .create_task(CreateTask {
            working_dir: body.working_dir,
            title: body.title,
            description: body.description,
            acceptance_criteria: body.acceptance_criteria,
            context_summary: body.context_summary,
            scope_paths: body.scope_paths,
            required_tools: body.required_tools,
            task_type: body.task_type,
            tags: body.tags,
            estimated_effort: body.estimated_effort,
            priority: body.priority,
            blocked_by: body.blocked_by,
            related_task_ids: body.related_task_ids,
            created_by_session_id: body.created_by_session_id,
            created_by_agent_id: body.created_by_agent_id,
            discovered_from_task_id: body.discovered_from_task_id,
            discovery_reason: body.discovery_reason,
            extra: body.extra,
        })
        .await?;
    Ok(Json(task))
}

#[derive(Deserialize)]
struct ListQuery {
    #[serde(default)]
    working_dir: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    task_type: Option<String>,
    #[serde(default)]
    tags: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    offset: Option<usize>,
}

async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let status = query
        .status
        .as_deref()
        .map(|s| {
            TaskStatus::from_str(s)
                .ok_or_else(|| DomainError::Validation(format!("Invalid status: {s}")))
        })
        .transpose()
        .map_err(ApiError)?;

    let filter = TaskFilter {
        working_dir: query.working_dir,
        status,
        task_type: query.task_type,
        tags: query
            .tags
            .map(|t| t.split(',').map(str::to_string).collect())
            .unwrap_or_default(),
        limit: query.limit.unwrap_or(50),
        offset: query.offset.unwrap_or(0),
    };
    let (tasks, total) = state.work_queue.list_tasks(&filter).await?;
    Ok(Json(serde_json::json!({ "tasks": tasks, "total": total })))
}

#[derive(Deserialize)]
struct ReadyQuery {
    working_dir: String,
    #[serde(default)]
    task_type: Option<String>,
    #[serde(default)]
    required_tools: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

async fn ready_tasks(
    State(state): State<AppState>,
    Query(query): Query<ReadyQuery>,
) -> ApiResult<Json<Vec<ProjectTask>>> {
    let tools: Option<Vec<String>> = query
        .required_tools
        .map(|t| t.split(',').map(str::to_string).collect());
    let tasks = state
        .work_queue
        .get_ready_tasks(
            &query.working_dir,
            query.task_type.as_deref(),
            tools.as_deref(),
            query.limit.unwrap_or(10),
        )
        .await?;
    Ok(Json(tasks))
}

async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ProjectTask>> {
    Ok(Json(state.work_queue.get_task(id).await?))
}

#[derive(Deserialize)]
struct ClaimBody {
    #[serde(default)]
    session_id: Option<Uuid>,
    #[serde(default)]
    agent_id: Option<Uuid>,
}

async fn claim_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ClaimBody>,
) -> ApiResult<Json<ProjectTask>> {
    let claimant = match (body.session_id, body.agent_id) {
        (Some(session), None) => TaskClaimant::Session(session),
        (None, Some(agent)) => TaskClaimant::Agent(agent),
        _ => {
            return Err(ApiError(DomainError::Validation(
                "Provide exactly one of session_id or agent_id".to_string(),
            )))
        }
    };
    Ok(Json(state.work_queue.claim_task(id, claimant).await?))
}

#[derive(Deserialize)]
struct ReleaseBody {
    #[serde(default)]
    reason: Option<String>,
}

async fn release_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ReleaseBody>,
) -> ApiResult<Json<ProjectTask>> {
    Ok(Json(state.work_queue.release_task(id, body.reason).await?))
}

#[derive(Deserialize)]
struct UpdateTaskBody {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    priority: Option<i64>,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    outcome: Option<String>,
    #[serde(default)]
    completion_notes: Option<String>,
    #[serde(default)]
    files_changed: Option<Vec<String>>,
    #[serde(default)]
    last_error: Option<String>,
}

async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateTaskBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let status = body
        .status
        .as_deref()
        .map(|s| {
            TaskStatus::from_str(s)
                .ok_or_else(|| DomainError::Validation(format!("Invalid status: {s}")))
        })
        .transpose()
        .map_err(ApiError)?;

    let result = state
        .work_queue
        .update_task(
            id,
            UpdateTask {
                status,
                title: body.title,
                description: body.description,
                priority: body.priority,
                tags: body.tags,
                outcome: body.outcome,
                completion_notes: body.completion_notes,
                files_changed: body.files_changed,
                last_error: body.last_error,
            },
        )
        .await?;
    Ok(Json(serde_json::json!({
        "task": result.task,
        "newly_ready": result.newly_ready,
    })))
}

#[derive(Deserialize)]
struct FollowUpBody {
    child_task_id: Uuid,
}

async fn add_follow_up(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<FollowUpBody>,
) -> ApiResult<Json<serde_json::Value>> {
    state.work_queue.add_follow_up_task(id, body.child_task_id).await?;
    Ok(Json(serde_json::json!({ "linked": true })))
}

async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let deleted = state.work_queue.delete_task(id).await?;
    if !deleted {
        return Err(ApiError(DomainError::TaskNotFound(id)));
    }
    Ok(Json(serde_json::json!({ "deleted": true })))
}
