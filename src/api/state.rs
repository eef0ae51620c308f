//! Shared API state and error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;

use crate::domain::errors::DomainError;
use crate::domain::ports::RareEventRepository;
use crate::services::{
    AgentSessionService, BondManager, CoreMemoryService, EmotionRegistry, MissionScheduler,
    MissionService, SwarmCoordinator, WorkQueueCoordinator,
};

/// Everything the handlers can reach. Handlers call exactly one coordinator
/// and hold no domain logic of their own.
#[derive(Clone)]
pub struct AppState {
    pub work_queue: Arc<WorkQueueCoordinator>,
    pub missions: Arc<MissionService>,
    pub scheduler: Arc<MissionScheduler>,
    pub swarm: Arc<SwarmCoordinator>,
    pub memory: Arc<CoreMemoryService>,
    pub sessions: Arc<AgentSessionService>,
    pub bond: Arc<BondManager>,
    pub emotions: Arc<EmotionRegistry>,
    pub rare_events: Arc<dyn RareEventRepository>,
}

/// JSON error body: `{"detail": "..."}` with a standard status code.
pub struct ApiError(pub DomainError);

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            DomainError::Validation(_)
            | DomainError::ConditionEvaluation(_)
            | DomainError::DependencyCycle { .. }
            | DomainError::Serialization(_)
            | DomainError::InvalidStateTransition { .. } => StatusCode::BAD_REQUEST,

            DomainError::RecursiveSwarm => StatusCode::FORBIDDEN,

            DomainError::TaskNotFound(_)
            | DomainError::MissionNotFound(_)
            | DomainError::ExecutionNotFound(_)
            | DomainError::SwarmNotFound(_)
            | DomainError::SwarmAgentNotFound(_)
            | DomainError::SessionNotFound(_)
            | DomainError::MemoryBlockNotFound(_)
            | DomainError::ScratchpadKeyNotFound(_) => StatusCode::NOT_FOUND,

            DomainError::TaskNotReady { .. } | DomainError::TaskAlreadyClaimed(_) => {
                StatusCode::CONFLICT
            }

            DomainError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,

            DomainError::Runtime(_) | DomainError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        }

        (status, Json(serde_json::json!({ "detail": self.0.to_string() }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
