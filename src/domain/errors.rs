//! Domain errors for the dere daemon.

use thiserror::Error;
use uuid::Uuid;

/// Domain-level errors surfaced by coordinators and repositories.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("Task {id} is not ready (status: {status})")]
    TaskNotReady { id: Uuid, status: String },

    #[error("Task {0} was claimed by another worker")]
    TaskAlreadyClaimed(Uuid),

    #[error("Mission not found: {0}")]
    MissionNotFound(Uuid),

    #[error("Mission execution not found: {0}")]
    ExecutionNotFound(Uuid),

    #[error("Swarm not found: {0}")]
    SwarmNotFound(Uuid),

    #[error("Swarm agent not found: {0}")]
    SwarmAgentNotFound(String),

    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("Memory block not found: {0}")]
    MemoryBlockNotFound(Uuid),

    #[error("Scratchpad key not found: {0}")]
    ScratchpadKeyNotFound(String),

    #[error("Dependency cycle detected: {}", path.join(" -> "))]
    DependencyCycle { path: Vec<String> },

    #[error("Swarm agents cannot spawn new swarms")]
    RecursiveSwarm,

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Condition evaluation failed: {0}")]
    ConditionEvaluation(String),

    #[error("Agent runtime error: {0}")]
    Runtime(String),

    #[error("Subsystem unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() || db.is_check_violation() => {
                DomainError::Validation(err.to_string())
            }
            _ => DomainError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::Serialization(err.to_string())
    }
}
