//! Work queue repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{ProjectTask, TaskClaimant, TaskStatus};

/// Filter for task listings.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub working_dir: Option<String>,
    pub status: Option<TaskStatus>,
    pub task_type: Option<String>,
    /// Match tasks carrying any of these tags.
    pub tags: Vec<String>,
    pub limit: usize,
    pub offset: usize,
}

impl TaskFilter {
    pub fn new() -> Self {
        Self { limit: 50, ..Self::default() }
    }
}

#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn create(&self, task: &ProjectTask) -> DomainResult<()>;

    async fn get(&self, id: Uuid) -> DomainResult<Option<ProjectTask>>;

    /// Persist the full row. Errors with `TaskNotFound` when absent.
    async fn update(&self, task: &ProjectTask) -> DomainResult<()>;

    /// Hard delete. Returns false when the task was absent.
    async fn delete(&self, id: Uuid) -> DomainResult<bool>;

    /// List with filters; returns the page and the unpaginated total.
    async fn list(&self, filter: &TaskFilter) -> DomainResult<(Vec<ProjectTask>, u64)>;

    /// Ready, unclaimed tasks in a working directory ordered by priority
    /// descending then creation ascending. Advisory only.
    async fn ready_tasks(
        &self,
        working_dir: &str,
        task_type: Option<&str>,
        limit: usize,
    ) -> DomainResult<Vec<ProjectTask>>;

    /// Atomically claim a ready, unclaimed task. Returns the claimed row, or
    /// `None` when the guarded update matched nothing (lost race, not ready,
    /// or absent; the caller disambiguates with `get`).
    async fn try_claim(&self, id: Uuid, claimant: TaskClaimant) -> DomainResult<Option<ProjectTask>>;

    /// Persist a completed task and, in the same transaction, remove it from
    /// every dependent's `blocked_by`, promoting fully unblocked dependents
    /// to ready. Returns the newly-ready tasks.
    async fn complete_and_refresh(&self, task: &ProjectTask) -> DomainResult<Vec<ProjectTask>>;
}
