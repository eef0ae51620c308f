//! Work queue coordinator.
//!
//! Task CRUD with atomic claiming and dependency-driven status transitions.
//! Claims are settled by the repository's guarded update: exactly one
//! concurrent caller wins a ready task, the rest observe a typed conflict.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ProjectTask, TaskClaimant, TaskStatus};
use crate::domain::ports::{TaskFilter, TaskRepository};

/// Fields accepted by `create_task`.
#[derive(Debug, Clone, Default)]
pub struct CreateTask {
    pub working_dir: String,
    pub title: String,
    pub description: Option<String>,
    pub acceptance_criteria: Option<String>,
    pub context_summary: Option<String>,
    pub scope_paths: Vec<String>,
    pub required_tools: Vec<String>,
    pub task_type: Option<String>,
    pub tags: Vec<String>,
    pub estimated_effort: Option<String>,
    pub priority: i64,
    pub blocked_by: Vec<Uuid>,
    pub related_task_ids: Vec<Uuid>,
    pub created_by_session_id: Option<Uuid>,
    pub created_by_agent_id: Option<Uuid>,
    pub discovered_from_task_id: Option<Uuid>,
    pub discovery_reason: Option<String>,
    pub extra: Option<serde_json::Value>,
}

/// Field updates accepted by `update_task`. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdateTask {
    pub status: Option<TaskStatus>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<i64>,
    pub tags: Option<Vec<String>>,
    pub outcome: Option<String>,
    pub completion_notes: Option<String>,
    pub files_changed: Option<Vec<String>>,
    pub last_error: Option<String>,
}

/// Result of a task update: the task plus any dependents the completion
/// promoted to ready, for optional fan-out scheduling by the caller.
#[derive(Debug, Clone)]
pub struct TaskUpdateResult {
    pub task: ProjectTask,
    pub newly_ready: Vec<ProjectTask>,
}

pub struct WorkQueueCoordinator {
    repo: Arc<dyn TaskRepository>,
}

impl WorkQueueCoordinator {
    pub fn new(repo: Arc<dyn TaskRepository>) -> Self {
        Self { repo }
    }

    /// Create a task. Initial status derives from its blockers: `blocked`
    /// when any referenced task is unfinished, `ready` otherwise.
    pub async fn create_task(&self, fields: CreateTask) -> DomainResult<ProjectTask> {
        let mut task = ProjectTask::new(fields.working_dir, fields.title);
        task.description = fields.description;
        task.acceptance_criteria = fields.acceptance_criteria;
        task.context_summary = fields.context_summary;
        task.scope_paths = fields.scope_paths;
        task.required_tools = fields.required_tools;
        task.task_type = fields.task_type;
        task.tags = fields.tags;
        task.estimated_effort = fields.estimated_effort;
        task.priority = fields.priority;
        task.blocked_by = fields.blocked_by;
        task.related_task_ids = fields.related_task_ids;
        task.created_by_session_id = fields.created_by_session_id;
        task.created_by_agent_id = fields.created_by_agent_id;
        task.discovered_from_task_id = fields.discovered_from_task_id;
        task.discovery_reason = fields.discovery_reason;
        task.extra = fields.extra;

        task.validate().map_err(DomainError::Validation)?;

        task.status = if task.blocked_by.is_empty() {
            TaskStatus::Ready
        } else {
            let mut pending = false;
            for blocker in &task.blocked_by {
                match self.repo.get(*blocker).await? {
                    Some(b) if b.status == TaskStatus::Done => {}
                    _ => {
                        pending = true;
                        break;
                    }
                }
            }
            if pending { TaskStatus::Blocked } else { TaskStatus::Ready }
        };

        self.repo.create(&task).await?;
        tracing::info!(
            task_id = %task.id,
            title = %task.title,
            working_dir = %task.working_dir,
            status = task.status.as_str(),
            "Created task"
        );
        Ok(task)
    }

    pub async fn get_task(&self, id: Uuid) -> DomainResult<ProjectTask> {
        self.repo.get(id).await?.ok_or(DomainError::TaskNotFound(id))
    }

    pub async fn list_tasks(&self, filter: &TaskFilter) -> DomainResult<(Vec<ProjectTask>, u64)> {
        self.repo.list(filter).await
    }

    /// Ready tasks a worker could claim. Optionally restricted to tasks
    /// whose `required_tools` are a subset of the caller's tools. Advisory:
    /// results may be stale by the time a claim is attempted.
    pub async fn get_ready_tasks(
        &self,
        working_dir: &str,
        task_type: Option<&str>,
        caller_tools: Option<&[String]>,
        limit: usize,
    ) -> DomainResult<Vec<ProjectTask>> {
        let mut tasks = self.repo.ready_tasks(working_dir, task_type, limit).await?;
        if let Some(tools) = caller_tools {
            tasks.retain(|t| t.required_tools.iter().all(|r| tools.contains(r)));
        }
        Ok(tasks)
    }

    /// Atomically claim a ready task for a worker. Exactly one concurrent
    /// caller wins; losers get an error distinguishing not-found, not-ready,
    /// and already-claimed.
    pub async fn claim_task(
        &self,
        task_id: Uuid,
        claimant: TaskClaimant,
    ) -> DomainResult<ProjectTask> {
        if let Some(task) = self.repo.try_claim(task_id, claimant).await? {
            tracing::info!(
                task_id = %task_id,
                session_id = ?claimant.session_id(),
                agent_id = ?claimant.agent_id(),
                "Task claimed"
            );
            return Ok(task);
        }

        // Lost the guarded update; disambiguate for the caller. A row held
        // by another worker is a claim conflict; blocked, backlog, done, and
        // cancelled rows were never claimable in the first place. Done rows
        // keep their historical claim fields, so the status is the
        // discriminator, not the claim columns.
        match self.repo.get(task_id).await? {
            None => Err(DomainError::TaskNotFound(task_id)),
            Some(task) if matches!(task.status, TaskStatus::Claimed | TaskStatus::InProgress) => {
                Err(DomainError::TaskAlreadyClaimed(task_id))
            }
            Some(task) if task.status != TaskStatus::Ready => Err(DomainError::TaskNotReady {
                id: task_id,
                status: task.status.as_str().to_string(),
            }),
            // Ready again already: claimed and released between our update
            // and this fetch.
            Some(_) => Err(DomainError::TaskAlreadyClaimed(task_id)),
        }
    }

    /// Release a claimed task back to ready. `attempt_count` is preserved as
    /// the claim-history record.
    pub async fn release_task(
        &self,
        task_id: Uuid,
        reason: Option<String>,
    ) -> DomainResult<ProjectTask> {
        let mut task = self.get_task(task_id).await?;
        if !matches!(task.status, TaskStatus::Claimed | TaskStatus::InProgress) {
            return Err(DomainError::InvalidStateTransition {
                from: task.status.as_str().to_string(),
                to: TaskStatus::Ready.as_str().to_string(),
            });
        }

        task.status = TaskStatus::Ready;
        task.claimed_by_session_id = None;
        task.claimed_by_agent_id = None;
        task.claimed_at = None;
        task.updated_at = Utc::now();
        if let Some(reason) = &reason {
            task.last_error = Some(reason.clone());
        }
        self.repo.update(&task).await?;

        tracing::info!(
            task_id = %task_id,
            reason = reason.as_deref().unwrap_or("no reason given"),
            "Task released"
        );
        Ok(task)
    }

    /// Apply field updates and an optional status transition. A transition
    /// to `done` refreshes dependents in the same transaction and returns
    /// the newly-ready set.
    pub async fn update_task(
        &self,
        task_id: Uuid,
        update: UpdateTask,
    ) -> DomainResult<TaskUpdateResult> {
        let mut task = self.get_task(task_id).await?;
        let now = Utc::now();

        if let Some(title) = update.title {
            task.title = title;
        }
        if let Some(description) = update.description {
            task.description = Some(description);
        }
        if let Some(priority) = update.priority {
            task.priority = priority;
        }
        if let Some(tags) = update.tags {
            task.tags = tags;
        }
        if let Some(outcome) = update.outcome {
            task.outcome = Some(outcome);
        }
        if let Some(notes) = update.completion_notes {
            task.completion_notes = Some(notes);
        }
        if let Some(files) = update.files_changed {
            task.files_changed = files;
        }
        if let Some(error) = update.last_error {
            task.last_error = Some(error);
        }

        let old_status = task.status;
        let mut completed = false;
        if let Some(status) = update.status {
            if status != old_status {
                if !old_status.can_transition_to(status) {
                    return Err(DomainError::InvalidStateTransition {
                        from: old_status.as_str().to_string(),
                        to: status.as_str().to_string(),
                    });
                }
                task.status = status;
                match status {
                    TaskStatus::InProgress => task.started_at = Some(now),
                    TaskStatus::Done => {
                        task.completed_at = Some(now);
                        completed = true;
                    }
                    _ => {}
                }
            }
        }
        task.updated_at = now;

        let newly_ready = if completed {
            let ready = self.repo.complete_and_refresh(&task).await?;
            if !ready.is_empty() {
                tracing::info!(
                    task_id = %task_id,
                    unblocked = ready.len(),
                    "Task completion unblocked dependents"
                );
            }
            ready
        } else {
            self.repo.update(&task).await?;
            Vec::new()
        };

        tracing::info!(
            task_id = %task_id,
            from = old_status.as_str(),
            to = task.status.as_str(),
            "Task updated"
        );
        Ok(TaskUpdateResult { task, newly_ready })
    }

    /// Idempotently link a follow-up task to its parent.
    pub async fn add_follow_up_task(&self, parent_id: Uuid, child_id: Uuid) -> DomainResult<()> {
        let mut parent = self.get_task(parent_id).await?;
        if !parent.follow_up_task_ids.contains(&child_id) {
            parent.follow_up_task_ids.push(child_id);
            parent.updated_at = Utc::now();
            self.repo.update(&parent).await?;
        }
        Ok(())
    }

    pub async fn delete_task(&self, id: Uuid) -> DomainResult<bool> {
        let deleted = self.repo.delete(id).await?;
        if deleted {
            tracing::info!(task_id = %id, "Task deleted");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteTaskRepository};

    async fn coordinator() -> WorkQueueCoordinator {
        let pool = create_migrated_test_pool().await.unwrap();
        WorkQueueCoordinator::new(Arc::new(SqliteTaskRepository::new(pool)))
    }

    fn fields(title: &str) -> CreateTask {
        CreateTask {
            working_dir: "/tmp/p".into(),
            title: title.into(),
            ..CreateTask::default()
        }
    }

    #[tokio::test]
    async fn create_without_blockers_is_ready() {
        let wq = coordinator().await;
        let task = wq.create_task(fields("solo")).await.unwrap();
        assert_eq!(task.status, TaskStatus::Ready);
    }

    #[tokio::test]
    async fn create_with_unfinished_blocker_is_blocked() {
        let wq = coordinator().await;
        let a = wq.create_task(fields("a")).await.unwrap();
        let b = wq
            .create_task(CreateTask { blocked_by: vec![a.id], ..fields("b") })
            .await
            .unwrap();
        assert_eq!(b.status, TaskStatus::Blocked);
    }

    #[tokio::test]
    async fn create_rejects_empty_title() {
        let wq = coordinator().await;
        let result = wq.create_task(fields("")).await;
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn claim_errors_are_typed() {
        let wq = coordinator().await;

        let missing = wq.claim_task(Uuid::new_v4(), TaskClaimant::Agent(Uuid::new_v4())).await;
        assert!(matches!(missing, Err(DomainError::TaskNotFound(_))));

        let a = wq.create_task(fields("a")).await.unwrap();
        let b = wq
            .create_task(CreateTask { blocked_by: vec![a.id], ..fields("b") })
            .await
            .unwrap();
        let not_ready = wq.claim_task(b.id, TaskClaimant::Agent(Uuid::new_v4())).await;
        assert!(matches!(not_ready, Err(DomainError::TaskNotReady { .. })));

        wq.claim_task(a.id, TaskClaimant::Agent(Uuid::new_v4())).await.unwrap();
        // A second claim on a task another worker holds reports the claim
        // conflict, not a generic not-ready.
        let again = wq.claim_task(a.id, TaskClaimant::Agent(Uuid::new_v4())).await;
        assert!(matches!(again, Err(DomainError::TaskAlreadyClaimed(_))));

        // Done tasks are unclaimed but not claimable: not-ready.
        let done = wq.create_task(fields("d")).await.unwrap();
        wq.claim_task(done.id, TaskClaimant::Agent(Uuid::new_v4())).await.unwrap();
        wq.update_task(done.id, UpdateTask { status: Some(TaskStatus::Done), ..UpdateTask::default() })
            .await
            .unwrap();
        let finished = wq.claim_task(done.id, TaskClaimant::Agent(Uuid::new_v4())).await;
        assert!(matches!(finished, Err(DomainError::TaskNotReady { .. })));
    }

    #[tokio::test]
    async fn release_preserves_attempt_count() {
        let wq = coordinator().await;
        let task = wq.create_task(fields("work")).await.unwrap();
        let claimed = wq.claim_task(task.id, TaskClaimant::Agent(Uuid::new_v4())).await.unwrap();
        assert_eq!(claimed.attempt_count, 1);

        let released = wq.release_task(task.id, Some("agent crashed".into())).await.unwrap();
        assert_eq!(released.status, TaskStatus::Ready);
        assert_eq!(released.attempt_count, 1);
        assert_eq!(released.last_error.as_deref(), Some("agent crashed"));
        assert!(released.claimed_by_agent_id.is_none());

        let reclaimed = wq.claim_task(task.id, TaskClaimant::Agent(Uuid::new_v4())).await.unwrap();
        assert_eq!(reclaimed.attempt_count, 2);
    }

    #[tokio::test]
    async fn release_requires_claimed_or_in_progress() {
        let wq = coordinator().await;
        let task = wq.create_task(fields("work")).await.unwrap();
        let result = wq.release_task(task.id, None).await;
        assert!(matches!(result, Err(DomainError::InvalidStateTransition { .. })));
    }

    #[tokio::test]
    async fn dependency_cascade() {
        let wq = coordinator().await;
        let a = wq.create_task(fields("a")).await.unwrap();
        let b = wq
            .create_task(CreateTask { blocked_by: vec![a.id], ..fields("b") })
            .await
            .unwrap();
        let c = wq
            .create_task(CreateTask { blocked_by: vec![b.id], ..fields("c") })
            .await
            .unwrap();
        assert_eq!(a.status, TaskStatus::Ready);
        assert_eq!(b.status, TaskStatus::Blocked);
        assert_eq!(c.status, TaskStatus::Blocked);

        // Completing a promotes b but not c.
        let claimed = wq.claim_task(a.id, TaskClaimant::Agent(Uuid::new_v4())).await.unwrap();
        assert_eq!(claimed.status, TaskStatus::Claimed);
        let result = wq
            .update_task(a.id, UpdateTask { status: Some(TaskStatus::Done), ..UpdateTask::default() })
            .await
            .unwrap();
        assert_eq!(result.newly_ready.len(), 1);
        assert_eq!(result.newly_ready[0].id, b.id);
        assert_eq!(wq.get_task(c.id).await.unwrap().status, TaskStatus::Blocked);

        // Completing b promotes c.
        wq.claim_task(b.id, TaskClaimant::Agent(Uuid::new_v4())).await.unwrap();
        let result = wq
            .update_task(b.id, UpdateTask { status: Some(TaskStatus::Done), ..UpdateTask::default() })
            .await
            .unwrap();
        assert_eq!(result.newly_ready.len(), 1);
        assert_eq!(result.newly_ready[0].id, c.id);
        assert_eq!(wq.get_task(c.id).await.unwrap().status, TaskStatus::Ready);
    }

    #[tokio::test]
    async fn required_tools_subset_filter() {
        let wq = coordinator().await;
        wq.create_task(CreateTask {
            required_tools: vec!["git".into(), "docker".into()],
            ..fields("needs-docker")
        })
        .await
        .unwrap();
        wq.create_task(CreateTask { required_tools: vec!["git".into()], ..fields("needs-git") })
            .await
            .unwrap();

        let caller_tools = vec!["git".to_string()];
        let ready = wq
            .get_ready_tasks("/tmp/p", None, Some(&caller_tools), 10)
            .await
            .unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].title, "needs-git");
    }

    #[tokio::test]
    async fn follow_up_is_idempotent() {
        let wq = coordinator().await;
        let parent = wq.create_task(fields("parent")).await.unwrap();
        let child = wq.create_task(fields("child")).await.unwrap();

        wq.add_follow_up_task(parent.id, child.id).await.unwrap();
        wq.add_follow_up_task(parent.id, child.id).await.unwrap();

        let fetched = wq.get_task(parent.id).await.unwrap();
        assert_eq!(fetched.follow_up_task_ids, vec![child.id]);
    }

    #[tokio::test]
    async fn in_progress_sets_started_at() {
        let wq = coordinator().await;
        let task = wq.create_task(fields("work")).await.unwrap();
        wq.claim_task(task.id, TaskClaimant::Agent(Uuid::new_v4())).await.unwrap();
        let result = wq
            .update_task(
                task.id,
                UpdateTask { status: Some(TaskStatus::InProgress), ..UpdateTask::default() },
            )
            .await
            .unwrap();
        assert!(result.task.started_at.is_some());
    }
}
