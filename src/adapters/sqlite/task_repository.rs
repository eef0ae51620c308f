//! SQLite implementation of the work queue repository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ProjectTask, TaskClaimant, TaskStatus};
use crate::domain::ports::{TaskFilter, TaskRepository};

#[derive(Clone)]
pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn create(&self, task: &ProjectTask) -> DomainResult<()> {
        insert_task(&self.pool, task).await
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<ProjectTask>> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM project_tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(ProjectTask::try_from).transpose()
    }

    async fn update(&self, task: &ProjectTask) -> DomainResult<()> {
        let result = update_task_query(task).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::TaskNotFound(task.id));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> DomainResult<bool> {
        let result = sqlx::query("DELETE FROM project_tasks WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, filter: &TaskFilter) -> DomainResult<(Vec<ProjectTask>, u64)> {
        let mut conditions = String::from(" WHERE 1=1");
        let mut bindings: Vec<String> = Vec::new();

        if let Some(working_dir) = &filter.working_dir {
            conditions.push_str(" AND working_dir = ?");
            bindings.push(working_dir.clone());
        }
        if let Some(status) = &filter.status {
            conditions.push_str(" AND status = ?");
            bindings.push(status.as_str().to_string());
        }
        if let Some(task_type) = &filter.task_type {
            conditions.push_str(" AND task_type = ?");
            bindings.push(task_type.clone());
        }

        let count_query = format!("SELECT COUNT(*) FROM project_tasks{conditions}");
        let mut cq = sqlx::query_as::<_, (i64,)>(&count_query);
        for binding in &bindings {
            cq = cq.bind(binding);
        }

        let page_query = format!(
            "SELECT * FROM project_tasks{conditions} \
             ORDER BY priority DESC, created_at DESC LIMIT ? OFFSET ?"
        );
        let mut pq = sqlx::query_as::<_, TaskRow>(&page_query);
        for binding in &bindings {
            pq = pq.bind(binding);
        }
        let limit = if filter.limit == 0 { 50 } else { filter.limit };
        pq = pq.bind(limit as i64).bind(filter.offset as i64);

        let (total,) = cq.fetch_one(&self.pool).await?;
        let rows: Vec<TaskRow> = pq.fetch_all(&self.pool).await?;

        let mut tasks: Vec<ProjectTask> = rows
            .into_iter()
            .map(ProjectTask::try_from)
            .collect::<DomainResult<Vec<_>>>()?;

        // Tag matching happens in Rust: tags live in a JSON column and the
        // filter matches any overlap.
        if !filter.tags.is_empty() {
            tasks.retain(|t| t.tags.iter().any(|tag| filter.tags.contains(tag)));
        }

        Ok((tasks, total as u64))
    }

    async fn ready_tasks(
        &self,
        working_dir: &str,
        task_type: Option<&str>,
        limit: usize,
    ) -> DomainResult<Vec<ProjectTask>> {
        let mut query = String::from(
            "SELECT * FROM project_tasks
             WHERE working_dir = ? AND status = 'ready'
               AND claimed_by_session_id IS NULL AND claimed_by_agent_id IS NULL",
        );
        if task_type.is_some() {
            query.push_str(" AND task_type = ?");
        }
        query.push_str(" ORDER BY priority DESC, created_at ASC LIMIT ?");

        let mut q = sqlx::query_as::<_, TaskRow>(&query).bind(working_dir);
        if let Some(tt) = task_type {
            q = q.bind(tt);
        }
        let rows: Vec<TaskRow> = q.bind(limit as i64).fetch_all(&self.pool).await?;
        rows.into_iter().map(ProjectTask::try_from).collect()
    }

    async fn try_claim(
        &self,
        id: Uuid,
        claimant: TaskClaimant,
    ) -> DomainResult<Option<ProjectTask>> {
        // Guarded update: exactly one concurrent caller can match the ready,
        // unclaimed row. rows_affected == 0 means the race was lost (or the
        // task is absent / not ready); contended callers never block.
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE project_tasks
             SET status = 'claimed',
                 claimed_by_session_id = ?,
                 claimed_by_agent_id = ?,
                 claimed_at = ?,
                 attempt_count = attempt_count + 1,
                 updated_at = ?
             WHERE id = ? AND status = 'ready'
               AND claimed_by_session_id IS NULL AND claimed_by_agent_id IS NULL",
        )
        .bind(claimant.session_id().map(|u| u.to_string()))
        .bind(claimant.agent_id().map(|u| u.to_string()))
        .bind(&now)
        .bind(&now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get(id).await
    }

    async fn complete_and_refresh(&self, task: &ProjectTask) -> DomainResult<Vec<ProjectTask>> {
        let mut tx = self.pool.begin().await?;

        let result = update_task_query(task).execute(&mut *tx).await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::TaskNotFound(task.id));
        }

        // Dependents carry the completed id inside a JSON blocked_by column;
        // the blocked set is small, so fetch and filter here.
        let blocked_rows: Vec<TaskRow> =
            sqlx::query_as("SELECT * FROM project_tasks WHERE status = 'blocked'")
                .fetch_all(&mut *tx)
                .await?;

        let now = Utc::now();
        let mut newly_ready = Vec::new();

        for row in blocked_rows {
            let mut dependent = ProjectTask::try_from(row)?;
            if !dependent.blocked_by.contains(&task.id) {
                continue;
            }
            dependent.blocked_by.retain(|b| *b != task.id);
            dependent.updated_at = now;

            let still_blocked = if dependent.blocked_by.is_empty() {
                false
            } else {
                let remaining: Vec<String> =
                    dependent.blocked_by.iter().map(Uuid::to_string).collect();
                let placeholders = vec!["?"; remaining.len()].join(",");
                let query = format!(
                    "SELECT COUNT(*) FROM project_tasks WHERE id IN ({placeholders}) AND status != 'done'"
                );
                let mut q = sqlx::query_as::<_, (i64,)>(&query);
                for id in &remaining {
                    q = q.bind(id);
                }
                let (count,) = q.fetch_one(&mut *tx).await?;
                count > 0
            };

            if !still_blocked {
                dependent.status = TaskStatus::Ready;
            }

            update_task_query(&dependent).execute(&mut *tx).await?;
            if dependent.status == TaskStatus::Ready {
                newly_ready.push(dependent);
            }
        }

        tx.commit().await?;
        Ok(newly_ready)
    }
}

async fn insert_task(pool: &SqlitePool, task: &ProjectTask) -> DomainResult<()> {
    sqlx::query(
        r"INSERT INTO project_tasks (
            id, working_dir, title, description, acceptance_criteria, context_summary,
            scope_paths, required_tools, task_type, tags, estimated_effort, priority, status,
            claimed_by_session_id, claimed_by_agent_id, claimed_at, attempt_count,
            blocked_by, related_task_ids, created_by_session_id, created_by_agent_id,
            discovered_from_task_id, discovery_reason, outcome, completion_notes,
            files_changed, follow_up_task_ids, last_error, extra,
            created_at, updated_at, started_at, completed_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(task.id.to_string())
    .bind(&task.working_dir)
    .bind(&task.title)
    .bind(&task.description)
    .bind(&task.acceptance_criteria)
    .bind(&task.context_summary)
    .bind(string_list_json(&task.scope_paths)?)
    .bind(string_list_json(&task.required_tools)?)
    .bind(&task.task_type)
    .bind(string_list_json(&task.tags)?)
    .bind(&task.estimated_effort)
    .bind(task.priority)
    .bind(task.status.as_str())
    .bind(task.claimed_by_session_id.map(|u| u.to_string()))
    .bind(task.claimed_by_agent_id.map(|u| u.to_string()))
    .bind(task.claimed_at.map(|t| t.to_rfc3339()))
    .bind(i64::from(task.attempt_count))
    .bind(super::uuid_list_json(&task.blocked_by)?)
    .bind(super::uuid_list_json(&task.related_task_ids)?)
    .bind(task.created_by_session_id.map(|u| u.to_string()))
    .bind(task.created_by_agent_id.map(|u| u.to_string()))
    .bind(task.discovered_from_task_id.map(|u| u.to_string()))
    .bind(&task.discovery_reason)
    .bind(&task.outcome)
    .bind(&task.completion_notes)
    .bind(string_list_json(&task.files_changed)?)
    .bind(super::uuid_list_json(&task.follow_up_task_ids)?)
    .bind(&task.last_error)
    .bind(task.extra.as_ref().map(serde_json::Value::to_string))
    .bind(task.created_at.to_rfc3339())
    .bind(task.updated_at.to_rfc3339())
    .bind(task.started_at.map(|t| t.to_rfc3339()))
    .bind(task.completed_at.map(|t| t.to_rfc3339()))
    .execute(pool)
    .await?;
    Ok(())
}

/// Build the shared full-row UPDATE used by `update` and
/// `complete_and_refresh`.
fn update_task_query(
    task: &ProjectTask,
) -> sqlx::query::Query<'_, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'_>> {
    sqlx::query(
        r"UPDATE project_tasks SET
            working_dir = ?, title = ?, description = ?, acceptance_criteria = ?,
            context_summary = ?, scope_paths = ?, required_tools = ?, task_type = ?,
            tags = ?, estimated_effort = ?, priority = ?, status = ?,
            claimed_by_session_id = ?, claimed_by_agent_id = ?, claimed_at = ?,
            attempt_count = ?, blocked_by = ?, related_task_ids = ?,
            discovery_reason = ?, outcome = ?, completion_notes = ?, files_changed = ?,
            follow_up_task_ids = ?, last_error = ?, extra = ?,
            updated_at = ?, started_at = ?, completed_at = ?
          WHERE id = ?",
    )
    .bind(&task.working_dir)
    .bind(&task.title)
    .bind(&task.description)
    .bind(&task.acceptance_criteria)
    .bind(&task.context_summary)
    .bind(string_list_json(&task.scope_paths).unwrap_or(None))
    .bind(string_list_json(&task.required_tools).unwrap_or(None))
    .bind(&task.task_type)
    .bind(string_list_json(&task.tags).unwrap_or(None))
    .bind(&task.estimated_effort)
    .bind(task.priority)
    .bind(task.status.as_str())
    .bind(task.claimed_by_session_id.map(|u| u.to_string()))
    .bind(task.claimed_by_agent_id.map(|u| u.to_string()))
    .bind(task.claimed_at.map(|t| t.to_rfc3339()))
    .bind(i64::from(task.attempt_count))
    .bind(super::uuid_list_json(&task.blocked_by).unwrap_or(None))
    .bind(super::uuid_list_json(&task.related_task_ids).unwrap_or(None))
    .bind(&task.discovery_reason)
    .bind(&task.outcome)
    .bind(&task.completion_notes)
    .bind(string_list_json(&task.files_changed).unwrap_or(None))
    .bind(super::uuid_list_json(&task.follow_up_task_ids).unwrap_or(None))
    .bind(&task.last_error)
    .bind(task.extra.as_ref().map(serde_json::Value::to_string))
    .bind(task.updated_at.to_rfc3339())
    .bind(task.started_at.map(|t| t.to_rfc3339()))
    .bind(task.completed_at.map(|t| t.to_rfc3339()))
    .bind(task.id.to_string())
}

fn string_list_json(items: &[String]) -> DomainResult<Option<String>> {
    if items.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::to_string(items)?))
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    working_dir: String,
    title: String,
    description: Option<String>,
    acceptance_criteria: Option<String>,
    context_summary: Option<String>,
    scope_paths: Option<String>,
    required_tools: Option<String>,
    task_type: Option<String>,
    tags: Option<String>,
    estimated_effort: Option<String>,
    priority: i64,
    status: String,
    claimed_by_session_id: Option<String>,
    claimed_by_agent_id: Option<String>,
    claimed_at: Option<String>,
    attempt_count: i64,
    blocked_by: Option<String>,
    related_task_ids: Option<String>,
    created_by_session_id: Option<String>,
    created_by_agent_id: Option<String>,
    discovered_from_task_id: Option<String>,
    discovery_reason: Option<String>,
    outcome: Option<String>,
    completion_notes: Option<String>,
    files_changed: Option<String>,
    follow_up_task_ids: Option<String>,
    last_error: Option<String>,
    extra: Option<String>,
    created_at: String,
    updated_at: String,
    started_at: Option<String>,
    completed_at: Option<String>,
}

impl TryFrom<TaskRow> for ProjectTask {
    type Error = DomainError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let status = TaskStatus::from_str(&row.status)
            .ok_or_else(|| DomainError::Serialization(format!("Invalid status: {}", row.status)))?;

        let extra = row
            .extra
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(|e| DomainError::Serialization(e.to_string()))?;

        Ok(ProjectTask {
            id: super::parse_uuid(&row.id)?,
            working_dir: row.working_dir,
            title: row.title,
            description: row.description,
            acceptance_criteria: row.acceptance_criteria,
            context_summary: row.context_summary,
            scope_paths: super::parse_json_or_default(row.scope_paths)?,
            required_tools: super::parse_json_or_default(row.required_tools)?,
            task_type: row.task_type,
            tags: super::parse_json_or_default(row.tags)?,
            estimated_effort: row.estimated_effort,
            priority: row.priority,
            status,
            claimed_by_session_id: super::parse_optional_uuid(row.claimed_by_session_id)?,
            claimed_by_agent_id: super::parse_optional_uuid(row.claimed_by_agent_id)?,
            claimed_at: super::parse_optional_datetime(row.claimed_at)?,
            attempt_count: row.attempt_count as u32,
            blocked_by: super::parse_uuid_list(row.blocked_by)?,
            related_task_ids: super::parse_uuid_list(row.related_task_ids)?,
            created_by_session_id: super::parse_optional_uuid(row.created_by_session_id)?,
            created_by_agent_id: super::parse_optional_uuid(row.created_by_agent_id)?,
            discovered_from_task_id: super::parse_optional_uuid(row.discovered_from_task_id)?,
            discovery_reason: row.discovery_reason,
            outcome: row.outcome,
            completion_notes: row.completion_notes,
            files_changed: super::parse_json_or_default(row.files_changed)?,
            follow_up_task_ids: super::parse_uuid_list(row.follow_up_task_ids)?,
            last_error: row.last_error,
            extra,
            created_at: super::parse_datetime(&row.created_at)?,
            updated_at: super::parse_datetime(&row.updated_at)?,
            started_at: super::parse_optional_datetime(row.started_at)?,
            completed_at: super::parse_optional_datetime(row.completed_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;

    async fn setup() -> SqliteTaskRepository {
        let pool = create_migrated_test_pool().await.unwrap();
        SqliteTaskRepository::new(pool)
    }

    #[tokio::test]
    async fn create_and_get_round_trip() {
        let repo = setup().await;
        let task = ProjectTask::new("/tmp/project", "Write docs")
            .with_description("Document the work queue")
            .with_tags(vec!["docs".into()])
            .with_status(TaskStatus::Ready);

        repo.create(&task).await.unwrap();
        let fetched = repo.get(task.id).await.unwrap().unwrap();
        assert_eq!(fetched.title, "Write docs");
        assert_eq!(fetched.status, TaskStatus::Ready);
        assert_eq!(fetched.tags, vec!["docs".to_string()]);
    }

    #[tokio::test]
    async fn try_claim_wins_once() {
        let repo = setup().await;
        let task = ProjectTask::new("/tmp/p", "Claim me").with_status(TaskStatus::Ready);
        repo.create(&task).await.unwrap();

        let session = Uuid::new_v4();
        let first = repo.try_claim(task.id, TaskClaimant::Session(session)).await.unwrap();
        assert!(first.is_some());
        let claimed = first.unwrap();
        assert_eq!(claimed.status, TaskStatus::Claimed);
        assert_eq!(claimed.claimed_by_session_id, Some(session));
        assert_eq!(claimed.attempt_count, 1);

        let second = repo.try_claim(task.id, TaskClaimant::Agent(Uuid::new_v4())).await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn try_claim_skips_non_ready() {
        let repo = setup().await;
        let task = ProjectTask::new("/tmp/p", "Backlogged");
        repo.create(&task).await.unwrap();
        let result = repo.try_claim(task.id, TaskClaimant::Agent(Uuid::new_v4())).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn complete_and_refresh_promotes_dependents() {
        let repo = setup().await;
        let a = ProjectTask::new("/tmp/p", "A").with_status(TaskStatus::Ready);
        let b = ProjectTask::new("/tmp/p", "B")
            .with_blocked_by(vec![a.id])
            .with_status(TaskStatus::Blocked);
        repo.create(&a).await.unwrap();
        repo.create(&b).await.unwrap();

        let mut done = a.clone();
        done.status = TaskStatus::Done;
        done.completed_at = Some(Utc::now());
        let ready = repo.complete_and_refresh(&done).await.unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].id, b.id);
        assert!(ready[0].blocked_by.is_empty());

        let b_after = repo.get(b.id).await.unwrap().unwrap();
        assert_eq!(b_after.status, TaskStatus::Ready);
    }

    #[tokio::test]
    async fn ready_tasks_respects_priority_order() {
        let repo = setup().await;
        let low = ProjectTask::new("/tmp/p", "low").with_status(TaskStatus::Ready);
        let high = ProjectTask::new("/tmp/p", "high")
            .with_priority(10)
            .with_status(TaskStatus::Ready);
        repo.create(&low).await.unwrap();
        repo.create(&high).await.unwrap();

        let ready = repo.ready_tasks("/tmp/p", None, 10).await.unwrap();
        assert_eq!(ready.len(), 2);
        assert_eq!(ready[0].title, "high");
    }

    #[tokio::test]
    async fn list_counts_and_paginates() {
        let repo = setup().await;
        for i in 0..5 {
            let task = ProjectTask::new("/tmp/p", format!("t{i}")).with_status(TaskStatus::Ready);
            repo.create(&task).await.unwrap();
        }
        let filter = TaskFilter {
            working_dir: Some("/tmp/p".into()),
            limit: 2,
            ..TaskFilter::default()
        };
        let (page, total) = repo.list(&filter).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(total, 5);
    }
}
