//! SQLite implementation of the mission repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Mission, MissionExecution, MissionExecutionStatus, MissionStatus, MissionTrigger,
};
use crate::domain::ports::MissionRepository;

#[derive(Clone)]
pub struct SqliteMissionRepository {
    pool: SqlitePool,
}

impl SqliteMissionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MissionRepository for SqliteMissionRepository {
    async fn create(&self, mission: &Mission) -> DomainResult<()> {
        sqlx::query(
            r"INSERT INTO missions (
                id, name, prompt, cron_expression, schedule_natural, timezone, status,
                next_execution_at, last_execution_at, working_dir, personality,
                allowed_tools, model, user_id, sandbox_mode, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(mission.id.to_string())
        .bind(&mission.name)
        .bind(&mission.prompt)
        .bind(&mission.cron_expression)
        .bind(&mission.schedule_natural)
        .bind(&mission.timezone)
        .bind(mission.status.as_str())
        .bind(mission.next_execution_at.map(|t| t.to_rfc3339()))
        .bind(mission.last_execution_at.map(|t| t.to_rfc3339()))
        .bind(&mission.working_dir)
        .bind(&mission.personality)
        .bind(tools_json(&mission.allowed_tools)?)
        .bind(&mission.model)
        .bind(&mission.user_id)
        .bind(i32::from(mission.sandbox_mode))
        .bind(mission.created_at.to_rfc3339())
        .bind(mission.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Mission>> {
        let row: Option<MissionRow> = sqlx::query_as("SELECT * FROM missions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Mission::try_from).transpose()
    }

    async fn update(&self, mission: &Mission) -> DomainResult<()> {
        let result = sqlx::query(
            r"UPDATE missions SET
                name = ?, prompt = ?, cron_expression = ?, schedule_natural = ?,
                timezone = ?, status = ?, next_execution_at = ?, last_execution_at = ?,
                working_dir = ?, personality = ?, allowed_tools = ?, model = ?,
                user_id = ?, sandbox_mode = ?, updated_at = ?
              WHERE id = ?",
        )
        .bind(&mission.name)
        .bind(&mission.prompt)
        .bind(&mission.cron_expression)
        .bind(&mission.schedule_natural)
        .bind(&mission.timezone)
        .bind(mission.status.as_str())
        .bind(mission.next_execution_at.map(|t| t.to_rfc3339()))
        .bind(mission.last_execution_at.map(|t| t.to_rfc3339()))
        .bind(&mission.working_dir)
        .bind(&mission.personality)
        .bind(tools_json(&mission.allowed_tools)?)
        .bind(&mission.model)
        .bind(&mission.user_id)
        .bind(i32::from(mission.sandbox_mode))
        .bind(mission.updated_at.to_rfc3339())
        .bind(mission.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::MissionNotFound(mission.id));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> DomainResult<bool> {
        let result = sqlx::query("DELETE FROM missions WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, status: Option<MissionStatus>) -> DomainResult<Vec<Mission>> {
        let rows: Vec<MissionRow> = match status {
            Some(status) => {
                sqlx::query_as("SELECT * FROM missions WHERE status = ? ORDER BY created_at DESC")
                    .bind(status.as_str())
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_as("SELECT * FROM missions ORDER BY created_at DESC")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.into_iter().map(Mission::try_from).collect()
    }

    async fn due_missions(&self, now: DateTime<Utc>) -> DomainResult<Vec<Mission>> {
        let rows: Vec<MissionRow> = sqlx::query_as(
            "SELECT * FROM missions
             WHERE status = 'active' AND next_execution_at IS NOT NULL AND next_execution_at <= ?
             ORDER BY next_execution_at ASC",
        )
        .bind(now.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Mission::try_from).collect()
    }

    async fn create_execution(&self, execution: &MissionExecution) -> DomainResult<()> {
        sqlx::query(
            r"INSERT INTO mission_executions (
                id, mission_id, trigger_type, triggered_by, status, started_at,
                completed_at, output_text, output_summary, tool_count, error_message, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(execution.id.to_string())
        .bind(execution.mission_id.to_string())
        .bind(execution.trigger.as_str())
        .bind(&execution.triggered_by)
        .bind(execution.status.as_str())
        .bind(execution.started_at.map(|t| t.to_rfc3339()))
        .bind(execution.completed_at.map(|t| t.to_rfc3339()))
        .bind(&execution.output_text)
        .bind(&execution.output_summary)
        .bind(i64::from(execution.tool_count))
        .bind(&execution.error_message)
        .bind(execution.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_execution(&self, execution: &MissionExecution) -> DomainResult<()> {
        let result = sqlx::query(
            r"UPDATE mission_executions SET
                status = ?, started_at = ?, completed_at = ?, output_text = ?,
                output_summary = ?, tool_count = ?, error_message = ?
              WHERE id = ?",
        )
        .bind(execution.status.as_str())
        .bind(execution.started_at.map(|t| t.to_rfc3339()))
        .bind(execution.completed_at.map(|t| t.to_rfc3339()))
        .bind(&execution.output_text)
        .bind(&execution.output_summary)
        .bind(i64::from(execution.tool_count))
        .bind(&execution.error_message)
        .bind(execution.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::ExecutionNotFound(execution.id));
        }
        Ok(())
    }

    async fn get_execution(&self, id: Uuid) -> DomainResult<Option<MissionExecution>> {
        let row: Option<ExecutionRow> =
            sqlx::query_as("SELECT * FROM mission_executions WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        row.map(MissionExecution::try_from).transpose()
    }

    async fn list_executions(
        &self,
        mission_id: Uuid,
        limit: usize,
    ) -> DomainResult<Vec<MissionExecution>> {
        let rows: Vec<ExecutionRow> = sqlx::query_as(
            "SELECT * FROM mission_executions WHERE mission_id = ?
             ORDER BY created_at DESC LIMIT ?",
        )
        .bind(mission_id.to_string())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(MissionExecution::try_from).collect()
    }
}

fn tools_json(tools: &[String]) -> DomainResult<Option<String>> {
    if tools.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::to_string(tools)?))
}

#[derive(sqlx::FromRow)]
struct MissionRow {
    id: String,
    name: String,
    prompt: String,
    cron_expression: String,
    schedule_natural: Option<String>,
    timezone: String,
    status: String,
    next_execution_at: Option<String>,
    last_execution_at: Option<String>,
    working_dir: String,
    personality: Option<String>,
    allowed_tools: Option<String>,
    model: Option<String>,
    user_id: Option<String>,
    sandbox_mode: i32,
    created_at: String,
    updated_at: String,
}

impl TryFrom<MissionRow> for Mission {
    type Error = DomainError;

    fn try_from(row: MissionRow) -> Result<Self, Self::Error> {
        let status = MissionStatus::from_str(&row.status)
            .ok_or_else(|| DomainError::Serialization(format!("Invalid status: {}", row.status)))?;
        Ok(Mission {
            id: super::parse_uuid(&row.id)?,
            name: row.name,
            prompt: row.prompt,
            cron_expression: row.cron_expression,
            schedule_natural: row.schedule_natural,
            timezone: row.timezone,
            status,
            next_execution_at: super::parse_optional_datetime(row.next_execution_at)?,
            last_execution_at: super::parse_optional_datetime(row.last_execution_at)?,
            working_dir: row.working_dir,
            personality: row.personality,
            allowed_tools: super::parse_json_or_default(row.allowed_tools)?,
            model: row.model,
            user_id: row.user_id,
            sandbox_mode: row.sandbox_mode != 0,
            created_at: super::parse_datetime(&row.created_at)?,
            updated_at: super::parse_datetime(&row.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ExecutionRow {
    id: String,
    mission_id: String,
    trigger_type: String,
    triggered_by: Option<String>,
    status: String,
    started_at: Option<String>,
    completed_at: Option<String>,
    output_text: Option<String>,
    output_summary: Option<String>,
    tool_count: i64,
    error_message: Option<String>,
    created_at: String,
}

impl TryFrom<ExecutionRow> for MissionExecution {
    type Error = DomainError;

    fn try_from(row: ExecutionRow) -> Result<Self, Self::Error> {
        let trigger = MissionTrigger::from_str(&row.trigger_type).ok_or_else(|| {
            DomainError::Serialization(format!("Invalid trigger: {}", row.trigger_type))
        })?;
        let status = MissionExecutionStatus::from_str(&row.status)
            .ok_or_else(|| DomainError::Serialization(format!("Invalid status: {}", row.status)))?;
        Ok(MissionExecution {
            id: super::parse_uuid(&row.id)?,
            mission_id: super::parse_uuid(&row.mission_id)?,
            trigger,
            triggered_by: row.triggered_by,
            status,
            started_at: super::parse_optional_datetime(row.started_at)?,
            completed_at: super::parse_optional_datetime(row.completed_at)?,
            output_text: row.output_text,
            output_summary: row.output_summary,
            tool_count: row.tool_count as u32,
            error_message: row.error_message,
            created_at: super::parse_datetime(&row.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;

    async fn setup() -> SqliteMissionRepository {
        let pool = create_migrated_test_pool().await.unwrap();
        SqliteMissionRepository::new(pool)
    }

    #[tokio::test]
    async fn create_get_round_trip() {
        let repo = setup().await;
        let mission = Mission::new("daily-review", "Review things", "0 8 * * *", "/tmp")
            .with_timezone("America/New_York");
        repo.create(&mission).await.unwrap();

        let fetched = repo.get(mission.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "daily-review");
        assert_eq!(fetched.timezone, "America/New_York");
        assert_eq!(fetched.status, MissionStatus::Active);
    }

    #[tokio::test]
    async fn due_missions_filters_on_time_and_status() {
        let repo = setup().await;
        let mut due = Mission::new("due", "p", "0 8 * * *", "/tmp");
        due.next_execution_at = Some(Utc::now() - chrono::Duration::minutes(1));
        let mut future = Mission::new("future", "p", "0 8 * * *", "/tmp");
        future.next_execution_at = Some(Utc::now() + chrono::Duration::hours(1));
        let mut paused = Mission::new("paused", "p", "0 8 * * *", "/tmp");
        paused.next_execution_at = Some(Utc::now() - chrono::Duration::minutes(1));
        paused.status = MissionStatus::Paused;

        repo.create(&due).await.unwrap();
        repo.create(&future).await.unwrap();
        repo.create(&paused).await.unwrap();

        let found = repo.due_missions(Utc::now()).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "due");
    }

    #[tokio::test]
    async fn execution_lifecycle() {
        let repo = setup().await;
        let mission = Mission::new("m", "p", "0 8 * * *", "/tmp");
        repo.create(&mission).await.unwrap();

        let mut exec = MissionExecution::started(mission.id, MissionTrigger::Manual, Some("user".into()));
        repo.create_execution(&exec).await.unwrap();

        exec.status = MissionExecutionStatus::Completed;
        exec.completed_at = Some(Utc::now());
        exec.output_text = Some("all done".into());
        exec.tool_count = 3;
        repo.update_execution(&exec).await.unwrap();

        let fetched = repo.get_execution(exec.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, MissionExecutionStatus::Completed);
        assert_eq!(fetched.tool_count, 3);

        let list = repo.list_executions(mission.id, 10).await.unwrap();
        assert_eq!(list.len(), 1);
    }
}
