//! SQLite implementation of the swarm repository.

use async_trait::async_trait;
use sqlx::{Executor, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    DependencySpec, ScratchpadEntry, Swarm, SwarmAgent, SwarmAgentStatus, SwarmStatus,
};
use crate::domain::ports::SwarmRepository;

#[derive(Clone)]
pub struct SqliteSwarmRepository {
    pool: SqlitePool,
}

impl SqliteSwarmRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SwarmRepository for SqliteSwarmRepository {
    async fn create(&self, swarm: &Swarm, agents: &[SwarmAgent]) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r"INSERT INTO swarms (
                id, name, description, parent_session_id, working_dir,
                git_branch_prefix, base_branch, skip_synthesis_on_failure,
                status, created_at, started_at, completed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(swarm.id.to_string())
        .bind(&swarm.name)
        .bind(&swarm.description)
        .bind(swarm.parent_session_id.map(|u| u.to_string()))
        .bind(&swarm.working_dir)
        .bind(&swarm.git_branch_prefix)
        .bind(&swarm.base_branch)
        .bind(i32::from(swarm.skip_synthesis_on_failure))
        .bind(swarm.status.as_str())
        .bind(swarm.created_at.to_rfc3339())
        .bind(swarm.started_at.map(|t| t.to_rfc3339()))
        .bind(swarm.completed_at.map(|t| t.to_rfc3339()))
        .execute(&mut *tx)
        .await?;

        for agent in agents {
            insert_agent(&mut *tx, agent).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Swarm>> {
        let row: Option<SwarmRow> = sqlx::query_as("SELECT * FROM swarms WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Swarm::try_from).transpose()
    }

    async fn update(&self, swarm: &Swarm) -> DomainResult<()> {
        let result = sqlx::query(
            r"UPDATE swarms SET
                name = ?, description = ?, status = ?, started_at = ?, completed_at = ?
              WHERE id = ?",
        )
        .bind(&swarm.name)
        .bind(&swarm.description)
        .bind(swarm.status.as_str())
        .bind(swarm.started_at.map(|t| t.to_rfc3339()))
        .bind(swarm.completed_at.map(|t| t.to_rfc3339()))
        .bind(swarm.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::SwarmNotFound(swarm.id));
        }
        Ok(())
    }

    async fn list(&self, status: Option<SwarmStatus>, limit: usize) -> DomainResult<Vec<Swarm>> {
        let rows: Vec<SwarmRow> = match status {
            Some(status) => {
                sqlx::query_as(
                    "SELECT * FROM swarms WHERE status = ? ORDER BY created_at DESC LIMIT ?",
                )
                .bind(status.as_str())
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as("SELECT * FROM swarms ORDER BY created_at DESC LIMIT ?")
                    .bind(limit as i64)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.into_iter().map(Swarm::try_from).collect()
    }

    async fn agents(&self, swarm_id: Uuid) -> DomainResult<Vec<SwarmAgent>> {
        let rows: Vec<AgentRow> = sqlx::query_as(
            "SELECT * FROM swarm_agents WHERE swarm_id = ? ORDER BY created_at ASC",
        )
        .bind(swarm_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(SwarmAgent::try_from).collect()
    }

    async fn agent_by_name(&self, swarm_id: Uuid, name: &str) -> DomainResult<Option<SwarmAgent>> {
        let row: Option<AgentRow> =
            sqlx::query_as("SELECT * FROM swarm_agents WHERE swarm_id = ? AND name = ?")
                .bind(swarm_id.to_string())
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        row.map(SwarmAgent::try_from).transpose()
    }

    async fn update_agent(&self, agent: &SwarmAgent) -> DomainResult<()> {
        let result = sqlx::query(
            r"UPDATE swarm_agents SET
                git_branch = ?, depends_on = ?, session_id = ?, status = ?,
                output = ?, summary = ?, error = ?, tool_count = ?,
                started_at = ?, completed_at = ?
              WHERE id = ?",
        )
        .bind(&agent.git_branch)
        .bind(deps_json(&agent.depends_on)?)
        .bind(agent.session_id.map(|u| u.to_string()))
        .bind(agent.status.as_str())
        .bind(&agent.output)
        .bind(&agent.summary)
        .bind(&agent.error)
        .bind(i64::from(agent.tool_count))
        .bind(agent.started_at.map(|t| t.to_rfc3339()))
        .bind(agent.completed_at.map(|t| t.to_rfc3339()))
        .bind(agent.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::SwarmAgentNotFound(agent.name.clone()));
        }
        Ok(())
    }

    async fn agent_by_session(&self, session_id: Uuid) -> DomainResult<Option<SwarmAgent>> {
        let row: Option<AgentRow> =
            sqlx::query_as("SELECT * FROM swarm_agents WHERE session_id = ?")
                .bind(session_id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        row.map(SwarmAgent::try_from).transpose()
    }

    async fn scratchpad_get(
        &self,
        swarm_id: Uuid,
        key: &str,
    ) -> DomainResult<Option<ScratchpadEntry>> {
        let row: Option<ScratchpadRow> =
            sqlx::query_as("SELECT * FROM swarm_scratchpad WHERE swarm_id = ? AND key = ?")
                .bind(swarm_id.to_string())
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        row.map(ScratchpadEntry::try_from).transpose()
    }

    async fn scratchpad_put(&self, entry: &ScratchpadEntry) -> DomainResult<()> {
        // Last-writer-wins upsert; created_at survives updates.
        sqlx::query(
            r"INSERT INTO swarm_scratchpad
                (swarm_id, key, value, set_by_agent_id, set_by_agent_name, created_at, updated_at)
              VALUES (?, ?, ?, ?, ?, ?, ?)
              ON CONFLICT(swarm_id, key) DO UPDATE SET
                value = excluded.value,
                set_by_agent_id = excluded.set_by_agent_id,
                set_by_agent_name = excluded.set_by_agent_name,
                updated_at = excluded.updated_at",
        )
        .bind(entry.swarm_id.to_string())
        .bind(&entry.key)
        .bind(entry.value.to_string())
        .bind(entry.set_by_agent_id.map(|u| u.to_string()))
        .bind(&entry.set_by_agent_name)
        .bind(entry.created_at.to_rfc3339())
        .bind(entry.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn scratchpad_list(
        &self,
        swarm_id: Uuid,
        prefix: Option<&str>,
    ) -> DomainResult<Vec<ScratchpadEntry>> {
        let rows: Vec<ScratchpadRow> = match prefix {
            Some(prefix) => {
                let pattern = format!("{}%", prefix.replace('%', "\\%").replace('_', "\\_"));
                sqlx::query_as(
                    "SELECT * FROM swarm_scratchpad
                     WHERE swarm_id = ? AND key LIKE ? ESCAPE '\\' ORDER BY key",
                )
                .bind(swarm_id.to_string())
                .bind(pattern)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as("SELECT * FROM swarm_scratchpad WHERE swarm_id = ? ORDER BY key")
                    .bind(swarm_id.to_string())
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.into_iter().map(ScratchpadEntry::try_from).collect()
    }

    async fn scratchpad_delete(&self, swarm_id: Uuid, key: &str) -> DomainResult<bool> {
        let result = sqlx::query("DELETE FROM swarm_scratchpad WHERE swarm_id = ? AND key = ?")
            .bind(swarm_id.to_string())
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

async fn insert_agent<'e, E>(executor: E, agent: &SwarmAgent) -> DomainResult<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r"INSERT INTO swarm_agents (
            id, swarm_id, name, role, prompt, personality, plugins, model, git_branch,
            depends_on, session_id, status, output, summary, error, tool_count,
            created_at, started_at, completed_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(agent.id.to_string())
    .bind(agent.swarm_id.to_string())
    .bind(&agent.name)
    .bind(&agent.role)
    .bind(&agent.prompt)
    .bind(&agent.personality)
    .bind(if agent.plugins.is_empty() {
        None
    } else {
        Some(serde_json::to_string(&agent.plugins)?)
    })
    .bind(&agent.model)
    .bind(&agent.git_branch)
    .bind(deps_json(&agent.depends_on)?)
    .bind(agent.session_id.map(|u| u.to_string()))
    .bind(agent.status.as_str())
    .bind(&agent.output)
    .bind(&agent.summary)
    .bind(&agent.error)
    .bind(i64::from(agent.tool_count))
    .bind(agent.created_at.to_rfc3339())
    .bind(agent.started_at.map(|t| t.to_rfc3339()))
    .bind(agent.completed_at.map(|t| t.to_rfc3339()))
    .execute(executor)
    .await?;
    Ok(())
}

fn deps_json(deps: &[DependencySpec]) -> DomainResult<Option<String>> {
    if deps.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::to_string(deps)?))
}

#[derive(sqlx::FromRow)]
struct SwarmRow {
    id: String,
    name: String,
    description: Option<String>,
    parent_session_id: Option<String>,
    working_dir: String,
    git_branch_prefix: Option<String>,
    base_branch: Option<String>,
    skip_synthesis_on_failure: i32,
    status: String,
    created_at: String,
    started_at: Option<String>,
    completed_at: Option<String>,
}

impl TryFrom<SwarmRow> for Swarm {
    type Error = DomainError;

    fn try_from(row: SwarmRow) -> Result<Self, Self::Error> {
        let status = SwarmStatus::from_str(&row.status)
            .ok_or_else(|| DomainError::Serialization(format!("Invalid status: {}", row.status)))?;
        Ok(Swarm {
            id: super::parse_uuid(&row.id)?,
            name: row.name,
            description: row.description,
            parent_session_id: super::parse_optional_uuid(row.parent_session_id)?,
            working_dir: row.working_dir,
            git_branch_prefix: row.git_branch_prefix,
            base_branch: row.base_branch,
            skip_synthesis_on_failure: row.skip_synthesis_on_failure != 0,
            status,
            created_at: super::parse_datetime(&row.created_at)?,
            started_at: super::parse_optional_datetime(row.started_at)?,
            completed_at: super::parse_optional_datetime(row.completed_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AgentRow {
    id: String,
    swarm_id: String,
    name: String,
    role: Option<String>,
    prompt: String,
    personality: Option<String>,
    plugins: Option<String>,
    model: Option<String>,
    git_branch: Option<String>,
    depends_on: Option<String>,
    session_id: Option<String>,
    status: String,
    output: Option<String>,
    summary: Option<String>,
    error: Option<String>,
    tool_count: i64,
    created_at: String,
    started_at: Option<String>,
    completed_at: Option<String>,
}

impl TryFrom<AgentRow> for SwarmAgent {
    type Error = DomainError;

    fn try_from(row: AgentRow) -> Result<Self, Self::Error> {
        let status = SwarmAgentStatus::from_str(&row.status)
            .ok_or_else(|| DomainError::Serialization(format!("Invalid status: {}", row.status)))?;
        Ok(SwarmAgent {
            id: super::parse_uuid(&row.id)?,
            swarm_id: super::parse_uuid(&row.swarm_id)?,
            name: row.name,
            role: row.role,
            prompt: row.prompt,
            personality: row.personality,
            plugins: super::parse_json_or_default(row.plugins)?,
            model: row.model,
            git_branch: row.git_branch,
            depends_on: super::parse_json_or_default(row.depends_on)?,
            session_id: super::parse_optional_uuid(row.session_id)?,
            status,
            output: row.output,
            summary: row.summary,
            error: row.error,
            tool_count: row.tool_count as u32,
            created_at: super::parse_datetime(&row.created_at)?,
            started_at: super::parse_optional_datetime(row.started_at)?,
            completed_at: super::parse_optional_datetime(row.completed_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ScratchpadRow {
    swarm_id: String,
    key: String,
    value: String,
    set_by_agent_id: Option<String>,
    set_by_agent_name: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<ScratchpadRow> for ScratchpadEntry {
    type Error = DomainError;

    fn try_from(row: ScratchpadRow) -> Result<Self, Self::Error> {
        Ok(ScratchpadEntry {
            swarm_id: super::parse_uuid(&row.swarm_id)?,
            key: row.key,
            value: serde_json::from_str(&row.value)
                .map_err(|e| DomainError::Serialization(e.to_string()))?,
            set_by_agent_id: super::parse_optional_uuid(row.set_by_agent_id)?,
            set_by_agent_name: row.set_by_agent_name,
            created_at: super::parse_datetime(&row.created_at)?,
            updated_at: super::parse_datetime(&row.updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use crate::domain::models::AgentSpec;
    use chrono::Utc;

    async fn setup() -> SqliteSwarmRepository {
        let pool = create_migrated_test_pool().await.unwrap();
        SqliteSwarmRepository::new(pool)
    }

    fn swarm_with_agents(names: &[&str]) -> (Swarm, Vec<SwarmAgent>) {
        let swarm = Swarm::new("test-swarm", "/tmp/p");
        let agents = names
            .iter()
            .map(|n| SwarmAgent::from_spec(swarm.id, &AgentSpec::new(*n, format!("prompt {n}"))))
            .collect();
        (swarm, agents)
    }

    #[tokio::test]
    async fn create_and_fetch_agents() {
        let repo = setup().await;
        let (swarm, agents) = swarm_with_agents(&["a", "b"]);
        repo.create(&swarm, &agents).await.unwrap();

        let fetched = repo.agents(swarm.id).await.unwrap();
        assert_eq!(fetched.len(), 2);
        let by_name = repo.agent_by_name(swarm.id, "a").await.unwrap();
        assert!(by_name.is_some());
    }

    #[tokio::test]
    async fn duplicate_agent_names_rejected() {
        let repo = setup().await;
        let (swarm, agents) = swarm_with_agents(&["dup", "dup"]);
        let result = repo.create(&swarm, &agents).await;
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn agent_by_session_lookup() {
        let repo = setup().await;
        let (swarm, mut agents) = swarm_with_agents(&["a"]);
        let session_id = Uuid::new_v4();
        agents[0].session_id = Some(session_id);
        repo.create(&swarm, &agents).await.unwrap();

        let found = repo.agent_by_session(session_id).await.unwrap();
        assert_eq!(found.map(|a| a.name), Some("a".to_string()));
        assert!(repo.agent_by_session(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn scratchpad_last_writer_wins() {
        let repo = setup().await;
        let (swarm, agents) = swarm_with_agents(&["a"]);
        repo.create(&swarm, &agents).await.unwrap();

        let now = Utc::now();
        let first = ScratchpadEntry {
            swarm_id: swarm.id,
            key: "findings/risk".into(),
            value: serde_json::json!({"level": "low"}),
            set_by_agent_id: Some(agents[0].id),
            set_by_agent_name: Some("a".into()),
            created_at: now,
            updated_at: now,
        };
        repo.scratchpad_put(&first).await.unwrap();

        let mut second = first.clone();
        second.value = serde_json::json!({"level": "high"});
        repo.scratchpad_put(&second).await.unwrap();

        let got = repo.scratchpad_get(swarm.id, "findings/risk").await.unwrap().unwrap();
        assert_eq!(got.value["level"], "high");

        let listed = repo.scratchpad_list(swarm.id, Some("findings/")).await.unwrap();
        assert_eq!(listed.len(), 1);
        let missed = repo.scratchpad_list(swarm.id, Some("other/")).await.unwrap();
        assert!(missed.is_empty());

        assert!(repo.scratchpad_delete(swarm.id, "findings/risk").await.unwrap());
        assert!(!repo.scratchpad_delete(swarm.id, "findings/risk").await.unwrap());
    }
}
