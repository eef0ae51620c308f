//! Embedded SQLite schema migrations.

use sqlx::SqlitePool;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Failed to execute migration {version}: {source}")]
    ExecutionError {
        version: i64,
        #[source]
        source: sqlx::Error,
    },
    #[error("Failed to get schema version: {0}")]
    VersionCheckError(#[source] sqlx::Error),
}

#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i64,
    pub description: String,
    pub sql: String,
}

pub struct Migrator {
    pool: SqlitePool,
}

impl Migrator {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn run_embedded_migrations(
        &self,
        migrations: Vec<Migration>,
    ) -> Result<usize, MigrationError> {
        self.ensure_migrations_table().await?;
        let current_version = self.get_current_version().await?;
        let pending: Vec<_> = migrations
            .into_iter()
            .filter(|m| m.version > current_version)
            .collect();

        if pending.is_empty() {
            return Ok(0);
        }

        for migration in &pending {
            self.apply_migration(migration).await?;
        }

        Ok(pending.len())
    }

    async fn ensure_migrations_table(&self) -> Result<(), MigrationError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT (datetime('now')),
                description TEXT
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MigrationError::ExecutionError { version: 0, source: e })?;
        Ok(())
    }

    pub async fn get_current_version(&self) -> Result<i64, MigrationError> {
        let row: (Option<i64>,) =
            sqlx::query_as("SELECT MAX(version) FROM schema_migrations")
                .fetch_one(&self.pool)
                .await
                .map_err(MigrationError::VersionCheckError)?;
        Ok(row.0.unwrap_or(0))
    }

    async fn apply_migration(&self, migration: &Migration) -> Result<(), MigrationError> {
        tracing::info!(
            version = migration.version,
            description = %migration.description,
            "Applying migration"
        );

        // SQLite cannot run multiple statements in one prepared query;
        // split on the statement separator.
        for statement in migration.sql.split(';') {
            let statement = statement.trim();
            if statement.is_empty() {
                continue;
            }
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| MigrationError::ExecutionError {
                    version: migration.version,
                    source: e,
                })?;
        }

        sqlx::query("INSERT INTO schema_migrations (version, description) VALUES (?, ?)")
            .bind(migration.version)
            .bind(&migration.description)
            .execute(&self.pool)
            .await
            .map_err(|e| MigrationError::ExecutionError {
                version: migration.version,
                source: e,
            })?;

        Ok(())
    }
}

pub fn all_embedded_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "sessions and conversations".to_string(),
            sql: r"
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                working_dir TEXT NOT NULL,
                started_at TEXT NOT NULL,
                ended_at TEXT,
                last_activity TEXT NOT NULL,
                personality TEXT,
                medium TEXT,
                user_id TEXT,
                parent_session_id TEXT,
                external_session_id TEXT
            );
            CREATE INDEX IF NOT EXISTS sessions_working_dir_idx ON sessions(working_dir);
            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                role TEXT NOT NULL,
                text TEXT NOT NULL,
                medium TEXT,
                user_id TEXT,
                timestamp TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS conversations_session_idx ON conversations(session_id)
            "
            .to_string(),
        },
        Migration {
            version: 2,
            description: "project task work queue".to_string(),
            sql: r"
            CREATE TABLE IF NOT EXISTS project_tasks (
                id TEXT PRIMARY KEY,
                working_dir TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                acceptance_criteria TEXT,
                context_summary TEXT,
                scope_paths TEXT,
                required_tools TEXT,
                task_type TEXT,
                tags TEXT,
                estimated_effort TEXT,
                priority INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL,
                claimed_by_session_id TEXT,
                claimed_by_agent_id TEXT,
                claimed_at TEXT,
                attempt_count INTEGER NOT NULL DEFAULT 0,
                blocked_by TEXT,
                related_task_ids TEXT,
                created_by_session_id TEXT,
                created_by_agent_id TEXT,
                discovered_from_task_id TEXT,
                discovery_reason TEXT,
                outcome TEXT,
                completion_notes TEXT,
                files_changed TEXT,
                follow_up_task_ids TEXT,
                last_error TEXT,
                extra TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                started_at TEXT,
                completed_at TEXT
            );
            CREATE INDEX IF NOT EXISTS project_tasks_working_dir_idx ON project_tasks(working_dir);
            CREATE INDEX IF NOT EXISTS project_tasks_status_idx ON project_tasks(status)
            "
            .to_string(),
        },
        Migration {
            version: 3,
            description: "missions and executions".to_string(),
            sql: r"
            CREATE TABLE IF NOT EXISTS missions (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                prompt TEXT NOT NULL,
                cron_expression TEXT NOT NULL,
                schedule_natural TEXT,
                timezone TEXT NOT NULL DEFAULT 'UTC',
                status TEXT NOT NULL,
                next_execution_at TEXT,
                last_execution_at TEXT,
                working_dir TEXT NOT NULL,
                personality TEXT,
                allowed_tools TEXT,
                model TEXT,
                user_id TEXT,
                sandbox_mode INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS missions_status_idx ON missions(status);
            CREATE TABLE IF NOT EXISTS mission_executions (
                id TEXT PRIMARY KEY,
                mission_id TEXT NOT NULL REFERENCES missions(id) ON DELETE CASCADE,
                trigger_type TEXT NOT NULL,
                triggered_by TEXT,
                status TEXT NOT NULL,
                started_at TEXT,
                completed_at TEXT,
                output_text TEXT,
                output_summary TEXT,
                tool_count INTEGER NOT NULL DEFAULT 0,
                error_message TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS mission_executions_mission_idx ON mission_executions(mission_id)
            "
            .to_string(),
        },
        Migration {
            version: 4,
            description: "swarms, agents, scratchpad".to_string(),
            sql: r"
            CREATE TABLE IF NOT EXISTS swarms (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT,
                parent_session_id TEXT,
                working_dir TEXT NOT NULL,
                git_branch_prefix TEXT,
                base_branch TEXT,
                skip_synthesis_on_failure INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                started_at TEXT,
                completed_at TEXT
            );
            CREATE TABLE IF NOT EXISTS swarm_agents (
                id TEXT PRIMARY KEY,
                swarm_id TEXT NOT NULL REFERENCES swarms(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                role TEXT,
                prompt TEXT NOT NULL,
                personality TEXT,
                plugins TEXT,
                model TEXT,
                git_branch TEXT,
                depends_on TEXT,
                session_id TEXT,
                status TEXT NOT NULL,
                output TEXT,
                summary TEXT,
                error TEXT,
                tool_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                started_at TEXT,
                completed_at TEXT,
                UNIQUE(swarm_id, name)
            );
            CREATE INDEX IF NOT EXISTS swarm_agents_swarm_idx ON swarm_agents(swarm_id);
            CREATE INDEX IF NOT EXISTS swarm_agents_session_idx ON swarm_agents(session_id);
            CREATE TABLE IF NOT EXISTS swarm_scratchpad (
                swarm_id TEXT NOT NULL REFERENCES swarms(id) ON DELETE CASCADE,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                set_by_agent_id TEXT,
                set_by_agent_name TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (swarm_id, key)
            )
            "
            .to_string(),
        },
        Migration {
            version: 5,
            description: "core memory blocks and versions".to_string(),
            sql: r"
            CREATE TABLE IF NOT EXISTS core_memory_blocks (
                id TEXT PRIMARY KEY,
                user_id TEXT,
                session_id TEXT,
                block_type TEXT NOT NULL,
                content TEXT NOT NULL,
                char_limit INTEGER NOT NULL,
                version INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                CHECK ((user_id IS NULL) != (session_id IS NULL))
            );
            CREATE UNIQUE INDEX IF NOT EXISTS core_memory_scope_idx
                ON core_memory_blocks (COALESCE(user_id, ''), COALESCE(session_id, ''), block_type);
            CREATE TABLE IF NOT EXISTS core_memory_versions (
                id TEXT PRIMARY KEY,
                block_id TEXT NOT NULL REFERENCES core_memory_blocks(id) ON DELETE CASCADE,
                version INTEGER NOT NULL,
                content TEXT NOT NULL,
                reason TEXT,
                created_at TEXT NOT NULL,
                UNIQUE(block_id, version)
            )
            "
            .to_string(),
        },
        Migration {
            version: 6,
            description: "bond, emotion, stimulus history".to_string(),
            sql: r"
            CREATE TABLE IF NOT EXISTS bond_states (
                user_id TEXT PRIMARY KEY,
                affection_level REAL NOT NULL,
                trend TEXT NOT NULL,
                last_interaction_at TEXT NOT NULL,
                last_meaningful_at TEXT,
                streak_days INTEGER NOT NULL DEFAULT 0,
                streak_last_date TEXT,
                affection_history TEXT
            );
            CREATE TABLE IF NOT EXISTS emotion_states (
                session_id TEXT PRIMARY KEY,
                active_emotions TEXT NOT NULL,
                primary_type TEXT NOT NULL,
                primary_intensity REAL NOT NULL,
                secondary_type TEXT,
                secondary_intensity REAL,
                overall_intensity REAL NOT NULL,
                last_decay_at TEXT NOT NULL,
                last_update TEXT NOT NULL,
                appraisal_snapshot TEXT,
                trigger_snapshot TEXT
            );
            CREATE TABLE IF NOT EXISTS stimulus_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                stimulus_type TEXT NOT NULL,
                valence REAL NOT NULL,
                intensity REAL NOT NULL,
                timestamp TEXT NOT NULL,
                context TEXT
            );
            CREATE INDEX IF NOT EXISTS stimulus_history_session_idx ON stimulus_history(session_id)
            "
            .to_string(),
        },
        Migration {
            version: 7,
            description: "rare events and notifications".to_string(),
            sql: r"
            CREATE TABLE IF NOT EXISTS rare_events (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                content TEXT NOT NULL,
                trigger_reason TEXT NOT NULL,
                trigger_context TEXT NOT NULL,
                shown_at TEXT,
                dismissed_at TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS rare_events_user_idx ON rare_events(user_id, created_at);
            CREATE TABLE IF NOT EXISTS notifications (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                medium TEXT NOT NULL,
                target TEXT NOT NULL,
                message TEXT NOT NULL,
                priority INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL,
                error TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS notifications_status_idx ON notifications(status)
            "
            .to_string(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_test_pool;

    #[tokio::test]
    async fn migrations_apply_cleanly() {
        let pool = create_test_pool().await.unwrap();
        let migrator = Migrator::new(pool.clone());
        let applied = migrator
            .run_embedded_migrations(all_embedded_migrations())
            .await
            .unwrap();
        assert_eq!(applied, all_embedded_migrations().len());

        // Re-running is a no-op.
        let applied_again = migrator
            .run_embedded_migrations(all_embedded_migrations())
            .await
            .unwrap();
        assert_eq!(applied_again, 0);
    }

    #[tokio::test]
    async fn versions_are_monotonic() {
        let migrations = all_embedded_migrations();
        for pair in migrations.windows(2) {
            assert!(pair[0].version < pair[1].version);
        }
    }
}
