//! SQLite implementation of the session repository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Conversation, MessageRole, Session};
use crate::domain::ports::SessionRepository;

#[derive(Clone)]
pub struct SqliteSessionRepository {
    pool: SqlitePool,
}

impl SqliteSessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for SqliteSessionRepository {
    async fn create(&self, session: &Session) -> DomainResult<()> {
        sqlx::query(
            r"INSERT INTO sessions (
                id, working_dir, started_at, ended_at, last_activity,
                personality, medium, user_id, parent_session_id, external_session_id
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(session.id.to_string())
        .bind(&session.working_dir)
        .bind(session.started_at.to_rfc3339())
        .bind(session.ended_at.map(|t| t.to_rfc3339()))
        .bind(session.last_activity.to_rfc3339())
        .bind(&session.personality)
        .bind(&session.medium)
        .bind(&session.user_id)
        .bind(session.parent_session_id.map(|u| u.to_string()))
        .bind(&session.external_session_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Session>> {
        let row: Option<SessionRow> = sqlx::query_as("SELECT * FROM sessions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Session::try_from).transpose()
    }

    async fn update(&self, session: &Session) -> DomainResult<()> {
        let result = sqlx::query(
            r"UPDATE sessions SET
                ended_at = ?, last_activity = ?, personality = ?, medium = ?,
                user_id = ?, external_session_id = ?
              WHERE id = ?",
        )
        .bind(session.ended_at.map(|t| t.to_rfc3339()))
        .bind(session.last_activity.to_rfc3339())
        .bind(&session.personality)
        .bind(&session.medium)
        .bind(&session.user_id)
        .bind(&session.external_session_id)
        .bind(session.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::SessionNotFound(session.id));
        }
        Ok(())
    }

    async fn append_conversation(&self, message: &Conversation) -> DomainResult<()> {
        sqlx::query(
            r"INSERT INTO conversations (id, session_id, role, text, medium, user_id, timestamp)
              VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(message.id.to_string())
        .bind(message.session_id.to_string())
        .bind(message.role.as_str())
        .bind(&message.text)
        .bind(&message.medium)
        .bind(&message.user_id)
        .bind(message.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn conversations(
        &self,
        session_id: Uuid,
        limit: usize,
    ) -> DomainResult<Vec<Conversation>> {
        let rows: Vec<ConversationRow> = sqlx::query_as(
            "SELECT * FROM conversations WHERE session_id = ? ORDER BY timestamp ASC LIMIT ?",
        )
        .bind(session_id.to_string())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Conversation::try_from).collect()
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    working_dir: String,
    started_at: String,
    ended_at: Option<String>,
    last_activity: String,
    personality: Option<String>,
    medium: Option<String>,
    user_id: Option<String>,
    parent_session_id: Option<String>,
    external_session_id: Option<String>,
}

impl TryFrom<SessionRow> for Session {
    type Error = DomainError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        Ok(Session {
            id: super::parse_uuid(&row.id)?,
            working_dir: row.working_dir,
            started_at: super::parse_datetime(&row.started_at)?,
            ended_at: super::parse_optional_datetime(row.ended_at)?,
            last_activity: super::parse_datetime(&row.last_activity)?,
            personality: row.personality,
            medium: row.medium,
            user_id: row.user_id,
            parent_session_id: super::parse_optional_uuid(row.parent_session_id)?,
            external_session_id: row.external_session_id,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ConversationRow {
    id: String,
    session_id: String,
    role: String,
    text: String,
    medium: Option<String>,
    user_id: Option<String>,
    timestamp: String,
}

impl TryFrom<ConversationRow> for Conversation {
    type Error = DomainError;

    fn try_from(row: ConversationRow) -> Result<Self, Self::Error> {
        let role = MessageRole::from_str(&row.role)
            .ok_or_else(|| DomainError::Serialization(format!("Invalid role: {}", row.role)))?;
        Ok(Conversation {
            id: super::parse_uuid(&row.id)?,
            session_id: super::parse_uuid(&row.session_id)?,
            role,
            text: row.text,
            medium: row.medium,
            user_id: row.user_id,
            timestamp: super::parse_datetime(&row.timestamp)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use chrono::Utc;

    #[tokio::test]
    async fn session_lifecycle() {
        let pool = create_migrated_test_pool().await.unwrap();
        let repo = SqliteSessionRepository::new(pool);

        let mut session = Session::new("/tmp/p");
        session.personality = Some("tsun".into());
        repo.create(&session).await.unwrap();

        session.ended_at = Some(Utc::now());
        repo.update(&session).await.unwrap();

        let fetched = repo.get(session.id).await.unwrap().unwrap();
        assert!(fetched.ended_at.is_some());
        assert_eq!(fetched.personality.as_deref(), Some("tsun"));
    }

    #[tokio::test]
    async fn conversations_append_in_order() {
        let pool = create_migrated_test_pool().await.unwrap();
        let repo = SqliteSessionRepository::new(pool);

        let session = Session::new("/tmp/p");
        repo.create(&session).await.unwrap();

        repo.append_conversation(&Conversation::new(session.id, MessageRole::User, "hi"))
            .await
            .unwrap();
        repo.append_conversation(&Conversation::new(session.id, MessageRole::Assistant, "hello"))
            .await
            .unwrap();

        let messages = repo.conversations(session.id, 10).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[1].text, "hello");
    }
}
