//! SQLite implementation of rare-event and notification persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Notification, NotificationStatus, RareEvent, RareEventType};
use crate::domain::ports::RareEventRepository;

#[derive(Clone)]
pub struct SqliteRareEventRepository {
    pool: SqlitePool,
}

impl SqliteRareEventRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RareEventRepository for SqliteRareEventRepository {
    async fn insert(&self, event: &RareEvent) -> DomainResult<()> {
        sqlx::query(
            r"INSERT INTO rare_events (
                id, user_id, event_type, content, trigger_reason, trigger_context,
                shown_at, dismissed_at, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(event.id.to_string())
        .bind(&event.user_id)
        .bind(event.event_type.as_str())
        .bind(event.content.to_string())
        .bind(&event.trigger_reason)
        .bind(event.trigger_context.to_string())
        .bind(event.shown_at.map(|t| t.to_rfc3339()))
        .bind(event.dismissed_at.map(|t| t.to_rfc3339()))
        .bind(event.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest_for_user(&self, user_id: &str) -> DomainResult<Option<RareEvent>> {
        let row: Option<EventRow> = sqlx::query_as(
            "SELECT * FROM rare_events WHERE user_id = ? ORDER BY created_at DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(RareEvent::try_from).transpose()
    }

    async fn count_since(&self, user_id: &str, since: DateTime<Utc>) -> DomainResult<u64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM rare_events WHERE user_id = ? AND created_at >= ?",
        )
        .bind(user_id)
        .bind(since.to_rfc3339())
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }

    async fn list_for_user(&self, user_id: &str, limit: usize) -> DomainResult<Vec<RareEvent>> {
        let rows: Vec<EventRow> = sqlx::query_as(
            "SELECT * FROM rare_events WHERE user_id = ? ORDER BY created_at DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(RareEvent::try_from).collect()
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<RareEvent>> {
        let row: Option<EventRow> = sqlx::query_as("SELECT * FROM rare_events WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(RareEvent::try_from).transpose()
    }

    async fn mark_shown(&self, id: Uuid) -> DomainResult<bool> {
        let result = sqlx::query("UPDATE rare_events SET shown_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_dismissed(&self, id: Uuid) -> DomainResult<bool> {
        let result = sqlx::query("UPDATE rare_events SET dismissed_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_notification(&self, notification: &Notification) -> DomainResult<()> {
        sqlx::query(
            r"INSERT INTO notifications (
                id, user_id, medium, target, message, priority, status, error,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(notification.id.to_string())
        .bind(&notification.user_id)
        .bind(&notification.medium)
        .bind(&notification.target)
        .bind(&notification.message)
        .bind(notification.priority)
        .bind(notification.status.as_str())
        .bind(&notification.error)
        .bind(notification.created_at.to_rfc3339())
        .bind(notification.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_notification(&self, notification: &Notification) -> DomainResult<()> {
        let result = sqlx::query(
            "UPDATE notifications SET status = ?, error = ?, updated_at = ? WHERE id = ?",
        )
        .bind(notification.status.as_str())
        .bind(&notification.error)
        .bind(notification.updated_at.to_rfc3339())
        .bind(notification.id.to_string())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::Validation(format!(
                "Notification {} not found",
                notification.id
            )));
        }
        Ok(())
    }

    async fn pending_notifications(&self, limit: usize) -> DomainResult<Vec<Notification>> {
        let rows: Vec<NotificationRow> = sqlx::query_as(
            "SELECT * FROM notifications WHERE status = 'pending'
             ORDER BY priority DESC, created_at ASC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Notification::try_from).collect()
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: String,
    user_id: String,
    event_type: String,
    content: String,
    trigger_reason: String,
    trigger_context: String,
    shown_at: Option<String>,
    dismissed_at: Option<String>,
    created_at: String,
}

impl TryFrom<EventRow> for RareEvent {
    type Error = DomainError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let event_type = RareEventType::from_str(&row.event_type).ok_or_else(|| {
            DomainError::Serialization(format!("Invalid event type: {}", row.event_type))
        })?;
        Ok(RareEvent {
            id: super::parse_uuid(&row.id)?,
            user_id: row.user_id,
            event_type,
            content: serde_json::from_str(&row.content)
                .map_err(|e| DomainError::Serialization(e.to_string()))?,
            trigger_reason: row.trigger_reason,
            trigger_context: serde_json::from_str(&row.trigger_context)
                .map_err(|e| DomainError::Serialization(e.to_string()))?,
            shown_at: super::parse_optional_datetime(row.shown_at)?,
            dismissed_at: super::parse_optional_datetime(row.dismissed_at)?,
            created_at: super::parse_datetime(&row.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: String,
    user_id: String,
    medium: String,
    target: String,
    message: String,
    priority: i64,
    status: String,
    error: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = DomainError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        let status = NotificationStatus::from_str(&row.status)
            .ok_or_else(|| DomainError::Serialization(format!("Invalid status: {}", row.status)))?;
        Ok(Notification {
            id: super::parse_uuid(&row.id)?,
            user_id: row.user_id,
            medium: row.medium,
            target: row.target,
            message: row.message,
            priority: row.priority,
            status,
            error: row.error,
            created_at: super::parse_datetime(&row.created_at)?,
            updated_at: super::parse_datetime(&row.updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;

    #[tokio::test]
    async fn cooldown_queries() {
        let pool = create_migrated_test_pool().await.unwrap();
        let repo = SqliteRareEventRepository::new(pool);

        assert!(repo.latest_for_user("u").await.unwrap().is_none());
        assert_eq!(repo.count_since("u", Utc::now() - chrono::Duration::days(1)).await.unwrap(), 0);

        let event = RareEvent::new(
            "u",
            RareEventType::Greeting,
            serde_json::json!({"type": "greeting"}),
            "morning greeting, bond=62",
            serde_json::json!({"hour": 8}),
        );
        repo.insert(&event).await.unwrap();

        let latest = repo.latest_for_user("u").await.unwrap().unwrap();
        assert_eq!(latest.event_type, RareEventType::Greeting);
        assert_eq!(repo.count_since("u", Utc::now() - chrono::Duration::days(1)).await.unwrap(), 1);

        assert!(repo.mark_shown(event.id).await.unwrap());
        assert!(repo.mark_dismissed(event.id).await.unwrap());
        let after = repo.get(event.id).await.unwrap().unwrap();
        assert!(after.shown_at.is_some());
        assert!(after.dismissed_at.is_some());
    }

    #[tokio::test]
    async fn notification_queue() {
        let pool = create_migrated_test_pool().await.unwrap();
        let repo = SqliteRareEventRepository::new(pool);

        let mut n = Notification::new("u", "discord", "#general", "hello");
        repo.insert_notification(&n).await.unwrap();

        let pending = repo.pending_notifications(10).await.unwrap();
        assert_eq!(pending.len(), 1);

        n.status = NotificationStatus::Sent;
        n.updated_at = Utc::now();
        repo.update_notification(&n).await.unwrap();
        assert!(repo.pending_notifications(10).await.unwrap().is_empty());
    }
}
