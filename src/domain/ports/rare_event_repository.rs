//! Rare event and notification persistence port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Notification, RareEvent};

#[async_trait]
pub trait RareEventRepository: Send + Sync {
    async fn insert(&self, event: &RareEvent) -> DomainResult<()>;

    /// Most recent event for a user, if any.
    async fn latest_for_user(&self, user_id: &str) -> DomainResult<Option<RareEvent>>;

    /// Number of events created for a user since `since`.
    async fn count_since(&self, user_id: &str, since: DateTime<Utc>) -> DomainResult<u64>;

    async fn list_for_user(&self, user_id: &str, limit: usize) -> DomainResult<Vec<RareEvent>>;

    async fn get(&self, id: Uuid) -> DomainResult<Option<RareEvent>>;

    async fn mark_shown(&self, id: Uuid) -> DomainResult<bool>;

    async fn mark_dismissed(&self, id: Uuid) -> DomainResult<bool>;

    async fn insert_notification(&self, notification: &Notification) -> DomainResult<()>;

    async fn update_notification(&self, notification: &Notification) -> DomainResult<()>;

    async fn pending_notifications(&self, limit: usize) -> DomainResult<Vec<Notification>>;
}
