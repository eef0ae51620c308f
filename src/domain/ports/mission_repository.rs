//! Mission repository port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Mission, MissionExecution, MissionStatus};

#[async_trait]
pub trait MissionRepository: Send + Sync {
    async fn create(&self, mission: &Mission) -> DomainResult<()>;

    async fn get(&self, id: Uuid) -> DomainResult<Option<Mission>>;

    async fn update(&self, mission: &Mission) -> DomainResult<()>;

    async fn delete(&self, id: Uuid) -> DomainResult<bool>;

    async fn list(&self, status: Option<MissionStatus>) -> DomainResult<Vec<Mission>>;

    /// Active missions whose `next_execution_at` is at or before `now`.
    async fn due_missions(&self, now: DateTime<Utc>) -> DomainResult<Vec<Mission>>;

    async fn create_execution(&self, execution: &MissionExecution) -> DomainResult<()>;

    async fn update_execution(&self, execution: &MissionExecution) -> DomainResult<()>;

    async fn get_execution(&self, id: Uuid) -> DomainResult<Option<MissionExecution>>;

    async fn list_executions(
        &self,
        mission_id: Uuid,
        limit: usize,
    ) -> DomainResult<Vec<MissionExecution>>;
}
