//! Bond and emotion persistence port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{BondState, EmotionState, StimulusRecord};

#[async_trait]
pub trait AffectRepository: Send + Sync {
    async fn load_bond(&self, user_id: &str) -> DomainResult<Option<BondState>>;

    /// Insert-or-update keyed by user id.
    async fn save_bond(&self, state: &BondState) -> DomainResult<()>;

    async fn load_emotion(&self, session_id: Uuid) -> DomainResult<Option<EmotionState>>;

    /// Insert-or-update keyed by session id.
    async fn save_emotion(&self, state: &EmotionState) -> DomainResult<()>;

    async fn record_stimulus(&self, session_id: Uuid, record: &StimulusRecord) -> DomainResult<()>;

    async fn recent_stimuli(
        &self,
        session_id: Uuid,
        since: DateTime<Utc>,
    ) -> DomainResult<Vec<StimulusRecord>>;
}
