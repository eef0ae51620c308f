//! Swarm repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{ScratchpadEntry, Swarm, SwarmAgent, SwarmStatus};

#[async_trait]
pub trait SwarmRepository: Send + Sync {
    /// Persist a swarm with its agents in one transaction.
    async fn create(&self, swarm: &Swarm, agents: &[SwarmAgent]) -> DomainResult<()>;

    async fn get(&self, id: Uuid) -> DomainResult<Option<Swarm>>;

    async fn update(&self, swarm: &Swarm) -> DomainResult<()>;

    async fn list(&self, status: Option<SwarmStatus>, limit: usize) -> DomainResult<Vec<Swarm>>;

    async fn agents(&self, swarm_id: Uuid) -> DomainResult<Vec<SwarmAgent>>;

    async fn agent_by_name(&self, swarm_id: Uuid, name: &str) -> DomainResult<Option<SwarmAgent>>;

    async fn update_agent(&self, agent: &SwarmAgent) -> DomainResult<()>;

    /// Find the swarm agent that owns a session, if any. Used to reject
    /// recursive swarm creation.
    async fn agent_by_session(&self, session_id: Uuid) -> DomainResult<Option<SwarmAgent>>;

    // Scratchpad: last-writer-wins KV scoped to the swarm.

    async fn scratchpad_get(&self, swarm_id: Uuid, key: &str) -> DomainResult<Option<ScratchpadEntry>>;

    async fn scratchpad_put(&self, entry: &ScratchpadEntry) -> DomainResult<()>;

    async fn scratchpad_list(
        &self,
        swarm_id: Uuid,
        prefix: Option<&str>,
    ) -> DomainResult<Vec<ScratchpadEntry>>;

    async fn scratchpad_delete(&self, swarm_id: Uuid, key: &str) -> DomainResult<bool>;
}
