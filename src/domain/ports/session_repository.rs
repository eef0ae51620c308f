//! Session repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Conversation, Session};

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, session: &Session) -> DomainResult<()>;

    async fn get(&self, id: Uuid) -> DomainResult<Option<Session>>;

    async fn update(&self, session: &Session) -> DomainResult<()>;

    async fn append_conversation(&self, message: &Conversation) -> DomainResult<()>;

    async fn conversations(&self, session_id: Uuid, limit: usize) -> DomainResult<Vec<Conversation>>;
}
