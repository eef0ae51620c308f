//! Core memory repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{CoreMemoryBlock, CoreMemoryVersion, MemoryBlockType, MemoryScope};

#[async_trait]
pub trait MemoryRepository: Send + Sync {
    async fn get_block(
        &self,
        scope: &MemoryScope,
        block_type: MemoryBlockType,
    ) -> DomainResult<Option<CoreMemoryBlock>>;

    async fn get_block_by_id(&self, id: Uuid) -> DomainResult<Option<CoreMemoryBlock>>;

    async fn list_blocks(&self, scope: &MemoryScope) -> DomainResult<Vec<CoreMemoryBlock>>;

    /// Insert or update a block and append its version row in one
    /// transaction.
    async fn save_block_with_version(
        &self,
        block: &CoreMemoryBlock,
        reason: Option<String>,
    ) -> DomainResult<()>;

    async fn versions(&self, block_id: Uuid) -> DomainResult<Vec<CoreMemoryVersion>>;
}
