//! Core memory service.
//!
//! Small always-in-context blocks (persona, human, task) scoped to a user
//! or session. Every edit bumps the version and appends a version row in
//! the same transaction; rollback re-applies an old version as a new edit.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{CoreMemoryBlock, CoreMemoryVersion, MemoryBlockType, MemoryScope};
use crate::domain::ports::MemoryRepository;

pub struct CoreMemoryService {
    repo: Arc<dyn MemoryRepository>,
}

impl CoreMemoryService {
    pub fn new(repo: Arc<dyn MemoryRepository>) -> Self {
        Self { repo }
    }

    /// Create or update a block. The char limit binds; new blocks start at
    /// version 1, edits bump the version.
    pub async fn edit(
        &self,
        scope: MemoryScope,
        block_type: MemoryBlockType,
        content: String,
        reason: Option<String>,
        char_limit: Option<u32>,
    ) -> DomainResult<CoreMemoryBlock> {
        let mut block = match self.repo.get_block(&scope, block_type).await? {
            Some(mut existing) => {
                existing.content = content;
                existing.version += 1;
                existing.updated_at = Utc::now();
                existing
            }
            None => CoreMemoryBlock::new(scope, block_type, content),
        };
        if let Some(limit) = char_limit {
            block.char_limit = limit;
        }
        block.validate().map_err(DomainError::Validation)?;

        self.repo.save_block_with_version(&block, reason).await?;
        tracing::info!(
            block_id = %block.id,
            block_type = block.block_type.as_str(),
            version = block.version,
            "Core memory block saved"
        );
        Ok(block)
    }

    pub async fn get(&self, scope: &MemoryScope) -> DomainResult<Vec<CoreMemoryBlock>> {
        self.repo.list_blocks(scope).await
    }

    pub async fn get_block(
        &self,
        scope: &MemoryScope,
        block_type: MemoryBlockType,
    ) -> DomainResult<CoreMemoryBlock> {
        self.repo
            .get_block(scope, block_type)
            .await?
            .ok_or_else(|| DomainError::Validation(format!(
                "No {} block in scope",
                block_type.as_str()
            )))
    }

    pub async fn history(&self, block_id: Uuid) -> DomainResult<Vec<CoreMemoryVersion>> {
        let versions = self.repo.versions(block_id).await?;
        if versions.is_empty() && self.repo.get_block_by_id(block_id).await?.is_none() {
            return Err(DomainError::MemoryBlockNotFound(block_id));
        }
        Ok(versions)
    }

    /// Roll a block back to an earlier version. The rollback itself is an
    /// edit: it appends a new version rather than rewriting history.
    pub async fn rollback(&self, block_id: Uuid, version: u32) -> DomainResult<CoreMemoryBlock> {
        let block = self
            .repo
            .get_block_by_id(block_id)
            .await?
            .ok_or(DomainError::MemoryBlockNotFound(block_id))?;

        let target = self
            .repo
            .versions(block_id)
            .await?
            .into_iter()
            .find(|v| v.version == version)
            .ok_or_else(|| {
                DomainError::Validation(format!("Block {block_id} has no version {version}"))
            })?;

        self.edit(
            block.scope.clone(),
            block.block_type,
            target.content,
            Some(format!("rollback to version {version}")),
            None,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteMemoryRepository};

    async fn service() -> CoreMemoryService {
        let pool = create_migrated_test_pool().await.unwrap();
        CoreMemoryService::new(Arc::new(SqliteMemoryRepository::new(pool)))
    }

    #[tokio::test]
    async fn edit_bumps_version() {
        let svc = service().await;
        let scope = MemoryScope::User("u".into());

        let v1 = svc
            .edit(scope.clone(), MemoryBlockType::Persona, "first".into(), None, None)
            .await
            .unwrap();
        assert_eq!(v1.version, 1);

        let v2 = svc
            .edit(scope.clone(), MemoryBlockType::Persona, "second".into(), Some("update".into()), None)
            .await
            .unwrap();
        assert_eq!(v2.version, 2);
        assert_eq!(v2.id, v1.id);

        let history = svc.history(v1.id).await.unwrap();
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn edit_enforces_char_limit() {
        let svc = service().await;
        let scope = MemoryScope::User("u".into());
        let result = svc
            .edit(scope, MemoryBlockType::Task, "too long".into(), None, Some(3))
            .await;
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn rollback_appends_new_version() {
        let svc = service().await;
        let scope = MemoryScope::User("u".into());

        let block = svc
            .edit(scope.clone(), MemoryBlockType::Human, "original".into(), None, None)
            .await
            .unwrap();
        svc.edit(scope.clone(), MemoryBlockType::Human, "changed".into(), None, None)
            .await
            .unwrap();

        let rolled = svc.rollback(block.id, 1).await.unwrap();
        assert_eq!(rolled.content, "original");
        assert_eq!(rolled.version, 3);

        let history = svc.history(block.id).await.unwrap();
        assert_eq!(history.len(), 3);
        assert!(history[0].reason.as_deref().unwrap_or("").contains("rollback"));
    }

    #[tokio::test]
    async fn rollback_rejects_unknown_version() {
        let svc = service().await;
        let scope = MemoryScope::User("u".into());
        let block = svc
            .edit(scope, MemoryBlockType::Human, "x".into(), None, None)
            .await
            .unwrap();
        assert!(svc.rollback(block.id, 9).await.is_err());
        assert!(svc.rollback(Uuid::new_v4(), 1).await.is_err());
    }
}
