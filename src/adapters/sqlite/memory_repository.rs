//! SQLite implementation of the core memory repository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{CoreMemoryBlock, CoreMemoryVersion, MemoryBlockType, MemoryScope};
use crate::domain::ports::MemoryRepository;

#[derive(Clone)]
pub struct SqliteMemoryRepository {
    pool: SqlitePool,
}

impl SqliteMemoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MemoryRepository for SqliteMemoryRepository {
    async fn get_block(
        &self,
        scope: &MemoryScope,
        block_type: MemoryBlockType,
    ) -> DomainResult<Option<CoreMemoryBlock>> {
        let row: Option<BlockRow> = match scope {
            MemoryScope::User(user_id) => {
                sqlx::query_as(
                    "SELECT * FROM core_memory_blocks WHERE user_id = ? AND block_type = ?",
                )
                .bind(user_id)
                .bind(block_type.as_str())
                .fetch_optional(&self.pool)
                .await?
            }
            MemoryScope::Session(session_id) => {
                sqlx::query_as(
                    "SELECT * FROM core_memory_blocks WHERE session_id = ? AND block_type = ?",
                )
                .bind(session_id.to_string())
                .bind(block_type.as_str())
                .fetch_optional(&self.pool)
                .await?
            }
        };
        row.map(CoreMemoryBlock::try_from).transpose()
    }

    async fn get_block_by_id(&self, id: Uuid) -> DomainResult<Option<CoreMemoryBlock>> {
        let row: Option<BlockRow> =
            sqlx::query_as("SELECT * FROM core_memory_blocks WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        row.map(CoreMemoryBlock::try_from).transpose()
    }

    async fn list_blocks(&self, scope: &MemoryScope) -> DomainResult<Vec<CoreMemoryBlock>> {
        let rows: Vec<BlockRow> = match scope {
            MemoryScope::User(user_id) => {
                sqlx::query_as(
                    "SELECT * FROM core_memory_blocks WHERE user_id = ? ORDER BY block_type",
                )
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?
            }
            MemoryScope::Session(session_id) => {
                sqlx::query_as(
                    "SELECT * FROM core_memory_blocks WHERE session_id = ? ORDER BY block_type",
                )
                .bind(session_id.to_string())
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.into_iter().map(CoreMemoryBlock::try_from).collect()
    }

    async fn save_block_with_version(
        &self,
        block: &CoreMemoryBlock,
        reason: Option<String>,
    ) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r"INSERT INTO core_memory_blocks (
                id, user_id, session_id, block_type, content, char_limit, version,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                content = excluded.content,
                char_limit = excluded.char_limit,
                version = excluded.version,
                updated_at = excluded.updated_at",
        )
        .bind(block.id.to_string())
        .bind(block.scope.user_id())
        .bind(block.scope.session_id().map(|u| u.to_string()))
        .bind(block.block_type.as_str())
        .bind(&block.content)
        .bind(i64::from(block.char_limit))
        .bind(i64::from(block.version))
        .bind(block.created_at.to_rfc3339())
        .bind(block.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        let version = CoreMemoryVersion::of(block, reason);
        sqlx::query(
            r"INSERT INTO core_memory_versions (id, block_id, version, content, reason, created_at)
              VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(version.id.to_string())
        .bind(version.block_id.to_string())
        .bind(i64::from(version.version))
        .bind(&version.content)
        .bind(&version.reason)
        .bind(version.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn versions(&self, block_id: Uuid) -> DomainResult<Vec<CoreMemoryVersion>> {
        let rows: Vec<VersionRow> = sqlx::query_as(
            "SELECT * FROM core_memory_versions WHERE block_id = ? ORDER BY version DESC",
        )
        .bind(block_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(CoreMemoryVersion::try_from).collect()
    }
}

#[derive(sqlx::FromRow)]
struct BlockRow {
    id: String,
    user_id: Option<String>,
    session_id: Option<String>,
    block_type: String,
    content: String,
    char_limit: i64,
    version: i64,
    created_at: String,
    updated_at: String,
}

impl TryFrom<BlockRow> for CoreMemoryBlock {
    type Error = DomainError;

    fn try_from(row: BlockRow) -> Result<Self, Self::Error> {
        let block_type = MemoryBlockType::from_str(&row.block_type).ok_or_else(|| {
            DomainError::Serialization(format!("Invalid block type: {}", row.block_type))
        })?;
        let session_id = super::parse_optional_uuid(row.session_id)?;
        let scope = MemoryScope::from_ids(row.user_id, session_id)
            .map_err(DomainError::Serialization)?;
        Ok(CoreMemoryBlock {
            id: super::parse_uuid(&row.id)?,
            scope,
            block_type,
            content: row.content,
            char_limit: row.char_limit as u32,
            version: row.version as u32,
            created_at: super::parse_datetime(&row.created_at)?,
            updated_at: super::parse_datetime(&row.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct VersionRow {
    id: String,
    block_id: String,
    version: i64,
    content: String,
    reason: Option<String>,
    created_at: String,
}

impl TryFrom<VersionRow> for CoreMemoryVersion {
    type Error = DomainError;

    fn try_from(row: VersionRow) -> Result<Self, Self::Error> {
        Ok(CoreMemoryVersion {
            id: super::parse_uuid(&row.id)?,
            block_id: super::parse_uuid(&row.block_id)?,
            version: row.version as u32,
            content: row.content,
            reason: row.reason,
            created_at: super::parse_datetime(&row.created_at)?,
        })
    }
}
