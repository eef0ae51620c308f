//! Core memory domain model.
//!
//! Core memory blocks are small always-in-context blocks (persona, human,
//! task) scoped to either a user or a session. Every edit appends a version
//! row so blocks can be rolled back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of core memory block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryBlockType {
    Persona,
    Human,
    Task,
}

impl MemoryBlockType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Persona => "persona",
            Self::Human => "human",
            Self::Task => "task",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "persona" => Some(Self::Persona),
            "human" => Some(Self::Human),
            "task" => Some(Self::Task),
            _ => None,
        }
    }
}

/// Scope of a memory block: exactly one of user or session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryScope {
    User(String),
    Session(Uuid),
}

impl MemoryScope {
    /// Build from optional ids, enforcing exactly-one.
    pub fn from_ids(user_id: Option<String>, session_id: Option<Uuid>) -> Result<Self, String> {
        match (user_id, session_id) {
            (Some(u), None) => Ok(Self::User(u)),
            (None, Some(s)) => Ok(Self::Session(s)),
            (Some(_), Some(_)) => Err("Memory scope must be user or session, not both".to_string()),
            (None, None) => Err("Memory scope requires a user_id or session_id".to_string()),
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::User(u) => Some(u),
            Self::Session(_) => None,
        }
    }

    pub fn session_id(&self) -> Option<Uuid> {
        match self {
            Self::Session(s) => Some(*s),
            Self::User(_) => None,
        }
    }
}

/// An editable always-in-context memory block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreMemoryBlock {
    pub id: Uuid,
    pub scope: MemoryScope,
    pub block_type: MemoryBlockType,
    pub content: String,
    pub char_limit: u32,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CoreMemoryBlock {
    pub const DEFAULT_CHAR_LIMIT: u32 = 2000;

    pub fn new(scope: MemoryScope, block_type: MemoryBlockType, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            scope,
            block_type,
            content: content.into(),
            char_limit: Self::DEFAULT_CHAR_LIMIT,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.char_limit == 0 {
            return Err("char_limit must be positive".to_string());
        }
        if self.content.chars().count() > self.char_limit as usize {
            return Err(format!(
                "Content exceeds char_limit ({} > {})",
                self.content.chars().count(),
                self.char_limit
            ));
        }
        Ok(())
    }
}

/// Append-only history of a block's content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreMemoryVersion {
    pub id: Uuid,
    pub block_id: Uuid,
    pub version: u32,
    pub content: String,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CoreMemoryVersion {
    pub fn of(block: &CoreMemoryBlock, reason: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            block_id: block.id,
            version: block.version,
            content: block.content.clone(),
            reason,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_exactly_one() {
        assert!(MemoryScope::from_ids(Some("u".into()), None).is_ok());
        assert!(MemoryScope::from_ids(None, Some(Uuid::new_v4())).is_ok());
        assert!(MemoryScope::from_ids(Some("u".into()), Some(Uuid::new_v4())).is_err());
        assert!(MemoryScope::from_ids(None, None).is_err());
    }

    #[test]
    fn block_char_limit() {
        let scope = MemoryScope::User("u".into());
        let mut block = CoreMemoryBlock::new(scope, MemoryBlockType::Persona, "hi");
        assert!(block.validate().is_ok());
        block.char_limit = 1;
        assert!(block.validate().is_err());
        block.char_limit = 0;
        assert!(block.validate().is_err());
    }
}
