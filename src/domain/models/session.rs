//! Agent session domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

/// A live or historical conversation with an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub working_dir: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub last_activity: DateTime<Utc>,
    pub personality: Option<String>,
    pub medium: Option<String>,
    pub user_id: Option<String>,
    pub parent_session_id: Option<Uuid>,
    /// Identifier the external runtime uses for resume.
    pub external_session_id: Option<String>,
}

impl Session {
    pub fn new(working_dir: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            working_dir: working_dir.into(),
            started_at: now,
            ended_at: None,
            last_activity: now,
            personality: None,
            medium: None,
            user_id: None,
            parent_session_id: None,
            external_session_id: None,
        }
    }
}

/// One message appended to a session transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub session_id: Uuid,
    pub role: MessageRole,
    pub text: String,
    pub medium: Option<String>,
    pub user_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Conversation {
    pub fn new(session_id: Uuid, role: MessageRole, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            role,
            text: text.into(),
            medium: None,
            user_id: None,
            timestamp: Utc::now(),
        }
    }
}

/// Configuration used to spawn an agent session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub working_dir: String,
    #[serde(default)]
    pub personality: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub medium: Option<String>,
    #[serde(default)]
    pub allowed_tools: Option<Vec<String>>,
    /// Skip bond/emotion context injection (swarm agents, missions).
    #[serde(default)]
    pub lean_mode: bool,
    #[serde(default)]
    pub sandbox_mode: bool,
    #[serde(default)]
    pub parent_session_id: Option<Uuid>,
    #[serde(default)]
    pub plugins: Option<Vec<String>>,
    /// Extra environment variables for the agent process.
    #[serde(default)]
    pub env: std::collections::HashMap<String, String>,
    /// External runtime session id to resume from.
    #[serde(default)]
    pub resume_external_id: Option<String>,
}

impl SessionConfig {
    pub fn new(working_dir: impl Into<String>) -> Self {
        Self {
            working_dir: working_dir.into(),
            personality: None,
            model: None,
            user_id: None,
            medium: None,
            allowed_tools: None,
            lean_mode: false,
            sandbox_mode: false,
            parent_session_id: None,
            plugins: None,
            env: std::collections::HashMap::new(),
            resume_external_id: None,
        }
    }

    pub fn lean(mut self) -> Self {
        self.lean_mode = true;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_deserialize() {
        let cfg: SessionConfig = serde_json::from_str(r#"{"working_dir":"/tmp"}"#).unwrap();
        assert!(!cfg.lean_mode);
        assert!(cfg.allowed_tools.is_none());
        assert!(cfg.env.is_empty());
    }

    #[test]
    fn lean_builder() {
        let cfg = SessionConfig::new("/tmp").lean().with_env("DERE_SWARM_ID", "x");
        assert!(cfg.lean_mode);
        assert_eq!(cfg.env.get("DERE_SWARM_ID").map(String::as_str), Some("x"));
    }
}
