//! Rare event and notification domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of spontaneous personality event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RareEventType {
    Greeting,
    Note,
    Observation,
    MoodShift,
    Memory,
}

impl RareEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Greeting => "greeting",
            Self::Note => "note",
            Self::Observation => "observation",
            Self::MoodShift => "mood_shift",
            Self::Memory => "memory",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "greeting" => Some(Self::Greeting),
            "note" => Some(Self::Note),
            "observation" => Some(Self::Observation),
            "mood_shift" => Some(Self::MoodShift),
            "memory" => Some(Self::Memory),
            _ => None,
        }
    }
}

/// A generated spontaneous event awaiting display.
///
/// `content` is a structured hint; the final rendering happens in the
/// personality layer when the event is shown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RareEvent {
    pub id: Uuid,
    pub user_id: String,
    pub event_type: RareEventType,
    pub content: serde_json::Value,
    pub trigger_reason: String,
    pub trigger_context: serde_json::Value,
    pub shown_at: Option<DateTime<Utc>>,
    pub dismissed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl RareEvent {
    pub fn new(
        user_id: impl Into<String>,
        event_type: RareEventType,
        content: serde_json::Value,
        trigger_reason: impl Into<String>,
        trigger_context: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            event_type,
            content,
            trigger_reason: trigger_reason.into(),
            trigger_context,
            shown_at: None,
            dismissed_at: None,
            created_at: Utc::now(),
        }
    }
}

/// Outbound notification status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Failed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "sent" => Some(Self::Sent),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// A queued outbound message to a user on some medium.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: String,
    pub medium: String,
    pub target: String,
    pub message: String,
    pub priority: i64,
    pub status: NotificationStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        user_id: impl Into<String>,
        medium: impl Into<String>,
        target: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            medium: medium.into(),
            target: target.into(),
            message: message.into(),
            priority: 0,
            status: NotificationStatus::Pending,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}
