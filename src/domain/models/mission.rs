//! Mission domain model.
//!
//! A mission is a durable, schedulable unit of agent work with a cron
//! expression. Executions are recorded per run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a mission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionStatus {
    Active,
    Paused,
}

impl MissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(Self::Active),
            "paused" => Some(Self::Paused),
            _ => None,
        }
    }
}

/// How a mission execution was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionTrigger {
    Scheduled,
    Manual,
}

impl MissionTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Manual => "manual",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "scheduled" => Some(Self::Scheduled),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

/// Status of one mission execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl MissionExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// A durable scheduled agent job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mission {
    pub id: Uuid,
    pub name: String,
    pub prompt: String,
    /// Five-field cron expression (minute hour dom month dow).
    pub cron_expression: String,
    /// Natural-language source the cron was derived from, if any.
    pub schedule_natural: Option<String>,
    /// IANA timezone the cron expression is evaluated in.
    pub timezone: String,
    pub status: MissionStatus,
    pub next_execution_at: Option<DateTime<Utc>>,
    pub last_execution_at: Option<DateTime<Utc>>,

    // Session spawn fields
    pub working_dir: String,
    pub personality: Option<String>,
    pub allowed_tools: Vec<String>,
    pub model: Option<String>,
    pub user_id: Option<String>,
    pub sandbox_mode: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Mission {
    pub fn new(
        name: impl Into<String>,
        prompt: impl Into<String>,
        cron_expression: impl Into<String>,
        working_dir: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            prompt: prompt.into(),
            cron_expression: cron_expression.into(),
            schedule_natural: None,
            timezone: "UTC".to_string(),
            status: MissionStatus::Active,
            next_execution_at: None,
            last_execution_at: None,
            working_dir: working_dir.into(),
            personality: None,
            allowed_tools: Vec::new(),
            model: None,
            user_id: None,
            sandbox_mode: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_timezone(mut self, tz: impl Into<String>) -> Self {
        self.timezone = tz.into();
        self
    }

    pub fn with_natural_schedule(mut self, source: impl Into<String>) -> Self {
        self.schedule_natural = Some(source.into());
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Mission name cannot be empty".to_string());
        }
        if self.prompt.trim().is_empty() {
            return Err("Mission prompt cannot be empty".to_string());
        }
        if self.cron_expression.split_whitespace().count() != 5 {
            return Err(format!(
                "Invalid cron format: '{}' (expected 5 fields: minute hour day month weekday)",
                self.cron_expression
            ));
        }
        Ok(())
    }
}

/// Record of one mission run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionExecution {
    pub id: Uuid,
    pub mission_id: Uuid,
    pub trigger: MissionTrigger,
    pub triggered_by: Option<String>,
    pub status: MissionExecutionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub output_text: Option<String>,
    pub output_summary: Option<String>,
    pub tool_count: u32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl MissionExecution {
    /// Create a running execution record for a mission.
    pub fn started(mission_id: Uuid, trigger: MissionTrigger, triggered_by: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            mission_id,
            trigger,
            triggered_by,
            status: MissionExecutionStatus::Running,
            started_at: Some(now),
            completed_at: None,
            output_text: None,
            output_summary: None,
            tool_count: 0,
            error_message: None,
            created_at: now,
        }
    }
}
