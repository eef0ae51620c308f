//! Project task domain model.
//!
//! Tasks live in a per-project work queue. Blocked tasks reference the
//! tasks that gate them; completion of a blocker can promote dependents
//! back to ready.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a task in the work queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Defined but not yet triaged into the ready pool
    Backlog,
    /// Eligible for claiming (no unfinished blockers, unclaimed)
    Ready,
    /// Exclusively claimed by one session or swarm agent
    Claimed,
    /// Claimed worker has started the work
    InProgress,
    /// Finished successfully
    Done,
    /// Waiting on unfinished blockers
    Blocked,
    /// Abandoned
    Cancelled,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Backlog
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Backlog => "backlog",
            Self::Ready => "ready",
            Self::Claimed => "claimed",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Blocked => "blocked",
            Self::Cancelled => "cancelled",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "backlog" => Some(Self::Backlog),
            "ready" => Some(Self::Ready),
            "claimed" => Some(Self::Claimed),
            "in_progress" => Some(Self::InProgress),
            "done" => Some(Self::Done),
            "blocked" => Some(Self::Blocked),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Cancelled)
    }

    /// Valid transitions from this status.
    pub fn valid_transitions(&self) -> &'static [TaskStatus] {
        match self {
            Self::Backlog => &[Self::Ready, Self::Blocked, Self::Cancelled],
            Self::Ready => &[Self::Claimed, Self::Blocked, Self::Backlog, Self::Cancelled],
            Self::Claimed => &[Self::InProgress, Self::Ready, Self::Done, Self::Cancelled],
            Self::InProgress => &[Self::Done, Self::Ready, Self::Blocked, Self::Cancelled],
            Self::Blocked => &[Self::Ready, Self::Cancelled],
            Self::Done => &[],
            Self::Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

/// Worker identity used when claiming a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskClaimant {
    Session(Uuid),
    Agent(Uuid),
}

impl TaskClaimant {
    pub fn session_id(&self) -> Option<Uuid> {
        match self {
            Self::Session(id) => Some(*id),
            Self::Agent(_) => None,
        }
    }

    pub fn agent_id(&self) -> Option<Uuid> {
        match self {
            Self::Agent(id) => Some(*id),
            Self::Session(_) => None,
        }
    }
}

/// A discrete unit of project work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectTask {
    pub id: Uuid,
    pub working_dir: String,
    pub title: String,
    pub description: Option<String>,
    pub acceptance_criteria: Option<String>,
    pub context_summary: Option<String>,
    pub scope_paths: Vec<String>,
    pub required_tools: Vec<String>,
    pub task_type: Option<String>,
    pub tags: Vec<String>,
    pub estimated_effort: Option<String>,
    pub priority: i64,
    pub status: TaskStatus,
    pub claimed_by_session_id: Option<Uuid>,
    pub claimed_by_agent_id: Option<Uuid>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub attempt_count: u32,
    /// Tasks that must reach `done` before this one becomes ready.
    pub blocked_by: Vec<Uuid>,
    pub related_task_ids: Vec<Uuid>,
    pub created_by_session_id: Option<Uuid>,
    pub created_by_agent_id: Option<Uuid>,
    pub discovered_from_task_id: Option<Uuid>,
    pub discovery_reason: Option<String>,
    pub outcome: Option<String>,
    pub completion_notes: Option<String>,
    pub files_changed: Vec<String>,
    pub follow_up_task_ids: Vec<Uuid>,
    pub last_error: Option<String>,
    pub extra: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ProjectTask {
    /// Create a new task in a working directory.
    pub fn new(working_dir: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            working_dir: working_dir.into(),
            title: title.into(),
            description: None,
            acceptance_criteria: None,
            context_summary: None,
            scope_paths: Vec::new(),
            required_tools: Vec::new(),
            task_type: None,
            tags: Vec::new(),
            estimated_effort: None,
            priority: 0,
            status: TaskStatus::Backlog,
            claimed_by_session_id: None,
            claimed_by_agent_id: None,
            claimed_at: None,
            attempt_count: 0,
            blocked_by: Vec::new(),
            related_task_ids: Vec::new(),
            created_by_session_id: None,
            created_by_agent_id: None,
            discovered_from_task_id: None,
            discovery_reason: None,
            outcome: None,
            completion_notes: None,
            files_changed: Vec::new(),
            follow_up_task_ids: Vec::new(),
            last_error: None,
            extra: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_task_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = Some(task_type.into());
        self
    }

    pub fn with_blocked_by(mut self, blockers: Vec<Uuid>) -> Self {
        self.blocked_by = blockers;
        self
    }

    pub fn with_required_tools(mut self, tools: Vec<String>) -> Self {
        self.required_tools = tools;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    /// Whether the task currently holds a claim.
    pub fn is_claimed(&self) -> bool {
        self.claimed_by_session_id.is_some() || self.claimed_by_agent_id.is_some()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("Task title cannot be empty".to_string());
        }
        if self.working_dir.trim().is_empty() {
            return Err("Task working_dir cannot be empty".to_string());
        }
        if self.blocked_by.contains(&self.id) {
            return Err("Task cannot block on itself".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trip() {
        for status in [
            TaskStatus::Backlog,
            TaskStatus::Ready,
            TaskStatus::Claimed,
            TaskStatus::InProgress,
            TaskStatus::Done,
            TaskStatus::Blocked,
            TaskStatus::Cancelled,
        ] {
            assert_eq!(TaskStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(TaskStatus::from_str("canceled"), Some(TaskStatus::Cancelled));
        assert_eq!(TaskStatus::from_str("bogus"), None);
    }

    #[test]
    fn terminal_states() {
        assert!(TaskStatus::Done.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Ready.is_terminal());
        assert!(TaskStatus::Done.valid_transitions().is_empty());
    }

    #[test]
    fn claim_transitions() {
        assert!(TaskStatus::Ready.can_transition_to(TaskStatus::Claimed));
        assert!(TaskStatus::Claimed.can_transition_to(TaskStatus::InProgress));
        assert!(TaskStatus::Claimed.can_transition_to(TaskStatus::Ready));
        assert!(!TaskStatus::Blocked.can_transition_to(TaskStatus::Claimed));
    }

    #[test]
    fn task_validation() {
        let task = ProjectTask::new("/tmp/project", "");
        assert!(task.validate().is_err());

        let task = ProjectTask::new("", "Title");
        assert!(task.validate().is_err());

        let mut task = ProjectTask::new("/tmp/project", "Title");
        task.blocked_by = vec![task.id];
        assert!(task.validate().is_err());

        let task = ProjectTask::new("/tmp/project", "Title");
        assert!(task.validate().is_ok());
    }

    #[test]
    fn claimant_accessors() {
        let id = Uuid::new_v4();
        assert_eq!(TaskClaimant::Session(id).session_id(), Some(id));
        assert_eq!(TaskClaimant::Session(id).agent_id(), None);
        assert_eq!(TaskClaimant::Agent(id).agent_id(), Some(id));
    }
}
