//! Swarm domain models.
//!
//! A swarm is a DAG of agents sharing a working directory, an optional git
//! branch family, and a persisted scratchpad. Edges run from a child agent to
//! the agents it depends on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a swarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwarmStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl SwarmStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Status of one agent inside a swarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwarmAgentStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    /// A conditional dependency evaluated false, or an upstream agent was
    /// skipped/failed; the agent never ran.
    Skipped,
}

impl SwarmAgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Skipped => "skipped",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }
}

/// A dependency edge declared by a swarm agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySpec {
    /// Name of the agent this one depends on.
    pub agent: String,
    /// Optional boolean expression over the dependency's output. When it
    /// evaluates false, the dependent agent is skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl DependencySpec {
    pub fn bare(agent: impl Into<String>) -> Self {
        Self { agent: agent.into(), condition: None }
    }

    pub fn conditional(agent: impl Into<String>, condition: impl Into<String>) -> Self {
        Self { agent: agent.into(), condition: Some(condition.into()) }
    }
}

/// Caller-supplied specification for one swarm agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugins: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<Vec<DependencySpec>>,
}

impl AgentSpec {
    pub fn new(name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: None,
            prompt: prompt.into(),
            personality: None,
            plugins: None,
            model: None,
            depends_on: None,
        }
    }

    pub fn with_depends_on(mut self, deps: Vec<DependencySpec>) -> Self {
        self.depends_on = Some(deps);
        self
    }
}

/// A persisted swarm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Swarm {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub parent_session_id: Option<Uuid>,
    pub working_dir: String,
    pub git_branch_prefix: Option<String>,
    pub base_branch: Option<String>,
    /// When set, the synthesis agent is skipped if any sibling failed.
    pub skip_synthesis_on_failure: bool,
    pub status: SwarmStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Swarm {
    pub fn new(name: impl Into<String>, working_dir: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            parent_session_id: None,
            working_dir: working_dir.into(),
            git_branch_prefix: None,
            base_branch: None,
            skip_synthesis_on_failure: false,
            status: SwarmStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}

/// A persisted swarm agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwarmAgent {
    pub id: Uuid,
    pub swarm_id: Uuid,
    pub name: String,
    pub role: Option<String>,
    pub prompt: String,
    pub personality: Option<String>,
    pub plugins: Vec<String>,
    pub model: Option<String>,
    pub git_branch: Option<String>,
    pub depends_on: Vec<DependencySpec>,
    pub session_id: Option<Uuid>,
    pub status: SwarmAgentStatus,
    pub output: Option<String>,
    pub summary: Option<String>,
    pub error: Option<String>,
    pub tool_count: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SwarmAgent {
    pub fn from_spec(swarm_id: Uuid, spec: &AgentSpec) -> Self {
        Self {
            id: Uuid::new_v4(),
            swarm_id,
            name: spec.name.clone(),
            role: spec.role.clone(),
            prompt: spec.prompt.clone(),
            personality: spec.personality.clone(),
            plugins: spec.plugins.clone().unwrap_or_default(),
            model: spec.model.clone(),
            git_branch: None,
            depends_on: spec.depends_on.clone().unwrap_or_default(),
            session_id: None,
            status: SwarmAgentStatus::Pending,
            output: None,
            summary: None,
            error: None,
            tool_count: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}

/// A scratchpad key/value entry scoped to one swarm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScratchpadEntry {
    pub swarm_id: Uuid,
    pub key: String,
    pub value: serde_json::Value,
    pub set_by_agent_id: Option<Uuid>,
    pub set_by_agent_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of attempting to merge one agent's branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchMergeOutcome {
    pub agent_name: String,
    pub branch: String,
    pub merged: bool,
    pub conflict: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_from_spec_carries_dependencies() {
        let spec = AgentSpec::new("worker", "do the thing")
            .with_depends_on(vec![DependencySpec::conditional("gate", "output.risk == \"high\"")]);
        let agent = SwarmAgent::from_spec(Uuid::new_v4(), &spec);
        assert_eq!(agent.name, "worker");
        assert_eq!(agent.depends_on.len(), 1);
        assert_eq!(agent.depends_on[0].agent, "gate");
        assert!(agent.depends_on[0].condition.is_some());
        assert_eq!(agent.status, SwarmAgentStatus::Pending);
    }

    #[test]
    fn terminal_statuses() {
        assert!(SwarmAgentStatus::Skipped.is_terminal());
        assert!(SwarmAgentStatus::Completed.is_terminal());
        assert!(!SwarmAgentStatus::Running.is_terminal());
        assert!(SwarmStatus::Cancelled.is_terminal());
        assert!(!SwarmStatus::Pending.is_terminal());
    }

    #[test]
    fn dependency_spec_serde_shape() {
        let bare = DependencySpec::bare("a");
        let json = serde_json::to_string(&bare).unwrap();
        assert!(!json.contains("condition"));

        let cond: DependencySpec = serde_json::from_str(r#"{"agent":"a","condition":"output.ok"}"#).unwrap();
        assert_eq!(cond.condition.as_deref(), Some("output.ok"));
    }
}
