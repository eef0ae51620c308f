//! Mission executor.
//!
//! Runs one mission through the agent session service, accumulating output
//! and recording a `MissionExecution` row whatever happens.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    Mission, MissionExecution, MissionExecutionStatus, MissionTrigger, SessionConfig,
    StreamEventKind,
};
use crate::domain::ports::{LlmHelper, MissionRepository};
use crate::services::session_service::AgentSessionService;

/// Maximum stored output size (50 KiB).
const MAX_OUTPUT_SIZE: usize = 50 * 1024;

/// Outputs longer than this get a generated summary.
const SUMMARY_THRESHOLD: usize = 1000;

pub struct MissionExecutor {
    sessions: Arc<AgentSessionService>,
    repo: Arc<dyn MissionRepository>,
    helper: Option<Arc<dyn LlmHelper>>,
}

impl MissionExecutor {
    pub fn new(sessions: Arc<AgentSessionService>, repo: Arc<dyn MissionRepository>) -> Self {
        Self { sessions, repo, helper: None }
    }

    pub fn with_helper(mut self, helper: Arc<dyn LlmHelper>) -> Self {
        self.helper = Some(helper);
        self
    }

    /// Execute a mission and return the finished execution record. Failures
    /// are captured in the record; the error path here is reserved for the
    /// store itself.
    pub async fn execute(
        &self,
        mission: &Mission,
        trigger: MissionTrigger,
        triggered_by: Option<String>,
    ) -> DomainResult<MissionExecution> {
        let execution = MissionExecution::started(mission.id, trigger, triggered_by);
        self.repo.create_execution(&execution).await?;
        self.execute_into(mission, execution).await
    }

    /// Run a mission into an already-persisted execution row.
    pub async fn execute_into(
        &self,
        mission: &Mission,
        mut execution: MissionExecution,
    ) -> DomainResult<MissionExecution> {
        tracing::info!(
            mission_id = %mission.id,
            name = %mission.name,
            trigger = execution.trigger.as_str(),
            "Executing mission"
        );

        match self.run(mission).await {
            Ok(outcome) => {
                execution.status = if outcome.error_message.is_some() {
                    MissionExecutionStatus::Failed
                } else {
                    MissionExecutionStatus::Completed
                };
                execution.completed_at = Some(Utc::now());
                execution.tool_count = outcome.tool_count;
                execution.error_message = outcome.error_message;

                let mut output = outcome.output;
                if output.len() > MAX_OUTPUT_SIZE {
                    output = truncate_at_boundary(&output, MAX_OUTPUT_SIZE);
                    output.push_str("\n\n[Output truncated]");
                }
                if output.len() > SUMMARY_THRESHOLD {
                    execution.output_summary = self.summarize(&output).await;
                }
                execution.output_text = Some(output);
            }
            Err(e) => {
                execution.status = MissionExecutionStatus::Failed;
                execution.completed_at = Some(Utc::now());
                execution.error_message = Some(e.to_string());
                tracing::error!(mission_id = %mission.id, error = %e, "Mission execution failed");
            }
        }

        self.repo.update_execution(&execution).await?;
        tracing::info!(
            mission_id = %mission.id,
            status = execution.status.as_str(),
            tool_count = execution.tool_count,
            "Mission execution finished"
        );
        Ok(execution)
    }

    async fn run(&self, mission: &Mission) -> DomainResult<RunOutcome> {
        let mut config = SessionConfig::new(mission.working_dir.clone()).lean();
        config.personality = mission.personality.clone();
        config.model = mission.model.clone();
        config.user_id = mission.user_id.clone();
        config.sandbox_mode = mission.sandbox_mode;
        if !mission.allowed_tools.is_empty() {
            config.allowed_tools = Some(mission.allowed_tools.clone());
        }

        let session_id = self.sessions.create_session(config).await?;
        let outcome = self.stream_query(session_id, &mission.prompt).await;

        // The session closes whatever happened during the query.
        if let Err(e) = self.sessions.close_session(session_id).await {
            tracing::warn!(session_id = %session_id, error = %e, "Failed to close mission session");
        }
        outcome
    }

    async fn stream_query(&self, session_id: Uuid, prompt: &str) -> DomainResult<RunOutcome> {
        let mut rx = self.sessions.query(session_id, prompt).await?;
        let mut output = String::new();
        let mut tool_count: u32 = 0;
        let mut error_message: Option<String> = None;

        while let Some(event) = rx.recv().await {
            match event.kind {
                StreamEventKind::Text { text } => output.push_str(&text),
                StreamEventKind::ToolUse { .. } => tool_count += 1,
                StreamEventKind::Done { tool_count: total, .. } => {
                    if total > 0 {
                        tool_count = total;
                    }
                    break;
                }
                StreamEventKind::Error { message, recoverable } => {
                    error_message = Some(message);
                    if !recoverable {
                        break;
                    }
                }
                StreamEventKind::Cancelled => {
                    error_message = Some("mission query was cancelled".to_string());
                    break;
                }
                _ => {}
            }
        }

        Ok(RunOutcome { output, tool_count, error_message })
    }

    async fn summarize(&self, output: &str) -> Option<String> {
        let helper = self.helper.as_ref()?;
        match helper.summarize(output).await {
            Ok(summary) => Some(summary),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to generate mission summary");
                None
            }
        }
    }
}

struct RunOutcome {
    output: String,
    tool_count: u32,
    error_message: Option<String>,
}

/// Truncate at a char boundary at or below `max_bytes`.
fn truncate_at_boundary(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        let s = "héllo wörld";
        let truncated = truncate_at_boundary(s, 3);
        assert!(truncated.len() <= 3);
        assert!(s.starts_with(&truncated));

        assert_eq!(truncate_at_boundary("short", 100), "short");
    }
}
