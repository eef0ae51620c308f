//! Cheap-model helper port.
//!
//! Small structured calls (schedule parsing, stimulus appraisal, output
//! summarisation) go through a cheap model rather than a full agent
//! session.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::AppraisalOutput;

/// A natural-language schedule resolved to cron + timezone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSchedule {
    /// Five-field cron expression (minute hour dom month dow).
    pub cron: String,
    /// IANA timezone name.
    pub timezone: String,
    pub explanation: Option<String>,
}

#[async_trait]
pub trait LlmHelper: Send + Sync {
    /// Convert a natural-language schedule into a cron expression and
    /// timezone. The caller validates both before accepting.
    async fn parse_schedule(&self, natural: &str) -> DomainResult<ParsedSchedule>;

    /// Appraise a stimulus along the OCC dimensions.
    async fn appraise(
        &self,
        stimulus: &serde_json::Value,
        current_state_summary: &str,
        persona_name: &str,
    ) -> DomainResult<AppraisalOutput>;

    /// One-or-two-sentence summary of a long output.
    async fn summarize(&self, text: &str) -> DomainResult<String>;
}
