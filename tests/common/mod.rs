//! Shared helpers for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

use dere::adapters::sqlite::create_migrated_test_pool;
use dere::domain::errors::DomainResult;
use dere::domain::models::{AppraisalOutput, StreamEventKind};
use dere::domain::ports::{
    AgentRuntime, AgentRuntimeFactory, LlmHelper, ParsedSchedule, RuntimeSpec,
};
use sqlx::SqlitePool;

pub async fn test_pool() -> SqlitePool {
    create_migrated_test_pool().await.expect("migrated test pool")
}

/// Produces the event script for a prompt.
pub type Script = Arc<dyn Fn(&str) -> Vec<StreamEventKind> + Send + Sync>;

/// An agent runtime that replays a scripted event sequence per query.
pub struct ScriptedRuntime {
    script: Script,
    closed: bool,
}

#[async_trait]
impl AgentRuntime for ScriptedRuntime {
    async fn query(&mut self, prompt: &str) -> DomainResult<mpsc::Receiver<StreamEventKind>> {
        let (tx, rx) = mpsc::channel(64);
        let events = (self.script)(prompt);
        tokio::spawn(async move {
            for event in events {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }

    async fn interrupt(&mut self) -> DomainResult<()> {
        Ok(())
    }

    async fn close(&mut self) -> DomainResult<()> {
        self.closed = true;
        Ok(())
    }

    fn external_session_id(&self) -> Option<String> {
        Some("mock-session".to_string())
    }
}

pub struct ScriptedRuntimeFactory {
    script: Script,
}

impl ScriptedRuntimeFactory {
    pub fn new(script: Script) -> Self {
        Self { script }
    }

    /// A factory whose agents emit one text body followed by done.
    pub fn echoing(body: &'static str) -> Self {
        Self::new(Arc::new(move |_prompt| {
            vec![
                StreamEventKind::Text { text: body.to_string() },
                StreamEventKind::Done { tool_count: 0, duration_ms: None },
            ]
        }))
    }
}

#[async_trait]
impl AgentRuntimeFactory for ScriptedRuntimeFactory {
    async fn start(&self, _spec: RuntimeSpec) -> DomainResult<Box<dyn AgentRuntime>> {
        Ok(Box::new(ScriptedRuntime { script: self.script.clone(), closed: false }))
    }
}

/// A helper that answers from canned values.
pub struct MockLlmHelper {
    pub schedule: ParsedSchedule,
    pub appraisal: AppraisalOutput,
    pub summary: String,
}

impl Default for MockLlmHelper {
    fn default() -> Self {
        Self {
            schedule: ParsedSchedule {
                cron: "30 8 * * 1-5".to_string(),
                timezone: "UTC".to_string(),
                explanation: Some("Monday through Friday at 8:30 AM".to_string()),
            },
            appraisal: AppraisalOutput::default(),
            summary: "A short summary.".to_string(),
        }
    }
}

#[async_trait]
impl LlmHelper for MockLlmHelper {
    async fn parse_schedule(&self, _natural: &str) -> DomainResult<ParsedSchedule> {
        Ok(self.schedule.clone())
    }

    async fn appraise(
        &self,
        _stimulus: &serde_json::Value,
        _current_state_summary: &str,
        _persona_name: &str,
    ) -> DomainResult<AppraisalOutput> {
        Ok(self.appraisal.clone())
    }

    async fn summarize(&self, _text: &str) -> DomainResult<String> {
        Ok(self.summary.clone())
    }
}
