//! Agent runtime port.
//!
//! One runtime instance wraps one external agent child process. The session
//! service owns instances and serialises access per session; the factory
//! keeps coordinators decoupled from the concrete process adapter.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::mpsc;

use crate::domain::errors::DomainResult;
use crate::domain::models::StreamEventKind;

/// Everything needed to spawn one agent process.
#[derive(Debug, Clone, Default)]
pub struct RuntimeSpec {
    pub working_dir: String,
    pub model: Option<String>,
    pub allowed_tools: Option<Vec<String>>,
    pub env: HashMap<String, String>,
    /// External runtime session id to resume.
    pub resume_session_id: Option<String>,
    /// Container image when the session requested sandboxing.
    pub sandbox_image: Option<String>,
}

/// A live agent child process.
///
/// `query` returns a channel of raw (unsequenced) event kinds; the session
/// service assigns sequence numbers. The channel closes after a terminal
/// event. Dropping the receiver cancels the in-flight query.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Dispatch a prompt and stream events back until a terminal event.
    async fn query(&mut self, prompt: &str) -> DomainResult<mpsc::Receiver<StreamEventKind>>;

    /// Ask the in-flight query to stop.
    async fn interrupt(&mut self) -> DomainResult<()>;

    /// Graceful close: protocol close, bounded wait, then terminate.
    async fn close(&mut self) -> DomainResult<()>;

    /// Identifier the external runtime uses for resume, once known.
    fn external_session_id(&self) -> Option<String>;
}

/// Factory spawning runtimes; resolves once the child reports ready.
#[async_trait]
pub trait AgentRuntimeFactory: Send + Sync {
    async fn start(&self, spec: RuntimeSpec) -> DomainResult<Box<dyn AgentRuntime>>;
}
