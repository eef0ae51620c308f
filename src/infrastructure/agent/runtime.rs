//! Process-backed agent runtime.
//!
//! Spawns the external agent binary as a child process and speaks the NDJSON
//! protocol over stdin/stdout. One instance per session; the session service
//! serialises access.

use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, watch, Mutex};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::StreamEventKind;
use crate::domain::ports::{AgentRuntime, AgentRuntimeFactory, RuntimeSpec};

use super::protocol::{parse_event_line, AgentCommand};

/// How long `start` waits for the child's ready frame.
const READY_TIMEOUT: Duration = Duration::from_secs(60);

/// Buffered events per in-flight query.
const QUERY_CHANNEL_CAPACITY: usize = 256;

/// Configuration for spawning agent processes.
#[derive(Debug, Clone)]
pub struct ProcessRuntimeConfig {
    /// Path to the agent binary.
    pub binary_path: String,
    /// Grace period between protocol close and SIGTERM/kill.
    pub close_grace: Duration,
}

impl Default for ProcessRuntimeConfig {
    fn default() -> Self {
        Self { binary_path: "claude".to_string(), close_grace: Duration::from_secs(5) }
    }
}

/// Factory spawning one child process per session.
pub struct ProcessRuntimeFactory {
    config: ProcessRuntimeConfig,
}

impl ProcessRuntimeFactory {
    pub fn new(config: ProcessRuntimeConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl AgentRuntimeFactory for ProcessRuntimeFactory {
    async fn start(&self, spec: RuntimeSpec) -> DomainResult<Box<dyn AgentRuntime>> {
        let runtime = ProcessAgentRuntime::spawn(&self.config, spec).await?;
        Ok(Box::new(runtime))
    }
}

/// Shared state between the runtime handle and the stdout reader task.
struct Shared {
    /// Sink for the in-flight query, if any.
    current_query: Mutex<Option<mpsc::Sender<StreamEventKind>>>,
}

pub struct ProcessAgentRuntime {
    child: Child,
    stdin: ChildStdin,
    shared: Arc<Shared>,
    external_id_rx: watch::Receiver<Option<String>>,
    close_grace: Duration,
    closed: bool,
}

impl ProcessAgentRuntime {
    async fn spawn(config: &ProcessRuntimeConfig, spec: RuntimeSpec) -> DomainResult<Self> {
        let mut cmd = Command::new(&config.binary_path);
        cmd.current_dir(&spec.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        if let Some(model) = &spec.model {
            cmd.arg("--model").arg(model);
        }
        if let Some(tools) = &spec.allowed_tools {
            if !tools.is_empty() {
                cmd.arg("--allowed-tools").arg(tools.join(","));
            }
        }
        if let Some(resume) = &spec.resume_session_id {
            cmd.arg("--resume").arg(resume);
        }
        if let Some(image) = &spec.sandbox_image {
            cmd.env("DERE_SANDBOX_IMAGE", image);
        }
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| DomainError::Runtime(format!("Failed to spawn agent process: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| DomainError::Runtime("Failed to capture agent stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DomainError::Runtime("Failed to capture agent stdout".to_string()))?;

        let shared = Arc::new(Shared { current_query: Mutex::new(None) });
        let (ready_tx, mut ready_rx) = watch::channel::<Option<String>>(None);
        let (external_tx, external_rx) = watch::channel::<Option<String>>(None);

        let reader_shared = shared.clone();
        tokio::spawn(async move {
            let mut ready_seen = false;
            let reader = BufReader::new(stdout);
            let mut lines = reader.lines();

            while let Ok(Some(line)) = lines.next_line().await {
                let Some(kind) = parse_event_line(&line) else { continue };

                if let StreamEventKind::SessionReady { external_session_id } = &kind {
                    let _ = external_tx.send(external_session_id.clone());
                    if !ready_seen {
                        ready_seen = true;
                        let _ = ready_tx.send(Some(external_session_id.clone().unwrap_or_default()));
                        continue;
                    }
                }

                let terminal = kind.is_terminal();
                let sink = reader_shared.current_query.lock().await.clone();
                if let Some(sink) = sink {
                    // A dropped receiver means the caller cancelled; the
                    // runtime handle sends the interrupt, we just stop
                    // forwarding.
                    let _ = sink.send(kind).await;
                }
                if terminal {
                    *reader_shared.current_query.lock().await = None;
                }
            }

            // Child stdout closed. If a query was in flight, synthesize the
            // non-recoverable error + done pair.
            let sink = reader_shared.current_query.lock().await.take();
            if let Some(sink) = sink {
                let _ = sink
                    .send(StreamEventKind::Error {
                        message: "agent process exited unexpectedly".to_string(),
                        recoverable: false,
                    })
                    .await;
                let _ = sink.send(StreamEventKind::Done { tool_count: 0, duration_ms: None }).await;
            }
            if !ready_seen {
                let _ = ready_tx.send(Some(String::new()));
            }
        });

        // Wait for the ready frame.
        let ready = tokio::time::timeout(READY_TIMEOUT, async {
            loop {
                if ready_rx.borrow().is_some() {
                    return;
                }
                if ready_rx.changed().await.is_err() {
                    return;
                }
            }
        })
        .await;
        if ready.is_err() {
            let _ = child.start_kill();
            return Err(DomainError::Runtime("agent process did not report ready".to_string()));
        }

        // Distinguish a clean ready from an immediate exit.
        if let Ok(Some(status)) = child.try_wait() {
            return Err(DomainError::Runtime(format!(
                "agent process exited during startup: {status}"
            )));
        }

        Ok(Self {
            child,
            stdin,
            shared,
            external_id_rx: external_rx,
            close_grace: config.close_grace,
            closed: false,
        })
    }

    async fn write_command(&mut self, command: &AgentCommand) -> DomainResult<()> {
        let line = command
            .to_line()
            .map_err(|e| DomainError::Serialization(e.to_string()))?;
        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| DomainError::Runtime(format!("agent stdin write failed: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| DomainError::Runtime(format!("agent stdin flush failed: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl AgentRuntime for ProcessAgentRuntime {
    async fn query(&mut self, prompt: &str) -> DomainResult<mpsc::Receiver<StreamEventKind>> {
        if self.closed {
            return Err(DomainError::Runtime("agent runtime is closed".to_string()));
        }
        let (tx, rx) = mpsc::channel(QUERY_CHANNEL_CAPACITY);
        {
            let mut current = self.shared.current_query.lock().await;
            if current.is_some() {
                return Err(DomainError::Runtime(
                    "a query is already in flight for this session".to_string(),
                ));
            }
            *current = Some(tx);
        }
        if let Err(e) = self.write_command(&AgentCommand::Query { prompt: prompt.to_string() }).await
        {
            *self.shared.current_query.lock().await = None;
            return Err(e);
        }
        Ok(rx)
    }

    async fn interrupt(&mut self) -> DomainResult<()> {
        self.write_command(&AgentCommand::Interrupt).await
    }

    async fn close(&mut self) -> DomainResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        // Polite protocol close first; the write can fail if the child is
        // already gone, which is fine.
        let _ = self.write_command(&AgentCommand::Close).await;

        let graceful = tokio::time::timeout(self.close_grace, self.child.wait()).await;
        if graceful.is_ok() {
            return Ok(());
        }

        // SIGTERM, another grace period, then SIGKILL.
        if let Some(pid) = self.child.id() {
            let _ = nix::sys::signal::kill(
                nix::unistd::Pid::from_raw(pid as i32),
                nix::sys::signal::Signal::SIGTERM,
            );
        }
        let termed = tokio::time::timeout(self.close_grace, self.child.wait()).await;
        if termed.is_err() {
            let _ = self.child.start_kill();
            let _ = self.child.wait().await;
        }
        Ok(())
    }

    fn external_session_id(&self) -> Option<String> {
        self.external_id_rx.borrow().clone()
    }
}
