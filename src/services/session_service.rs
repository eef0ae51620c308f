//! Agent session service.
//!
//! Owns the registry of live sessions. Each entry wraps one agent child
//! process behind a per-session mutex (the underlying runtime is
//! single-threaded), a bounded replay buffer, and a broadcast channel for
//! subscriber fan-out. Cross-session operations run in parallel; the
//! registry lock guards map mutation only.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Conversation, MessageRole, Session, SessionConfig, StreamEvent, StreamEventKind,
};
use crate::domain::ports::{AgentRuntime, AgentRuntimeFactory, RuntimeSpec, SessionRepository};

/// Supplies the context block injected ahead of the first prompt of a
/// non-lean session. Implemented over the bond and emotion managers; the
/// session service only sees this trait, never the managers themselves.
#[async_trait]
pub trait ContextSource: Send + Sync {
    async fn context_block(&self, user_id: Option<&str>, session_id: Uuid) -> Option<String>;

    /// Observe a user message on a non-lean session (e.g. feed the emotion
    /// pipeline). Runs off the query path; the default does nothing.
    async fn observe_user_message(
        &self,
        _user_id: Option<String>,
        _session_id: Uuid,
        _text: String,
    ) {
    }
}

#[derive(Debug, Clone)]
pub struct SessionServiceConfig {
    pub replay_capacity: usize,
    pub default_model: Option<String>,
    pub sandbox_image: Option<String>,
    pub subscriber_capacity: usize,
}

impl Default for SessionServiceConfig {
    fn default() -> Self {
        Self {
            replay_capacity: 512,
            default_model: None,
            sandbox_image: None,
            subscriber_capacity: 256,
        }
    }
}

/// One live session.
pub struct RunningSession {
    pub id: Uuid,
    pub config: SessionConfig,
    runtime: Arc<Mutex<Box<dyn AgentRuntime>>>,
    seq: AtomicU64,
    replay: Mutex<VecDeque<StreamEvent>>,
    replay_capacity: usize,
    dropped: AtomicU64,
    live: broadcast::Sender<StreamEvent>,
    /// Context block waiting to be prepended to the first prompt.
    pending_context: Mutex<Option<String>>,
    /// Set when a non-recoverable runtime error was observed.
    defunct: AtomicBool,
}

impl RunningSession {
    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn record(&self, event: StreamEvent) {
        {
            let mut replay = self.replay.lock().await;
            if replay.len() >= self.replay_capacity {
                replay.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            replay.push_back(event.clone());
        }
        let _ = self.live.send(event);
    }

    pub fn is_defunct(&self) -> bool {
        self.defunct.load(Ordering::SeqCst)
    }
}

type SessionMap = Arc<RwLock<HashMap<Uuid, Arc<RunningSession>>>>;

pub struct AgentSessionService {
    sessions: SessionMap,
    repo: Arc<dyn SessionRepository>,
    factory: Arc<dyn AgentRuntimeFactory>,
    context: Option<Arc<dyn ContextSource>>,
    config: SessionServiceConfig,
}

impl AgentSessionService {
    pub fn new(
        repo: Arc<dyn SessionRepository>,
        factory: Arc<dyn AgentRuntimeFactory>,
        config: SessionServiceConfig,
    ) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            repo,
            factory,
            context: None,
            config,
        }
    }

    pub fn with_context_source(mut self, source: Arc<dyn ContextSource>) -> Self {
        self.context = Some(source);
        self
    }

    fn runtime_spec(&self, config: &SessionConfig) -> RuntimeSpec {
        RuntimeSpec {
            working_dir: config.working_dir.clone(),
            model: config.model.clone().or_else(|| self.config.default_model.clone()),
            allowed_tools: config.allowed_tools.clone(),
            env: config.env.clone(),
            resume_session_id: config.resume_external_id.clone(),
            sandbox_image: if config.sandbox_mode {
                self.config.sandbox_image.clone()
            } else {
                None
            },
        }
    }

    /// Spawn a session. Resolves once the agent reports ready.
    pub async fn create_session(&self, config: SessionConfig) -> DomainResult<Uuid> {
        let mut session = Session::new(config.working_dir.clone());
        session.personality = config.personality.clone();
        session.medium = config.medium.clone();
        session.user_id = config.user_id.clone();
        session.parent_session_id = config.parent_session_id;
        self.repo.create(&session).await?;

        let runtime = self.factory.start(self.runtime_spec(&config)).await?;
        let external_id = runtime.external_session_id();
        if external_id.is_some() {
            let mut row = session.clone();
            row.external_session_id = external_id.clone();
            self.repo.update(&row).await?;
        }

        let pending_context = if config.lean_mode {
            None
        } else if let Some(source) = &self.context {
            source.context_block(config.user_id.as_deref(), session.id).await
        } else {
            None
        };

        let (live, _) = broadcast::channel(self.config.subscriber_capacity);
        let running = Arc::new(RunningSession {
            id: session.id,
            config,
            runtime: Arc::new(Mutex::new(runtime)),
            seq: AtomicU64::new(0),
            replay: Mutex::new(VecDeque::new()),
            replay_capacity: self.config.replay_capacity,
            dropped: AtomicU64::new(0),
            live,
            pending_context: Mutex::new(pending_context),
            defunct: AtomicBool::new(false),
        });

        let ready = StreamEvent::new(
            running.next_seq(),
            StreamEventKind::SessionReady { external_session_id: external_id },
        );
        running.record(ready).await;

        self.sessions.write().await.insert(session.id, running);
        tracing::info!(session_id = %session.id, "Session created");
        Ok(session.id)
    }

    /// Re-attach an adapter to a stored session. Returns false when the
    /// external runtime cannot resume it. Sequence numbers restart.
    pub async fn resume_session(&self, session_id: Uuid) -> DomainResult<bool> {
        if self.sessions.read().await.contains_key(&session_id) {
            return Ok(true);
        }

        let Some(mut session) = self.repo.get(session_id).await? else {
            return Err(DomainError::SessionNotFound(session_id));
        };
        let Some(external_id) = session.external_session_id.clone() else {
            return Ok(false);
        };

        let mut config = SessionConfig::new(session.working_dir.clone());
        config.personality = session.personality.clone();
        config.user_id = session.user_id.clone();
        config.medium = session.medium.clone();
        config.resume_external_id = Some(external_id);

        let runtime = match self.factory.start(self.runtime_spec(&config)).await {
            Ok(runtime) => runtime,
            Err(DomainError::Runtime(message)) => {
                tracing::warn!(session_id = %session_id, %message, "Resume failed");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        session.ended_at = None;
        session.last_activity = chrono::Utc::now();
        self.repo.update(&session).await?;

        let (live, _) = broadcast::channel(self.config.subscriber_capacity);
        let running = Arc::new(RunningSession {
            id: session_id,
            config,
            runtime: Arc::new(Mutex::new(runtime)),
            seq: AtomicU64::new(0),
            replay: Mutex::new(VecDeque::new()),
            replay_capacity: self.config.replay_capacity,
            dropped: AtomicU64::new(0),
            live,
            pending_context: Mutex::new(None),
            defunct: AtomicBool::new(false),
        });
        let ready = StreamEvent::new(
            running.next_seq(),
            StreamEventKind::SessionReady { external_session_id: None },
        );
        running.record(ready).await;

        self.sessions.write().await.insert(session_id, running);
        Ok(true)
    }

    async fn running(&self, session_id: Uuid) -> DomainResult<Arc<RunningSession>> {
        self.sessions
            .read()
            .await
            .get(&session_id)
            .cloned()
            .ok_or(DomainError::SessionNotFound(session_id))
    }

    /// Dispatch a prompt and stream sequence-numbered events back.
    ///
    /// Events also reach every subscriber and the replay buffer. Dropping
    /// the returned receiver cancels the query: the service interrupts the
    /// agent and emits a synthetic `cancelled` to the other subscribers.
    pub async fn query(
        &self,
        session_id: Uuid,
        prompt: &str,
    ) -> DomainResult<mpsc::Receiver<StreamEvent>> {
        let running = self.running(session_id).await?;
        if running.is_defunct() {
            return Err(DomainError::Runtime("session runtime is defunct".to_string()));
        }

        let full_prompt = {
            let mut pending = running.pending_context.lock().await;
            match pending.take() {
                Some(context) => format!("{context}\n\n{prompt}"),
                None => prompt.to_string(),
            }
        };

        // Serialize on the session mutex. The owned guard moves into the
        // forwarder task and is held until the query reaches a terminal
        // event; cross-session queries proceed in parallel.
        let guard = running.runtime.clone().lock_owned().await;
        let mut guard = guard;
        let raw_rx = guard.query(&full_prompt).await?;

        // Touch the session row and record the user message.
        if let Ok(Some(mut session)) = self.repo.get(session_id).await {
            session.last_activity = chrono::Utc::now();
            let _ = self.repo.update(&session).await;
        }
        let mut user_message = Conversation::new(session_id, MessageRole::User, prompt);
        user_message.user_id = running.config.user_id.clone();
        user_message.medium = running.config.medium.clone();
        let _ = self.repo.append_conversation(&user_message).await;

        // Feed the affect engine off the query path.
        if !running.config.lean_mode {
            if let Some(context) = self.context.clone() {
                let user_id = running.config.user_id.clone();
                let text = prompt.to_string();
                tokio::spawn(async move {
                    context.observe_user_message(user_id, session_id, text).await;
                });
            }
        }

        let (tx, rx) = mpsc::channel(self.config.subscriber_capacity);
        let repo = self.repo.clone();
        let sessions = self.sessions.clone();
        let session_ref = running.clone();

        tokio::spawn(async move {
            let mut raw_rx = raw_rx;
            let mut assistant_text = String::new();
            let mut caller_gone = false;
            let mut fatal = false;

            while let Some(kind) = raw_rx.recv().await {
                if let StreamEventKind::Text { text } = &kind {
                    assistant_text.push_str(text);
                }
                if let StreamEventKind::Error { recoverable: false, .. } = &kind {
                    fatal = true;
                }
                let terminal = kind.is_terminal();

                let event = StreamEvent::new(session_ref.next_seq(), kind);
                session_ref.record(event.clone()).await;

                if !caller_gone && tx.send(event).await.is_err() {
                    // Caller dropped the stream: cancel the in-flight query
                    // and tell the other subscribers.
                    caller_gone = true;
                    let _ = guard.interrupt().await;
                    let cancelled =
                        StreamEvent::new(session_ref.next_seq(), StreamEventKind::Cancelled);
                    session_ref.record(cancelled).await;
                }

                if terminal {
                    break;
                }
            }

            if !assistant_text.is_empty() {
                let mut message =
                    Conversation::new(session_ref.id, MessageRole::Assistant, assistant_text);
                message.user_id = session_ref.config.user_id.clone();
                message.medium = session_ref.config.medium.clone();
                let _ = repo.append_conversation(&message).await;
            }

            if fatal {
                // Non-recoverable runtime error: tear the session down.
                session_ref.defunct.store(true, Ordering::SeqCst);
                let _ = guard.close().await;
                sessions.write().await.remove(&session_ref.id);
                if let Ok(Some(mut session)) = repo.get(session_ref.id).await {
                    session.ended_at = Some(chrono::Utc::now());
                    let _ = repo.update(&session).await;
                }
                tracing::warn!(session_id = %session_ref.id, "Session torn down after fatal runtime error");
            }
            drop(guard);
        });

        Ok(rx)
    }

    /// Replay snapshot plus a live receiver. The replay prefix is ordered by
    /// sequence number and the live receiver continues from there; a
    /// lagging subscriber observes `RecvError::Lagged`, which the facade
    /// renders as a `gap` event.
    pub async fn subscribe(
        &self,
        session_id: Uuid,
    ) -> DomainResult<(Vec<StreamEvent>, broadcast::Receiver<StreamEvent>)> {
        let running = self.running(session_id).await?;
        let replay = running.replay.lock().await;
        let mut snapshot = Vec::with_capacity(replay.len() + 1);
        let dropped = running.dropped.load(Ordering::Relaxed);
        if dropped > 0 {
            snapshot.push(StreamEvent::new(0, StreamEventKind::Gap { dropped }));
        }
        snapshot.extend(replay.iter().cloned());
        let rx = running.live.subscribe();
        Ok((snapshot, rx))
    }

    /// Close the adapter, persist the end time, and drop state.
    pub async fn close_session(&self, session_id: Uuid) -> DomainResult<()> {
        let Some(running) = self.sessions.write().await.remove(&session_id) else {
            return Err(DomainError::SessionNotFound(session_id));
        };

        {
            let mut runtime = running.runtime.lock().await;
            runtime.close().await?;
        }

        if let Some(mut session) = self.repo.get(session_id).await? {
            session.ended_at = Some(chrono::Utc::now());
            self.repo.update(&session).await?;
        }
        tracing::info!(session_id = %session_id, "Session closed");
        Ok(())
    }

    /// Apply config fields that don't require respawning the agent
    /// (personality, medium, user identity). Runtime-level settings are
    /// fixed at spawn.
    pub async fn update_session_config(
        &self,
        session_id: Uuid,
        config: &SessionConfig,
    ) -> DomainResult<()> {
        let mut session = self
            .repo
            .get(session_id)
            .await?
            .ok_or(DomainError::SessionNotFound(session_id))?;
        session.personality = config.personality.clone();
        session.medium = config.medium.clone();
        session.user_id = config.user_id.clone();
        session.last_activity = chrono::Utc::now();
        self.repo.update(&session).await
    }

    /// Ids of currently live sessions.
    pub async fn active_sessions(&self) -> Vec<Uuid> {
        self.sessions.read().await.keys().copied().collect()
    }

    pub async fn is_active(&self, session_id: Uuid) -> bool {
        self.sessions.read().await.contains_key(&session_id)
    }

    /// Close every live session; used during shutdown.
    pub async fn close_all(&self) {
        let ids = self.active_sessions().await;
        for id in ids {
            if let Err(e) = self.close_session(id).await {
                tracing::warn!(session_id = %id, error = %e, "Failed to close session during shutdown");
            }
        }
    }
}
