//! Swarm coordinator.
//!
//! Creates and runs DAGs of dependent agents. Execution is a fixed-point
//! loop: every pass evaluates which pending agents have satisfied
//! dependencies, launches them as isolated tasks, and settles skip cascades
//! for failed conditions and dead upstream agents. Agent failures never
//! cancel siblings.

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AgentSpec, BranchMergeOutcome, DependencySpec, ScratchpadEntry, SessionConfig, StreamEventKind,
    Swarm, SwarmAgent, SwarmAgentStatus, SwarmStatus,
};
use crate::domain::ports::SwarmRepository;
use crate::services::session_service::AgentSessionService;

use super::conditions::evaluate_condition;
use super::git::{agent_branch_name, checkout_agent_branch, merge_branch};

/// Name given to the auto-appended synthesis agent.
const SYNTHESIS_AGENT_NAME: &str = "synthesis";

/// Poll interval for wait_for_agents and the scheduling loop's fallback
/// wake.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

const DEFAULT_SYNTHESIS_PROMPT: &str = "Every other agent in this swarm has finished. Read their \
outputs from the shared scratchpad and your dependency results, aggregate the findings into a \
single coherent summary, and propose concrete follow-up tasks for anything unresolved or newly \
discovered.";

/// Parameters for `create_swarm`.
#[derive(Debug, Clone, Default)]
pub struct CreateSwarm {
    pub name: String,
    pub description: Option<String>,
    pub parent_session_id: Option<Uuid>,
    pub working_dir: String,
    pub agents: Vec<AgentSpec>,
    pub git_branch_prefix: Option<String>,
    pub base_branch: Option<String>,
    pub auto_synthesize: bool,
    pub synthesis_prompt: Option<String>,
    pub skip_synthesis_on_failure: bool,
}

/// Detect a dependency cycle over `child -> dep` edges with a depth-first
/// search. Edges to unknown agent names are ignored. Returns the cycle path
/// (first node repeated at the end) when one exists.
pub fn detect_dependency_cycle(agents: &[AgentSpec]) -> Option<Vec<String>> {
    let known: HashSet<&str> = agents.iter().map(|a| a.name.as_str()).collect();
    let edges: HashMap<&str, Vec<&str>> = agents
        .iter()
        .map(|a| {
            let deps = a
                .depends_on
                .iter()
                .flatten()
                .map(|d| d.agent.as_str())
                .filter(|name| known.contains(name))
                .collect();
            (a.name.as_str(), deps)
        })
        .collect();

    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Grey,
        Black,
    }

    fn visit<'a>(
        node: &'a str,
        edges: &HashMap<&'a str, Vec<&'a str>>,
        colors: &mut HashMap<&'a str, Color>,
        stack: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        colors.insert(node, Color::Grey);
        stack.push(node);

        for &dep in edges.get(node).into_iter().flatten() {
            match colors.get(dep).copied().unwrap_or(Color::White) {
                Color::Grey => {
                    // Found a back edge: the cycle is the stack suffix from
                    // the first occurrence of `dep`, closed with `dep`.
                    let start = stack.iter().position(|&n| n == dep).unwrap_or(0);
                    let mut cycle: Vec<String> =
                        stack[start..].iter().map(ToString::to_string).collect();
                    cycle.push(dep.to_string());
                    return Some(cycle);
                }
                Color::White => {
                    if let Some(cycle) = visit(dep, edges, colors, stack) {
                        return Some(cycle);
                    }
                }
                Color::Black => {}
            }
        }

        stack.pop();
        colors.insert(node, Color::Black);
        None
    }

    let mut colors: HashMap<&str, Color> = HashMap::new();
    for agent in agents {
        if colors.get(agent.name.as_str()).copied().unwrap_or(Color::White) == Color::White {
            let mut stack = Vec::new();
            if let Some(cycle) = visit(agent.name.as_str(), &edges, &mut colors, &mut stack) {
                return Some(cycle);
            }
        }
    }
    None
}

/// Per-swarm run state held in memory while a swarm executes.
struct SwarmRun {
    cancelled: Arc<Notify>,
    cancel_flag: Arc<std::sync::atomic::AtomicBool>,
}

pub struct SwarmCoordinator {
    repo: Arc<dyn SwarmRepository>,
    sessions: Arc<AgentSessionService>,
    runs: Arc<RwLock<HashMap<Uuid, Arc<SwarmRun>>>>,
}

impl SwarmCoordinator {
    pub fn new(repo: Arc<dyn SwarmRepository>, sessions: Arc<AgentSessionService>) -> Self {
        Self {
            repo,
            sessions,
            runs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Validate and persist a swarm with its agents.
    pub async fn create_swarm(&self, params: CreateSwarm) -> DomainResult<(Swarm, Vec<SwarmAgent>)> {
        // Swarm agents cannot spawn nested swarms.
        if let Some(parent) = params.parent_session_id {
            if self.repo.agent_by_session(parent).await?.is_some() {
                return Err(DomainError::RecursiveSwarm);
            }
        }

        if params.agents.is_empty() {
            return Err(DomainError::Validation("A swarm requires at least one agent".to_string()));
        }
        let mut seen = HashSet::new();
        for spec in &params.agents {
            if spec.name.trim().is_empty() {
                return Err(DomainError::Validation("Agent name cannot be empty".to_string()));
            }
            if spec.prompt.trim().is_empty() {
                return Err(DomainError::Validation(format!(
                    "Agent '{}' has an empty prompt",
                    spec.name
                )));
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(DomainError::Validation(format!(
                    "Duplicate agent name: '{}'",
                    spec.name
                )));
            }
            if spec.name == SYNTHESIS_AGENT_NAME && params.auto_synthesize {
                return Err(DomainError::Validation(format!(
                    "Agent name '{SYNTHESIS_AGENT_NAME}' is reserved when auto_synthesize is set"
                )));
            }
        }

        let mut specs = params.agents.clone();
        if params.auto_synthesize {
            let deps = specs
                .iter()
                .map(|s| DependencySpec::bare(s.name.clone()))
                .collect::<Vec<_>>();
            let prompt = params
                .synthesis_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYNTHESIS_PROMPT.to_string());
            let mut synthesis = AgentSpec::new(SYNTHESIS_AGENT_NAME, prompt).with_depends_on(deps);
            synthesis.role = Some("synthesis".to_string());
            specs.push(synthesis);
        }

        if let Some(cycle) = detect_dependency_cycle(&specs) {
            return Err(DomainError::DependencyCycle { path: cycle });
        }

        let mut swarm = Swarm::new(params.name, params.working_dir);
        swarm.description = params.description;
        swarm.parent_session_id = params.parent_session_id;
        swarm.git_branch_prefix = params.git_branch_prefix;
        swarm.base_branch = params.base_branch;
        swarm.skip_synthesis_on_failure = params.skip_synthesis_on_failure;

        let agents: Vec<SwarmAgent> =
            specs.iter().map(|spec| SwarmAgent::from_spec(swarm.id, spec)).collect();

        self.repo.create(&swarm, &agents).await?;
        tracing::info!(
            swarm_id = %swarm.id,
            name = %swarm.name,
            agents = agents.len(),
            "Swarm created"
        );
        Ok((swarm, agents))
    }

    pub async fn get_swarm(&self, id: Uuid) -> DomainResult<Swarm> {
        self.repo.get(id).await?.ok_or(DomainError::SwarmNotFound(id))
    }

    pub async fn list_swarms(
        &self,
        status: Option<SwarmStatus>,
        limit: usize,
    ) -> DomainResult<Vec<Swarm>> {
        self.repo.list(status, limit).await
    }

    pub async fn agents(&self, swarm_id: Uuid) -> DomainResult<Vec<SwarmAgent>> {
        self.get_swarm(swarm_id).await?;
        self.repo.agents(swarm_id).await
    }

    pub async fn agent_output(&self, swarm_id: Uuid, name: &str) -> DomainResult<SwarmAgent> {
        self.get_swarm(swarm_id).await?;
        self.repo
            .agent_by_name(swarm_id, name)
            .await?
            .ok_or_else(|| DomainError::SwarmAgentNotFound(name.to_string()))
    }

    /// Start executing a pending swarm. The scheduling loop runs in its own
    /// task until every agent is terminal.
    pub async fn start_swarm(self: &Arc<Self>, swarm_id: Uuid) -> DomainResult<()> {
        let mut swarm = self.get_swarm(swarm_id).await?;
        if swarm.status != SwarmStatus::Pending {
            return Err(DomainError::Validation(format!(
                "Swarm is {} and cannot be started",
                swarm.status.as_str()
            )));
        }
        swarm.status = SwarmStatus::Running;
        swarm.started_at = Some(Utc::now());
        self.repo.update(&swarm).await?;

        let run = Arc::new(SwarmRun {
            cancelled: Arc::new(Notify::new()),
            cancel_flag: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        });
        self.runs.write().await.insert(swarm_id, run.clone());

        let coordinator = self.clone();
        tokio::spawn(async move {
            if let Err(e) = coordinator.run_swarm(swarm, run).await {
                tracing::error!(swarm_id = %swarm_id, error = %e, "Swarm execution loop failed");
            }
            coordinator.runs.write().await.remove(&swarm_id);
        });

        Ok(())
    }

    /// The fixed-point scheduling loop.
    async fn run_swarm(&self, swarm: Swarm, run: Arc<SwarmRun>) -> DomainResult<()> {
        let mut tasks: JoinSet<()> = JoinSet::new();
        let mut launched: HashSet<Uuid> = HashSet::new();

        loop {
            if run.cancel_flag.load(std::sync::atomic::Ordering::SeqCst) {
                break;
            }

            let agents = self.repo.agents(swarm.id).await?;
            let by_name: HashMap<String, SwarmAgent> =
                agents.iter().map(|a| (a.name.clone(), a.clone())).collect();

            if agents.iter().all(|a| a.status.is_terminal()) {
                self.finalize_swarm(&swarm, &agents).await?;
                break;
            }

            let mut progressed = false;
            for agent in &agents {
                if agent.status != SwarmAgentStatus::Pending || launched.contains(&agent.id) {
                    continue;
                }
                match self.dependency_state(agent, &by_name, &swarm) {
                    DependencyState::Runnable => {
                        launched.insert(agent.id);
                        progressed = true;
                        let coordinator_repo = self.repo.clone();
                        let sessions = self.sessions.clone();
                        let run_agent = agent.clone();
                        let run_swarm = swarm.clone();
                        let cancelled = run.cancelled.clone();
                        let cancel_flag = run.cancel_flag.clone();
                        tasks.spawn(async move {
                            run_one_agent(
                                coordinator_repo,
                                sessions,
                                run_swarm,
                                run_agent,
                                cancelled,
                                cancel_flag,
                            )
                            .await;
                        });
                    }
                    DependencyState::Skip(reason) => {
                        let mut skipped = agent.clone();
                        skipped.status = SwarmAgentStatus::Skipped;
                        skipped.error = Some(reason.clone());
                        skipped.completed_at = Some(Utc::now());
                        self.repo.update_agent(&skipped).await?;
                        progressed = true;
                        tracing::info!(
                            swarm_id = %swarm.id,
                            agent = %agent.name,
                            reason = %reason,
                            "Swarm agent skipped"
                        );
                    }
                    DependencyState::Waiting => {}
                }
            }

            if progressed {
                continue;
            }

            // Nothing changed this pass: wait for a running agent to finish
            // (or for a cancel), then re-evaluate. The fallback sleep covers
            // agents finishing through external session closure.
            tokio::select! {
                joined = tasks.join_next(), if !tasks.is_empty() => {
                    if let Some(Err(e)) = joined {
                        tracing::error!(swarm_id = %swarm.id, error = %e, "Swarm agent task panicked");
                    }
                }
                () = run.cancelled.notified() => {}
                () = tokio::time::sleep(POLL_INTERVAL), if tasks.is_empty() => {}
            }
        }

        // Drain remaining agent tasks (they observe the cancel notify).
        while tasks.join_next().await.is_some() {}
        Ok(())
    }

    fn dependency_state(
        &self,
        agent: &SwarmAgent,
        by_name: &HashMap<String, SwarmAgent>,
        swarm: &Swarm,
    ) -> DependencyState {
        let is_synthesis = agent.role.as_deref() == Some("synthesis");

        for dep in &agent.depends_on {
            // Unknown names are trivially satisfied.
            let Some(upstream) = by_name.get(&dep.agent) else { continue };

            match upstream.status {
                SwarmAgentStatus::Completed => {
                    if let Some(condition) = &dep.condition {
                        match evaluate_condition(condition, upstream.output.as_deref()) {
                            Ok(true) => {}
                            Ok(false) => {
                                return DependencyState::Skip(format!(
                                    "condition '{}' on '{}' evaluated false",
                                    condition, dep.agent
                                ));
                            }
                            Err(e) => {
                                return DependencyState::Skip(format!(
                                    "condition on '{}' failed to evaluate: {e}",
                                    dep.agent
                                ));
                            }
                        }
                    }
                }
                SwarmAgentStatus::Failed if is_synthesis => {
                    if swarm.skip_synthesis_on_failure {
                        return DependencyState::Skip(format!(
                            "upstream agent '{}' failed and synthesis is configured to skip",
                            dep.agent
                        ));
                    }
                    // Synthesis treats a failed sibling as settled input.
                }
                SwarmAgentStatus::Skipped | SwarmAgentStatus::Cancelled if is_synthesis => {}
                SwarmAgentStatus::Failed
                | SwarmAgentStatus::Cancelled
                | SwarmAgentStatus::Skipped => {
                    return DependencyState::Skip(format!(
                        "upstream agent '{}' is {}",
                        dep.agent,
                        upstream.status.as_str()
                    ));
                }
                SwarmAgentStatus::Pending | SwarmAgentStatus::Running => {
                    return DependencyState::Waiting;
                }
            }
        }
        DependencyState::Runnable
    }

    async fn finalize_swarm(&self, swarm: &Swarm, agents: &[SwarmAgent]) -> DomainResult<()> {
        let mut updated = self.get_swarm(swarm.id).await?;
        if updated.status.is_terminal() {
            return Ok(());
        }
        let any_failed = agents.iter().any(|a| a.status == SwarmAgentStatus::Failed);
        let any_cancelled = agents.iter().any(|a| a.status == SwarmAgentStatus::Cancelled);
        updated.status = if any_cancelled {
            SwarmStatus::Cancelled
        } else if any_failed {
            SwarmStatus::Failed
        } else {
            SwarmStatus::Completed
        };
        updated.completed_at = Some(Utc::now());
        self.repo.update(&updated).await?;
        tracing::info!(
            swarm_id = %swarm.id,
            status = updated.status.as_str(),
            "Swarm finished"
        );
        Ok(())
    }

    /// Block until every named agent (all agents when `names` is `None`) is
    /// terminal, or the timeout elapses. Returns the current agent states.
    pub async fn wait_for_agents(
        &self,
        swarm_id: Uuid,
        names: Option<Vec<String>>,
        timeout: Duration,
    ) -> DomainResult<Vec<SwarmAgent>> {
        self.get_swarm(swarm_id).await?;
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let agents = self.repo.agents(swarm_id).await?;
            let watched: Vec<&SwarmAgent> = match &names {
                Some(names) => {
                    for name in names {
                        if !agents.iter().any(|a| &a.name == name) {
                            return Err(DomainError::SwarmAgentNotFound(name.clone()));
                        }
                    }
                    agents.iter().filter(|a| names.contains(&a.name)).collect()
                }
                None => agents.iter().collect(),
            };

            if watched.iter().all(|a| a.status.is_terminal()) {
                return Ok(watched.into_iter().cloned().collect());
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(watched.into_iter().cloned().collect());
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Cancel a swarm: pending agents become `cancelled`, running agents are
    /// told to stop (their sessions close, producing a terminal event), and
    /// completed results stay intact.
    pub async fn cancel_swarm(&self, swarm_id: Uuid) -> DomainResult<()> {
        let swarm = self.get_swarm(swarm_id).await?;
        let agents = self.repo.agents(swarm_id).await?;

        for agent in &agents {
            if agent.status == SwarmAgentStatus::Pending {
                let mut cancelled = agent.clone();
                cancelled.status = SwarmAgentStatus::Cancelled;
                cancelled.completed_at = Some(Utc::now());
                self.repo.update_agent(&cancelled).await?;
            }
        }

        if let Some(run) = self.runs.read().await.get(&swarm_id).cloned() {
            run.cancel_flag.store(true, std::sync::atomic::Ordering::SeqCst);
            run.cancelled.notify_waiters();
        }

        let mut updated = swarm;
        if !updated.status.is_terminal() {
            updated.status = SwarmStatus::Cancelled;
            updated.completed_at = Some(Utc::now());
            self.repo.update(&updated).await?;
        }
        tracing::info!(swarm_id = %swarm_id, "Swarm cancelled");
        Ok(())
    }

    /// Merge completed agents' branches into a target branch. Conflicts are
    /// reported per agent and later merges still proceed.
    pub async fn merge_branches(
        &self,
        swarm_id: Uuid,
        target_branch: &str,
        order: Option<Vec<String>>,
    ) -> DomainResult<Vec<BranchMergeOutcome>> {
        let swarm = self.get_swarm(swarm_id).await?;
        if swarm.git_branch_prefix.is_none() {
            return Err(DomainError::Validation(
                "Swarm was not created with branch isolation".to_string(),
            ));
        }

        let agents = self.repo.agents(swarm_id).await?;
        let mut completed: Vec<&SwarmAgent> = agents
            .iter()
            .filter(|a| a.status == SwarmAgentStatus::Completed && a.git_branch.is_some())
            .collect();

        if let Some(order) = &order {
            completed.sort_by_key(|a| {
                order.iter().position(|n| n == &a.name).unwrap_or(usize::MAX)
            });
        }

        let mut outcomes = Vec::with_capacity(completed.len());
        for agent in completed {
            let branch = agent.git_branch.clone().unwrap_or_default();
            let conflict = merge_branch(&swarm.working_dir, &branch, target_branch).await?;
            if let Some(message) = &conflict {
                tracing::warn!(
                    swarm_id = %swarm_id,
                    agent = %agent.name,
                    branch = %branch,
                    "Branch merge conflict"
                );
                let _ = message;
            }
            outcomes.push(BranchMergeOutcome {
                agent_name: agent.name.clone(),
                branch,
                merged: conflict.is_none(),
                conflict,
            });
        }
        Ok(outcomes)
    }

    // Scratchpad: persisted per-swarm KV, readable only within the swarm.

    pub async fn scratchpad_get(&self, swarm_id: Uuid, key: &str) -> DomainResult<ScratchpadEntry> {
        self.get_swarm(swarm_id).await?;
        self.repo
            .scratchpad_get(swarm_id, key)
            .await?
            .ok_or_else(|| DomainError::ScratchpadKeyNotFound(key.to_string()))
    }

    pub async fn scratchpad_put(
        &self,
        swarm_id: Uuid,
        key: &str,
        value: serde_json::Value,
        set_by_agent_id: Option<Uuid>,
        set_by_agent_name: Option<String>,
    ) -> DomainResult<ScratchpadEntry> {
        self.get_swarm(swarm_id).await?;
        if key.trim().is_empty() {
            return Err(DomainError::Validation("Scratchpad key cannot be empty".to_string()));
        }
        let now = Utc::now();
        let created_at = self
            .repo
            .scratchpad_get(swarm_id, key)
            .await?
            .map_or(now, |existing| existing.created_at);
        let entry = ScratchpadEntry {
            swarm_id,
            key: key.to_string(),
            value,
            set_by_agent_id,
            set_by_agent_name,
            created_at,
            updated_at: now,
        };
        self.repo.scratchpad_put(&entry).await?;
        Ok(entry)
    }

    pub async fn scratchpad_list(
        &self,
        swarm_id: Uuid,
        prefix: Option<&str>,
    ) -> DomainResult<Vec<ScratchpadEntry>> {
        self.get_swarm(swarm_id).await?;
        self.repo.scratchpad_list(swarm_id, prefix).await
    }

    pub async fn scratchpad_delete(&self, swarm_id: Uuid, key: &str) -> DomainResult<()> {
        self.get_swarm(swarm_id).await?;
        if self.repo.scratchpad_delete(swarm_id, key).await? {
            Ok(())
        } else {
            Err(DomainError::ScratchpadKeyNotFound(key.to_string()))
        }
    }
}

enum DependencyState {
    Runnable,
    Waiting,
    Skip(String),
}

/// Run one agent to a terminal state. Branch checkout, session spawn, query
/// streaming, and status persistence all happen here; failures land in the
/// agent row and never propagate to siblings.
async fn run_one_agent(
    repo: Arc<dyn SwarmRepository>,
    sessions: Arc<AgentSessionService>,
    swarm: Swarm,
    mut agent: SwarmAgent,
    cancelled: Arc<Notify>,
    cancel_flag: Arc<std::sync::atomic::AtomicBool>,
) {
    if cancel_flag.load(std::sync::atomic::Ordering::SeqCst) {
        return;
    }

    // Branch isolation, when configured.
    if let Some(prefix) = &swarm.git_branch_prefix {
        let branch = agent_branch_name(prefix, &agent.name);
        match checkout_agent_branch(&swarm.working_dir, &branch, swarm.base_branch.as_deref()).await
        {
            Ok(()) => agent.git_branch = Some(branch),
            Err(e) => {
                agent.status = SwarmAgentStatus::Failed;
                agent.error = Some(format!("branch checkout failed: {e}"));
                agent.completed_at = Some(Utc::now());
                let _ = repo.update_agent(&agent).await;
                return;
            }
        }
    }

    let mut config = SessionConfig::new(swarm.working_dir.clone()).lean();
    config.personality = agent.personality.clone();
    config.model = agent.model.clone();
    config.plugins = if agent.plugins.is_empty() { None } else { Some(agent.plugins.clone()) };
    config = config
        .with_env("DERE_SWARM_ID", swarm.id.to_string())
        .with_env("DERE_SWARM_AGENT_ID", agent.id.to_string());

    let session_id = match sessions.create_session(config).await {
        Ok(id) => id,
        Err(e) => {
            agent.status = SwarmAgentStatus::Failed;
            agent.error = Some(format!("session spawn failed: {e}"));
            agent.completed_at = Some(Utc::now());
            let _ = repo.update_agent(&agent).await;
            return;
        }
    };

    agent.session_id = Some(session_id);
    agent.status = SwarmAgentStatus::Running;
    agent.started_at = Some(Utc::now());
    if let Err(e) = repo.update_agent(&agent).await {
        tracing::error!(agent = %agent.name, error = %e, "Failed to persist running agent");
    }

    let mut output = String::new();
    let mut tool_count: u32 = 0;
    let mut error: Option<String> = None;
    let mut was_cancelled = false;

    match sessions.query(session_id, &agent.prompt).await {
        Ok(mut rx) => loop {
            if cancel_flag.load(std::sync::atomic::Ordering::SeqCst) {
                was_cancelled = true;
                break;
            }
            tokio::select! {
                event = rx.recv() => {
                    let Some(event) = event else { break };
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
                            error = Some(message);
                            if !recoverable {
                                break;
                            }
                        }
                        StreamEventKind::Cancelled => {
                            was_cancelled = true;
                            break;
                        }
                        _ => {}
                    }
                }
                () = cancelled.notified() => {
                    // Dropping the receiver interrupts the in-flight query.
                    was_cancelled = true;
                    break;
                }
            }
        },
        Err(e) => error = Some(e.to_string()),
    }

    if let Err(e) = sessions.close_session(session_id).await {
        tracing::warn!(session_id = %session_id, error = %e, "Failed to close swarm agent session");
    }

    agent.output = if output.is_empty() { None } else { Some(output) };
    agent.tool_count = tool_count;
    agent.completed_at = Some(Utc::now());
    agent.status = if was_cancelled {
        SwarmAgentStatus::Cancelled
    } else if let Some(message) = error {
        agent.error = Some(message);
        SwarmAgentStatus::Failed
    } else {
        SwarmAgentStatus::Completed
    };

    if let Err(e) = repo.update_agent(&agent).await {
        tracing::error!(agent = %agent.name, error = %e, "Failed to persist finished agent");
    }
    tracing::info!(
        swarm_id = %swarm.id,
        agent = %agent.name,
        status = agent.status.as_str(),
        tool_count = agent.tool_count,
        "Swarm agent finished"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_agent(name: &str, depends_on: &[&str]) -> AgentSpec {
        let deps = if depends_on.is_empty() {
            None
        } else {
            Some(depends_on.iter().map(|d| DependencySpec::bare(*d)).collect())
        };
        AgentSpec { depends_on: deps, ..AgentSpec::new(name, format!("prompt {name}")) }
    }

    #[test]
    fn no_dependencies_no_cycle() {
        let agents = vec![make_agent("a", &[]), make_agent("b", &[]), make_agent("c", &[])];
        assert!(detect_dependency_cycle(&agents).is_none());
    }

    #[test]
    fn linear_chain_no_cycle() {
        let agents = vec![make_agent("a", &[]), make_agent("b", &["a"]), make_agent("c", &["b"])];
        assert!(detect_dependency_cycle(&agents).is_none());
    }

    #[test]
    fn diamond_no_cycle() {
        let agents = vec![
            make_agent("a", &[]),
            make_agent("b", &["a"]),
            make_agent("c", &["a"]),
            make_agent("d", &["b", "c"]),
        ];
        assert!(detect_dependency_cycle(&agents).is_none());
    }

    #[test]
    fn simple_cycle_detected() {
        let agents = vec![make_agent("a", &["b"]), make_agent("b", &["a"])];
        let cycle = detect_dependency_cycle(&agents).unwrap();
        assert_eq!(cycle.len(), 3);
        assert_eq!(cycle.first(), cycle.last());
    }

    #[test]
    fn self_cycle_detected() {
        let agents = vec![make_agent("a", &["a"])];
        let cycle = detect_dependency_cycle(&agents).unwrap();
        assert_eq!(cycle, vec!["a".to_string(), "a".to_string()]);
    }

    #[test]
    fn three_node_cycle_detected() {
        let agents = vec![make_agent("a", &["c"]), make_agent("b", &["a"]), make_agent("c", &["b"])];
        let cycle = detect_dependency_cycle(&agents).unwrap();
        assert_eq!(cycle.len(), 4);
        assert_eq!(cycle.first(), cycle.last());
    }

    #[test]
    fn cycle_excludes_independent_agents() {
        let agents = vec![
            make_agent("independent", &[]),
            make_agent("a", &["b"]),
            make_agent("b", &["a"]),
            make_agent("also_independent", &[]),
        ];
        let cycle = detect_dependency_cycle(&agents).unwrap();
        assert!(!cycle.contains(&"independent".to_string()));
        assert!(!cycle.contains(&"also_independent".to_string()));
    }

    #[test]
    fn unknown_dependency_ignored() {
        let agents = vec![make_agent("a", &["nonexistent"]), make_agent("b", &["a"])];
        assert!(detect_dependency_cycle(&agents).is_none());
    }
}
