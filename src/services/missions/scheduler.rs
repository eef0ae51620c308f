//! Mission scheduler.
//!
//! One background loop ticks periodically, executes due missions serially
//! (the external agent runtime does not take kindly to parallel spawns),
//! and advances `next_execution_at` from the current instant in each
//! mission's timezone.

use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Mission, MissionExecution, MissionStatus, MissionTrigger};
use crate::domain::ports::MissionRepository;

use super::executor::MissionExecutor;
use super::schedule::next_occurrence;

pub struct MissionScheduler {
    repo: Arc<dyn MissionRepository>,
    executor: Arc<MissionExecutor>,
    tick_interval: Duration,
    running: Arc<AtomicBool>,
}

impl MissionScheduler {
    pub fn new(
        repo: Arc<dyn MissionRepository>,
        executor: Arc<MissionExecutor>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            repo,
            executor,
            tick_interval,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the tick loop. Returns the task handle.
    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        let scheduler = self.clone();
        tracing::info!(interval_secs = scheduler.tick_interval.as_secs(), "Mission scheduler started");

        tokio::spawn(async move {
            while scheduler.running.load(Ordering::SeqCst) {
                tokio::time::sleep(scheduler.tick_interval).await;
                if !scheduler.running.load(Ordering::SeqCst) {
                    break;
                }
                // One bad tick never stops the loop.
                if let Err(e) = scheduler.tick().await {
                    tracing::error!(error = %e, "Mission scheduler tick failed");
                }
            }
            tracing::info!("Mission scheduler stopped");
        })
    }

    /// Cooperative stop; the loop observes the flag on its next wake.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// One scheduler pass: find due missions, execute serially, advance.
    pub async fn tick(&self) -> DomainResult<()> {
        let now = Utc::now();
        let due = self.repo.due_missions(now).await?;
        if due.is_empty() {
            return Ok(());
        }
        tracing::info!(count = due.len(), "Found due missions");

        for mission in due {
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            if let Err(e) = self
                .executor
                .execute(&mission, MissionTrigger::Scheduled, None)
                .await
            {
                tracing::error!(mission_id = %mission.id, error = %e, "Failed to execute mission");
            }
            // Advance regardless of execution outcome so a failing mission
            // doesn't fire continuously.
            if let Err(e) = self.advance(&mission).await {
                tracing::error!(mission_id = %mission.id, error = %e, "Failed to advance mission schedule");
            }
        }
        Ok(())
    }

    /// Write back `last_execution_at` and the next cron occurrence computed
    /// from the current instant in the mission's timezone.
    async fn advance(&self, mission: &Mission) -> DomainResult<()> {
        let now = Utc::now();
        let next = next_occurrence(&mission.cron_expression, &mission.timezone, now)?;

        let Some(mut stored) = self.repo.get(mission.id).await? else {
            return Ok(());
        };
        stored.last_execution_at = Some(now);
        stored.next_execution_at = Some(next);
        stored.updated_at = now;
        self.repo.update(&stored).await?;

        tracing::debug!(
            mission = %mission.name,
            next_execution = %next.to_rfc3339(),
            "Mission schedule advanced"
        );
        Ok(())
    }

    /// Manually trigger a mission now, bypassing the due-mission selection.
    /// Runs in a fresh background task; the returned execution id can be
    /// polled through the executions API.
    pub async fn trigger_now(
        &self,
        mission_id: Uuid,
        triggered_by: Option<String>,
    ) -> DomainResult<Uuid> {
        let mission = self
            .repo
            .get(mission_id)
            .await?
            .ok_or(DomainError::MissionNotFound(mission_id))?;
        if mission.status == MissionStatus::Paused {
            return Err(DomainError::Validation(format!(
                "Mission '{}' is paused",
                mission.name
            )));
        }

        // The execution row is created before handing off so the caller can
        // observe it immediately.
        let execution = MissionExecution::started(mission.id, MissionTrigger::Manual, triggered_by);
        let execution_id = execution.id;
        self.repo.create_execution(&execution).await?;

        let executor = self.executor.clone();
        let repo = self.repo.clone();
        tokio::spawn(async move {
            if let Err(e) = executor.execute_into(&mission, execution).await {
                tracing::error!(mission_id = %mission.id, error = %e, "Manual mission execution failed");
            }
            // Manual runs do not advance next_execution_at, but they do
            // record the run time.
            if let Ok(Some(mut stored)) = repo.get(mission.id).await {
                stored.last_execution_at = Some(Utc::now());
                stored.updated_at = Utc::now();
                let _ = repo.update(&stored).await;
            }
        });

        Ok(execution_id)
    }
}
