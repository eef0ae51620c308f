//! Mission CRUD coordination.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Mission, MissionExecution, MissionStatus};
use crate::domain::ports::{LlmHelper, MissionRepository};

use super::schedule::{next_occurrence, parse_natural_schedule, validate_cron, validate_timezone};

/// Fields accepted by `create_mission`. Exactly one of `cron_expression` or
/// `schedule_natural` must be provided.
#[derive(Debug, Clone, Default)]
pub struct CreateMission {
    pub name: String,
    pub prompt: String,
    pub cron_expression: Option<String>,
    pub schedule_natural: Option<String>,
    pub timezone: Option<String>,
    pub working_dir: String,
    pub personality: Option<String>,
    pub allowed_tools: Vec<String>,
    pub model: Option<String>,
    pub user_id: Option<String>,
    pub sandbox_mode: bool,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateMission {
    pub name: Option<String>,
    pub prompt: Option<String>,
    pub cron_expression: Option<String>,
    pub timezone: Option<String>,
    pub personality: Option<String>,
    pub model: Option<String>,
    pub allowed_tools: Option<Vec<String>>,
}

pub struct MissionService {
    repo: Arc<dyn MissionRepository>,
    helper: Option<Arc<dyn LlmHelper>>,
}

impl MissionService {
    pub fn new(repo: Arc<dyn MissionRepository>) -> Self {
        Self { repo, helper: None }
    }

    pub fn with_helper(mut self, helper: Arc<dyn LlmHelper>) -> Self {
        self.helper = Some(helper);
        self
    }

    /// Create a mission. Natural-language schedules are resolved through
    /// the helper model; the resulting cron and timezone must both validate
    /// before the mission is accepted. `next_execution_at` is seeded from
    /// the current instant.
    pub async fn create_mission(&self, fields: CreateMission) -> DomainResult<Mission> {
        let (cron, timezone, natural) = match (&fields.cron_expression, &fields.schedule_natural) {
            (Some(cron), _) => {
                validate_cron(cron)?;
                let tz = fields.timezone.clone().unwrap_or_else(|| "UTC".to_string());
                validate_timezone(&tz)?;
                (cron.clone(), tz, fields.schedule_natural.clone())
            }
            (None, Some(natural)) => {
                let helper = self.helper.as_ref().ok_or_else(|| {
                    DomainError::Unavailable("schedule parser helper not configured".to_string())
                })?;
                let parsed = parse_natural_schedule(helper, natural).await?;
                (parsed.cron, parsed.timezone, Some(natural.clone()))
            }
            (None, None) => {
                return Err(DomainError::Validation(
                    "Mission requires a cron expression or a natural-language schedule".to_string(),
                ))
            }
        };

        let mut mission =
            Mission::new(fields.name, fields.prompt, cron, fields.working_dir).with_timezone(timezone);
        mission.schedule_natural = natural;
        mission.personality = fields.personality;
        mission.allowed_tools = fields.allowed_tools;
        mission.model = fields.model;
        mission.user_id = fields.user_id;
        mission.sandbox_mode = fields.sandbox_mode;
        mission.validate().map_err(DomainError::Validation)?;

        mission.next_execution_at =
            Some(next_occurrence(&mission.cron_expression, &mission.timezone, Utc::now())?);

        self.repo.create(&mission).await?;
        tracing::info!(
            mission_id = %mission.id,
            name = %mission.name,
            cron = %mission.cron_expression,
            next_execution = ?mission.next_execution_at,
            "Mission created"
        );
        Ok(mission)
    }

    pub async fn get_mission(&self, id: Uuid) -> DomainResult<Mission> {
        self.repo.get(id).await?.ok_or(DomainError::MissionNotFound(id))
    }

    pub async fn list_missions(&self, status: Option<MissionStatus>) -> DomainResult<Vec<Mission>> {
        self.repo.list(status).await
    }

    pub async fn update_mission(&self, id: Uuid, update: UpdateMission) -> DomainResult<Mission> {
        let mut mission = self.get_mission(id).await?;

        if let Some(name) = update.name {
            mission.name = name;
        }
        if let Some(prompt) = update.prompt {
            mission.prompt = prompt;
        }
        let mut reschedule = false;
        if let Some(cron) = update.cron_expression {
            validate_cron(&cron)?;
            mission.cron_expression = cron;
            reschedule = true;
        }
        if let Some(tz) = update.timezone {
            validate_timezone(&tz)?;
            mission.timezone = tz;
            reschedule = true;
        }
        if let Some(personality) = update.personality {
            mission.personality = Some(personality);
        }
        if let Some(model) = update.model {
            mission.model = Some(model);
        }
        if let Some(tools) = update.allowed_tools {
            mission.allowed_tools = tools;
        }

        mission.validate().map_err(DomainError::Validation)?;
        if reschedule && mission.status == MissionStatus::Active {
            mission.next_execution_at =
                Some(next_occurrence(&mission.cron_expression, &mission.timezone, Utc::now())?);
        }
        mission.updated_at = Utc::now();
        self.repo.update(&mission).await?;
        Ok(mission)
    }

    pub async fn delete_mission(&self, id: Uuid) -> DomainResult<bool> {
        self.repo.delete(id).await
    }

    /// Pause: the scheduler stops selecting the mission.
    pub async fn pause_mission(&self, id: Uuid) -> DomainResult<Mission> {
        let mut mission = self.get_mission(id).await?;
        mission.status = MissionStatus::Paused;
        mission.updated_at = Utc::now();
        self.repo.update(&mission).await?;
        tracing::info!(mission_id = %id, "Mission paused");
        Ok(mission)
    }

    /// Resume: reactivate and recompute the next fire time from now, so a
    /// long pause doesn't cause an immediate stale firing.
    pub async fn resume_mission(&self, id: Uuid) -> DomainResult<Mission> {
        let mut mission = self.get_mission(id).await?;
        mission.status = MissionStatus::Active;
        mission.next_execution_at =
            Some(next_occurrence(&mission.cron_expression, &mission.timezone, Utc::now())?);
        mission.updated_at = Utc::now();
        self.repo.update(&mission).await?;
        tracing::info!(mission_id = %id, next_execution = ?mission.next_execution_at, "Mission resumed");
        Ok(mission)
    }

    pub async fn list_executions(
        &self,
        mission_id: Uuid,
        limit: usize,
    ) -> DomainResult<Vec<MissionExecution>> {
        // 404 on an unknown mission rather than an empty list.
        self.get_mission(mission_id).await?;
        self.repo.list_executions(mission_id, limit).await
    }

    pub async fn get_execution(&self, execution_id: Uuid) -> DomainResult<MissionExecution> {
        self.repo
            .get_execution(execution_id)
            .await?
            .ok_or(DomainError::ExecutionNotFound(execution_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteMissionRepository};

    async fn service() -> MissionService {
        let pool = create_migrated_test_pool().await.unwrap();
        MissionService::new(Arc::new(SqliteMissionRepository::new(pool)))
    }

    fn fields(name: &str, cron: &str) -> CreateMission {
        CreateMission {
            name: name.into(),
            prompt: "do the thing".into(),
            cron_expression: Some(cron.into()),
            working_dir: "/tmp/p".into(),
            ..CreateMission::default()
        }
    }

    #[tokio::test]
    async fn create_seeds_next_execution() {
        let svc = service().await;
        let mission = svc.create_mission(fields("daily", "0 8 * * *")).await.unwrap();
        assert!(mission.next_execution_at.is_some());
        assert!(mission.next_execution_at.unwrap() > Utc::now());
    }

    #[tokio::test]
    async fn create_rejects_invalid_cron() {
        let svc = service().await;
        let result = svc.create_mission(fields("bad", "99 99 * * *")).await;
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn create_rejects_invalid_timezone() {
        let svc = service().await;
        let mut f = fields("tz", "0 8 * * *");
        f.timezone = Some("Nowhere/Void".into());
        let result = svc.create_mission(f).await;
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn create_requires_some_schedule() {
        let svc = service().await;
        let mut f = fields("none", "0 8 * * *");
        f.cron_expression = None;
        let result = svc.create_mission(f).await;
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn pause_and_resume() {
        let svc = service().await;
        let mission = svc.create_mission(fields("pausable", "0 8 * * *")).await.unwrap();

        let paused = svc.pause_mission(mission.id).await.unwrap();
        assert_eq!(paused.status, MissionStatus::Paused);

        let resumed = svc.resume_mission(mission.id).await.unwrap();
        assert_eq!(resumed.status, MissionStatus::Active);
        assert!(resumed.next_execution_at.unwrap() > Utc::now());
    }

    #[tokio::test]
    async fn update_reschedules_on_cron_change() {
        let svc = service().await;
        let mission = svc.create_mission(fields("resched", "0 8 * * *")).await.unwrap();
        let before = mission.next_execution_at.unwrap();

        let updated = svc
            .update_mission(
                mission.id,
                UpdateMission { cron_expression: Some("30 20 * * *".into()), ..UpdateMission::default() },
            )
            .await
            .unwrap();
        assert_eq!(updated.cron_expression, "30 20 * * *");
        assert_ne!(updated.next_execution_at.unwrap(), before);
    }

    #[tokio::test]
    async fn executions_404_on_unknown_mission() {
        let svc = service().await;
        let result = svc.list_executions(Uuid::new_v4(), 10).await;
        assert!(matches!(result, Err(DomainError::MissionNotFound(_))));
    }
}
