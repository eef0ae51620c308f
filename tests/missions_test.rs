//! Mission integration tests: natural-language schedules, scheduler ticks,
//! and executor output handling.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::{MockLlmHelper, ScriptedRuntimeFactory};
use dere::adapters::sqlite::{SqliteMissionRepository, SqliteSessionRepository};
use dere::domain::models::{MissionExecutionStatus, MissionStatus, StreamEventKind};
use dere::domain::ports::{LlmHelper, MissionRepository, ParsedSchedule};
use dere::services::missions::next_occurrence;
use dere::services::{
    AgentSessionService, CreateMission, MissionExecutor, MissionScheduler, MissionService,
    SessionServiceConfig,
};

struct Fixture {
    repo: Arc<SqliteMissionRepository>,
    service: MissionService,
    scheduler: Arc<MissionScheduler>,
}

async fn fixture(factory: ScriptedRuntimeFactory, helper: Arc<dyn LlmHelper>) -> Fixture {
    let pool = common::test_pool().await;
    let repo = Arc::new(SqliteMissionRepository::new(pool.clone()));
    let sessions = Arc::new(AgentSessionService::new(
        Arc::new(SqliteSessionRepository::new(pool)),
        Arc::new(factory),
        SessionServiceConfig::default(),
    ));
    let executor =
        Arc::new(MissionExecutor::new(sessions, repo.clone()).with_helper(helper.clone()));
    let service = MissionService::new(repo.clone()).with_helper(helper);
    let scheduler =
        Arc::new(MissionScheduler::new(repo.clone(), executor, Duration::from_secs(60)));
    Fixture { repo, service, scheduler }
}

fn weekday_mission(name: &str) -> CreateMission {
    CreateMission {
        name: name.into(),
        prompt: "review the morning inbox".into(),
        schedule_natural: Some("every weekday at 8:30am".into()),
        working_dir: "/tmp/project".into(),
        ..CreateMission::default()
    }
}

#[tokio::test]
async fn natural_language_schedule_resolves_and_validates() {
    let fixture = fixture(
        ScriptedRuntimeFactory::echoing("ok"),
        Arc::new(MockLlmHelper::default()),
    )
    .await;

    let mission = fixture.service.create_mission(weekday_mission("weekday")).await.unwrap();
    assert_eq!(mission.cron_expression, "30 8 * * 1-5");
    assert_eq!(mission.timezone, "UTC");
    assert_eq!(mission.schedule_natural.as_deref(), Some("every weekday at 8:30am"));

    // next_execution_at equals the next matching occurrence from now.
    let expected = next_occurrence("30 8 * * 1-5", "UTC", Utc::now()).unwrap();
    let stored = mission.next_execution_at.unwrap();
    assert!((stored - expected).num_seconds().abs() <= 1);
    assert!(stored > Utc::now());
}

#[tokio::test]
async fn invalid_helper_cron_is_rejected() {
    let helper = MockLlmHelper {
        schedule: ParsedSchedule {
            cron: "99 99 * * *".into(),
            timezone: "UTC".into(),
            explanation: None,
        },
        ..MockLlmHelper::default()
    };
    let fixture = fixture(ScriptedRuntimeFactory::echoing("ok"), Arc::new(helper)).await;
    assert!(fixture.service.create_mission(weekday_mission("bad")).await.is_err());
}

#[tokio::test]
async fn invalid_helper_timezone_is_rejected() {
    let helper = MockLlmHelper {
        schedule: ParsedSchedule {
            cron: "30 8 * * 1-5".into(),
            timezone: "Atlantis/Sunken".into(),
            explanation: None,
        },
        ..MockLlmHelper::default()
    };
    let fixture = fixture(ScriptedRuntimeFactory::echoing("ok"), Arc::new(helper)).await;
    assert!(fixture.service.create_mission(weekday_mission("bad-tz")).await.is_err());
}

#[tokio::test]
async fn scheduler_tick_executes_due_mission_and_advances() {
    let factory = ScriptedRuntimeFactory::new(Arc::new(|_prompt: &str| {
        vec![
            StreamEventKind::Text { text: "mission output".into() },
            StreamEventKind::ToolUse {
                id: "t1".into(),
                name: "read".into(),
                input: serde_json::Value::Null,
            },
            StreamEventKind::Done { tool_count: 1, duration_ms: None },
        ]
    }));
    let fixture = fixture(factory, Arc::new(MockLlmHelper::default())).await;

    let mut mission = fixture
        .service
        .create_mission(CreateMission {
            name: "due".into(),
            prompt: "do it".into(),
            cron_expression: Some("0 8 * * *".into()),
            working_dir: "/tmp/project".into(),
            ..CreateMission::default()
        })
        .await
        .unwrap();

    // Force the mission due.
    mission.next_execution_at = Some(Utc::now() - chrono::Duration::minutes(5));
    fixture.repo.update(&mission).await.unwrap();

    fixture.scheduler.tick().await.unwrap();

    let after = fixture.service.get_mission(mission.id).await.unwrap();
    assert!(after.last_execution_at.is_some());
    let next = after.next_execution_at.unwrap();
    assert!(next > Utc::now(), "next_execution_at advances past now");

    let executions = fixture.service.list_executions(mission.id, 10).await.unwrap();
    assert_eq!(executions.len(), 1);
    let execution = &executions[0];
    assert_eq!(execution.status, MissionExecutionStatus::Completed);
    assert_eq!(execution.output_text.as_deref(), Some("mission output"));
    assert_eq!(execution.tool_count, 1);
    assert!(execution.completed_at.is_some());
}

#[tokio::test]
async fn paused_missions_are_not_selected() {
    let fixture = fixture(
        ScriptedRuntimeFactory::echoing("ok"),
        Arc::new(MockLlmHelper::default()),
    )
    .await;

    let mut mission = fixture
        .service
        .create_mission(CreateMission {
            name: "paused".into(),
            prompt: "never run".into(),
            cron_expression: Some("0 8 * * *".into()),
            working_dir: "/tmp/project".into(),
            ..CreateMission::default()
        })
        .await
        .unwrap();
    mission.next_execution_at = Some(Utc::now() - chrono::Duration::minutes(5));
    fixture.repo.update(&mission).await.unwrap();
    fixture.service.pause_mission(mission.id).await.unwrap();

    fixture.scheduler.tick().await.unwrap();

    let executions = fixture.service.list_executions(mission.id, 10).await.unwrap();
    assert!(executions.is_empty());
    assert_eq!(
        fixture.service.get_mission(mission.id).await.unwrap().status,
        MissionStatus::Paused
    );
}

#[tokio::test]
async fn failing_agent_marks_execution_failed() {
    let factory = ScriptedRuntimeFactory::new(Arc::new(|_prompt: &str| {
        vec![
            StreamEventKind::Error { message: "agent exploded".into(), recoverable: false },
            StreamEventKind::Done { tool_count: 0, duration_ms: None },
        ]
    }));
    let fixture = fixture(factory, Arc::new(MockLlmHelper::default())).await;

    let mut mission = fixture
        .service
        .create_mission(CreateMission {
            name: "doomed".into(),
            prompt: "explode".into(),
            cron_expression: Some("0 8 * * *".into()),
            working_dir: "/tmp/project".into(),
            ..CreateMission::default()
        })
        .await
        .unwrap();
    mission.next_execution_at = Some(Utc::now() - chrono::Duration::minutes(5));
    fixture.repo.update(&mission).await.unwrap();

    fixture.scheduler.tick().await.unwrap();

    let executions = fixture.service.list_executions(mission.id, 10).await.unwrap();
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].status, MissionExecutionStatus::Failed);
    assert_eq!(executions[0].error_message.as_deref(), Some("agent exploded"));

    // The schedule still advances so the failure doesn't refire every tick.
    let after = fixture.service.get_mission(mission.id).await.unwrap();
    assert!(after.next_execution_at.unwrap() > Utc::now());
}

#[tokio::test]
async fn long_output_gets_summary() {
    let factory = ScriptedRuntimeFactory::new(Arc::new(|_prompt: &str| {
        vec![
            StreamEventKind::Text { text: "x".repeat(2000) },
            StreamEventKind::Done { tool_count: 0, duration_ms: None },
        ]
    }));
    let fixture = fixture(factory, Arc::new(MockLlmHelper::default())).await;

    let mut mission = fixture
        .service
        .create_mission(CreateMission {
            name: "chatty".into(),
            prompt: "write a lot".into(),
            cron_expression: Some("0 8 * * *".into()),
            working_dir: "/tmp/project".into(),
            ..CreateMission::default()
        })
        .await
        .unwrap();
    mission.next_execution_at = Some(Utc::now() - chrono::Duration::minutes(5));
    fixture.repo.update(&mission).await.unwrap();

    fixture.scheduler.tick().await.unwrap();

    let executions = fixture.service.list_executions(mission.id, 10).await.unwrap();
    assert_eq!(executions[0].output_summary.as_deref(), Some("A short summary."));
}
