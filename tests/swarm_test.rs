//! Swarm integration tests: cycle rejection, conditional skip cascades,
//! scratchpad semantics, cancellation.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::ScriptedRuntimeFactory;
use dere::adapters::sqlite::{SqliteSessionRepository, SqliteSwarmRepository};
use dere::domain::errors::DomainError;
use dere::domain::models::{AgentSpec, DependencySpec, StreamEventKind, SwarmAgentStatus, SwarmStatus};
use dere::services::{
    AgentSessionService, CreateSwarm, SessionServiceConfig, SwarmCoordinator,
};

async fn coordinator_with(factory: ScriptedRuntimeFactory) -> Arc<SwarmCoordinator> {
    let pool = common::test_pool().await;
    let sessions = Arc::new(AgentSessionService::new(
        Arc::new(SqliteSessionRepository::new(pool.clone())),
        Arc::new(factory),
        SessionServiceConfig::default(),
    ));
    Arc::new(SwarmCoordinator::new(
        Arc::new(SqliteSwarmRepository::new(pool)),
        sessions,
    ))
}

fn create_params(agents: Vec<AgentSpec>) -> CreateSwarm {
    CreateSwarm {
        name: "test-swarm".into(),
        working_dir: "/tmp/project".into(),
        agents,
        ..CreateSwarm::default()
    }
}

/// The scheduling loop finalizes the swarm shortly after the last agent
/// lands; poll briefly instead of racing it.
async fn terminal_swarm_status(
    coordinator: &SwarmCoordinator,
    swarm_id: uuid::Uuid,
) -> SwarmStatus {
    for _ in 0..40 {
        let swarm = coordinator.get_swarm(swarm_id).await.unwrap();
        if swarm.status.is_terminal() {
            return swarm.status;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    coordinator.get_swarm(swarm_id).await.unwrap().status
}

#[tokio::test]
async fn cycle_is_rejected_with_path() {
    let coordinator = coordinator_with(ScriptedRuntimeFactory::echoing("ok")).await;

    let agents = vec![
        AgentSpec::new("a", "p").with_depends_on(vec![DependencySpec::bare("c")]),
        AgentSpec::new("b", "p").with_depends_on(vec![DependencySpec::bare("a")]),
        AgentSpec::new("c", "p").with_depends_on(vec![DependencySpec::bare("b")]),
    ];

    let result = coordinator.create_swarm(create_params(agents)).await;
    match result {
        Err(DomainError::DependencyCycle { path }) => {
            assert_eq!(path.len(), 4, "cycle of three agents closes with four nodes");
            assert_eq!(path.first(), path.last());
        }
        other => panic!("expected a dependency cycle error, got {other:?}"),
    }
}

#[tokio::test]
async fn conditional_gate_skips_dependent_and_cascades() {
    // The gate completes with low risk; the worker requires high risk.
    let factory = ScriptedRuntimeFactory::new(Arc::new(|prompt: &str| {
        let text = if prompt.contains("assess risk") {
            r#"{"risk": "low"}"#.to_string()
        } else {
            "worker output".to_string()
        };
        vec![
            StreamEventKind::Text { text },
            StreamEventKind::Done { tool_count: 0, duration_ms: None },
        ]
    }));
    let coordinator = coordinator_with(factory).await;

    let agents = vec![
        AgentSpec::new("gate", "assess risk"),
        AgentSpec::new("worker", "handle the risk").with_depends_on(vec![
            DependencySpec::conditional("gate", r#"output.risk == "high""#),
        ]),
        AgentSpec::new("follow", "follow up")
            .with_depends_on(vec![DependencySpec::bare("worker")]),
    ];

    let (swarm, _) = coordinator.create_swarm(create_params(agents)).await.unwrap();
    coordinator.start_swarm(swarm.id).await.unwrap();

    let agents = coordinator
        .wait_for_agents(swarm.id, None, Duration::from_secs(10))
        .await
        .unwrap();

    let status_of = |name: &str| {
        agents.iter().find(|a| a.name == name).map(|a| a.status).unwrap()
    };
    assert_eq!(status_of("gate"), SwarmAgentStatus::Completed);
    assert_eq!(status_of("worker"), SwarmAgentStatus::Skipped);
    assert_eq!(status_of("follow"), SwarmAgentStatus::Skipped);

    assert_eq!(terminal_swarm_status(&coordinator, swarm.id).await, SwarmStatus::Completed);
}

#[tokio::test]
async fn satisfied_condition_runs_dependent() {
    let factory = ScriptedRuntimeFactory::new(Arc::new(|prompt: &str| {
        let text = if prompt.contains("assess risk") {
            r#"{"risk": "high"}"#.to_string()
        } else {
            "handled".to_string()
        };
        vec![
            StreamEventKind::Text { text },
            StreamEventKind::Done { tool_count: 2, duration_ms: None },
        ]
    }));
    let coordinator = coordinator_with(factory).await;

    let agents = vec![
        AgentSpec::new("gate", "assess risk"),
        AgentSpec::new("worker", "handle the risk").with_depends_on(vec![
            DependencySpec::conditional("gate", r#"output.risk == "high""#),
        ]),
    ];

    let (swarm, _) = coordinator.create_swarm(create_params(agents)).await.unwrap();
    coordinator.start_swarm(swarm.id).await.unwrap();

    let agents = coordinator
        .wait_for_agents(swarm.id, None, Duration::from_secs(10))
        .await
        .unwrap();
    let worker = agents.iter().find(|a| a.name == "worker").unwrap();
    assert_eq!(worker.status, SwarmAgentStatus::Completed);
    assert_eq!(worker.output.as_deref(), Some("handled"));
    assert_eq!(worker.tool_count, 2);
    assert!(worker.session_id.is_some());
}

#[tokio::test]
async fn recursive_swarm_creation_is_forbidden() {
    let coordinator = coordinator_with(ScriptedRuntimeFactory::echoing("ok")).await;

    let (swarm, agents) = coordinator
        .create_swarm(create_params(vec![AgentSpec::new("solo", "p")]))
        .await
        .unwrap();
    coordinator.start_swarm(swarm.id).await.unwrap();
    coordinator
        .wait_for_agents(swarm.id, None, Duration::from_secs(10))
        .await
        .unwrap();

    // The finished agent's session now exists; using it as a parent is
    // rejected.
    let agent = coordinator.agent_output(swarm.id, &agents[0].name).await.unwrap();
    let session_id = agent.session_id.expect("agent ran in a session");

    let mut params = create_params(vec![AgentSpec::new("nested", "p")]);
    params.parent_session_id = Some(session_id);
    let result = coordinator.create_swarm(params).await;
    assert!(matches!(result, Err(DomainError::RecursiveSwarm)));
}

#[tokio::test]
async fn auto_synthesize_appends_terminal_agent() {
    let coordinator = coordinator_with(ScriptedRuntimeFactory::echoing("done")).await;

    let mut params = create_params(vec![AgentSpec::new("a", "p"), AgentSpec::new("b", "p")]);
    params.auto_synthesize = true;
    let (swarm, agents) = coordinator.create_swarm(params).await.unwrap();

    assert_eq!(agents.len(), 3);
    let synthesis = agents.iter().find(|a| a.name == "synthesis").unwrap();
    assert_eq!(synthesis.depends_on.len(), 2);

    coordinator.start_swarm(swarm.id).await.unwrap();
    let finished = coordinator
        .wait_for_agents(swarm.id, None, Duration::from_secs(10))
        .await
        .unwrap();
    assert!(finished.iter().all(|a| a.status == SwarmAgentStatus::Completed));
}

#[tokio::test]
async fn failed_agent_marks_swarm_failed_but_siblings_run() {
    let factory = ScriptedRuntimeFactory::new(Arc::new(|prompt: &str| {
        if prompt.contains("explode") {
            vec![
                StreamEventKind::Error { message: "boom".into(), recoverable: false },
                StreamEventKind::Done { tool_count: 0, duration_ms: None },
            ]
        } else {
            vec![
                StreamEventKind::Text { text: "fine".into() },
                StreamEventKind::Done { tool_count: 0, duration_ms: None },
            ]
        }
    }));
    let coordinator = coordinator_with(factory).await;

    let (swarm, _) = coordinator
        .create_swarm(create_params(vec![
            AgentSpec::new("bad", "explode"),
            AgentSpec::new("good", "work quietly"),
        ]))
        .await
        .unwrap();
    coordinator.start_swarm(swarm.id).await.unwrap();

    let agents = coordinator
        .wait_for_agents(swarm.id, None, Duration::from_secs(10))
        .await
        .unwrap();
    let status_of = |name: &str| agents.iter().find(|a| a.name == name).unwrap().status;
    assert_eq!(status_of("bad"), SwarmAgentStatus::Failed);
    assert_eq!(status_of("good"), SwarmAgentStatus::Completed);

    assert_eq!(terminal_swarm_status(&coordinator, swarm.id).await, SwarmStatus::Failed);
}

#[tokio::test]
async fn scratchpad_last_writer_wins_across_agents() {
    let coordinator = coordinator_with(ScriptedRuntimeFactory::echoing("ok")).await;
    let (swarm, agents) = coordinator
        .create_swarm(create_params(vec![AgentSpec::new("a", "p"), AgentSpec::new("b", "p")]))
        .await
        .unwrap();

    coordinator
        .scratchpad_put(
            swarm.id,
            "findings/summary",
            serde_json::json!({"from": "a"}),
            Some(agents[0].id),
            Some("a".into()),
        )
        .await
        .unwrap();
    coordinator
        .scratchpad_put(
            swarm.id,
            "findings/summary",
            serde_json::json!({"from": "b"}),
            Some(agents[1].id),
            Some("b".into()),
        )
        .await
        .unwrap();

    let entry = coordinator.scratchpad_get(swarm.id, "findings/summary").await.unwrap();
    assert_eq!(entry.value["from"], "b");
    assert_eq!(entry.set_by_agent_name.as_deref(), Some("b"));

    let listed = coordinator.scratchpad_list(swarm.id, Some("findings/")).await.unwrap();
    assert_eq!(listed.len(), 1);

    coordinator.scratchpad_delete(swarm.id, "findings/summary").await.unwrap();
    let missing = coordinator.scratchpad_get(swarm.id, "findings/summary").await;
    assert!(matches!(missing, Err(DomainError::ScratchpadKeyNotFound(_))));
}

#[tokio::test]
async fn cancel_marks_pending_agents() {
    let coordinator = coordinator_with(ScriptedRuntimeFactory::echoing("ok")).await;
    // Not started: both agents stay pending until cancel.
    let (swarm, _) = coordinator
        .create_swarm(create_params(vec![AgentSpec::new("a", "p"), AgentSpec::new("b", "p")]))
        .await
        .unwrap();

    coordinator.cancel_swarm(swarm.id).await.unwrap();

    let agents = coordinator.agents(swarm.id).await.unwrap();
    assert!(agents.iter().all(|a| a.status == SwarmAgentStatus::Cancelled));
    assert_eq!(coordinator.get_swarm(swarm.id).await.unwrap().status, SwarmStatus::Cancelled);
}
