//! Session service integration tests: event sequencing, replay-then-live
//! stitching, cancellation, and teardown on fatal errors.

mod common;

use std::sync::Arc;

use common::ScriptedRuntimeFactory;
use dere::adapters::sqlite::SqliteSessionRepository;
use dere::domain::models::{SessionConfig, StreamEvent, StreamEventKind};
use dere::domain::ports::SessionRepository;
use dere::services::{AgentSessionService, SessionServiceConfig};

async fn service_with(factory: ScriptedRuntimeFactory) -> (Arc<AgentSessionService>, Arc<SqliteSessionRepository>) {
    let pool = common::test_pool().await;
    let repo = Arc::new(SqliteSessionRepository::new(pool));
    let service = Arc::new(AgentSessionService::new(
        repo.clone(),
        Arc::new(factory),
        SessionServiceConfig::default(),
    ));
    (service, repo)
}

fn assert_monotonic(events: &[StreamEvent]) {
    for pair in events.windows(2) {
        assert!(
            pair[1].seq > pair[0].seq,
            "sequence numbers must strictly increase: {} then {}",
            pair[0].seq,
            pair[1].seq
        );
    }
}

#[tokio::test]
async fn query_events_are_sequenced_without_gaps() {
    let factory = ScriptedRuntimeFactory::new(Arc::new(|_prompt: &str| {
        vec![
            StreamEventKind::Thinking { text: "hmm".into() },
            StreamEventKind::Text { text: "hello ".into() },
            StreamEventKind::Text { text: "world".into() },
            StreamEventKind::Done { tool_count: 0, duration_ms: None },
        ]
    }));
    let (service, _) = service_with(factory).await;

    let session_id = service.create_session(SessionConfig::new("/tmp/p")).await.unwrap();
    let mut rx = service.query(session_id, "hi").await.unwrap();

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    assert_eq!(events.len(), 4);
    assert_monotonic(&events);
    // Live-range events are contiguous.
    for pair in events.windows(2) {
        assert_eq!(pair[1].seq, pair[0].seq + 1);
    }
    assert!(matches!(events.last().unwrap().kind, StreamEventKind::Done { .. }));
}

#[tokio::test]
async fn subscriber_sees_replay_then_live() {
    let factory = ScriptedRuntimeFactory::echoing("reply");
    let (service, _) = service_with(factory).await;

    let session_id = service.create_session(SessionConfig::new("/tmp/p")).await.unwrap();

    // First query fills the replay buffer.
    let mut rx = service.query(session_id, "first").await.unwrap();
    while rx.recv().await.is_some() {}

    let (replay, mut live) = service.subscribe(session_id).await.unwrap();
    assert!(!replay.is_empty());
    assert_monotonic(&replay);
    assert!(matches!(replay[0].kind, StreamEventKind::SessionReady { .. }));

    // A second query arrives on the live channel, continuing the sequence.
    let mut rx = service.query(session_id, "second").await.unwrap();
    while rx.recv().await.is_some() {}

    let mut live_events = Vec::new();
    while let Ok(event) = live.try_recv() {
        live_events.push(event);
    }
    assert!(!live_events.is_empty());
    assert!(live_events[0].seq > replay.last().unwrap().seq);
    assert_monotonic(&live_events);
}

#[tokio::test]
async fn conversations_are_persisted() {
    let factory = ScriptedRuntimeFactory::echoing("assistant says hi");
    let (service, repo) = service_with(factory).await;

    let session_id = service.create_session(SessionConfig::new("/tmp/p")).await.unwrap();
    let mut rx = service.query(session_id, "user says hi").await.unwrap();
    while rx.recv().await.is_some() {}

    // The assistant row is written by the forwarder after the terminal
    // event; give it a beat.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let messages = repo.conversations(session_id, 10).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].text, "user says hi");
    assert_eq!(messages[1].text, "assistant says hi");
}

#[tokio::test]
async fn close_session_persists_end_time() {
    let factory = ScriptedRuntimeFactory::echoing("x");
    let (service, repo) = service_with(factory).await;

    let session_id = service.create_session(SessionConfig::new("/tmp/p")).await.unwrap();
    assert!(service.is_active(session_id).await);

    service.close_session(session_id).await.unwrap();
    assert!(!service.is_active(session_id).await);

    let session = repo.get(session_id).await.unwrap().unwrap();
    assert!(session.ended_at.is_some());
}

#[tokio::test]
async fn fatal_error_tears_session_down() {
    let factory = ScriptedRuntimeFactory::new(Arc::new(|_prompt: &str| {
        vec![
            StreamEventKind::Error { message: "dead".into(), recoverable: false },
            StreamEventKind::Done { tool_count: 0, duration_ms: None },
        ]
    }));
    let (service, repo) = service_with(factory).await;

    let session_id = service.create_session(SessionConfig::new("/tmp/p")).await.unwrap();
    let mut rx = service.query(session_id, "boom").await.unwrap();
    while rx.recv().await.is_some() {}

    // Teardown happens after the terminal event.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    assert!(!service.is_active(session_id).await);
    let session = repo.get(session_id).await.unwrap().unwrap();
    assert!(session.ended_at.is_some());
}

#[tokio::test]
async fn recoverable_error_keeps_session_usable() {
    let factory = ScriptedRuntimeFactory::new(Arc::new(|prompt: &str| {
        if prompt.contains("wobble") {
            vec![
                StreamEventKind::Error { message: "transient".into(), recoverable: true },
                StreamEventKind::Text { text: "recovered".into() },
                StreamEventKind::Done { tool_count: 0, duration_ms: None },
            ]
        } else {
            vec![
                StreamEventKind::Text { text: "fine".into() },
                StreamEventKind::Done { tool_count: 0, duration_ms: None },
            ]
        }
    }));
    let (service, _) = service_with(factory).await;

    let session_id = service.create_session(SessionConfig::new("/tmp/p")).await.unwrap();
    let mut rx = service.query(session_id, "wobble").await.unwrap();
    while rx.recv().await.is_some() {}

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert!(service.is_active(session_id).await);

    // A follow-up query still works.
    let mut rx = service.query(session_id, "again").await.unwrap();
    let mut saw_done = false;
    while let Some(event) = rx.recv().await {
        saw_done |= matches!(event.kind, StreamEventKind::Done { .. });
    }
    assert!(saw_done);
}

#[tokio::test]
async fn dropping_stream_emits_cancelled_to_subscribers() {
    // A long script: the caller drops after the first event.
    let factory = ScriptedRuntimeFactory::new(Arc::new(|_prompt: &str| {
        let mut events = vec![StreamEventKind::Text { text: "start".into() }];
        for i in 0..50 {
            events.push(StreamEventKind::Text { text: format!("chunk {i}") });
        }
        events.push(StreamEventKind::Done { tool_count: 0, duration_ms: None });
        events
    }));
    let (service, _) = service_with(factory).await;

    let session_id = service.create_session(SessionConfig::new("/tmp/p")).await.unwrap();
    let (_, mut live) = service.subscribe(session_id).await.unwrap();

    let mut rx = service.query(session_id, "stream").await.unwrap();
    let first = rx.recv().await;
    assert!(first.is_some());
    drop(rx);

    // The subscriber observes a synthetic cancelled event.
    let mut saw_cancelled = false;
    for _ in 0..200 {
        match tokio::time::timeout(std::time::Duration::from_millis(50), live.recv()).await {
            Ok(Ok(event)) => {
                if matches!(event.kind, StreamEventKind::Cancelled) {
                    saw_cancelled = true;
                    break;
                }
            }
            Ok(Err(_)) | Err(_) => break,
        }
    }
    assert!(saw_cancelled, "subscribers must see a synthetic cancelled event");
}
