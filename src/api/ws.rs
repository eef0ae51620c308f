//! WebSocket endpoint for agent sessions.
//!
//! Clients drive sessions with JSON frames (`new_session`, `resume_session`,
//! `update_config`, `query`, `ping`, `close`) and receive the session's
//! sequence-numbered event stream. Event delivery rides the session
//! subscription, so a reconnecting client re-subscribes and replays.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::domain::models::{SessionConfig, StreamEvent, StreamEventKind};

use super::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/agent/ws", get(upgrade))
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame {
    NewSession { config: SessionConfig },
    ResumeSession { session_id: Uuid },
    UpdateConfig { config: SessionConfig },
    Query { prompt: String },
    Ping,
    Close,
}

async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();

    // All outbound frames funnel through one writer task.
    let (out_tx, mut out_rx) = mpsc::channel::<String>(256);
    let writer = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let mut session_id: Option<Uuid> = None;
    let mut forwarder: Option<tokio::task::JoinHandle<()>> = None;

    while let Some(Ok(message)) = stream.next().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let frame: ClientFrame = match serde_json::from_str(&text) {
            Ok(frame) => frame,
            Err(e) => {
                send_error(&out_tx, &format!("invalid frame: {e}"), true).await;
                continue;
            }
        };

        match frame {
            ClientFrame::NewSession { config } => {
                match state.sessions.create_session(config).await {
                    Ok(id) => {
                        attach(&state, id, &out_tx, &mut session_id, &mut forwarder).await;
                    }
                    Err(e) => send_error(&out_tx, &e.to_string(), false).await,
                }
            }
            ClientFrame::ResumeSession { session_id: id } => {
                match state.sessions.resume_session(id).await {
                    Ok(true) => {
                        attach(&state, id, &out_tx, &mut session_id, &mut forwarder).await;
                    }
                    Ok(false) => {
                        send_error(&out_tx, "session cannot be resumed", false).await;
                    }
                    Err(e) => send_error(&out_tx, &e.to_string(), false).await,
                }
            }
            ClientFrame::UpdateConfig { config } => {
                let Some(id) = session_id else {
                    send_error(&out_tx, "no active session", true).await;
                    continue;
                };
                if let Err(e) = state.sessions.update_session_config(id, &config).await {
                    send_error(&out_tx, &e.to_string(), true).await;
                } else {
                    let _ = out_tx.send(r#"{"type":"config_updated"}"#.to_string()).await;
                }
            }
            ClientFrame::Query { prompt } => {
                let Some(id) = session_id else {
                    send_error(&out_tx, "no active session", true).await;
                    continue;
                };
                match state.sessions.query(id, &prompt).await {
                    Ok(mut rx) => {
                        // Events reach the client via the subscription
                        // forwarder; this task keeps the query alive by
                        // draining its receiver to the terminal event.
                        tokio::spawn(async move { while rx.recv().await.is_some() {} });
                    }
                    Err(e) => send_error(&out_tx, &e.to_string(), true).await,
                }
            }
            ClientFrame::Ping => {
                let _ = out_tx.send(r#"{"type":"pong"}"#.to_string()).await;
            }
            ClientFrame::Close => {
                if let Some(id) = session_id.take() {
                    if let Err(e) = state.sessions.close_session(id).await {
                        tracing::warn!(session_id = %id, error = %e, "WS close failed");
                    }
                }
                break;
            }
        }
    }

    if let Some(task) = forwarder {
        task.abort();
    }
    writer.abort();
}

/// Subscribe to a session and forward replay + live events to the socket.
async fn attach(
    state: &AppState,
    id: Uuid,
    out_tx: &mpsc::Sender<String>,
    session_id: &mut Option<Uuid>,
    forwarder: &mut Option<tokio::task::JoinHandle<()>>,
) {
    if let Some(previous) = forwarder.take() {
        previous.abort();
    }
    *session_id = Some(id);

    match state.sessions.subscribe(id).await {
        Ok((replay, live)) => {
            let _ = out_tx
                .send(
                    serde_json::json!({ "type": "session_ready", "session_id": id }).to_string(),
                )
                .await;
            for event in &replay {
                send_event(out_tx, event).await;
            }
            let out = out_tx.clone();
            *forwarder = Some(tokio::spawn(forward_live(live, out)));
        }
        Err(e) => send_error(out_tx, &e.to_string(), false).await,
    }
}

async fn forward_live(mut live: broadcast::Receiver<StreamEvent>, out: mpsc::Sender<String>) {
    loop {
        match live.recv().await {
            Ok(event) => send_event(&out, &event).await,
            Err(broadcast::error::RecvError::Lagged(dropped)) => {
                // The subscriber fell behind the live channel; surface the
                // hole instead of silently resuming.
                let gap = StreamEvent::new(0, StreamEventKind::Gap { dropped });
                send_event(&out, &gap).await;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn send_event(out: &mpsc::Sender<String>, event: &StreamEvent) {
    if let Ok(text) = serde_json::to_string(event) {
        let _ = out.send(text).await;
    }
}

async fn send_error(out: &mpsc::Sender<String>, message: &str, recoverable: bool) {
    let frame = serde_json::json!({
        "type": "error",
        "message": message,
        "recoverable": recoverable,
    });
    let _ = out.send(frame.to_string()).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_frames_deserialize() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"type":"query","prompt":"hello"}"#).unwrap();
        assert!(matches!(frame, ClientFrame::Query { .. }));

        let frame: ClientFrame = serde_json::from_str(
            r#"{"type":"new_session","config":{"working_dir":"/tmp"}}"#,
        )
        .unwrap();
        assert!(matches!(frame, ClientFrame::NewSession { .. }));

        let frame: ClientFrame = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(frame, ClientFrame::Ping));

        assert!(serde_json::from_str::<ClientFrame>(r#"{"type":"bogus"}"#).is_err());
    }
}
