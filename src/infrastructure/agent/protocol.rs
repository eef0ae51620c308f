//! Wire protocol for the agent child process.
//!
//! Both directions are newline-delimited JSON with a `type` tag. Inbound
//! frames reuse the domain `StreamEventKind` vocabulary directly so the
//! session service and the WebSocket facade speak the same types.

use serde::{Deserialize, Serialize};

use crate::domain::models::StreamEventKind;

/// Commands written to the child's stdin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentCommand {
    Query { prompt: String },
    Interrupt,
    Close,
}

impl AgentCommand {
    /// Encode as one NDJSON line (newline included).
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Parse one stdout line into an event. Non-JSON lines are agent chatter and
/// are surfaced as text; blank lines produce nothing.
pub fn parse_event_line(line: &str) -> Option<StreamEventKind> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<StreamEventKind>(trimmed) {
        Ok(kind) => Some(kind),
        Err(_) => Some(StreamEventKind::Text { text: line.to_string() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_encoding() {
        let line = AgentCommand::Query { prompt: "hi".into() }.to_line().unwrap();
        assert_eq!(line, "{\"type\":\"query\",\"prompt\":\"hi\"}\n");
        let line = AgentCommand::Close.to_line().unwrap();
        assert_eq!(line, "{\"type\":\"close\"}\n");
    }

    #[test]
    fn parses_structured_events() {
        let kind = parse_event_line(r#"{"type":"text","text":"hello"}"#).unwrap();
        assert_eq!(kind, StreamEventKind::Text { text: "hello".into() });

        let kind = parse_event_line(
            r#"{"type":"tool_use","id":"t1","name":"read","input":{"path":"x"}}"#,
        )
        .unwrap();
        assert!(matches!(kind, StreamEventKind::ToolUse { .. }));

        let kind = parse_event_line(r#"{"type":"done","tool_count":2}"#).unwrap();
        assert_eq!(kind, StreamEventKind::Done { tool_count: 2, duration_ms: None });
    }

    #[test]
    fn plain_text_becomes_text_event() {
        let kind = parse_event_line("not json at all").unwrap();
        assert_eq!(kind, StreamEventKind::Text { text: "not json at all".into() });
        assert!(parse_event_line("   ").is_none());
    }

    #[test]
    fn session_ready_round_trip() {
        let kind =
            parse_event_line(r#"{"type":"session_ready","external_session_id":"abc"}"#).unwrap();
        assert_eq!(
            kind,
            StreamEventKind::SessionReady { external_session_id: Some("abc".into()) }
        );
    }
}
