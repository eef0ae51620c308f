//! Streaming events produced by an agent session.
//!
//! Every event carries a per-session monotonically increasing sequence
//! number so late subscribers can stitch replay and live streams and detect
//! gaps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Payload of a streaming event, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEventKind {
    /// The agent process is ready to accept queries.
    SessionReady {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        external_session_id: Option<String>,
    },
    /// A streamed assistant text fragment.
    Text { text: String },
    /// A streamed thinking fragment.
    Thinking { text: String },
    /// The agent invoked a tool.
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    /// Result for a prior tool invocation, correlated by id.
    ToolResult {
        id: String,
        output: String,
        #[serde(default)]
        is_error: bool,
    },
    /// The agent is asking for permission to use a tool.
    PermissionRequest {
        id: String,
        tool_name: String,
        input: serde_json::Value,
    },
    /// An error surfaced by the runtime. Non-recoverable errors tear the
    /// session down.
    Error {
        message: String,
        #[serde(default = "default_recoverable")]
        recoverable: bool,
    },
    /// Terminal event for a query, with aggregate counters.
    Done {
        #[serde(default)]
        tool_count: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
    },
    /// The in-flight query was cancelled by the caller.
    Cancelled,
    /// Synthetic marker: the replay buffer overflowed and `dropped` events
    /// before this one are no longer available.
    Gap { dropped: u64 },
}

fn default_recoverable() -> bool {
    true
}

impl StreamEventKind {
    /// Whether this event terminates the current query.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Done { .. } | Self::Cancelled | Self::Error { recoverable: false, .. }
        )
    }
}

/// A sequence-numbered event within one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: StreamEventKind,
}

impl StreamEvent {
    pub fn new(seq: u64, kind: StreamEventKind) -> Self {
        Self { seq, timestamp: Utc::now(), kind }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_tags_by_type() {
        let event = StreamEvent::new(3, StreamEventKind::Text { text: "hi".into() });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["seq"], 3);
        assert_eq!(json["text"], "hi");
    }

    #[test]
    fn terminal_classification() {
        assert!(StreamEventKind::Done { tool_count: 0, duration_ms: None }.is_terminal());
        assert!(StreamEventKind::Cancelled.is_terminal());
        assert!(StreamEventKind::Error { message: "x".into(), recoverable: false }.is_terminal());
        assert!(!StreamEventKind::Error { message: "x".into(), recoverable: true }.is_terminal());
        assert!(!StreamEventKind::Text { text: "x".into() }.is_terminal());
    }

    #[test]
    fn error_defaults_recoverable() {
        let kind: StreamEventKind =
            serde_json::from_str(r#"{"type":"error","message":"boom"}"#).unwrap();
        assert_eq!(kind, StreamEventKind::Error { message: "boom".into(), recoverable: true });
    }
}
