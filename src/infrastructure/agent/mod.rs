//! Agent child-process adapter.

pub mod protocol;
pub mod runtime;

pub use protocol::{parse_event_line, AgentCommand};
pub use runtime::{ProcessAgentRuntime, ProcessRuntimeConfig, ProcessRuntimeFactory};
