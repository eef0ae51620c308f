//! Ports: traits the services depend on, implemented by adapters.

pub mod affect_repository;
pub mod agent_runtime;
pub mod llm_helper;
pub mod memory_repository;
pub mod mission_repository;
pub mod rare_event_repository;
pub mod session_repository;
pub mod swarm_repository;
pub mod task_repository;

pub use affect_repository::AffectRepository;
pub use agent_runtime::{AgentRuntime, AgentRuntimeFactory, RuntimeSpec};
pub use llm_helper::{LlmHelper, ParsedSchedule};
pub use memory_repository::MemoryRepository;
pub use mission_repository::MissionRepository;
pub use rare_event_repository::RareEventRepository;
pub use session_repository::SessionRepository;
pub use swarm_repository::SwarmRepository;
pub use task_repository::{TaskFilter, TaskRepository};
