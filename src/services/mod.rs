//! Service layer: coordinators and background subsystems.

pub mod bond;
pub mod context;
pub mod emotion;
pub mod memory;
pub mod missions;
pub mod rare_events;
pub mod session_service;
pub mod swarm;
pub mod work_queue;

pub use bond::{BondConfig, BondManager};
pub use context::{AffectContext, AffectSnapshot};
pub use emotion::{EmotionManager, EmotionRegistry};
pub use memory::CoreMemoryService;
pub use missions::{CreateMission, MissionExecutor, MissionScheduler, MissionService, UpdateMission};
pub use rare_events::{RareEventGenerator, RareEventGeneratorConfig, StateSnapshot, TriggerContext};
pub use session_service::{AgentSessionService, ContextSource, SessionServiceConfig};
pub use swarm::{CreateSwarm, SwarmCoordinator};
pub use work_queue::{CreateTask, TaskUpdateResult, UpdateTask, WorkQueueCoordinator};
