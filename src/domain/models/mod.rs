//! Domain models for the dere daemon.

pub mod bond;
pub mod config;
pub mod emotion;
pub mod event;
pub mod memory;
pub mod mission;
pub mod rare_event;
pub mod session;
pub mod swarm;
pub mod task;

pub use bond::{AffectionSample, BondState, BondTrend, BondUpdate, InteractionQuality};
pub use config::{
    AgentConfig, Config, DatabaseConfig, LogConfig, LogFormat, RareEventConfig, SchedulerConfig,
    ServerConfig,
};
pub use emotion::{
    AgentAction, AppraisalOutput, AppraisedEmotion, Arousal, CurrentMood, EmotionCharacteristics,
    EmotionInstance, EmotionState, EmotionType, EventOutcome, ObjectAttribute, Persistence,
    SocialRelevance, StimulusRecord, Valence,
};
pub use event::{StreamEvent, StreamEventKind};
pub use memory::{CoreMemoryBlock, CoreMemoryVersion, MemoryBlockType, MemoryScope};
pub use mission::{Mission, MissionExecution, MissionExecutionStatus, MissionStatus, MissionTrigger};
pub use rare_event::{Notification, NotificationStatus, RareEvent, RareEventType};
pub use session::{Conversation, MessageRole, Session, SessionConfig};
pub use swarm::{
    AgentSpec, BranchMergeOutcome, DependencySpec, ScratchpadEntry, Swarm, SwarmAgent,
    SwarmAgentStatus, SwarmStatus,
};
pub use task::{ProjectTask, TaskClaimant, TaskStatus};
