//! Mission scheduling and execution.

pub mod executor;
pub mod schedule;
pub mod scheduler;
pub mod service;

pub use executor::MissionExecutor;
pub use schedule::{is_valid_cron, next_occurrence, parse_natural_schedule, validate_cron, validate_timezone};
pub use scheduler::MissionScheduler;
pub use service::{CreateMission, MissionService, UpdateMission};
