//! Swarm coordination: DAG validation, scheduling, conditions, branches.

pub mod conditions;
pub mod coordinator;
pub mod git;

pub use conditions::{evaluate_condition, extract_output_json};
pub use coordinator::{detect_dependency_cycle, CreateSwarm, SwarmCoordinator};
