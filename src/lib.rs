//! dere - a personality-layered agent daemon.
//!
//! One long-running process coordinates, over a shared SQLite store:
//! - a work queue with atomic claiming and dependency resolution
//! - a cron-driven mission scheduler and executor
//! - a swarm coordinator running DAGs of dependent agents
//! - an agent session service fanning subprocess events to WebSocket clients
//! - a bond/emotion engine with decay, appraisal, and physics
//! - a probabilistic rare-event generator

pub mod adapters;
pub mod api;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::{DomainError, DomainResult};
