//! Infrastructure: process adapters, HTTP clients, config, logging.

pub mod agent;
pub mod config;
pub mod llm;
pub mod logging;
