//! Daemon configuration model.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level daemon configuration, loaded via figment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub rare_events: RareEventConfig,
    #[serde(default)]
    pub logging: LogConfig,
    /// Default working directory for sessions that don't specify one.
    #[serde(default = "default_working_dir")]
    pub default_working_dir: String,
    /// Default user identity for single-user deployments.
    #[serde(default = "default_user_id")]
    pub default_user_id: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            server: ServerConfig::default(),
            agent: AgentConfig::default(),
            scheduler: SchedulerConfig::default(),
            rare_events: RareEventConfig::default(),
            logging: LogConfig::default(),
            default_working_dir: default_working_dir(),
            default_user_id: default_user_id(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_db_path(), max_connections: default_max_connections() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Pidfile used by the stop/status subcommands.
    #[serde(default = "default_pidfile")]
    pub pidfile: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port(), pidfile: default_pidfile() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Path to the external agent binary.
    #[serde(default = "default_agent_binary")]
    pub binary_path: String,
    /// Default model passed to spawned agents.
    #[serde(default)]
    pub default_model: Option<String>,
    /// Container image tag used when sandbox_mode is requested.
    #[serde(default)]
    pub sandbox_image: Option<String>,
    /// Grace period before a closing agent process is killed, in seconds.
    #[serde(default = "default_close_grace_secs")]
    pub close_grace_secs: u64,
    /// Bounded replay buffer size per session.
    #[serde(default = "default_replay_buffer")]
    pub replay_buffer_events: usize,
    /// Base URL of the cheap-model helper endpoint.
    #[serde(default)]
    pub helper_base_url: Option<String>,
    /// Model used for helper calls (summaries, appraisal, schedule parsing).
    #[serde(default = "default_helper_model")]
    pub helper_model: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            binary_path: default_agent_binary(),
            default_model: None,
            sandbox_image: None,
            close_grace_secs: default_close_grace_secs(),
            replay_buffer_events: default_replay_buffer(),
            helper_base_url: None,
            helper_model: default_helper_model(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Mission scheduler tick interval in seconds.
    #[serde(default = "default_tick_secs")]
    pub tick_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { tick_interval_secs: default_tick_secs() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RareEventConfig {
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: i64,
    #[serde(default = "default_daily_limit")]
    pub daily_event_limit: usize,
}

impl Default for RareEventConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval_secs(),
            cooldown_minutes: default_cooldown_minutes(),
            daily_event_limit: default_daily_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format (json, pretty)
    #[serde(default)]
    pub format: LogFormat,
    /// Directory for rotated log files; stdout-only when unset.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: default_log_level(), format: LogFormat::default(), log_dir: None }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_db_path() -> String {
    ".dere/dere.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8787
}

fn default_pidfile() -> PathBuf {
    PathBuf::from(".dere/dere.pid")
}

fn default_agent_binary() -> String {
    "claude".to_string()
}

fn default_close_grace_secs() -> u64 {
    5
}

fn default_replay_buffer() -> usize {
    512
}

fn default_helper_model() -> String {
    "claude-haiku-4-5".to_string()
}

fn default_tick_secs() -> u64 {
    60
}

fn default_check_interval_secs() -> u64 {
    300
}

fn default_cooldown_minutes() -> i64 {
    60
}

fn default_daily_limit() -> usize {
    5
}

fn default_working_dir() -> String {
    ".".to_string()
}

fn default_user_id() -> String {
    "default".to_string()
}
