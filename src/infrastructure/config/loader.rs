//! Hierarchical configuration loading with figment.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::Config;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid scheduler tick interval: {0}s. Must be at least 1")]
    InvalidTickInterval(u64),

    #[error("Invalid rare-event check interval: {0}s. Must be at least 1")]
    InvalidCheckInterval(u64),

    #[error("Invalid rare-event daily limit: 0")]
    InvalidDailyLimit,
}

/// Configuration loader with hierarchical merging.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. .dere/config.yaml (project config)
    /// 3. .dere/local.yaml (local overrides, optional)
    /// 4. Environment variables (DERE_* prefix)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".dere/config.yaml"))
            .merge(Yaml::file(".dere/local.yaml"))
            .merge(Env::prefixed("DERE_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.database.max_connections));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        if config.scheduler.tick_interval_secs == 0 {
            return Err(ConfigError::InvalidTickInterval(config.scheduler.tick_interval_secs));
        }
        if config.rare_events.check_interval_secs == 0 {
            return Err(ConfigError::InvalidCheckInterval(config.rare_events.check_interval_secs));
        }
        if config.rare_events.daily_event_limit == 0 {
            return Err(ConfigError::InvalidDailyLimit);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = Config::default();
        assert!(ConfigLoader::validate(&config).is_ok());
    }

    #[test]
    fn rejects_empty_db_path() {
        let mut config = Config::default();
        config.database.path = String::new();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::EmptyDatabasePath)
        ));
    }

    #[test]
    fn rejects_bad_log_level() {
        let mut config = Config::default();
        config.logging.level = "verbose".into();
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::InvalidLogLevel(_))));
    }

    #[test]
    fn loads_from_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "server:\n  port: 9999\nscheduler:\n  tick_interval_secs: 30\n")
            .unwrap();

        let config = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.scheduler.tick_interval_secs, 30);
        // Untouched fields keep defaults.
        assert_eq!(config.database.path, ".dere/dere.db");
    }
}
