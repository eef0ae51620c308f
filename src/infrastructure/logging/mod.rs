//! Tracing subscriber initialization.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::domain::models::{LogConfig, LogFormat};

/// Initialize the global tracing subscriber.
///
/// Returns the appender guard when file logging is enabled; the caller keeps
/// it alive for the process lifetime so buffered lines flush on shutdown.
pub fn init(config: &LogConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "dere.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            match config.format {
                LogFormat::Json => {
                    tracing_subscriber::fmt()
                        .with_env_filter(filter)
                        .with_writer(writer)
                        .json()
                        .init();
                }
                LogFormat::Pretty => {
                    tracing_subscriber::fmt()
                        .with_env_filter(filter)
                        .with_writer(writer)
                        .with_ansi(false)
                        .init();
                }
            }
            Some(guard)
        }
        None => {
            match config.format {
                LogFormat::Json => {
                    tracing_subscriber::fmt().with_env_filter(filter).json().init();
                }
                LogFormat::Pretty => {
                    tracing_subscriber::fmt().with_env_filter(filter).init();
                }
            }
            None
        }
    }
}
