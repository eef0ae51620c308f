//! dere daemon entry point.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::Table;
use std::sync::Arc;
use std::time::Duration;

use dere::adapters::sqlite::{
    initialize_database, SqliteAffectRepository, SqliteMemoryRepository, SqliteMissionRepository,
    SqliteRareEventRepository, SqliteSessionRepository, SqliteSwarmRepository,
    SqliteTaskRepository,
};
use dere::api::{self, AppState};
use dere::domain::models::Config;
use dere::domain::ports::{AffectRepository, LlmHelper, RareEventRepository};
use dere::infrastructure::agent::{ProcessRuntimeConfig, ProcessRuntimeFactory};
use dere::infrastructure::config::ConfigLoader;
use dere::infrastructure::llm::{HttpLlmHelper, LlmHelperConfig};
use dere::infrastructure::logging;
use dere::services::{
    AffectContext, AffectSnapshot, AgentSessionService, BondConfig, BondManager,
    CoreMemoryService, EmotionRegistry, MissionExecutor, MissionScheduler, MissionService,
    RareEventGenerator, RareEventGeneratorConfig, SessionServiceConfig, SwarmCoordinator,
    WorkQueueCoordinator,
};

#[derive(Parser)]
#[command(name = "dere", about = "Personality-layered agent daemon", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon in the foreground
    Start,
    /// Signal a running daemon to shut down
    Stop,
    /// Check whether the daemon is running
    Status,
    /// Stop then start
    Restart,
    /// Print the resolved configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ConfigLoader::load().context("Failed to load configuration")?;

    match cli.command {
        Commands::Start => start(config).await,
        Commands::Stop => stop(&config),
        Commands::Status => status(&config).await,
        Commands::Restart => {
            let _ = stop(&config);
            tokio::time::sleep(Duration::from_secs(1)).await;
            start(config).await
        }
        Commands::Config => {
            println!("{}", serde_yaml::to_string(&config)?);
            Ok(())
        }
    }
}

async fn start(config: Config) -> Result<()> {
    let _log_guard = logging::init(&config.logging);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting dere daemon");

    write_pidfile(&config)?;

    // Store
    let database_url = format!("sqlite:{}", config.database.path);
    let pool = initialize_database(&database_url)
        .await
        .context("Failed to initialize database")?;

    // Repositories
    let task_repo = Arc::new(SqliteTaskRepository::new(pool.clone()));
    let mission_repo = Arc::new(SqliteMissionRepository::new(pool.clone()));
    let swarm_repo = Arc::new(SqliteSwarmRepository::new(pool.clone()));
    let session_repo = Arc::new(SqliteSessionRepository::new(pool.clone()));
    let affect_repo: Arc<dyn AffectRepository> = Arc::new(SqliteAffectRepository::new(pool.clone()));
    let memory_repo = Arc::new(SqliteMemoryRepository::new(pool.clone()));
    let rare_event_repo: Arc<dyn RareEventRepository> =
        Arc::new(SqliteRareEventRepository::new(pool.clone()));

    // Cheap-model helper (optional; subsystems degrade without it)
    let helper: Option<Arc<dyn LlmHelper>> = match &config.agent.helper_base_url {
        Some(base_url) => {
            let helper = HttpLlmHelper::new(LlmHelperConfig {
                base_url: base_url.clone(),
                api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
                model: config.agent.helper_model.clone(),
                ..LlmHelperConfig::default()
            })
            .context("Failed to build LLM helper")?;
            Some(Arc::new(helper))
        }
        None => {
            tracing::warn!("No helper_base_url configured; schedule parsing, appraisal, and summaries are disabled");
            None
        }
    };

    // Affect engine
    let bond = Arc::new(BondManager::new(
        affect_repo.clone(),
        BondConfig::default(),
        config.default_user_id.clone(),
    ));
    let emotions = Arc::new(EmotionRegistry::new(affect_repo.clone(), helper.clone(), "dere"));

    // Agent session service
    let factory = Arc::new(ProcessRuntimeFactory::new(ProcessRuntimeConfig {
        binary_path: config.agent.binary_path.clone(),
        close_grace: Duration::from_secs(config.agent.close_grace_secs),
    }));
    let sessions = Arc::new(
        AgentSessionService::new(
            session_repo,
            factory,
            SessionServiceConfig {
                replay_capacity: config.agent.replay_buffer_events,
                default_model: config.agent.default_model.clone(),
                sandbox_image: config.agent.sandbox_image.clone(),
                subscriber_capacity: 256,
            },
        )
        .with_context_source(Arc::new(AffectContext::new(bond.clone(), emotions.clone()))),
    );

    // Coordinators
    let work_queue = Arc::new(WorkQueueCoordinator::new(task_repo));
    let mut mission_service = MissionService::new(mission_repo.clone());
    let mut mission_executor = MissionExecutor::new(sessions.clone(), mission_repo.clone());
    if let Some(helper) = &helper {
        mission_service = mission_service.with_helper(helper.clone());
        mission_executor = mission_executor.with_helper(helper.clone());
    }
    let missions = Arc::new(mission_service);
    let executor = Arc::new(mission_executor);
    let scheduler = Arc::new(MissionScheduler::new(
        mission_repo,
        executor,
        Duration::from_secs(config.scheduler.tick_interval_secs),
    ));
    let swarm = Arc::new(SwarmCoordinator::new(swarm_repo, sessions.clone()));
    let memory = Arc::new(CoreMemoryService::new(memory_repo));

    // Background loops
    let scheduler_handle = scheduler.start();
    let decay_stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let decay_handle = {
        // Periodic decay sweep so active sessions' emotions fade even
        // without new stimuli.
        let sessions = sessions.clone();
        let emotions = emotions.clone();
        let stop = decay_stop.clone();
        tokio::spawn(async move {
            while !stop.load(std::sync::atomic::Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_secs(300)).await;
                if stop.load(std::sync::atomic::Ordering::SeqCst) {
                    break;
                }
                for session_id in sessions.active_sessions().await {
                    let manager = emotions.for_session(session_id).await;
                    if let Err(e) = manager.apply_decay().await {
                        tracing::warn!(session_id = %session_id, error = %e, "Emotion decay sweep failed");
                    }
                }
            }
        })
    };
    let snapshot = Arc::new(AffectSnapshot::new(bond.clone(), emotions.clone(), sessions.clone()));
    let rare_events = Arc::new(RareEventGenerator::new(
        rare_event_repo.clone(),
        snapshot,
        RareEventGeneratorConfig {
            check_interval: Duration::from_secs(config.rare_events.check_interval_secs),
            cooldown_minutes: config.rare_events.cooldown_minutes,
            daily_event_limit: config.rare_events.daily_event_limit,
            ..RareEventGeneratorConfig::default()
        },
        config.default_user_id.clone(),
    ));
    let rare_events_handle = rare_events.start();

    // HTTP/WS facade
    let state = AppState {
        work_queue,
        missions,
        scheduler: scheduler.clone(),
        swarm,
        memory,
        sessions: sessions.clone(),
        bond,
        emotions,
        rare_events: rare_event_repo,
    };
    let router = api::router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!(addr = %addr, "HTTP server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    // Teardown in reverse initialization order.
    tracing::info!("Shutting down");
    rare_events.stop();
    scheduler.stop();
    decay_stop.store(true, std::sync::atomic::Ordering::SeqCst);
    sessions.close_all().await;
    rare_events_handle.abort();
    scheduler_handle.abort();
    decay_handle.abort();
    pool.close().await;
    remove_pidfile(&config);
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    let terminate = async {
        let mut signal =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        signal.recv().await;
    };
    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

fn write_pidfile(config: &Config) -> Result<()> {
    if let Some(parent) = config.server.pidfile.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&config.server.pidfile, std::process::id().to_string())?;
    Ok(())
}

fn remove_pidfile(config: &Config) {
    let _ = std::fs::remove_file(&config.server.pidfile);
}

fn read_pid(config: &Config) -> Option<i32> {
    std::fs::read_to_string(&config.server.pidfile)
        .ok()?
        .trim()
        .parse()
        .ok()
}

fn stop(config: &Config) -> Result<()> {
    let Some(pid) = read_pid(config) else {
        println!("dere daemon is not running (no pidfile)");
        return Ok(());
    };
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), nix::sys::signal::Signal::SIGTERM)
        .with_context(|| format!("Failed to signal pid {pid}"))?;
    println!("Sent SIGTERM to dere daemon (pid {pid})");
    Ok(())
}

async fn status(config: &Config) -> Result<()> {
    let url = format!("http://{}:{}/health", config.server.host, config.server.port);
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()?;

    let mut table = Table::new();
    table.set_header(vec!["field", "value"]);

    match client.get(&url).send().await {
        Ok(response) if response.status().is_success() => {
            table.add_row(vec!["status", "running"]);
            table.add_row(vec!["endpoint".to_string(), url]);
            if let Some(pid) = read_pid(config) {
                table.add_row(vec!["pid".to_string(), pid.to_string()]);
            }
        }
        _ => {
            table.add_row(vec!["status", "stopped"]);
        }
    }
    println!("{table}");
    Ok(())
}
