//! CyberSafe - cyberbullying protection service.
//!
//! Runs the HTTP API in front of the safety engine:
//! - Ingestion of per-message risk scores from mobile clients
//! - Background safety ledger updates and one-time trusted-contact alerts
//! - Parent dashboard and unlock endpoints

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use cybersafe_core::{
    AlertDispatcher, MemoryLedger, SafetyEngine, SafetyLedger, SafetyWorker,
};
use cybersafe_server::{AppState, Server, ServerConfig};
use cybersafe_storage::Database;
use directories::ProjectDirs;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{AppConfig, ConfigOverrides};

/// CyberSafe - cyberbullying protection service
#[derive(Parser, Debug)]
#[command(name = "cybersafe", version, about)]
struct Args {
    /// Path to a JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind the API server to
    #[arg(long)]
    host: Option<String>,

    /// Port to bind the API server to
    #[arg(long)]
    port: Option<u16>,

    /// Database file (default: platform data directory)
    #[arg(long, env = "CYBERSAFE_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Keep all state in memory (nothing survives a restart)
    #[arg(long, conflicts_with = "db_path")]
    in_memory: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            host: self.host.clone(),
            port: self.port,
            db_path: self.db_path.clone(),
        }
    }
}

/// Get the logs directory path.
fn logs_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "cybersafe", "cybersafe").map(|dirs| dirs.data_dir().join("logs"))
}

/// Initialize logging with file rotation.
fn init_logging(args: &Args) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_level = if args.debug { "debug" } else { &args.log_level };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("cybersafe={},warn", log_level)));

    if let Some(log_dir) = logs_dir() {
        if std::fs::create_dir_all(&log_dir).is_ok() {
            // Rotates daily, keeps five files
            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .max_log_files(5)
                .filename_prefix("cybersafe")
                .filename_suffix("log")
                .build(&log_dir)
                .ok();

            if let Some(appender) = file_appender {
                let (non_blocking, guard) = tracing_appender::non_blocking(appender);

                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().with_writer(std::io::stdout))
                    .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                    .init();

                tracing::info!("Logging to {:?}", log_dir);
                return Some(guard);
            }
        }
    }

    // Fallback: console logging only
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::warn!("File logging unavailable, using console only");
    None
}

/// Opens the ledger the server will write to.
fn open_ledger(config: &ServerConfig, in_memory: bool) -> anyhow::Result<Arc<dyn SafetyLedger>> {
    if in_memory {
        tracing::warn!("Running with an in-memory ledger; state is lost on exit");
        return Ok(Arc::new(MemoryLedger::new()));
    }

    let db = match &config.db_path {
        Some(path) => Database::with_path(path)?,
        None => Database::new()?,
    };
    Ok(Arc::new(db))
}

/// Resolves on Ctrl-C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        return;
    }
    tracing::info!("Shutdown requested");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Keep the guard alive for the duration of the program
    let _log_guard = init_logging(&args);

    tracing::info!("Starting CyberSafe...");
    tracing::debug!("Args: {:?}", args);

    let config = AppConfig::load_or_default(args.config.as_deref())?.with_overrides(args.overrides());
    config.validate()?;

    let ledger = open_ledger(&config.server, args.in_memory)?;
    let dispatcher = AlertDispatcher::from_config(&config.notifications)?;
    tracing::info!(channel = dispatcher.channel_name(), "Alert dispatcher ready");

    let engine = Arc::new(SafetyEngine::new(ledger, dispatcher, config.policy.clone())?);
    let worker = SafetyWorker::spawn(Arc::clone(&engine), config.worker.clone());

    let state = AppState::new(engine, worker.handle());
    let server = Server::with_state(config.server.clone(), state)?;
    tracing::info!("API server listening on {}", server.addr());

    let served = server.run(shutdown_signal()).await;

    // Finish queued events even if the server failed
    worker.shutdown().await;

    served?;
    tracing::info!("CyberSafe shutting down");
    Ok(())
}
