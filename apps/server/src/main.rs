//! Pivot Bot - Headless Server
//!
//! Polls Binance klines, tracks daily pivot levels per symbol and alerts
//! Telegram subscribers when price crosses a level.

mod config;
mod status_notifier;

use clap::Parser;
use config::{AppConfig, ConfigError, MonitorSettings};
use pivotbot_alerts::db::DbError;
use pivotbot_alerts::{
    AlertSender, Database, LevelMonitor, MonitorEvent, SessionStore, SubscriberRegistry,
    SymbolScope, TelegramBot,
};
use pivotbot_feeds::{BinanceKlineFetcher, CandleSource, FeedError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Pivot Bot CLI
#[derive(Parser, Debug)]
#[command(name = "pivotbot")]
#[command(about = "Pivot level crossing alerts for crypto markets", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Log level: trace, debug, info, warn, error (RUST_LOG takes precedence)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Directory for session state files
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Subscription database URL
    #[arg(long, default_value = "sqlite://data/pivotbot.db")]
    db_url: String,

    /// Run the monitors without the Telegram command handler
    #[arg(long, default_value_t = false)]
    no_bot: bool,
}

#[derive(Error, Debug)]
enum StartupError {
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("Database error: {0}")]
    Db(#[from] DbError),
    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),
    #[error("Failed to create data directory {path}: {source}")]
    DataDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("TELEGRAM_BOT_TOKEN is not set")]
    MissingBotToken,
}

fn init_logging(level: &str) {
    let level = match level {
        "trace" | "debug" | "info" | "warn" | "error" => level,
        _ => "info",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}

/// Shared handles every monitor is built from.
struct Services {
    registry: Arc<dyn SubscriberRegistry>,
    sender: Arc<dyn AlertSender>,
    events: Option<mpsc::Sender<MonitorEvent>>,
}

fn spawn_monitor(
    name: &str,
    settings: &MonitorSettings,
    endpoints: &[String],
    scope: SymbolScope,
    store: Arc<SessionStore>,
    services: &Services,
) -> Result<JoinHandle<()>, StartupError> {
    let fetcher = BinanceKlineFetcher::new(endpoints.to_vec(), settings.request_timeout())?;

    info!(
        monitor = name,
        endpoints = fetcher.endpoints().len(),
        interval = %settings.interval,
        poll_secs = settings.poll_interval_secs,
        state = %store.path().display(),
        "Spawning level monitor"
    );

    let source: Arc<dyn CandleSource> = Arc::new(fetcher);

    let mut monitor = LevelMonitor::new(
        settings.to_monitor_config(name),
        scope,
        source,
        store,
        Arc::clone(&services.registry),
        Arc::clone(&services.sender),
    );
    if let Some(events) = &services.events {
        monitor = monitor.with_events(events.clone());
    }
    Ok(tokio::spawn(monitor.run()))
}

fn monitor_state_path(name: &str, data_dir: &Path) -> PathBuf {
    data_dir.join(format!("{name}_state.json"))
}

async fn run(args: Args) -> Result<(), StartupError> {
    let config = AppConfig::load(&args.config)?;
    info!(
        "Config: btc={} valerts={} endpoints={}",
        config.btc.enabled,
        config.valerts.enabled,
        config.binance_endpoints.len()
    );

    std::fs::create_dir_all(&args.data_dir).map_err(|source| StartupError::DataDir {
        path: args.data_dir.clone(),
        source,
    })?;

    let btc_store = Arc::new(SessionStore::new(monitor_state_path("btc", &args.data_dir)));
    let valerts_store = Arc::new(SessionStore::new(monitor_state_path(
        "valerts",
        &args.data_dir,
    )));

    let db = Database::connect(&args.db_url).await?;
    info!("Subscription database ready: {}", args.db_url);

    let token = std::env::var("TELEGRAM_BOT_TOKEN")
        .ok()
        .filter(|t| !t.is_empty())
        .ok_or(StartupError::MissingBotToken)?;
    let bot = Arc::new(
        TelegramBot::new(&token, db.clone())
            .with_session_store(Arc::clone(&btc_store))
            .with_session_store(Arc::clone(&valerts_store)),
    );

    let services = Services {
        registry: Arc::new(db),
        sender: bot.clone(),
        events: status_notifier::try_start_status_notifier(),
    };

    let mut handles = Vec::new();
    if config.btc.enabled {
        handles.push(spawn_monitor(
            "btc",
            &config.btc,
            &config.binance_endpoints,
            SymbolScope::Fixed(vec!["BTCUSDT".to_string()]),
            btc_store,
            &services,
        )?);
    }
    if config.valerts.enabled {
        handles.push(spawn_monitor(
            "valerts",
            &config.valerts,
            &config.binance_endpoints,
            SymbolScope::Subscribed,
            valerts_store,
            &services,
        )?);
    }
    if handles.is_empty() {
        warn!("Both monitors are disabled; only the command handler will run");
    }

    if args.no_bot {
        info!("Telegram command handler disabled (--no-bot)");
    } else {
        info!("Starting Telegram command handler");
        handles.push(tokio::spawn(bot.run()));
    }

    info!("Press Ctrl+C to stop...");

    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for Ctrl+C");

    warn!("Shutdown signal received");
    for handle in handles {
        handle.abort();
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    init_logging(&args.log_level);

    info!("🚀 Pivot Bot starting...");
    info!("Config file: {}", args.config.display());
    info!("Data directory: {}", args.data_dir.display());

    if let Err(e) = run(args).await {
        error!("Startup failed: {}", e);
        std::process::exit(1);
    }

    info!("👋 Pivot Bot stopped");
}
