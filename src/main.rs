//! picdrip service binary.
//!
//! Loads configuration, wires the pool source, channel adapter,
//! dispatcher, and scheduler together, and runs the operator command loop
//! until ctrl-c.

use picdrip::channel::telegram::TelegramAdapter;
use picdrip::channel::traits::ChannelAdapter;
use picdrip::commands::ControlSurface;
use picdrip::config::BotConfig;
use picdrip::dispatch::Dispatcher;
use picdrip::history::HistoryStore;
use picdrip::pool;
use picdrip::scheduler::SendScheduler;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map_or_else(BotConfig::default_config_path, PathBuf::from);
    info!("loading config from {}", config_path.display());
    let config =
        BotConfig::from_file(&config_path).map_err(|e| anyhow::anyhow!("cannot load config: {e}"))?;

    let problems = config.validate();
    if !problems.is_empty() {
        for problem in &problems {
            error!("config: {problem}");
        }
        anyhow::bail!("configuration is invalid ({} problems)", problems.len());
    }

    let adapter: Arc<dyn ChannelAdapter> = Arc::new(TelegramAdapter::new(&config.channel));
    let source = pool::source_from_config(&config.source)?;
    let history = Arc::new(Mutex::new(HistoryStore::open(config.history.path.clone())));

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&source),
        Arc::clone(&adapter),
        Arc::clone(&history),
        config.channel.chat_id.clone(),
    ));

    match adapter.health_check().await {
        Ok(true) => info!("channel {} reachable", adapter.id()),
        Ok(false) | Err(_) => warn!("channel {} health check failed", adapter.id()),
    }

    let mut scheduler = SendScheduler::new(Arc::clone(&dispatcher), &config.schedule)?.start();
    let surface = Arc::new(ControlSurface::new(
        dispatcher,
        source,
        history,
        scheduler.control(),
    ));

    info!("picdrip running; press ctrl-c to stop");
    tokio::select! {
        result = picdrip::channel::run_command_loop(adapter, surface) => {
            if let Err(err) = result {
                error!("command loop failed: {err}");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
        }
    }

    scheduler.stop();
    scheduler.stopped().await;
    Ok(())
}
