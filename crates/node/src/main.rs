//! Standalone sync node.
//!
//! Runs one engine against Redis with an in-memory host, which is enough to
//! watch states move between processes from the logs.
mod config;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use config::NodeConfig;
use inventory_core::InventorySnapshot;
use sync_runtime::{MemoryInventories, RedisStore, StaticTeams, SyncEngine, SyncHooks};
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let config = NodeConfig::from_env()?;
    setup_logging(&config.log_dir, &config.sync.server_id)?;

    let host = MemoryInventories::new();
    let teams = StaticTeams::new();
    for (player, team) in &config.teams {
        teams.assign(*player, team.clone());
    }

    let store = RedisStore::from_config(&config.sync)?;
    let channel = store.channel();
    let engine = SyncEngine::builder()
        .config(config.sync.clone())
        .store(store)
        .channel(channel)
        .host(Arc::new(host.clone()))
        .teams(Arc::new(teams))
        .build()
        .await?;
    let handle = engine.handle();
    let hooks: Arc<dyn SyncHooks> = Arc::new(handle.clone());
    host.attach(hooks);

    let mut events = engine.subscribe_events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => info!(target: "node", key = %event.key(), ?event, "sync event"),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(target: "node", skipped, "event log lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    for player in &config.players {
        host.connect(*player, InventorySnapshot::new());
        match handle.join(*player).await {
            Ok(outcome) => info!(
                target: "node",
                %player,
                key = %outcome.key,
                version = outcome.version,
                "player online"
            ),
            Err(err) => warn!(target: "node", %player, error = %err, "join failed"),
        }
    }

    tokio::signal::ctrl_c().await?;
    info!(target: "node", "shutting down");

    for player in &config.players {
        if let Err(err) = handle.leave(*player).await {
            warn!(target: "node", %player, error = %err, "leave failed");
        }
    }
    engine.shutdown().await?;
    Ok(())
}

/// Setup logging to a file under `log_dir`
fn setup_logging(log_dir: &Path, server_id: &str) -> Result<()> {
    std::fs::create_dir_all(log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, "node.log");
    let (non_blocking_file, _guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false);
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();

    // Leak the guard to keep file writer alive
    std::mem::forget(_guard);

    info!("Logging initialized: server={}", server_id);
    info!("Log file: {}/node.log", log_dir.display());

    Ok(())
}
