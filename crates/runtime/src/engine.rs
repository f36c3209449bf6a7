//! Engine orchestrator and builder.
//!
//! The engine owns the background workers, wires up the command and event
//! channels, and exposes a builder for supplying the remote backends and the
//! host integration.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::api::{Result, SyncError, SyncHandle};
use crate::config::SyncConfig;
use crate::detector::ChangeDetector;
use crate::events::SyncEvent;
use crate::host::{InventoryHost, TeamDirectory};
use crate::registry::SyncRegistry;
use crate::remote::{NotificationChannel, Sleeper, StateStore, TokioSleeper};
use crate::resolver::GroupResolver;
use crate::workers::{Command, NotificationListener, SyncWorker, TaskContext};

/// Running sync engine.
///
/// [`SyncHandle`] is the cloneable façade for callers; the engine itself
/// only holds the worker tasks so it can stop them.
pub struct SyncEngine {
    handle: SyncHandle,
    worker: JoinHandle<()>,
    listener: JoinHandle<()>,
}

impl SyncEngine {
    pub fn builder() -> SyncEngineBuilder {
        SyncEngineBuilder::new()
    }

    /// Get a cloneable handle to this engine.
    pub fn handle(&self) -> SyncHandle {
        self.handle.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.handle.subscribe_events()
    }

    pub fn detector(&self) -> ChangeDetector {
        self.handle.detector().clone()
    }

    /// Stops the listener, then the worker. Operations still in flight are
    /// abandoned and their callers receive an error.
    pub async fn shutdown(self) -> Result<()> {
        self.listener.abort();
        if let Err(err) = self.listener.await
            && !err.is_cancelled()
        {
            return Err(SyncError::WorkerJoin(err));
        }

        if let Err(err) = self.handle.shutdown_worker().await {
            // The worker already stopped; its join result says why.
            warn!(target: "sync::engine", error = %err, "shutdown command not delivered");
        }
        self.worker.await.map_err(SyncError::WorkerJoin)?;

        info!(target: "sync::engine", "sync engine stopped");
        Ok(())
    }
}

/// Builder for [`SyncEngine`].
pub struct SyncEngineBuilder {
    config: SyncConfig,
    store: Option<Arc<dyn StateStore>>,
    channel: Option<Arc<dyn NotificationChannel>>,
    host: Option<Arc<dyn InventoryHost>>,
    teams: Option<Arc<dyn TeamDirectory>>,
    sleeper: Arc<dyn Sleeper>,
}

impl SyncEngineBuilder {
    fn new() -> Self {
        Self {
            config: SyncConfig::default(),
            store: None,
            channel: None,
            host: None,
            teams: None,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Shared state store (required).
    pub fn store(mut self, store: impl StateStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Notification channel (required).
    pub fn channel(mut self, channel: impl NotificationChannel + 'static) -> Self {
        self.channel = Some(Arc::new(channel));
        self
    }

    /// Host inventories (required).
    pub fn host(mut self, host: Arc<dyn InventoryHost>) -> Self {
        self.host = Some(host);
        self
    }

    /// Team directory; without one every player uses the fallback group.
    pub fn teams(mut self, teams: Arc<dyn TeamDirectory>) -> Self {
        self.teams = Some(teams);
        self
    }

    /// Replaces the sleep used between retries.
    pub fn sleeper(mut self, sleeper: impl Sleeper + 'static) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// Build the engine and spawn its workers.
    pub async fn build(self) -> Result<SyncEngine> {
        self.config.validate()?;
        let store = self
            .store
            .ok_or_else(|| SyncError::Config("state store not configured".into()))?;
        let channel = self
            .channel
            .ok_or_else(|| SyncError::Config("notification channel not configured".into()))?;
        let host = self
            .host
            .ok_or_else(|| SyncError::Config("inventory host not configured".into()))?;

        let (command_tx, command_rx) = mpsc::channel::<Command>(self.config.command_buffer);
        let (event_tx, _event_rx) = broadcast::channel::<SyncEvent>(self.config.event_buffer);

        let registry = SyncRegistry::new();
        let handle = SyncHandle::new(command_tx, event_tx.clone(), registry.clone());
        let writer = self.config.writer();

        // Subscribe before any join so no update committed after the first
        // baseline fetch goes unnoticed. A failure here is retried by the
        // listener.
        let initial = match channel.subscribe().await {
            Ok(subscription) => Some(subscription),
            Err(err) => {
                warn!(target: "sync::engine", error = %err, "initial subscribe failed");
                None
            }
        };

        let ctx = Arc::new(TaskContext {
            store,
            channel: Arc::clone(&channel),
            sleeper: Arc::clone(&self.sleeper),
            writer: writer.clone(),
            retry_limit: self.config.retry_limit,
            remote_timeout: self.config.remote_timeout(),
            backoff: self.config.backoff(),
            events: event_tx,
        });

        let worker = SyncWorker::new(
            ctx,
            host,
            GroupResolver::new(self.config.resolver_settings(), self.teams),
            registry,
            self.config.sections,
            self.config.shared_death,
            command_rx,
        );
        let worker = tokio::spawn(async move {
            worker.run().await;
        });

        let listener = NotificationListener::new(
            channel,
            Arc::new(handle.clone()),
            writer.clone(),
            self.config.backoff(),
            self.sleeper,
            initial,
        );
        let listener = tokio::spawn(async move {
            listener.run().await;
        });

        info!(target: "sync::engine", %writer, "sync engine started");
        Ok(SyncEngine {
            handle,
            worker,
            listener,
        })
    }
}
