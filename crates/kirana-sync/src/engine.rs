//! # Sync Engine
//!
//! Orchestrator for the sync layer. An explicitly constructed instance with
//! its own lifecycle - `start(shop_id)` / `stop()` - so multiple shop
//! contexts or test harnesses run isolated engines instead of sharing
//! ambient global state.
//!
//! ## Engine Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SyncEngine Architecture                          │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                         SyncEngine                               │  │
//! │  │                                                                  │  │
//! │  │  • start(shop_id): spawns the components below                   │  │
//! │  │  • stop(): tears them down via shutdown channels                 │  │
//! │  │  • sync_now() / resync(): explicit triggers                      │  │
//! │  │  • status(): online/syncing/pending for the UI indicator         │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼──────────────────────┐                 │
//! │         ▼                     ▼                      ▼                  │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ OutboxProcessor│  │ DownwardListener│ │ DownwardListener       │    │
//! │  │ (drain task)   │  │ (products)      │ │ (inventory)            │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │         │                     │                      │                  │
//! │         └─────────────────────┴──────────────────────┘                 │
//! │                               │                                         │
//! │                    Arc<dyn RemoteStore>                                 │
//! │              (WebSocket gateway, or in-process store)                   │
//! │                                                                         │
//! │  STATUS EVENTS (SyncEventEmitter, to the UI shell):                    │
//! │  • emit_status   - online/offline, pending count                       │
//! │  • emit_progress - entries delivered during a drain                    │
//! │  • emit_error    - drain halted / listener failures                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use tracing::{info, warn};

use kirana_db::Database;

use crate::config::SyncConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::error::{SyncError, SyncResult};
use crate::listener::{DownwardListener, ListenerHandle};
use crate::outbox::{DrainReport, OutboxDrainer, OutboxProcessor, OutboxProcessorHandle};
use crate::remote::RemoteStore;
use crate::resync::{run_bulk_resync, ResyncReport};
use kirana_core::Collection;

/// The collections the downward listener watches.
const WATCHED_COLLECTIONS: [Collection; 2] = [Collection::Products, Collection::Inventory];

// =============================================================================
// Sync Status
// =============================================================================

/// Current sync status for the always-present UI indicator.
#[derive(Debug, Clone, Default)]
pub struct SyncStatus {
    /// Connectivity gate state.
    pub online: bool,

    /// A drain is running right now.
    pub syncing: bool,

    /// Mutations waiting in the log - "N changes not yet saved online".
    pub pending_count: i64,

    /// Mutations quarantined after exhausting their retry budget.
    pub dead_letter_count: i64,

    /// Last time a drain left the queue empty (ISO8601).
    pub last_sync: Option<String>,

    /// The error that halted the most recent drain, if any.
    pub last_error: Option<String>,
}

// =============================================================================
// Event Emitter
// =============================================================================

/// Trait for pushing sync events to the host shell (UI toast, status bar).
pub trait SyncEventEmitter: Send + Sync {
    /// A status change worth re-rendering the indicator for.
    fn emit_status(&self, status: &SyncStatus);

    /// Drain progress: entries still pending, entries delivered.
    fn emit_progress(&self, pending: i64, synced: i64);

    /// A sync failure. Background concern - never blocks the register.
    fn emit_error(&self, message: &str, retryable: bool);
}

/// No-op event emitter for headless use and tests.
pub struct NoOpEmitter;

impl SyncEventEmitter for NoOpEmitter {
    fn emit_status(&self, _status: &SyncStatus) {}
    fn emit_progress(&self, _pending: i64, _synced: i64) {}
    fn emit_error(&self, _message: &str, _retryable: bool) {}
}

// =============================================================================
// Sync Engine
// =============================================================================

/// Handles for the running components, torn down on stop.
struct Running {
    shop_id: String,
    outbox: OutboxProcessorHandle,
    listeners: Vec<ListenerHandle>,
}

/// The sync engine. One instance per (database, remote, shop session).
pub struct SyncEngine {
    db: Database,
    remote: Arc<dyn RemoteStore>,
    config: SyncConfig,
    connectivity: ConnectivityMonitor,
    emitter: Arc<dyn SyncEventEmitter>,
    drainer: Arc<OutboxDrainer>,
    running: Option<Running>,
}

impl SyncEngine {
    /// Creates an engine with a no-op event emitter.
    pub fn new(db: Database, remote: Arc<dyn RemoteStore>, config: SyncConfig) -> Self {
        Self::with_emitter(db, remote, config, Arc::new(NoOpEmitter))
    }

    /// Creates an engine with a custom event emitter.
    ///
    /// The engine owns a fresh connectivity monitor, initially offline.
    /// Hand `connectivity()` to whatever drives it: the WebSocket remote's
    /// transport, OS network events forwarded by the shell, or a test.
    pub fn with_emitter(
        db: Database,
        remote: Arc<dyn RemoteStore>,
        config: SyncConfig,
        emitter: Arc<dyn SyncEventEmitter>,
    ) -> Self {
        let connectivity = ConnectivityMonitor::default();

        let drainer = Arc::new(OutboxDrainer::new(
            db.clone(),
            remote.clone(),
            connectivity.clone(),
            emitter.clone(),
            config.sync.max_attempts,
        ));

        SyncEngine {
            db,
            remote,
            config,
            connectivity,
            emitter,
            drainer,
            running: None,
        }
    }

    /// The engine's connectivity monitor (shared, cheap clone).
    pub fn connectivity(&self) -> ConnectivityMonitor {
        self.connectivity.clone()
    }

    /// Starts the engine for one shop session: spawns the outbox processor
    /// and the downward listeners.
    ///
    /// A listener whose subscription cannot be established (e.g. starting
    /// offline) is skipped with a warning and NOT retried - local data goes
    /// stale until a bulk resync or an engine restart. The outbox processor
    /// always starts; it gates itself on connectivity.
    pub async fn start(&mut self, shop_id: &str) -> SyncResult<()> {
        if self.running.is_some() {
            return Err(SyncError::Lifecycle("engine already started".into()));
        }
        if shop_id.is_empty() {
            return Err(SyncError::MissingShopId);
        }

        info!(shop_id, device_id = %self.config.device_id(), "Starting sync engine");

        let (processor, outbox_handle) = OutboxProcessor::new(
            self.drainer.clone(),
            self.db.clone(),
            self.connectivity.clone(),
        );
        tokio::spawn(processor.run());

        let mut listeners = Vec::new();
        for collection in WATCHED_COLLECTIONS {
            match self.remote.subscribe(collection, shop_id).await {
                Ok(rx) => {
                    let (listener, handle) =
                        DownwardListener::new(self.db.clone(), collection, rx);
                    tokio::spawn(listener.run());
                    listeners.push(handle);
                }
                Err(e) => {
                    warn!(collection = %collection, ?e, "Could not open change stream");
                    self.emitter
                        .emit_error(&format!("change stream {collection}: {e}"), true);
                }
            }
        }

        self.running = Some(Running {
            shop_id: shop_id.to_string(),
            outbox: outbox_handle,
            listeners,
        });

        let status = self.status().await?;
        self.emitter.emit_status(&status);

        info!("Sync engine started");
        Ok(())
    }

    /// Stops the engine: tears down the outbox processor and listeners.
    /// Called on shop change and logout. Idempotent.
    pub async fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            info!(shop_id = %running.shop_id, "Stopping sync engine");

            let _ = running.outbox.shutdown().await;
            for listener in running.listeners {
                let _ = listener.shutdown().await;
            }

            info!("Sync engine stopped");
        }
    }

    /// True while started.
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Runs a drain right now (unless offline or one is already running).
    ///
    /// The background processor covers the normal triggers; this is for
    /// explicit "sync now" UI actions and tests.
    pub async fn sync_now(&self) -> SyncResult<Option<DrainReport>> {
        self.drainer.try_drain().await
    }

    /// Runs a bulk resync for the active shop (or the configured shop when
    /// not started - the login flow resyncs before starting listeners).
    pub async fn resync(&self) -> SyncResult<ResyncReport> {
        let shop_id = match &self.running {
            Some(running) => running.shop_id.clone(),
            None => {
                let id = self.config.shop_id();
                if id.is_empty() {
                    return Err(SyncError::MissingShopId);
                }
                id.to_string()
            }
        };

        run_bulk_resync(
            &self.db,
            self.remote.as_ref(),
            &shop_id,
            self.config.sync.recent_bills_cap,
        )
        .await
    }

    /// Snapshot of the sync status for the UI indicator.
    pub async fn status(&self) -> SyncResult<SyncStatus> {
        Ok(SyncStatus {
            online: self.connectivity.is_online(),
            syncing: self.drainer.is_draining(),
            pending_count: self.db.sync_queue().count_pending().await?,
            dead_letter_count: self.db.sync_queue().count_dead_letters().await?,
            last_sync: self.drainer.last_sync().map(|t| t.to_rfc3339()),
            last_error: self.drainer.last_error(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_status_default() {
        let status = SyncStatus::default();
        assert!(!status.online);
        assert!(!status.syncing);
        assert_eq!(status.pending_count, 0);
        assert!(status.last_error.is_none());
    }
}
