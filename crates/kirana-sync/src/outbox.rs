//! # Outbox Processor (Upward Sync)
//!
//! Drains the mutation log against the remote store, strictly in creation
//! order, turning local optimistic writes into confirmed remote state.
//!
//! ## Drain Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Outbox Drain Flow                                │
//! │                                                                         │
//! │  TRIGGERS                                                              │
//! │  • sync_queue table change (a business operation committed)            │
//! │  • connectivity flips offline → online                                 │
//! │                                                                         │
//! │  GUARD: one drain at a time (re-entrant flag; rapid triggers while    │
//! │  a drain runs simply coalesce into the next one)                       │
//! │                                                                         │
//! │  FOR EACH pending entry, in insertion order:                           │
//! │                                                                         │
//! │    1. payload shape must match the entry's collection                  │
//! │       mismatch / missing ──► dead-letter, CONTINUE (can never succeed) │
//! │                                                                         │
//! │    2. create/update ──► merge-write fields + updatedAt/synced markers  │
//! │       delete        ──► remote delete                                  │
//! │                                                                         │
//! │    3. success ──► flip local synced flag (products, customers,         │
//! │       inventory, bills), remove entry from log, continue               │
//! │                                                                         │
//! │    4. failure ──► attempts += 1                                        │
//! │         attempts < budget ──► STOP THE DRAIN (head-of-line: later      │
//! │                               entries for the same document must not   │
//! │                               overtake this one)                       │
//! │         attempts ≥ budget ──► dead-letter, CONTINUE (a poisoned entry  │
//! │                               stops blocking everyone else)            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! There is no backoff timer: a halted drain re-runs on the next trigger.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use kirana_db::{Database, Table};

use crate::connectivity::ConnectivityMonitor;
use crate::engine::SyncEventEmitter;
use crate::error::{SyncError, SyncResult};
use crate::remote::RemoteStore;
use kirana_core::{Collection, MutationAction, SyncQueueEntry};

// =============================================================================
// Drain Report
// =============================================================================

/// What one drain accomplished.
#[derive(Debug, Clone, Default)]
pub struct DrainReport {
    /// Entries confirmed remotely and removed from the log.
    pub delivered: usize,

    /// Entries quarantined to the dead-letter table.
    pub dead_lettered: usize,

    /// Entries still pending when the drain ended.
    pub remaining: usize,

    /// The error that halted the drain, if it didn't run to completion.
    pub halted_on: Option<String>,
}

// =============================================================================
// Drainer
// =============================================================================

/// The drain logic, shared between the background processor task and the
/// engine's explicit `sync_now()`.
pub struct OutboxDrainer {
    db: Database,
    remote: Arc<dyn RemoteStore>,
    connectivity: ConnectivityMonitor,
    emitter: Arc<dyn SyncEventEmitter>,

    /// Delivery attempts before an entry is dead-lettered.
    max_attempts: i64,

    /// Re-entrant guard; also surfaces as the "syncing" status bit.
    draining: AtomicBool,

    /// When a drain last ran to completion with everything delivered.
    last_sync: Mutex<Option<DateTime<Utc>>>,

    /// The error that halted the most recent drain, if any.
    last_error: Mutex<Option<String>>,
}

impl OutboxDrainer {
    pub fn new(
        db: Database,
        remote: Arc<dyn RemoteStore>,
        connectivity: ConnectivityMonitor,
        emitter: Arc<dyn SyncEventEmitter>,
        max_attempts: i64,
    ) -> Self {
        OutboxDrainer {
            db,
            remote,
            connectivity,
            emitter,
            max_attempts,
            draining: AtomicBool::new(false),
            last_sync: Mutex::new(None),
            last_error: Mutex::new(None),
        }
    }

    /// True while a drain is in progress.
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    /// When a drain last left the queue empty.
    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        *self.last_sync.lock().unwrap()
    }

    /// The error that halted the most recent drain, if any.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().unwrap().clone()
    }

    /// Runs a drain unless offline or one is already running.
    ///
    /// Returns None when the drain was skipped (offline / already running).
    pub async fn try_drain(&self) -> SyncResult<Option<DrainReport>> {
        if !self.connectivity.is_online() {
            debug!("Offline, skipping drain");
            return Ok(None);
        }

        if self.draining.swap(true, Ordering::SeqCst) {
            debug!("Drain already in progress");
            return Ok(None);
        }

        let result = self.drain().await;
        self.draining.store(false, Ordering::SeqCst);

        result.map(Some)
    }

    /// One full drain pass.
    async fn drain(&self) -> SyncResult<DrainReport> {
        let entries = self.db.sync_queue().pending().await?;
        if entries.is_empty() {
            return Ok(DrainReport::default());
        }

        info!(count = entries.len(), "Draining mutation log");

        let mut report = DrainReport::default();
        let mut touched_tables: Vec<Table> = Vec::new();
        let total = entries.len();

        for entry in entries {
            match self.deliver(&entry).await {
                Ok(()) => {
                    self.db.sync_queue().remove(entry.id).await?;
                    report.delivered += 1;

                    if let Some(table) = synced_flag_table(entry.collection) {
                        if !touched_tables.contains(&table) {
                            touched_tables.push(table);
                        }
                    }

                    self.emitter.emit_progress(
                        (total - report.delivered - report.dead_lettered) as i64,
                        report.delivered as i64,
                    );
                }

                Err(e) if e.is_permanent_payload_error() => {
                    // No retry can fix a malformed entry - quarantine and move on
                    self.db
                        .sync_queue()
                        .move_to_dead_letter(&entry, &e.to_string())
                        .await?;
                    report.dead_lettered += 1;
                }

                Err(e) => {
                    let attempts = self
                        .db
                        .sync_queue()
                        .record_failure(entry.id, &e.to_string())
                        .await?;

                    if attempts >= self.max_attempts {
                        let mut exhausted = entry.clone();
                        exhausted.attempts = attempts;
                        self.db
                            .sync_queue()
                            .move_to_dead_letter(&exhausted, &e.to_string())
                            .await?;
                        report.dead_lettered += 1;
                        continue;
                    }

                    // Head-of-line halt: later entries must not overtake
                    warn!(
                        entry_id = entry.id,
                        collection = %entry.collection,
                        doc_id = %entry.doc_id,
                        attempts,
                        error = %e,
                        "Drain halted"
                    );
                    self.emitter.emit_error(&e.to_string(), e.is_retryable());
                    report.halted_on = Some(e.to_string());
                    break;
                }
            }
        }

        report.remaining = self.db.sync_queue().count_pending().await? as usize;

        *self.last_error.lock().unwrap() = report.halted_on.clone();
        if report.remaining == 0 {
            *self.last_sync.lock().unwrap() = Some(Utc::now());
        }

        if report.delivered > 0 || report.dead_lettered > 0 {
            touched_tables.push(Table::SyncQueue);
            self.db.changes().notify_many(&touched_tables);
        }

        info!(
            delivered = report.delivered,
            dead_lettered = report.dead_lettered,
            remaining = report.remaining,
            halted = report.halted_on.is_some(),
            "Drain finished"
        );

        Ok(report)
    }

    /// Delivers one entry to the remote store and flips the local synced
    /// flag on success.
    async fn deliver(&self, entry: &SyncQueueEntry) -> SyncResult<()> {
        debug!(
            entry_id = entry.id,
            collection = %entry.collection,
            doc_id = %entry.doc_id,
            action = entry.action.as_str(),
            "Delivering mutation"
        );

        match entry.action {
            MutationAction::Create | MutationAction::Update => {
                let payload = entry.payload.as_ref().ok_or(SyncError::MissingPayload {
                    id: entry.id,
                    action: entry.action.as_str().to_string(),
                })?;

                if payload.collection() != entry.collection {
                    return Err(SyncError::PayloadMismatch {
                        id: entry.id,
                        expected: entry.collection,
                        actual: payload.collection(),
                    });
                }

                let mut fields = payload.remote_fields()?;
                // Remote markers: when the write lands, the document IS the
                // confirmed state
                fields.insert(
                    "updatedAt".to_string(),
                    serde_json::json!(chrono::Utc::now()),
                );
                fields.insert("synced".to_string(), serde_json::json!(true));

                self.remote
                    .set_merge(entry.collection, &entry.doc_id, fields)
                    .await?;

                self.mark_entity_synced(entry).await?;
            }

            MutationAction::Delete => {
                self.remote.delete(entry.collection, &entry.doc_id).await?;
            }
        }

        Ok(())
    }

    /// Flips the local synced flag for the four tables the UI renders
    /// pending/confirmed state from. Other collections (khata entries,
    /// expenses, settings) have no pending indicator; their log entry
    /// disappearing is the confirmation.
    async fn mark_entity_synced(&self, entry: &SyncQueueEntry) -> SyncResult<()> {
        match entry.collection {
            Collection::Products => self.db.products().mark_synced(&entry.doc_id).await?,
            Collection::Customers => self.db.customers().mark_synced(&entry.doc_id).await?,
            Collection::Inventory => self.db.inventory().mark_synced(&entry.doc_id).await?,
            Collection::Bills => self.db.bills().mark_synced(&entry.doc_id).await?,
            _ => {}
        }

        Ok(())
    }
}

/// The local table whose synced flag a confirmed entry flips, if any.
fn synced_flag_table(collection: Collection) -> Option<Table> {
    match collection {
        Collection::Products => Some(Table::Products),
        Collection::Customers => Some(Table::Customers),
        Collection::Inventory => Some(Table::Inventory),
        Collection::Bills => Some(Table::Bills),
        _ => None,
    }
}

// =============================================================================
// Outbox Processor (background task)
// =============================================================================

/// Background task that watches for drain triggers.
pub struct OutboxProcessor {
    drainer: Arc<OutboxDrainer>,
    db: Database,
    connectivity: ConnectivityMonitor,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for controlling the outbox processor.
#[derive(Clone)]
pub struct OutboxProcessorHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl OutboxProcessorHandle {
    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| SyncError::ChannelError("Outbox processor already stopped".into()))
    }
}

impl OutboxProcessor {
    /// Creates the processor task around a shared drainer.
    pub fn new(
        drainer: Arc<OutboxDrainer>,
        db: Database,
        connectivity: ConnectivityMonitor,
    ) -> (Self, OutboxProcessorHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let processor = OutboxProcessor {
            drainer,
            db,
            connectivity,
            shutdown_rx,
        };

        (processor, OutboxProcessorHandle { shutdown_tx })
    }

    /// Runs the trigger loop. Spawn as a background task.
    pub async fn run(mut self) {
        info!("Outbox processor starting");

        let mut changes = self.db.changes().subscribe();
        let mut online_rx = self.connectivity.subscribe();

        // Anything queued before we started (e.g. offline session restart)
        self.trigger().await;

        loop {
            tokio::select! {
                result = changes.recv() => match result {
                    Ok(change) if change.table == Table::SyncQueue => {
                        self.trigger().await;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        debug!(missed, "Change bus lagged, draining to catch up");
                        self.trigger().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },

                result = online_rx.changed() => match result {
                    Ok(()) => {
                        if *online_rx.borrow() {
                            debug!("Back online, draining");
                            self.trigger().await;
                        }
                    }
                    Err(_) => break,
                },

                _ = self.shutdown_rx.recv() => {
                    info!("Outbox processor shutting down");
                    break;
                }
            }
        }

        info!("Outbox processor stopped");
    }

    async fn trigger(&self) {
        if let Err(e) = self.drainer.try_drain().await {
            error!(?e, "Drain failed");
        }
    }
}
