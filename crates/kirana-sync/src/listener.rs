//! # Downward Real-Time Listener
//!
//! Applies incremental remote changes to the local store so several devices
//! of the same shop stay consistent without manual refresh.
//!
//! ## Scope & Semantics
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Downward Listener                                    │
//! │                                                                         │
//! │  One subscription per watched collection, filtered to the active shop: │
//! │    • products                                                          │
//! │    • inventory                                                         │
//! │                                                                         │
//! │  added / modified ──► upsert locally, tagged synced = true             │
//! │  removed          ──► delete by NATURAL key                            │
//! │                       (inventory is keyed by productId, so removal     │
//! │                        resolves that field from the event's last       │
//! │                        snapshot, not the remote document id)           │
//! │                                                                         │
//! │  Events apply in per-collection delivery order. There is no cross-    │
//! │  collection ordering: a stock change and its product edit may land    │
//! │  moments apart - fine, the records are independently keyed.           │
//! │                                                                         │
//! │  Errors are logged, never retried here. Stale data recovers via bulk  │
//! │  resync or session restart.                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use kirana_db::{Database, Table};

use crate::error::{SyncError, SyncResult};
use crate::remote::{RemoteChange, RemoteChangeKind};
use kirana_core::{Collection, Inventory, Product};

// =============================================================================
// Listener
// =============================================================================

/// Applies one collection's change stream to the local store.
pub struct DownwardListener {
    db: Database,
    collection: Collection,
    changes_rx: mpsc::Receiver<RemoteChange>,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for tearing a listener down (shop change, logout).
#[derive(Clone)]
pub struct ListenerHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl ListenerHandle {
    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| SyncError::ChannelError("Listener already stopped".into()))
    }
}

impl DownwardListener {
    /// Creates a listener for one collection's change stream.
    pub fn new(
        db: Database,
        collection: Collection,
        changes_rx: mpsc::Receiver<RemoteChange>,
    ) -> (Self, ListenerHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let listener = DownwardListener {
            db,
            collection,
            changes_rx,
            shutdown_rx,
        };

        (listener, ListenerHandle { shutdown_tx })
    }

    /// Runs the apply loop. Spawn as a background task.
    pub async fn run(mut self) {
        info!(collection = %self.collection, "Downward listener starting");

        loop {
            tokio::select! {
                maybe_change = self.changes_rx.recv() => match maybe_change {
                    Some(change) => {
                        if let Err(e) = self.apply(change).await {
                            // Logged, not retried - see module docs
                            error!(collection = %self.collection, ?e, "Failed to apply remote change");
                        }
                    }
                    None => {
                        warn!(collection = %self.collection, "Change stream ended");
                        break;
                    }
                },

                _ = self.shutdown_rx.recv() => {
                    info!(collection = %self.collection, "Downward listener shutting down");
                    break;
                }
            }
        }

        info!(collection = %self.collection, "Downward listener stopped");
    }

    /// Applies one change event.
    async fn apply(&self, change: RemoteChange) -> SyncResult<()> {
        debug!(
            collection = %change.collection,
            kind = ?change.kind,
            doc_id = %change.doc.id,
            "Applying remote change"
        );

        match change.collection {
            Collection::Products => self.apply_product(change).await,
            Collection::Inventory => self.apply_inventory(change).await,
            other => {
                warn!(collection = %other, "Change event for unwatched collection");
                Ok(())
            }
        }
    }

    async fn apply_product(&self, change: RemoteChange) -> SyncResult<()> {
        let mut conn = self.db.pool().acquire().await.map_err(|e| {
            SyncError::DatabaseError(e.to_string())
        })?;

        match change.kind {
            RemoteChangeKind::Added | RemoteChangeKind::Modified => {
                let product: Product = change.doc.decode_entity()?;
                self.db.products().upsert_synced(&mut *conn, &product).await?;
            }
            RemoteChangeKind::Removed => {
                self.db
                    .products()
                    .delete_remote(&mut *conn, &change.doc.id)
                    .await?;
            }
        }

        self.db.changes().notify(Table::Products);
        Ok(())
    }

    async fn apply_inventory(&self, change: RemoteChange) -> SyncResult<()> {
        let mut conn = self.db.pool().acquire().await.map_err(|e| {
            SyncError::DatabaseError(e.to_string())
        })?;

        match change.kind {
            RemoteChangeKind::Added | RemoteChangeKind::Modified => {
                let inventory: Inventory = change.doc.decode_entity()?;
                self.db
                    .inventory()
                    .upsert_synced(&mut *conn, &inventory)
                    .await?;
            }
            RemoteChangeKind::Removed => {
                // Natural key: the productId field of the last snapshot.
                // Our own writes key inventory documents by product id, so
                // the document id is the fallback for foreign writers.
                let product_id = change
                    .doc
                    .str_field("productId")
                    .unwrap_or(&change.doc.id)
                    .to_string();

                self.db
                    .inventory()
                    .delete_remote(&mut *conn, &product_id)
                    .await?;
            }
        }

        self.db.changes().notify(Table::Inventory);
        Ok(())
    }
}
