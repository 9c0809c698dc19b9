//! # Table Change Notifications & Live Queries
//!
//! The local store is the single read model for the UI. Screens don't poll:
//! they subscribe to a query, and the query re-runs whenever one of its
//! underlying tables changes.
//!
//! ## How It Works
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Change Bus + Live Queries                            │
//! │                                                                         │
//! │  Business operation commits transaction                                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ChangeBus::notify(Table::Bills)  (AFTER commit - subscribers must     │
//! │       │                            never observe uncommitted state)    │
//! │       ├──────────────────────────────────┐                             │
//! │       ▼                                  ▼                             │
//! │  watch_query task                   Outbox processor                   │
//! │  (re-runs the caller's query,       (Table::SyncQueue events           │
//! │   pushes a fresh snapshot           trigger a drain)                   │
//! │   through a watch channel)                                             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  UI renders the new snapshot                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each live query is finite and restartable: the background task ends as
//! soon as the receiver is dropped, and a new subscription simply re-runs
//! the query from scratch.

use std::future::Future;
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

use crate::error::DbResult;
use crate::pool::Database;

// =============================================================================
// Tables
// =============================================================================

/// The local tables that emit change notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Products,
    Inventory,
    Bills,
    Customers,
    KhataTransactions,
    Expenses,
    StoreSettings,
    SyncQueue,
}

/// A change notification: something committed to this table.
///
/// Deliberately coarse - no row ids, no before/after images. Subscribers
/// re-run their query against the store, which is always the source of
/// truth.
#[derive(Debug, Clone, Copy)]
pub struct TableChange {
    pub table: Table,
}

// =============================================================================
// Change Bus
// =============================================================================

/// Broadcast bus for table change notifications.
///
/// Held by [`Database`] and shared by all its clones. Delivery is lossy: a
/// slow subscriber that lags simply re-runs its query once it catches up.
#[derive(Debug)]
pub struct ChangeBus {
    tx: broadcast::Sender<TableChange>,
}

impl ChangeBus {
    /// Creates a new change bus.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        ChangeBus { tx }
    }

    /// Subscribes to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<TableChange> {
        self.tx.subscribe()
    }

    /// Publishes a change for one table.
    ///
    /// Call AFTER the transaction that made the change has committed.
    pub fn notify(&self, table: Table) {
        // send() only fails when there are no subscribers - not an error
        let _ = self.tx.send(TableChange { table });
    }

    /// Publishes changes for several tables (one event per table).
    pub fn notify_many(&self, tables: &[Table]) {
        for table in tables {
            self.notify(*table);
        }
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Live Queries
// =============================================================================

/// Runs `query` once, then re-runs it whenever one of `tables` changes,
/// delivering each snapshot through the returned watch receiver.
///
/// ## Contract
/// - The initial snapshot is computed before this function returns, so the
///   receiver always holds a valid value.
/// - The background task exits when the receiver is dropped.
/// - A lagged subscriber re-runs the query once rather than replaying
///   missed events (snapshots make the events themselves disposable).
/// - A query error mid-stream is logged and the previous snapshot stays
///   current; the next change re-runs the query again.
///
/// ## Example
/// ```rust,ignore
/// let products = watch_query(&db, vec![Table::Products], move |db| {
///     let shop = shop_id.clone();
///     async move { db.products().list_for_shop(&shop).await }
/// })
/// .await?;
///
/// // products.borrow() is always the latest snapshot
/// ```
pub async fn watch_query<T, F, Fut>(
    db: &Database,
    tables: Vec<Table>,
    query: F,
) -> DbResult<watch::Receiver<T>>
where
    T: Send + Sync + 'static,
    F: Fn(Database) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = DbResult<T>> + Send,
{
    let initial = query(db.clone()).await?;
    let (tx, rx) = watch::channel(initial);

    let mut changes = db.changes().subscribe();
    let db = db.clone();

    tokio::spawn(async move {
        loop {
            let relevant = match changes.recv().await {
                Ok(change) => tables.contains(&change.table),
                // Missed some events - re-run unconditionally to catch up
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    debug!(missed, "Live query lagged, refreshing");
                    true
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            if !relevant {
                continue;
            }

            if tx.is_closed() {
                break;
            }

            match query(db.clone()).await {
                Ok(snapshot) => {
                    if tx.send(snapshot).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(?e, "Live query re-run failed; keeping previous snapshot");
                }
            }
        }

        debug!("Live query task ended");
    });

    Ok(rx)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_notify_reaches_subscriber() {
        let bus = ChangeBus::new();
        let mut rx = bus.subscribe();

        bus.notify(Table::Bills);

        let change = rx.recv().await.unwrap();
        assert_eq!(change.table, Table::Bills);
    }

    #[tokio::test]
    async fn test_notify_without_subscribers_is_fine() {
        let bus = ChangeBus::new();
        bus.notify(Table::Products);
        bus.notify_many(&[Table::Inventory, Table::SyncQueue]);
    }

    #[tokio::test]
    async fn test_notify_many_sends_one_event_per_table() {
        let bus = ChangeBus::new();
        let mut rx = bus.subscribe();

        bus.notify_many(&[Table::Products, Table::Inventory]);

        assert_eq!(rx.recv().await.unwrap().table, Table::Products);
        assert_eq!(rx.recv().await.unwrap().table, Table::Inventory);
    }
}
