//! # Bulk Downward Sync
//!
//! Destructive full resync: wipes and repopulates the local shop-scoped
//! collections from the remote store. Used at login and on an explicit
//! "refresh data" action, when the incremental listener may have missed a
//! backlog (first login on a new device, long offline stretch).
//!
//! ## Fail-Safe Ordering
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Bulk Resync Phases                                │
//! │                                                                         │
//! │  PHASE 1: FETCH (outside any local transaction)                        │
//! │    products, inventory, customers - full shop-scoped sets              │
//! │    settings - or the shop registry name as a minimal default           │
//! │    bills - most recent N by createdAt descending (capped)              │
//! │                                                                         │
//! │    Any network failure aborts HERE. Local state untouched.             │
//! │                                                                         │
//! │  PHASE 2: REPLACE (one local transaction)                              │
//! │    clear products, inventory, customers, settings, bills               │
//! │    bulk-insert everything fetched, tagged synced = true                │
//! │                                                                         │
//! │  This is a REPLACE, not a merge: local unsynced rows in these tables   │
//! │  are clobbered. Callers must drain the mutation log first - that       │
//! │  precondition is documented and logged, not enforced.                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use tracing::{info, warn};

use kirana_db::{Database, Table};

use crate::error::SyncResult;
use crate::remote::{RemoteDocument, RemoteStore};
use kirana_core::{Bill, Collection, Customer, Inventory, Product, StoreSettings};

/// What a bulk resync brought down.
#[derive(Debug, Clone, Default)]
pub struct ResyncReport {
    pub products: usize,
    pub inventory: usize,
    pub customers: usize,
    pub bills: usize,

    /// True when no settings document existed and the shop registry name
    /// seeded a minimal default.
    pub used_settings_fallback: bool,
}

/// Runs a bulk resync for one shop.
///
/// See the module docs for the two-phase fail-safe structure. Returns a
/// count of what was replaced.
pub async fn run_bulk_resync(
    db: &Database,
    remote: &dyn RemoteStore,
    shop_id: &str,
    recent_bills_cap: u32,
) -> SyncResult<ResyncReport> {
    // Documented precondition, not enforced: a pending mutation log means
    // local changes this replace will clobber
    let pending = db.sync_queue().count_pending().await?;
    if pending > 0 {
        warn!(
            pending,
            "Bulk resync with pending mutations - unsynced local changes will be lost"
        );
    }

    info!(shop_id, "Bulk resync: fetching remote snapshot");

    // PHASE 1: fetch everything before touching local state
    let product_docs = remote.fetch_all(Collection::Products, shop_id).await?;
    let inventory_docs = remote.fetch_all(Collection::Inventory, shop_id).await?;
    let customer_docs = remote.fetch_all(Collection::Customers, shop_id).await?;
    let settings_docs = remote.fetch_all(Collection::StoreSettings, shop_id).await?;
    let bill_docs = remote
        .fetch_recent(Collection::Bills, shop_id, recent_bills_cap)
        .await?;

    let products = decode_all::<Product>(&product_docs, "product");
    let inventory = decode_all::<Inventory>(&inventory_docs, "inventory");
    let customers = decode_all::<Customer>(&customer_docs, "customer");
    let bills = decode_all::<Bill>(&bill_docs, "bill");

    // Settings singleton, falling back to the shop registry name
    let mut used_settings_fallback = false;
    let settings: StoreSettings = match settings_docs
        .iter()
        .find_map(|doc| doc.decode_entity::<StoreSettings>().ok())
    {
        Some(s) => s,
        None => {
            let shop_name = remote
                .fetch_doc(Collection::Shops, shop_id)
                .await?
                .and_then(|doc| doc.str_field("name").map(str::to_string))
                .unwrap_or_else(|| "My Shop".to_string());

            used_settings_fallback = true;
            StoreSettings::defaults(shop_id, &shop_name)
        }
    };

    // PHASE 2: destructive replace in one transaction
    let mut tx = db.pool().begin().await.map_err(kirana_db::DbError::from)?;

    db.products().clear_shop(&mut *tx, shop_id).await?;
    db.inventory().clear_shop(&mut *tx, shop_id).await?;
    db.customers().clear_shop(&mut *tx, shop_id).await?;
    db.settings().clear_shop(&mut *tx, shop_id).await?;
    db.bills().clear_shop(&mut *tx, shop_id).await?;

    for product in &products {
        db.products().upsert_synced(&mut *tx, product).await?;
    }
    for inv in &inventory {
        db.inventory().upsert_synced(&mut *tx, inv).await?;
    }
    for customer in &customers {
        db.customers().upsert_synced(&mut *tx, customer).await?;
    }
    for bill in &bills {
        db.bills().upsert_synced(&mut *tx, bill).await?;
    }
    db.settings().upsert_synced(&mut *tx, &settings).await?;

    tx.commit().await.map_err(kirana_db::DbError::from)?;

    db.changes().notify_many(&[
        Table::Products,
        Table::Inventory,
        Table::Customers,
        Table::StoreSettings,
        Table::Bills,
    ]);

    let report = ResyncReport {
        products: products.len(),
        inventory: inventory.len(),
        customers: customers.len(),
        bills: bills.len(),
        used_settings_fallback,
    };

    info!(
        products = report.products,
        inventory = report.inventory,
        customers = report.customers,
        bills = report.bills,
        settings_fallback = report.used_settings_fallback,
        "Bulk resync complete"
    );

    Ok(report)
}

/// Decodes a fetched document set, skipping rows this client cannot read.
/// A skipped row is logged loudly: it means a foreign writer produced a
/// shape this version does not understand.
fn decode_all<T: serde::de::DeserializeOwned>(docs: &[RemoteDocument], kind: &str) -> Vec<T> {
    let mut out = Vec::with_capacity(docs.len());

    for doc in docs {
        match doc.decode_entity::<T>() {
            Ok(entity) => out.push(entity),
            Err(e) => {
                warn!(kind, doc_id = %doc.id, ?e, "Skipping undecodable remote document");
            }
        }
    }

    out
}
