//! End-to-end sync scenarios: offline operation, ordered drains, failure
//! isolation, multi-device convergence, and the bulk resync boundary.
//!
//! Everything runs against an in-memory SQLite store and the in-process
//! remote, with connectivity flipped by hand.

use std::sync::Arc;
use std::time::Duration;

use kirana_core::{
    BillItem, Collection, KhataEntryType, MutationAction, MutationPayload, NewMutation,
    PaymentMode,
};
use kirana_db::{watch_query, Database, DbConfig, NewCustomer, NewProduct, ShopOps, Table};
use kirana_sync::{MemoryRemote, RemoteStore, SyncConfig, SyncEngine};

const SHOP: &str = "shop-1";

// =============================================================================
// Fixtures
// =============================================================================

async fn fresh_db() -> Database {
    Database::new(DbConfig::in_memory()).await.unwrap()
}

fn engine_config() -> SyncConfig {
    let mut config = SyncConfig::default();
    config.shop.id = SHOP.to_string();
    config
}

async fn rig() -> (Database, ShopOps, Arc<MemoryRemote>, SyncEngine) {
    let db = fresh_db().await;
    let ops = ShopOps::new(db.clone(), SHOP);
    let remote = Arc::new(MemoryRemote::new());
    let engine = SyncEngine::new(db.clone(), remote.clone(), engine_config());
    (db, ops, remote, engine)
}

fn new_product(name: &str, price: i64, cost: Option<i64>, stock: i64) -> NewProduct {
    NewProduct {
        name: name.to_string(),
        barcode: None,
        price_paise: price,
        cost_price_paise: cost,
        category: "Grocery".to_string(),
        unit: "pcs".to_string(),
        is_loose: false,
        initial_stock: stock,
        low_stock_threshold: 2,
    }
}

fn cart_item(product_id: &str, qty: i64, price: i64) -> BillItem {
    BillItem {
        product_id: product_id.to_string(),
        name: "item".to_string(),
        qty,
        price_paise: price,
        total_paise: qty * price,
    }
}

/// Polls until `check` passes or the deadline hits (listener tasks apply
/// changes asynchronously).
async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

// =============================================================================
// Offline operation & ordering
// =============================================================================

#[tokio::test]
async fn offline_operations_log_exactly_one_entry_per_write_in_order() {
    let (db, ops, _remote, _engine) = rig().await;

    let p = ops.create_product(new_product("Rice 5kg", 40000, None, 10)).await.unwrap();
    ops.restock(&p.id, 5).await.unwrap();
    let c = ops.add_customer(NewCustomer { name: "Ravi".into(), phone: "98".into() }).await.unwrap();

    let pending = db.sync_queue().pending().await.unwrap();

    // product create, inventory create, inventory update, customer create
    assert_eq!(pending.len(), 4);
    assert!(pending.windows(2).all(|w| w[0].id < w[1].id));
    assert_eq!(pending[0].collection, Collection::Products);
    assert_eq!(pending[1].collection, Collection::Inventory);
    assert_eq!(pending[2].collection, Collection::Inventory);
    assert_eq!(pending[2].action, MutationAction::Update);
    assert_eq!(pending[3].doc_id, c.id);

    // Stock reflects both the initial fill and the restock
    let inv = db.inventory().get(&p.id).await.unwrap().unwrap();
    assert_eq!(inv.current_stock, 15);
}

#[tokio::test]
async fn scenario_a_offline_checkout_then_drain() {
    let (db, ops, remote, engine) = rig().await;
    let connectivity = engine.connectivity();

    // Catalog exists and is fully synced before the offline window
    let p1 = ops.create_product(new_product("Dal 1kg", 5000, Some(4000), 10)).await.unwrap();
    let p2 = ops.create_product(new_product("Oil 1l", 5000, None, 10)).await.unwrap();
    connectivity.set_online(true);
    engine.sync_now().await.unwrap().unwrap();
    assert_eq!(db.sync_queue().count_pending().await.unwrap(), 0);

    // Offline: checkout a 2-item cart totaling ₹150
    connectivity.set_online(false);
    let bill = ops
        .checkout(
            vec![cart_item(&p1.id, 2, 5000), cart_item(&p2.id, 1, 5000)],
            PaymentMode::Cash,
            None,
        )
        .await
        .unwrap();

    assert_eq!(bill.total_paise, 15_000);
    assert!(!bill.synced);

    let inv1 = db.inventory().get(&p1.id).await.unwrap().unwrap();
    let inv2 = db.inventory().get(&p2.id).await.unwrap().unwrap();
    assert_eq!(inv1.current_stock, 8);
    assert_eq!(inv2.current_stock, 9);

    // Exactly the bill plus its two inventory decrements are queued
    assert_eq!(db.sync_queue().count_pending().await.unwrap(), 3);

    // Offline drain attempts are a no-op
    assert!(engine.sync_now().await.unwrap().is_none());
    assert_eq!(db.sync_queue().count_pending().await.unwrap(), 3);

    // Back online: the drain clears the queue and flips the flags
    connectivity.set_online(true);
    let report = engine.sync_now().await.unwrap().unwrap();
    assert_eq!(report.delivered, 3);
    assert_eq!(report.remaining, 0);

    assert_eq!(db.sync_queue().count_pending().await.unwrap(), 0);
    assert!(db.bills().get_by_id(&bill.id).await.unwrap().unwrap().synced);
    assert!(db.inventory().get(&p1.id).await.unwrap().unwrap().synced);
    assert!(db.inventory().get(&p2.id).await.unwrap().unwrap().synced);

    // The remote documents exist and carry the confirmation markers
    let doc = remote.raw_doc(Collection::Bills, &bill.id).unwrap();
    assert_eq!(doc["synced"], true);
    assert!(doc.contains_key("updatedAt"));
    assert_eq!(doc["totalPaise"], 15_000);
}

// =============================================================================
// Drain failure semantics
// =============================================================================

#[tokio::test]
async fn scenario_c_drain_halts_at_failing_entry_preserving_order() {
    let (db, ops, remote, engine) = rig().await;
    engine.connectivity().set_online(true);

    // Five single-entry mutations, in order
    let mut customers = Vec::new();
    for i in 0..5 {
        let c = ops
            .add_customer(NewCustomer { name: format!("Customer {i}"), phone: format!("9{i}") })
            .await
            .unwrap();
        customers.push(c);
    }
    assert_eq!(db.sync_queue().count_pending().await.unwrap(), 5);

    // Entry #3 is rejected by the remote
    remote.reject(Collection::Customers, &customers[2].id);

    let report = engine.sync_now().await.unwrap().unwrap();
    assert_eq!(report.delivered, 2);
    assert_eq!(report.dead_lettered, 0);
    assert_eq!(report.remaining, 3);
    assert!(report.halted_on.is_some());

    // #1-#2 removed, #3-#5 retained untouched and in original order
    let pending = db.sync_queue().pending().await.unwrap();
    assert_eq!(pending.len(), 3);
    assert_eq!(pending[0].doc_id, customers[2].id);
    assert_eq!(pending[1].doc_id, customers[3].id);
    assert_eq!(pending[2].doc_id, customers[4].id);

    // No synced flag beyond #1-#2 flipped
    for (i, c) in customers.iter().enumerate() {
        let row = db.customers().get_by_id(&c.id).await.unwrap().unwrap();
        assert_eq!(row.synced, i < 2, "customer {i}");
    }

    // Recovery: once the remote accepts, the next drain clears the rest
    remote.allow(Collection::Customers, &customers[2].id);
    let report = engine.sync_now().await.unwrap().unwrap();
    assert_eq!(report.delivered, 3);
    assert_eq!(db.sync_queue().count_pending().await.unwrap(), 0);
}

#[tokio::test]
async fn poisoned_entry_dead_letters_after_budget_and_unblocks_queue() {
    let db = fresh_db().await;
    let ops = ShopOps::new(db.clone(), SHOP);
    let remote = Arc::new(MemoryRemote::new());

    let mut config = engine_config();
    config.sync.max_attempts = 3;
    let engine = SyncEngine::new(db.clone(), remote.clone(), config);
    engine.connectivity().set_online(true);

    let poisoned = ops
        .add_customer(NewCustomer { name: "Poisoned".into(), phone: "91".into() })
        .await
        .unwrap();
    let healthy = ops
        .add_customer(NewCustomer { name: "Healthy".into(), phone: "92".into() })
        .await
        .unwrap();

    remote.reject(Collection::Customers, &poisoned.id);

    // Two failing drains: attempts climb, queue stays blocked
    for expected_attempts in 1..=2 {
        let report = engine.sync_now().await.unwrap().unwrap();
        assert_eq!(report.delivered, 0);
        let head = &db.sync_queue().pending().await.unwrap()[0];
        assert_eq!(head.attempts, expected_attempts);
        assert!(head.last_error.is_some());
    }

    // Third failure exhausts the budget: quarantined, queue unblocked
    let report = engine.sync_now().await.unwrap().unwrap();
    assert_eq!(report.dead_lettered, 1);
    assert_eq!(report.delivered, 1);
    assert_eq!(report.remaining, 0);

    let dead = db.sync_queue().dead_letters().await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].doc_id, poisoned.id);
    assert_eq!(dead[0].attempts, 3);

    assert!(db.customers().get_by_id(&healthy.id).await.unwrap().unwrap().synced);

    let status = engine.status().await.unwrap();
    assert_eq!(status.dead_letter_count, 1);
    assert_eq!(status.pending_count, 0);
}

#[tokio::test]
async fn malformed_payload_is_quarantined_not_sent() {
    let (db, ops, remote, engine) = rig().await;
    engine.connectivity().set_online(true);

    // A delete-with-no-payload is fine; a create-with-no-payload can never
    // be delivered. Forge one directly in the log.
    let good = ops
        .add_customer(NewCustomer { name: "Good".into(), phone: "93".into() })
        .await
        .unwrap();

    {
        let mut conn = db.pool().acquire().await.unwrap();
        let mut forged = NewMutation::delete(Collection::Bills, "forged-bill", SHOP);
        forged.action = MutationAction::Create;
        db.sync_queue().enqueue(&mut *conn, &forged).await.unwrap();
    }

    let report = engine.sync_now().await.unwrap().unwrap();

    assert_eq!(report.delivered, 1);
    assert_eq!(report.dead_lettered, 1);
    assert_eq!(report.remaining, 0);
    assert!(remote.raw_doc(Collection::Bills, "forged-bill").is_none());
    assert!(db.customers().get_by_id(&good.id).await.unwrap().unwrap().synced);
}

// =============================================================================
// Idempotence
// =============================================================================

#[tokio::test]
async fn replaying_a_create_entry_does_not_duplicate_the_document() {
    let (db, ops, remote, engine) = rig().await;
    engine.connectivity().set_online(true);

    let bill = ops
        .checkout(vec![cart_item("loose-item", 1, 2500)], PaymentMode::Cash, None)
        .await
        .unwrap();

    // Crash-after-write-before-delete: the same create lands in the log twice
    {
        let mut conn = db.pool().acquire().await.unwrap();
        db.sync_queue()
            .enqueue(
                &mut *conn,
                &NewMutation::create(MutationPayload::Bills(bill.clone())),
            )
            .await
            .unwrap();
    }
    assert_eq!(db.sync_queue().count_pending().await.unwrap(), 2);

    let report = engine.sync_now().await.unwrap().unwrap();
    assert_eq!(report.delivered, 2);

    // Merge on the document id: one bill, not two
    assert_eq!(remote.doc_count(Collection::Bills), 1);
}

// =============================================================================
// Khata invariant
// =============================================================================

#[tokio::test]
async fn khata_balance_equals_signed_ledger_sum_through_sync() {
    let (db, ops, _remote, engine) = rig().await;
    let connectivity = engine.connectivity();

    let customer = ops
        .add_customer(NewCustomer { name: "Meena".into(), phone: "94".into() })
        .await
        .unwrap();

    let assert_invariant = |db: Database, id: String| async move {
        let row = db.customers().get_by_id(&id).await.unwrap().unwrap();
        let sum = db.customers().ledger_sum(&id).await.unwrap();
        assert_eq!(row.khata_balance_paise, sum);
        row.khata_balance_paise
    };

    // Offline: credit checkout + manual ledger entries
    ops.checkout(
        vec![cart_item("loose-item", 3, 4000)],
        PaymentMode::Credit,
        Some(&customer.id),
    )
    .await
    .unwrap();
    assert_eq!(assert_invariant(db.clone(), customer.id.clone()).await, 12_000);

    ops.record_khata_entry(&customer.id, 2_000, KhataEntryType::Debit).await.unwrap();
    assert_eq!(assert_invariant(db.clone(), customer.id.clone()).await, 10_000);

    // Interleave a drain, then keep going
    connectivity.set_online(true);
    engine.sync_now().await.unwrap().unwrap();

    ops.record_khata_entry(&customer.id, 5_000, KhataEntryType::Credit).await.unwrap();
    assert_eq!(assert_invariant(db.clone(), customer.id.clone()).await, 15_000);

    engine.sync_now().await.unwrap().unwrap();
    assert_eq!(assert_invariant(db.clone(), customer.id.clone()).await, 15_000);
    assert_eq!(db.sync_queue().count_pending().await.unwrap(), 0);
}

// =============================================================================
// Multi-device convergence & bulk resync
// =============================================================================

#[tokio::test]
async fn scenario_b_two_offline_devices_converge_to_the_union() {
    let remote = Arc::new(MemoryRemote::new());

    let db_a = fresh_db().await;
    let db_b = fresh_db().await;
    let ops_a = ShopOps::new(db_a.clone(), SHOP);
    let ops_b = ShopOps::new(db_b.clone(), SHOP);
    let engine_a = SyncEngine::new(db_a.clone(), remote.clone(), engine_config());
    let engine_b = SyncEngine::new(db_b.clone(), remote.clone(), engine_config());

    // Each device adds a different product while offline
    let pa = ops_a.create_product(new_product("Tea 250g", 12000, None, 6)).await.unwrap();
    let pb = ops_b.create_product(new_product("Soap", 3500, None, 12)).await.unwrap();

    // Both come online and drain
    engine_a.connectivity().set_online(true);
    engine_b.connectivity().set_online(true);
    engine_a.sync_now().await.unwrap().unwrap();
    engine_b.sync_now().await.unwrap().unwrap();

    // Each performs a bulk resync
    engine_a.resync().await.unwrap();
    engine_b.resync().await.unwrap();

    for db in [&db_a, &db_b] {
        let products = db.products().list_for_shop(SHOP).await.unwrap();
        let ids: Vec<_> = products.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(products.len(), 2);
        assert!(ids.contains(&pa.id.as_str()));
        assert!(ids.contains(&pb.id.as_str()));
        assert!(products.iter().all(|p| p.synced));

        let inventory = db.inventory().list_for_shop(SHOP).await.unwrap();
        assert_eq!(inventory.len(), 2);
    }
}

#[tokio::test]
async fn bulk_resync_into_empty_store_matches_remote_exactly() {
    let remote = Arc::new(MemoryRemote::new());

    // Seed the remote from a throwaway "other device"
    let seed_db = fresh_db().await;
    let seed_ops = ShopOps::new(seed_db.clone(), SHOP);
    let seed_engine = SyncEngine::new(seed_db.clone(), remote.clone(), engine_config());
    seed_engine.connectivity().set_online(true);

    let p = seed_ops.create_product(new_product("Atta 10kg", 45000, Some(41000), 4)).await.unwrap();
    let c = seed_ops
        .add_customer(NewCustomer { name: "Ravi".into(), phone: "95".into() })
        .await
        .unwrap();
    seed_ops
        .checkout(vec![cart_item(&p.id, 1, 45000)], PaymentMode::Credit, Some(&c.id))
        .await
        .unwrap();
    seed_engine.sync_now().await.unwrap().unwrap();

    // Shop registry document (owned by the auth layer)
    let mut shop_doc = kirana_sync::FieldMap::new();
    shop_doc.insert("shopId".to_string(), serde_json::json!(SHOP));
    shop_doc.insert("name".to_string(), serde_json::json!("Sri Ganesh Stores"));
    remote.set_merge(Collection::Shops, SHOP, shop_doc).await.unwrap();

    // A brand-new device with zero prior local data
    let db = fresh_db().await;
    let engine = SyncEngine::new(db.clone(), remote.clone(), engine_config());
    engine.connectivity().set_online(true);

    let report = engine.resync().await.unwrap();
    assert_eq!(report.products, 1);
    assert_eq!(report.inventory, 1);
    assert_eq!(report.customers, 1);
    assert_eq!(report.bills, 1);
    assert!(report.used_settings_fallback);

    // Populated exactly from the remote fetch, all confirmed
    let products = db.products().list_for_shop(SHOP).await.unwrap();
    assert_eq!(products.len(), 1);
    assert_eq!(products[0].id, p.id);
    assert!(products[0].synced);

    let customer = db.customers().get_by_id(&c.id).await.unwrap().unwrap();
    assert_eq!(customer.khata_balance_paise, 45_000);

    let bills = db.bills().list_recent(SHOP, 10).await.unwrap();
    assert_eq!(bills.len(), 1);
    assert_eq!(bills[0].items.len(), 1);

    // Settings came from the shop registry fallback
    let settings = db.settings().get_for_shop(SHOP).await.unwrap().unwrap();
    assert_eq!(settings.store_name, "Sri Ganesh Stores");

    // Running it again replaces rather than accumulates
    engine.resync().await.unwrap();
    assert_eq!(db.products().list_for_shop(SHOP).await.unwrap().len(), 1);
}

#[tokio::test]
async fn resync_failure_leaves_local_state_untouched() {
    let (db, ops, remote, engine) = rig().await;
    engine.connectivity().set_online(true);

    let p = ops.create_product(new_product("Salt", 2000, None, 3)).await.unwrap();
    engine.sync_now().await.unwrap().unwrap();

    // The fetch phase fails before the destructive clear
    remote.set_offline(true);
    assert!(engine.resync().await.is_err());

    assert!(db.products().get_by_id(&p.id).await.unwrap().is_some());
    assert_eq!(db.inventory().list_for_shop(SHOP).await.unwrap().len(), 1);
}

// =============================================================================
// Downward listener
// =============================================================================

#[tokio::test]
async fn listener_applies_remote_product_and_inventory_changes() {
    let (db, _ops, remote, mut engine) = rig().await;
    engine.connectivity().set_online(true);
    engine.start(SHOP).await.unwrap();

    // Another device pushes a product and its stock record
    let other_db = fresh_db().await;
    let other_ops = ShopOps::new(other_db.clone(), SHOP);
    let other_engine = SyncEngine::new(other_db.clone(), remote.clone(), engine_config());
    other_engine.connectivity().set_online(true);

    let p = other_ops.create_product(new_product("Ghee 500g", 32000, None, 7)).await.unwrap();
    other_engine.sync_now().await.unwrap().unwrap();

    // The local store converges without any manual refresh
    let db_poll = db.clone();
    let pid = p.id.clone();
    eventually(move || {
        let db = db_poll.clone();
        let pid = pid.clone();
        async move {
            matches!(db.products().get_by_id(&pid).await, Ok(Some(row)) if row.synced)
                && matches!(db.inventory().get(&pid).await, Ok(Some(inv)) if inv.current_stock == 7)
        }
    })
    .await;

    // Removal resolves inventory by its natural key (productId)
    remote.delete(Collection::Inventory, &p.id).await.unwrap();

    let db_poll = db.clone();
    let pid = p.id.clone();
    eventually(move || {
        let db = db_poll.clone();
        let pid = pid.clone();
        async move { matches!(db.inventory().get(&pid).await, Ok(None)) }
    })
    .await;

    engine.stop().await;
}

#[tokio::test]
async fn listener_stops_applying_after_engine_stop() {
    let (db, _ops, remote, mut engine) = rig().await;
    engine.connectivity().set_online(true);
    engine.start(SHOP).await.unwrap();
    engine.stop().await;

    // Give the shutdown a moment to land, then push a remote change
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut fields = kirana_sync::FieldMap::new();
    fields.insert("id".to_string(), serde_json::json!("ghost"));
    fields.insert("shopId".to_string(), serde_json::json!(SHOP));
    fields.insert("name".to_string(), serde_json::json!("Ghost"));
    fields.insert("pricePaise".to_string(), serde_json::json!(100));
    fields.insert("category".to_string(), serde_json::json!(""));
    fields.insert("unit".to_string(), serde_json::json!("pcs"));
    fields.insert("isLoose".to_string(), serde_json::json!(false));
    remote.set_merge(Collection::Products, "ghost", fields).await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(db.products().get_by_id("ghost").await.unwrap().is_none());
}

// =============================================================================
// Engine lifecycle & background processing
// =============================================================================

#[tokio::test]
async fn engine_lifecycle_guards() {
    let (_db, _ops, _remote, mut engine) = rig().await;

    assert!(engine.start("").await.is_err());

    engine.start(SHOP).await.unwrap();
    assert!(engine.is_running());
    assert!(engine.start(SHOP).await.is_err());

    engine.stop().await;
    assert!(!engine.is_running());
    engine.stop().await; // idempotent
}

#[tokio::test]
async fn background_processor_drains_on_queue_change_and_online_flip() {
    let (db, ops, _remote, mut engine) = rig().await;
    let connectivity = engine.connectivity();
    engine.start(SHOP).await.unwrap();

    // Queued while offline: nothing drains
    ops.add_customer(NewCustomer { name: "A".into(), phone: "96".into() }).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(db.sync_queue().count_pending().await.unwrap(), 1);

    // Online flip triggers the drain
    connectivity.set_online(true);
    let db_poll = db.clone();
    eventually(move || {
        let db = db_poll.clone();
        async move { db.sync_queue().count_pending().await.unwrap() == 0 }
    })
    .await;

    // A new mutation while online drains off the table-change trigger
    ops.add_customer(NewCustomer { name: "B".into(), phone: "97".into() }).await.unwrap();
    let db_poll = db.clone();
    eventually(move || {
        let db = db_poll.clone();
        async move { db.sync_queue().count_pending().await.unwrap() == 0 }
    })
    .await;

    let status = engine.status().await.unwrap();
    assert!(status.online);
    assert_eq!(status.pending_count, 0);
    assert!(status.last_sync.is_some());

    engine.stop().await;
}

// =============================================================================
// Live queries
// =============================================================================

#[tokio::test]
async fn live_query_redelivers_snapshots_on_table_change() {
    let db = fresh_db().await;
    let ops = ShopOps::new(db.clone(), SHOP);

    let mut products_rx = watch_query(&db, vec![Table::Products], move |db| async move {
        db.products().list_for_shop(SHOP).await
    })
    .await
    .unwrap();

    assert!(products_rx.borrow().is_empty());

    ops.create_product(new_product("Biscuits", 1000, None, 30)).await.unwrap();

    tokio::time::timeout(Duration::from_secs(2), products_rx.changed())
        .await
        .expect("live query did not re-run")
        .unwrap();

    let snapshot = products_rx.borrow().clone();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].name, "Biscuits");
}
