//! # Business Operations
//!
//! The UI-triggered transactions of the register: checkout, restock,
//! product CRUD, khata ledger entries, expenses, settings.
//!
//! ## The One Rule
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Every entity mutation that must eventually reach the remote store is  │
//! │  paired, in the SAME SQL transaction, with exactly one mutation-log    │
//! │  entry describing it.                                                  │
//! │                                                                         │
//! │  checkout():                                                           │
//! │    BEGIN                                                               │
//! │      INSERT bill                 + enqueue(create bills/<id>)          │
//! │      UPDATE inventory (per item) + enqueue(update inventory/<pid>)     │
//! │      [credit] INSERT khata entry + enqueue(create khata_tx/<id>)       │
//! │      [credit] UPDATE customer    + enqueue(update customers/<id>)      │
//! │    COMMIT                                                              │
//! │    notify change bus  ← only after commit                              │
//! │                                                                         │
//! │  If ANY step fails the whole transaction rolls back: no bill without   │
//! │  its stock decrement, no stock decrement without its log entry.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Operations fail synchronously (`DbError`) to the calling screen;
//! delivering the queued mutations is the sync engine's background concern.

use chrono::Utc;
use tracing::{info, warn};

use crate::error::{DbError, DbResult};
use crate::pool::Database;
use crate::watch::Table;
use kirana_core::validation::{
    validate_amount, validate_cart, validate_name, validate_price, validate_restock_qty,
};
use kirana_core::{
    new_doc_id, Bill, BillItem, BillStatus, Collection, Customer, Expense, Inventory,
    KhataEntryType, KhataTransaction, MutationPayload, NewMutation, PaymentMode, Product,
    StoreSettings,
};

// =============================================================================
// New-entity inputs
// =============================================================================

/// Input for creating a product (with its stock record).
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub barcode: Option<String>,
    pub price_paise: i64,
    pub cost_price_paise: Option<i64>,
    pub category: String,
    pub unit: String,
    pub is_loose: bool,
    pub initial_stock: i64,
    pub low_stock_threshold: i64,
}

/// Input for creating a customer.
#[derive(Debug, Clone)]
pub struct NewCustomer {
    pub name: String,
    pub phone: String,
}

/// Input for recording an expense.
#[derive(Debug, Clone)]
pub struct NewExpense {
    pub title: String,
    pub amount_paise: i64,
    pub category: String,
}

// =============================================================================
// Shop Operations
// =============================================================================

/// Business operations for one shop.
///
/// Holds the shop id so every operation is tenant-scoped by construction.
/// Cheap to clone; clones share the underlying pool and change bus.
#[derive(Debug, Clone)]
pub struct ShopOps {
    db: Database,
    shop_id: String,
}

impl ShopOps {
    /// Creates the operations facade for a shop.
    pub fn new(db: Database, shop_id: impl Into<String>) -> Self {
        ShopOps {
            db,
            shop_id: shop_id.into(),
        }
    }

    /// The shop this facade operates on.
    pub fn shop_id(&self) -> &str {
        &self.shop_id
    }

    /// The underlying database handle.
    pub fn db(&self) -> &Database {
        &self.db
    }

    // =========================================================================
    // Checkout
    // =========================================================================

    /// Completes a sale: creates the bill, decrements stock per item, and -
    /// for credit payment - records the khata entry and balance bump. One
    /// transaction, one mutation-log entry per entity write.
    ///
    /// Profit is computed here, from the CURRENT cost price of each product,
    /// because the bill only snapshots selling prices. Items whose product
    /// no longer exists or has no cost price contribute no profit.
    pub async fn checkout(
        &self,
        cart: Vec<BillItem>,
        payment_mode: PaymentMode,
        customer_id: Option<&str>,
    ) -> DbResult<Bill> {
        validate_cart(&cart, payment_mode, customer_id.is_some())?;

        let now = Utc::now();
        let total_paise: i64 = cart.iter().map(|i| i.total_paise).sum();

        let mut tx = self.db.pool().begin().await?;

        // Customer snapshot fields, resolved before anything is written
        let customer = match customer_id {
            Some(id) => Some(
                self.db
                    .customers()
                    .get_tx(&mut *tx, id)
                    .await?
                    .ok_or_else(|| DbError::not_found("Customer", id))?,
            ),
            None => None,
        };

        // Profit from current cost prices
        let mut profit_paise: Option<i64> = None;
        for item in &cart {
            if let Some(product) = self.db.products().get_tx(&mut *tx, &item.product_id).await? {
                if let Some(cost) = product.cost_price_paise {
                    let line_profit = (item.price_paise - cost) * item.qty;
                    profit_paise = Some(profit_paise.unwrap_or(0) + line_profit);
                }
            }
        }

        let bill = Bill {
            id: new_doc_id(),
            shop_id: self.shop_id.clone(),
            items: cart.clone(),
            total_paise,
            payment_mode,
            customer_id: customer.as_ref().map(|c| c.id.clone()),
            customer_name: customer.as_ref().map(|c| c.name.clone()),
            customer_phone: customer.as_ref().map(|c| c.phone.clone()),
            profit_paise,
            created_at: now,
            status: BillStatus::Completed,
            synced: false,
        };

        self.db.bills().insert(&mut *tx, &bill).await?;
        self.db
            .sync_queue()
            .enqueue(
                &mut *tx,
                &NewMutation::create(MutationPayload::Bills(bill.clone())),
            )
            .await?;

        // Decrement stock per line item. A product without a stock record
        // is sellable (loose items created before inventory tracking).
        let mut touched_inventory = false;
        for item in &cart {
            match self
                .db
                .inventory()
                .adjust_stock(&mut *tx, &item.product_id, -item.qty, now)
                .await
            {
                Ok(inv) => {
                    touched_inventory = true;
                    self.db
                        .sync_queue()
                        .enqueue(&mut *tx, &NewMutation::update(MutationPayload::Inventory(inv)))
                        .await?;
                }
                Err(DbError::NotFound { .. }) => {
                    warn!(product_id = %item.product_id, "No stock record for sold item");
                }
                Err(e) => return Err(e),
            }
        }

        // Credit sale: ledger entry + balance bump, same transaction
        let mut touched_khata = false;
        if payment_mode == PaymentMode::Credit {
            if let Some(customer) = customer {
                let khata = KhataTransaction {
                    id: new_doc_id(),
                    shop_id: self.shop_id.clone(),
                    customer_id: customer.id.clone(),
                    amount_paise: total_paise,
                    entry_type: KhataEntryType::Credit,
                    reference_bill_id: Some(bill.id.clone()),
                    date: now,
                    synced: false,
                };

                self.db.customers().insert_khata(&mut *tx, &khata).await?;
                self.db
                    .customers()
                    .apply_khata(&mut *tx, &customer.id, total_paise, now)
                    .await?;

                let updated = Customer {
                    khata_balance_paise: customer.khata_balance_paise + total_paise,
                    last_visit: now,
                    synced: false,
                    ..customer
                };

                self.db
                    .sync_queue()
                    .enqueue(
                        &mut *tx,
                        &NewMutation::create(MutationPayload::KhataTransactions(khata)),
                    )
                    .await?;
                self.db
                    .sync_queue()
                    .enqueue(
                        &mut *tx,
                        &NewMutation::update(MutationPayload::Customers(updated)),
                    )
                    .await?;

                touched_khata = true;
            }
        }

        tx.commit().await?;

        let mut tables = vec![Table::Bills, Table::SyncQueue];
        if touched_inventory {
            tables.push(Table::Inventory);
        }
        if touched_khata {
            tables.push(Table::Customers);
            tables.push(Table::KhataTransactions);
        }
        self.db.changes().notify_many(&tables);

        info!(
            bill_id = %bill.id,
            total = %bill.total(),
            items = bill.items.len(),
            mode = ?payment_mode,
            "Checkout complete"
        );

        Ok(bill)
    }

    // =========================================================================
    // Inventory
    // =========================================================================

    /// Adds stock for a product (restock delivery).
    pub async fn restock(&self, product_id: &str, qty: i64) -> DbResult<Inventory> {
        validate_restock_qty(qty)?;

        let now = Utc::now();
        let mut tx = self.db.pool().begin().await?;

        let inv = self
            .db
            .inventory()
            .adjust_stock(&mut *tx, product_id, qty, now)
            .await?;

        self.db
            .sync_queue()
            .enqueue(
                &mut *tx,
                &NewMutation::update(MutationPayload::Inventory(inv.clone())),
            )
            .await?;

        tx.commit().await?;
        self.db
            .changes()
            .notify_many(&[Table::Inventory, Table::SyncQueue]);

        Ok(inv)
    }

    // =========================================================================
    // Products
    // =========================================================================

    /// Creates a product together with its stock record.
    ///
    /// Inventory is never created without its product, so the two inserts
    /// (and their two log entries) always travel in one transaction.
    pub async fn create_product(&self, new: NewProduct) -> DbResult<Product> {
        validate_name(&new.name)?;
        validate_price(new.price_paise)?;

        let now = Utc::now();
        let product = Product {
            id: new_doc_id(),
            shop_id: self.shop_id.clone(),
            name: new.name,
            barcode: new.barcode,
            price_paise: new.price_paise,
            cost_price_paise: new.cost_price_paise,
            category: new.category,
            unit: new.unit,
            is_loose: new.is_loose,
            synced: false,
        };
        let inventory = Inventory {
            product_id: product.id.clone(),
            shop_id: self.shop_id.clone(),
            current_stock: new.initial_stock,
            low_stock_threshold: new.low_stock_threshold,
            last_updated: now,
            synced: false,
        };

        let mut tx = self.db.pool().begin().await?;

        self.db.products().insert(&mut *tx, &product).await?;
        self.db.inventory().insert(&mut *tx, &inventory).await?;
        self.db
            .sync_queue()
            .enqueue(
                &mut *tx,
                &NewMutation::create(MutationPayload::Products(product.clone())),
            )
            .await?;
        self.db
            .sync_queue()
            .enqueue(
                &mut *tx,
                &NewMutation::create(MutationPayload::Inventory(inventory)),
            )
            .await?;

        tx.commit().await?;
        self.db
            .changes()
            .notify_many(&[Table::Products, Table::Inventory, Table::SyncQueue]);

        info!(id = %product.id, name = %product.name, "Product created");

        Ok(product)
    }

    /// Updates a product's catalog fields.
    pub async fn update_product(&self, mut product: Product) -> DbResult<Product> {
        validate_name(&product.name)?;
        validate_price(product.price_paise)?;

        product.synced = false;

        let mut tx = self.db.pool().begin().await?;

        self.db.products().update(&mut *tx, &product).await?;
        self.db
            .sync_queue()
            .enqueue(
                &mut *tx,
                &NewMutation::update(MutationPayload::Products(product.clone())),
            )
            .await?;

        tx.commit().await?;
        self.db
            .changes()
            .notify_many(&[Table::Products, Table::SyncQueue]);

        Ok(product)
    }

    /// Deletes a product and its stock record.
    pub async fn delete_product(&self, product_id: &str) -> DbResult<()> {
        let mut tx = self.db.pool().begin().await?;

        self.db.products().delete(&mut *tx, product_id).await?;
        self.db.inventory().delete(&mut *tx, product_id).await?;
        self.db
            .sync_queue()
            .enqueue(
                &mut *tx,
                &NewMutation::delete(Collection::Products, product_id, &self.shop_id),
            )
            .await?;
        self.db
            .sync_queue()
            .enqueue(
                &mut *tx,
                &NewMutation::delete(Collection::Inventory, product_id, &self.shop_id),
            )
            .await?;

        tx.commit().await?;
        self.db
            .changes()
            .notify_many(&[Table::Products, Table::Inventory, Table::SyncQueue]);

        Ok(())
    }

    // =========================================================================
    // Customers & Khata
    // =========================================================================

    /// Adds a customer.
    pub async fn add_customer(&self, new: NewCustomer) -> DbResult<Customer> {
        validate_name(&new.name)?;

        let customer = Customer {
            id: new_doc_id(),
            shop_id: self.shop_id.clone(),
            name: new.name,
            phone: new.phone,
            khata_balance_paise: 0,
            last_visit: Utc::now(),
            synced: false,
        };

        let mut tx = self.db.pool().begin().await?;

        self.db.customers().insert(&mut *tx, &customer).await?;
        self.db
            .sync_queue()
            .enqueue(
                &mut *tx,
                &NewMutation::create(MutationPayload::Customers(customer.clone())),
            )
            .await?;

        tx.commit().await?;
        self.db
            .changes()
            .notify_many(&[Table::Customers, Table::SyncQueue]);

        Ok(customer)
    }

    /// Records a khata ledger entry and moves the customer balance with it.
    ///
    /// Credit raises the balance (customer owes more), debit lowers it
    /// (customer paid down). Ledger append and balance update share one
    /// transaction - the khata invariant depends on it.
    pub async fn record_khata_entry(
        &self,
        customer_id: &str,
        amount_paise: i64,
        entry_type: KhataEntryType,
    ) -> DbResult<KhataTransaction> {
        validate_amount(amount_paise)?;

        let now = Utc::now();
        let mut tx = self.db.pool().begin().await?;

        let customer = self
            .db
            .customers()
            .get_tx(&mut *tx, customer_id)
            .await?
            .ok_or_else(|| DbError::not_found("Customer", customer_id))?;

        let khata = KhataTransaction {
            id: new_doc_id(),
            shop_id: self.shop_id.clone(),
            customer_id: customer_id.to_string(),
            amount_paise,
            entry_type,
            reference_bill_id: None,
            date: now,
            synced: false,
        };

        let signed = khata.signed_amount().paise();

        self.db.customers().insert_khata(&mut *tx, &khata).await?;
        self.db
            .customers()
            .apply_khata(&mut *tx, customer_id, signed, now)
            .await?;

        let updated = Customer {
            khata_balance_paise: customer.khata_balance_paise + signed,
            last_visit: now,
            synced: false,
            ..customer
        };

        self.db
            .sync_queue()
            .enqueue(
                &mut *tx,
                &NewMutation::create(MutationPayload::KhataTransactions(khata.clone())),
            )
            .await?;
        self.db
            .sync_queue()
            .enqueue(
                &mut *tx,
                &NewMutation::update(MutationPayload::Customers(updated)),
            )
            .await?;

        tx.commit().await?;
        self.db.changes().notify_many(&[
            Table::Customers,
            Table::KhataTransactions,
            Table::SyncQueue,
        ]);

        Ok(khata)
    }

    // =========================================================================
    // Expenses & Settings
    // =========================================================================

    /// Records an expense.
    pub async fn record_expense(&self, new: NewExpense) -> DbResult<Expense> {
        validate_amount(new.amount_paise)?;

        let expense = Expense {
            id: new_doc_id(),
            shop_id: self.shop_id.clone(),
            title: new.title,
            amount_paise: new.amount_paise,
            category: new.category,
            date: Utc::now(),
            synced: false,
        };

        let mut tx = self.db.pool().begin().await?;

        self.db.expenses().insert(&mut *tx, &expense).await?;
        self.db
            .sync_queue()
            .enqueue(
                &mut *tx,
                &NewMutation::create(MutationPayload::Expenses(expense.clone())),
            )
            .await?;

        tx.commit().await?;
        self.db
            .changes()
            .notify_many(&[Table::Expenses, Table::SyncQueue]);

        Ok(expense)
    }

    /// Saves the shop settings singleton.
    pub async fn save_settings(&self, mut settings: StoreSettings) -> DbResult<StoreSettings> {
        // Singleton discipline: the document id IS the shop id
        settings.id = self.shop_id.clone();
        settings.shop_id = self.shop_id.clone();
        settings.synced = false;

        let mut tx = self.db.pool().begin().await?;

        self.db.settings().upsert(&mut *tx, &settings).await?;
        self.db
            .sync_queue()
            .enqueue(
                &mut *tx,
                &NewMutation::update(MutationPayload::StoreSettings(settings.clone())),
            )
            .await?;

        tx.commit().await?;
        self.db
            .changes()
            .notify_many(&[Table::StoreSettings, Table::SyncQueue]);

        Ok(settings)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DbConfig;

    async fn test_ops() -> ShopOps {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        ShopOps::new(db, "shop-1")
    }

    fn item(product_id: &str, qty: i64, price: i64) -> BillItem {
        BillItem {
            product_id: product_id.to_string(),
            name: "Test Item".to_string(),
            qty,
            price_paise: price,
            total_paise: qty * price,
        }
    }

    #[tokio::test]
    async fn test_create_product_pairs_two_log_entries() {
        let ops = test_ops().await;

        let product = ops
            .create_product(NewProduct {
                name: "Toor Dal 1kg".to_string(),
                barcode: None,
                price_paise: 14500,
                cost_price_paise: Some(12000),
                category: "Grocery".to_string(),
                unit: "pcs".to_string(),
                is_loose: false,
                initial_stock: 20,
                low_stock_threshold: 5,
            })
            .await
            .unwrap();

        let pending = ops.db().sync_queue().pending().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].collection, Collection::Products);
        assert_eq!(pending[1].collection, Collection::Inventory);
        assert_eq!(pending[0].doc_id, product.id);
        assert_eq!(pending[1].doc_id, product.id);
    }

    #[tokio::test]
    async fn test_checkout_decrements_stock_and_queues_in_order() {
        let ops = test_ops().await;

        let p1 = ops
            .create_product(NewProduct {
                name: "Rice 5kg".to_string(),
                barcode: None,
                price_paise: 5000,
                cost_price_paise: Some(4000),
                category: "Grocery".to_string(),
                unit: "pcs".to_string(),
                is_loose: false,
                initial_stock: 10,
                low_stock_threshold: 2,
            })
            .await
            .unwrap();
        let p2 = ops
            .create_product(NewProduct {
                name: "Sugar 1kg".to_string(),
                barcode: None,
                price_paise: 5000,
                cost_price_paise: None,
                category: "Grocery".to_string(),
                unit: "pcs".to_string(),
                is_loose: false,
                initial_stock: 8,
                low_stock_threshold: 2,
            })
            .await
            .unwrap();

        let bill = ops
            .checkout(
                vec![item(&p1.id, 2, 5000), item(&p2.id, 1, 5000)],
                PaymentMode::Cash,
                None,
            )
            .await
            .unwrap();

        assert_eq!(bill.total_paise, 15000);
        assert!(!bill.synced);
        // Only p1 has a cost price: profit = 2 × (5000 − 4000)
        assert_eq!(bill.profit_paise, Some(2000));

        let inv1 = ops.db().inventory().get(&p1.id).await.unwrap().unwrap();
        let inv2 = ops.db().inventory().get(&p2.id).await.unwrap().unwrap();
        assert_eq!(inv1.current_stock, 8);
        assert_eq!(inv2.current_stock, 7);
        assert!(!inv1.synced);

        // 4 product-creation entries + bill + 2 inventory updates, in order
        let pending = ops.db().sync_queue().pending().await.unwrap();
        assert_eq!(pending.len(), 7);
        assert_eq!(pending[4].collection, Collection::Bills);
        assert_eq!(pending[5].collection, Collection::Inventory);
        assert_eq!(pending[6].collection, Collection::Inventory);
    }

    #[tokio::test]
    async fn test_credit_checkout_updates_khata() {
        let ops = test_ops().await;

        let customer = ops
            .add_customer(NewCustomer {
                name: "Ravi".to_string(),
                phone: "9876543210".to_string(),
            })
            .await
            .unwrap();

        ops.checkout(
            vec![item("prod-x", 3, 5000)],
            PaymentMode::Credit,
            Some(&customer.id),
        )
        .await
        .unwrap();

        let after = ops
            .db()
            .customers()
            .get_by_id(&customer.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.khata_balance_paise, 15000);
        assert!(!after.synced);

        // Running balance equals recomputed ledger sum
        let sum = ops.db().customers().ledger_sum(&customer.id).await.unwrap();
        assert_eq!(after.khata_balance_paise, sum);
    }

    #[tokio::test]
    async fn test_khata_entry_keeps_invariant() {
        let ops = test_ops().await;

        let customer = ops
            .add_customer(NewCustomer {
                name: "Meena".to_string(),
                phone: "9000000000".to_string(),
            })
            .await
            .unwrap();

        ops.record_khata_entry(&customer.id, 20000, KhataEntryType::Credit)
            .await
            .unwrap();
        ops.record_khata_entry(&customer.id, 5000, KhataEntryType::Debit)
            .await
            .unwrap();

        let after = ops
            .db()
            .customers()
            .get_by_id(&customer.id)
            .await
            .unwrap()
            .unwrap();
        let sum = ops.db().customers().ledger_sum(&customer.id).await.unwrap();

        assert_eq!(after.khata_balance_paise, 15000);
        assert_eq!(after.khata_balance_paise, sum);
    }

    #[tokio::test]
    async fn test_invalid_cart_writes_nothing() {
        let ops = test_ops().await;

        let result = ops.checkout(vec![], PaymentMode::Cash, None).await;
        assert!(result.is_err());

        assert_eq!(ops.db().sync_queue().count_pending().await.unwrap(), 0);
        assert!(ops
            .db()
            .bills()
            .list_recent("shop-1", 10)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_unknown_customer_rolls_back_checkout() {
        let ops = test_ops().await;

        let result = ops
            .checkout(
                vec![item("prod-x", 1, 1000)],
                PaymentMode::Credit,
                Some("no-such-customer"),
            )
            .await;

        assert!(matches!(result, Err(DbError::NotFound { .. })));
        assert_eq!(ops.db().sync_queue().count_pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_product_removes_stock_and_queues_deletes() {
        let ops = test_ops().await;

        let p = ops
            .create_product(NewProduct {
                name: "Old Soap".to_string(),
                barcode: None,
                price_paise: 3000,
                cost_price_paise: None,
                category: "Bath".to_string(),
                unit: "pcs".to_string(),
                is_loose: false,
                initial_stock: 1,
                low_stock_threshold: 0,
            })
            .await
            .unwrap();

        ops.delete_product(&p.id).await.unwrap();

        assert!(ops.db().products().get_by_id(&p.id).await.unwrap().is_none());
        assert!(ops.db().inventory().get(&p.id).await.unwrap().is_none());

        let pending = ops.db().sync_queue().pending().await.unwrap();
        let deletes: Vec<_> = pending
            .iter()
            .filter(|e| e.action == kirana_core::MutationAction::Delete)
            .collect();
        assert_eq!(deletes.len(), 2);
        assert!(deletes.iter().all(|e| e.payload.is_none()));
    }
}
