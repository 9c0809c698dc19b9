//! # Domain Types
//!
//! Core domain types used throughout Kirana POS.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │      Bill       │   │    Customer     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  id (UUID)      │       │
//! │  │  barcode        │   │  items[] (snap) │   │  phone          │       │
//! │  │  price_paise    │   │  total_paise    │   │  khata_balance  │       │
//! │  └────────┬────────┘   └─────────────────┘   └────────┬────────┘       │
//! │           │ 1:1                                       │ 1:N            │
//! │  ┌────────┴────────┐                         ┌────────┴────────┐       │
//! │  │   Inventory     │                         │ KhataTransaction│       │
//! │  │  (by product_id)│                         │  (append-only)  │       │
//! │  └─────────────────┘                         └─────────────────┘       │
//! │                                                                         │
//! │  Every entity carries shop_id (tenant partition key) and a local-only  │
//! │  synced flag (false = not yet confirmed at the remote store).          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Format
//! Entities serialize with camelCase field names to match the remote
//! document store. The `synced` flag is serde-skipped: it never leaves the
//! device, and documents fetched from the remote deserialize with
//! `synced = false` until the store layer tags them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;
use crate::money::Money;

/// Generates a new document id (UUID v4).
///
/// UUIDs are generated device-side so offline registers never need to
/// coordinate on id allocation.
pub fn new_doc_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Product
// =============================================================================

/// A product available for sale.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Shop this product belongs to (tenant partition key).
    pub shop_id: String,

    /// Display name shown on the register and on receipts.
    pub name: String,

    /// Barcode (EAN-13, UPC-A, etc.), if the item carries one.
    pub barcode: Option<String>,

    /// Selling price in paise.
    pub price_paise: i64,

    /// Cost price in paise (for profit calculation at checkout).
    pub cost_price_paise: Option<i64>,

    /// Category label (e.g. "Grocery", "Dairy").
    pub category: String,

    /// Unit of sale: "kg", "g", "pcs", "l".
    pub unit: String,

    /// Loose items are weighed at the counter rather than sold per piece.
    pub is_loose: bool,

    /// Local-only: confirmed written to the remote store.
    #[serde(skip)]
    pub synced: bool,
}

impl Product {
    /// Returns the selling price as Money.
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_paise(self.price_paise)
    }

    /// Returns the cost price as Money, if known.
    #[inline]
    pub fn cost_price(&self) -> Option<Money> {
        self.cost_price_paise.map(Money::from_paise)
    }

    /// Per-unit margin, if the cost price is known.
    pub fn margin(&self) -> Option<Money> {
        self.cost_price().map(|cost| self.price() - cost)
    }
}

// =============================================================================
// Inventory
// =============================================================================

/// Stock record for a product.
///
/// Keyed by `product_id` (1:1 with Product), not by its own id - this is the
/// natural key used both locally and at the remote store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct Inventory {
    /// The product this stock record belongs to (natural key).
    pub product_id: String,

    /// Shop this record belongs to.
    pub shop_id: String,

    /// Current stock level. May go negative under concurrent sales.
    pub current_stock: i64,

    /// Threshold below which the UI shows a low-stock warning.
    pub low_stock_threshold: i64,

    /// When the stock level last changed.
    pub last_updated: DateTime<Utc>,

    /// Local-only: confirmed written to the remote store.
    #[serde(skip)]
    pub synced: bool,
}

impl Inventory {
    /// True when stock has fallen to or below the low-stock threshold.
    #[inline]
    pub fn is_low(&self) -> bool {
        self.current_stock <= self.low_stock_threshold
    }
}

// =============================================================================
// Bill
// =============================================================================

/// Payment mode for a bill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum PaymentMode {
    /// Physical cash payment.
    Cash,
    /// UPI transfer (QR code at the counter).
    Upi,
    /// On khata - amount added to the customer's running ledger.
    Credit,
    /// Split across multiple modes.
    Split,
}

/// The status of a bill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum BillStatus {
    /// Paid and finalized.
    Completed,
    /// Parked at the counter, to be resumed.
    Hold,
}

/// A line item in a bill.
///
/// Uses the snapshot pattern: name and price are frozen copies of the
/// product at checkout time, so the bill history survives later edits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillItem {
    /// The product sold.
    pub product_id: String,

    /// Product name at time of sale (frozen).
    pub name: String,

    /// Quantity sold.
    pub qty: i64,

    /// Unit price in paise at time of sale (frozen).
    pub price_paise: i64,

    /// Line total (qty × price) in paise.
    pub total_paise: i64,
}

impl BillItem {
    /// Returns the line total as Money.
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_paise(self.total_paise)
    }
}

/// A completed (or held) bill.
///
/// Immutable once created, except for the local `synced` flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bill {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Shop this bill belongs to.
    pub shop_id: String,

    /// Line items, snapshotted at checkout.
    pub items: Vec<BillItem>,

    /// Grand total in paise.
    pub total_paise: i64,

    /// How the customer paid.
    pub payment_mode: PaymentMode,

    /// Customer document id, when the sale was attributed to a customer.
    pub customer_id: Option<String>,

    /// Customer name snapshot at time of bill.
    pub customer_name: Option<String>,

    /// Customer phone snapshot at time of bill.
    pub customer_phone: Option<String>,

    /// Profit in paise, computed at checkout from current product costs.
    /// None when no line item had a known cost price.
    pub profit_paise: Option<i64>,

    /// When the bill was created.
    pub created_at: DateTime<Utc>,

    /// Completed or held.
    pub status: BillStatus,

    /// Local-only: confirmed written to the remote store.
    #[serde(skip)]
    pub synced: bool,
}

impl Bill {
    /// Returns the grand total as Money.
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_paise(self.total_paise)
    }
}

// =============================================================================
// Customer & Khata
// =============================================================================

/// A customer with a running khata (credit ledger) balance.
///
/// `khata_balance_paise` is a derived running total: positive = due (the
/// customer owes the shop), negative = advance. It is mutated only inside
/// the same transaction that appends a [`KhataTransaction`], so the balance
/// always equals the signed sum of the customer's ledger entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: String,
    pub shop_id: String,
    pub name: String,
    pub phone: String,

    /// Running ledger total in paise (credits − debits).
    pub khata_balance_paise: i64,

    /// Last time this customer transacted with the shop.
    pub last_visit: DateTime<Utc>,

    /// Local-only: confirmed written to the remote store.
    #[serde(skip)]
    pub synced: bool,
}

impl Customer {
    /// Returns the khata balance as Money (positive = due).
    #[inline]
    pub fn khata_balance(&self) -> Money {
        Money::from_paise(self.khata_balance_paise)
    }
}

/// Direction of a khata ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum KhataEntryType {
    /// Customer took goods on credit - balance goes up (due).
    Credit,
    /// Customer paid down the ledger - balance goes down.
    Debit,
}

/// An append-only khata ledger entry.
///
/// The audit trail whose signed sum must always equal the owning customer's
/// `khata_balance_paise` (credits positive, debits negative).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct KhataTransaction {
    pub id: String,
    pub shop_id: String,
    pub customer_id: String,

    /// Entry amount in paise (always positive; direction is `entry_type`).
    pub amount_paise: i64,

    /// Credit (due up) or debit (paid down).
    pub entry_type: KhataEntryType,

    /// The bill this entry was created from, when it came from a checkout.
    pub reference_bill_id: Option<String>,

    /// When the entry was recorded.
    pub date: DateTime<Utc>,

    /// Local-only: confirmed written to the remote store.
    #[serde(skip)]
    pub synced: bool,
}

impl KhataTransaction {
    /// Signed amount: credits positive, debits negative.
    #[inline]
    pub fn signed_amount(&self) -> Money {
        match self.entry_type {
            KhataEntryType::Credit => Money::from_paise(self.amount_paise),
            KhataEntryType::Debit => Money::from_paise(-self.amount_paise),
        }
    }
}

// =============================================================================
// Expense
// =============================================================================

/// A shop expense (rent, electricity, restock purchases, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub id: String,
    pub shop_id: String,
    pub title: String,
    pub amount_paise: i64,
    pub category: String,
    pub date: DateTime<Utc>,

    /// Local-only: confirmed written to the remote store.
    #[serde(skip)]
    pub synced: bool,
}

// =============================================================================
// Store Settings
// =============================================================================

/// Per-shop settings singleton (receipt header, printing, GST).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct StoreSettings {
    /// Document id. Equals the shop id - one settings document per shop.
    pub id: String,
    pub shop_id: String,
    pub store_name: String,
    pub address: Option<String>,
    pub phone: Option<String>,

    /// UPI id printed as a QR target on receipts.
    pub upi_id: Option<String>,

    /// Paired Bluetooth thermal printer, if any.
    pub printer_name: Option<String>,

    /// Print a receipt automatically after checkout.
    pub auto_print: bool,

    /// Include the shop logo on printed receipts.
    pub print_logo: bool,

    pub gst_enabled: bool,
    pub gst_number: Option<String>,

    /// Default GST rate in basis points (500 = 5%).
    pub gst_rate_bps: Option<i64>,

    /// Whether listed prices already include tax.
    pub tax_inclusive: bool,

    /// Local-only: confirmed written to the remote store.
    #[serde(skip)]
    pub synced: bool,
}

impl StoreSettings {
    /// Minimal defaults for a shop that has no settings document yet.
    ///
    /// Used by bulk resync when the remote has no settings for this shop:
    /// the shop registry name becomes the store name and everything else
    /// takes its default.
    pub fn defaults(shop_id: &str, store_name: &str) -> Self {
        StoreSettings {
            id: shop_id.to_string(),
            shop_id: shop_id.to_string(),
            store_name: store_name.to_string(),
            address: None,
            phone: None,
            upi_id: None,
            printer_name: None,
            auto_print: false,
            print_logo: false,
            gst_enabled: false,
            gst_number: None,
            gst_rate_bps: None,
            tax_inclusive: true,
            synced: false,
        }
    }
}

// =============================================================================
// Collections
// =============================================================================

/// The remote document-store collections the sync engine touches.
///
/// `Shops` is the registry collection owned by the auth/session layer; the
/// engine only reads it (settings fallback during bulk resync).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Products,
    Inventory,
    Bills,
    Customers,
    KhataTransactions,
    Expenses,
    StoreSettings,
    Shops,
}

impl Collection {
    /// The collection name as stored in the mutation log and on the wire.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Collection::Products => "products",
            Collection::Inventory => "inventory",
            Collection::Bills => "bills",
            Collection::Customers => "customers",
            Collection::KhataTransactions => "khata_transactions",
            Collection::Expenses => "expenses",
            Collection::StoreSettings => "store_settings",
            Collection::Shops => "shops",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Collection {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "products" => Ok(Collection::Products),
            "inventory" => Ok(Collection::Inventory),
            "bills" => Ok(Collection::Bills),
            "customers" => Ok(Collection::Customers),
            "khata_transactions" => Ok(Collection::KhataTransactions),
            "expenses" => Ok(Collection::Expenses),
            "store_settings" => Ok(Collection::StoreSettings),
            "shops" => Ok(Collection::Shops),
            other => Err(CoreError::UnknownCollection(other.to_string())),
        }
    }
}

// =============================================================================
// Mutation Log
// =============================================================================

/// What a mutation-log entry does at the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationAction {
    /// Merge-write a new document.
    Create,
    /// Merge-write changed fields into an existing document.
    Update,
    /// Delete the document.
    Delete,
}

impl MutationAction {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MutationAction::Create => "create",
            MutationAction::Update => "update",
            MutationAction::Delete => "delete",
        }
    }
}

impl std::str::FromStr for MutationAction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(MutationAction::Create),
            "update" => Ok(MutationAction::Update),
            "delete" => Ok(MutationAction::Delete),
            other => Err(CoreError::UnknownAction(other.to_string())),
        }
    }
}

/// The payload of a mutation-log entry: a full snapshot of one entity,
/// tagged by its collection.
///
/// Replaces an untyped JSON blob so the upward sync processor can check the
/// payload shape against the entry's collection before transmission - a
/// malformed entry is quarantined instead of being forwarded opaquely.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "collection", content = "doc", rename_all = "snake_case")]
pub enum MutationPayload {
    Products(Product),
    Inventory(Inventory),
    Bills(Bill),
    Customers(Customer),
    KhataTransactions(KhataTransaction),
    Expenses(Expense),
    StoreSettings(StoreSettings),
}

impl MutationPayload {
    /// The collection this payload belongs to.
    pub const fn collection(&self) -> Collection {
        match self {
            MutationPayload::Products(_) => Collection::Products,
            MutationPayload::Inventory(_) => Collection::Inventory,
            MutationPayload::Bills(_) => Collection::Bills,
            MutationPayload::Customers(_) => Collection::Customers,
            MutationPayload::KhataTransactions(_) => Collection::KhataTransactions,
            MutationPayload::Expenses(_) => Collection::Expenses,
            MutationPayload::StoreSettings(_) => Collection::StoreSettings,
        }
    }

    /// The remote document id for this payload.
    ///
    /// Inventory documents are keyed by `product_id` - the natural key used
    /// across devices - not by a separate document id.
    pub fn doc_id(&self) -> &str {
        match self {
            MutationPayload::Products(p) => &p.id,
            MutationPayload::Inventory(i) => &i.product_id,
            MutationPayload::Bills(b) => &b.id,
            MutationPayload::Customers(c) => &c.id,
            MutationPayload::KhataTransactions(t) => &t.id,
            MutationPayload::Expenses(e) => &e.id,
            MutationPayload::StoreSettings(s) => &s.id,
        }
    }

    /// The owning shop id.
    pub fn shop_id(&self) -> &str {
        match self {
            MutationPayload::Products(p) => &p.shop_id,
            MutationPayload::Inventory(i) => &i.shop_id,
            MutationPayload::Bills(b) => &b.shop_id,
            MutationPayload::Customers(c) => &c.shop_id,
            MutationPayload::KhataTransactions(t) => &t.shop_id,
            MutationPayload::Expenses(e) => &e.shop_id,
            MutationPayload::StoreSettings(s) => &s.shop_id,
        }
    }

    /// Serializes the inner entity to the field map sent to the remote
    /// store. The `synced` flag is serde-skipped on every entity, so it can
    /// never leak into a remote payload.
    pub fn remote_fields(&self) -> Result<serde_json::Map<String, serde_json::Value>, CoreError> {
        let value = match self {
            MutationPayload::Products(p) => serde_json::to_value(p),
            MutationPayload::Inventory(i) => serde_json::to_value(i),
            MutationPayload::Bills(b) => serde_json::to_value(b),
            MutationPayload::Customers(c) => serde_json::to_value(c),
            MutationPayload::KhataTransactions(t) => serde_json::to_value(t),
            MutationPayload::Expenses(e) => serde_json::to_value(e),
            MutationPayload::StoreSettings(s) => serde_json::to_value(s),
        }
        .map_err(|e| CoreError::PayloadEncoding(e.to_string()))?;

        match value {
            serde_json::Value::Object(map) => Ok(map),
            _ => Err(CoreError::PayloadEncoding(
                "entity did not serialize to an object".to_string(),
            )),
        }
    }
}

/// A mutation waiting in the outbox, as read back from the log table.
///
/// Lifecycle: created in the same local transaction as the business
/// mutation; consumed and deleted by the upward sync processor on confirmed
/// remote success. Only the failure bookkeeping fields (`attempts`,
/// `last_error`) ever change after creation.
#[derive(Debug, Clone)]
pub struct SyncQueueEntry {
    /// Auto-increment log id - drain order is ascending id.
    pub id: i64,
    pub collection: Collection,
    pub doc_id: String,
    pub action: MutationAction,

    /// Full entity snapshot for create/update; None for delete.
    pub payload: Option<MutationPayload>,

    /// Owning shop, when known at enqueue time.
    pub shop_id: Option<String>,

    /// Number of failed delivery attempts so far.
    pub attempts: i64,

    /// Error message from the most recent failed attempt.
    pub last_error: Option<String>,

    pub created_at: DateTime<Utc>,
}

/// A mutation about to be appended to the log.
#[derive(Debug, Clone)]
pub struct NewMutation {
    pub collection: Collection,
    pub doc_id: String,
    pub action: MutationAction,
    pub payload: Option<MutationPayload>,
    pub shop_id: Option<String>,
}

impl NewMutation {
    /// A create mutation carrying a full entity snapshot.
    pub fn create(payload: MutationPayload) -> Self {
        NewMutation {
            collection: payload.collection(),
            doc_id: payload.doc_id().to_string(),
            action: MutationAction::Create,
            shop_id: Some(payload.shop_id().to_string()),
            payload: Some(payload),
        }
    }

    /// An update mutation carrying a full entity snapshot.
    pub fn update(payload: MutationPayload) -> Self {
        NewMutation {
            collection: payload.collection(),
            doc_id: payload.doc_id().to_string(),
            action: MutationAction::Update,
            shop_id: Some(payload.shop_id().to_string()),
            payload: Some(payload),
        }
    }

    /// A delete mutation - no payload, just the target document.
    pub fn delete(collection: Collection, doc_id: &str, shop_id: &str) -> Self {
        NewMutation {
            collection,
            doc_id: doc_id.to_string(),
            action: MutationAction::Delete,
            payload: None,
            shop_id: Some(shop_id.to_string()),
        }
    }
}

/// A mutation-log entry quarantined after exhausting its retry budget.
///
/// Dead-lettered entries no longer block the queue; they are kept for
/// operator inspection and manual replay.
#[derive(Debug, Clone)]
pub struct DeadLetterEntry {
    pub id: i64,
    /// The id the entry had in the live queue.
    pub queue_id: i64,
    pub collection: Collection,
    pub doc_id: String,
    pub action: MutationAction,
    pub payload: Option<MutationPayload>,
    pub shop_id: Option<String>,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub failed_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_product() -> Product {
        Product {
            id: "prod-1".to_string(),
            shop_id: "shop-1".to_string(),
            name: "Toor Dal 1kg".to_string(),
            barcode: Some("8901234567890".to_string()),
            price_paise: 14500,
            cost_price_paise: Some(12000),
            category: "Grocery".to_string(),
            unit: "pcs".to_string(),
            is_loose: false,
            synced: false,
        }
    }

    #[test]
    fn test_product_margin() {
        let p = sample_product();
        assert_eq!(p.margin().unwrap().paise(), 2500);
    }

    #[test]
    fn test_synced_flag_never_serialized() {
        let json = serde_json::to_value(sample_product()).unwrap();
        assert!(json.get("synced").is_none());
        assert_eq!(json["shopId"], "shop-1");
        assert_eq!(json["pricePaise"], 14500);
    }

    #[test]
    fn test_synced_defaults_false_on_deserialize() {
        let json = serde_json::to_string(&sample_product()).unwrap();
        let back: Product = serde_json::from_str(&json).unwrap();
        assert!(!back.synced);
    }

    #[test]
    fn test_collection_round_trip() {
        for c in [
            Collection::Products,
            Collection::Inventory,
            Collection::Bills,
            Collection::Customers,
            Collection::KhataTransactions,
            Collection::Expenses,
            Collection::StoreSettings,
            Collection::Shops,
        ] {
            assert_eq!(c.as_str().parse::<Collection>().unwrap(), c);
        }
        assert!("invoices".parse::<Collection>().is_err());
    }

    #[test]
    fn test_payload_collection_and_doc_id() {
        let payload = MutationPayload::Products(sample_product());
        assert_eq!(payload.collection(), Collection::Products);
        assert_eq!(payload.doc_id(), "prod-1");
        assert_eq!(payload.shop_id(), "shop-1");
    }

    #[test]
    fn test_inventory_payload_uses_product_id() {
        let inv = Inventory {
            product_id: "prod-9".to_string(),
            shop_id: "shop-1".to_string(),
            current_stock: 10,
            low_stock_threshold: 2,
            last_updated: Utc::now(),
            synced: false,
        };
        let payload = MutationPayload::Inventory(inv);
        assert_eq!(payload.doc_id(), "prod-9");
    }

    #[test]
    fn test_remote_fields_excludes_synced() {
        let payload = MutationPayload::Products(sample_product());
        let fields = payload.remote_fields().unwrap();
        assert!(fields.contains_key("id"));
        assert!(fields.contains_key("shopId"));
        assert!(!fields.contains_key("synced"));
    }

    #[test]
    fn test_khata_signed_amount() {
        let mut tx = KhataTransaction {
            id: "tx-1".to_string(),
            shop_id: "shop-1".to_string(),
            customer_id: "cust-1".to_string(),
            amount_paise: 5000,
            entry_type: KhataEntryType::Credit,
            reference_bill_id: None,
            date: Utc::now(),
            synced: false,
        };
        assert_eq!(tx.signed_amount().paise(), 5000);

        tx.entry_type = KhataEntryType::Debit;
        assert_eq!(tx.signed_amount().paise(), -5000);
    }

    #[test]
    fn test_new_mutation_delete_has_no_payload() {
        let m = NewMutation::delete(Collection::Products, "prod-1", "shop-1");
        assert_eq!(m.action, MutationAction::Delete);
        assert!(m.payload.is_none());
        assert_eq!(m.doc_id, "prod-1");
    }
}
