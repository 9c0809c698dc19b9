//! # kirana-db: Local Durable Store for Kirana POS
//!
//! This crate provides the on-device database: the single source of truth
//! the UI renders from, and the mutation log the sync engine drains.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Kirana POS Data Flow                              │
//! │                                                                         │
//! │  UI action (checkout / restock / khata entry)                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     kirana-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌──────────────┐  ┌────────────┐  ┌─────────┐ │   │
//! │  │   │ Database  │  │ Repositories │  │  ShopOps   │  │ChangeBus│ │   │
//! │  │   │ (pool.rs) │  │ (per table)  │  │ (ops.rs)   │  │(watch.rs│ │   │
//! │  │   │           │  │              │  │            │  │ + live  │ │   │
//! │  │   │SqlitePool │◄─│ products,    │◄─│ one txn =  │─►│ queries)│ │   │
//! │  │   │WAL mode   │  │ bills, ...   │  │ entity +   │  │         │ │   │
//! │  │   │migrations │  │ sync_queue   │  │ log entry  │  │         │ │   │
//! │  │   └───────────┘  └──────────────┘  └────────────┘  └─────────┘ │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                          ▲                      │
//! │       ▼                                          │                      │
//! │  SQLite file (WAL)                    kirana-sync drains sync_queue,   │
//! │                                       flips synced flags, applies      │
//! │                                       remote changes                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations (one per table)
//! - [`ops`] - Business operations (checkout, restock, khata, ...)
//! - [`watch`] - Table change bus and live queries
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kirana_db::{Database, DbConfig, ShopOps};
//!
//! let db = Database::new(DbConfig::new("kirana.db")).await?;
//! let ops = ShopOps::new(db.clone(), "shop-42");
//!
//! let bill = ops.checkout(cart, PaymentMode::Cash, None).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod ops;
pub mod pool;
pub mod repository;
pub mod watch;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use ops::{NewCustomer, NewExpense, NewProduct, ShopOps};
pub use pool::{Database, DbConfig};
pub use watch::{watch_query, ChangeBus, Table, TableChange};

// Repository re-exports for convenience
pub use repository::bill::BillRepository;
pub use repository::customer::CustomerRepository;
pub use repository::expense::ExpenseRepository;
pub use repository::inventory::InventoryRepository;
pub use repository::product::ProductRepository;
pub use repository::settings::SettingsRepository;
pub use repository::sync_queue::SyncQueueRepository;
