//! # Repositories
//!
//! One repository per table. Read methods run against the pool; write
//! methods take `&mut SqliteConnection` so the business operations layer
//! can compose several writes (entity rows + mutation-log entries) inside
//! ONE transaction.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ops::ShopOps::checkout()                                              │
//! │      let mut tx = pool.begin().await?;                                 │
//! │      bills.insert(&mut *tx, &bill)?;            ┐                       │
//! │      inventory.adjust_stock(&mut *tx, ...)?;    │ one transaction       │
//! │      sync_queue.enqueue(&mut *tx, ...)?;        ┘                       │
//! │      tx.commit().await?;                                               │
//! │      changes.notify_many(&[...]);   ← only after commit                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every shop-facing read filters by `shop_id` - tenant isolation is a
//! query-level invariant, not an afterthought.

pub mod bill;
pub mod customer;
pub mod expense;
pub mod inventory;
pub mod product;
pub mod settings;
pub mod sync_queue;
