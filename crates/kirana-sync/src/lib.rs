//! # kirana-sync: Offline-First Sync Engine for Kirana POS
//!
//! This crate reconciles the local store with the shared remote document
//! store. The register never waits for the network: every operation commits
//! locally with a mutation-log entry, and this engine delivers the log
//! upward and applies remote changes downward, in the background.
//!
//! ## Data Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Offline-First Sync Flow                            │
//! │                                                                         │
//! │  Business operation (kirana-db::ops)                                   │
//! │       │  one transaction: entity write + mutation-log entry            │
//! │       ▼                                                                 │
//! │  Local store (source of truth for the UI)                              │
//! │       │ sync_queue change event / offline→online edge                  │
//! │       ▼                                                                 │
//! │  OutboxDrainer ──► RemoteStore::set_merge / delete (in log order)      │
//! │       │  success: remove log entry, flip local synced flag             │
//! │       │  failure: halt (ordering) or dead-letter (poison)              │
//! │       ▼                                                                 │
//! │  Remote document store (shared by every device of the shop)            │
//! │       │ change streams: products, inventory                            │
//! │       ▼                                                                 │
//! │  DownwardListener ──► upsert/delete local rows, synced = true          │
//! │                                                                         │
//! │  Bulk resync: destructive local replace from a full remote fetch       │
//! │  (login / explicit refresh)                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`engine`] - `SyncEngine` orchestrator (`start(shop_id)` / `stop()`)
//! - [`config`] - Sync configuration (TOML + env)
//! - [`connectivity`] - Online/offline monitor
//! - [`outbox`] - Upward sync: ordered drain with dead-letter quarantine
//! - [`listener`] - Downward sync: incremental change application
//! - [`resync`] - Bulk downward sync (destructive replace)
//! - [`remote`] - `RemoteStore` trait, in-process store, gateway client
//! - [`protocol`] - Gateway wire messages
//! - [`transport`] - Reconnecting WebSocket client
//! - [`error`] - Sync error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use kirana_db::{Database, DbConfig};
//! use kirana_sync::{SyncConfig, SyncEngine, WsRemote, WsRemoteConfig};
//!
//! let db = Database::new(DbConfig::new("kirana.db")).await?;
//! let config = SyncConfig::load_or_default(None);
//!
//! let mut engine = SyncEngine::new(db.clone(), remote, config);
//! engine.start("shop-42").await?;
//!
//! // ... the register runs; mutations drain in the background ...
//!
//! let status = engine.status().await?;
//! println!("pending: {}", status.pending_count);
//!
//! engine.stop().await;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod connectivity;
pub mod engine;
pub mod error;
pub mod listener;
pub mod outbox;
pub mod protocol;
pub mod remote;
pub mod resync;
pub mod transport;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{DeviceConfig, ShopConfig, SyncConfig, SyncSettings};
pub use connectivity::ConnectivityMonitor;
pub use engine::{NoOpEmitter, SyncEngine, SyncEventEmitter, SyncStatus};
pub use error::{SyncError, SyncResult};
pub use listener::{DownwardListener, ListenerHandle};
pub use outbox::{DrainReport, OutboxDrainer, OutboxProcessor, OutboxProcessorHandle};
pub use remote::{
    FieldMap, MemoryRemote, RemoteChange, RemoteChangeKind, RemoteDocument, RemoteStore, WsRemote,
    WsRemoteConfig,
};
pub use resync::{run_bulk_resync, ResyncReport};
pub use transport::{ConnectionState, Transport, TransportConfig, TransportHandle};
