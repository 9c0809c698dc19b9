//! # Remote Document Store Boundary
//!
//! The sync engine talks to the shared remote store through one trait seam,
//! so the engine logic is identical whether the remote is the production
//! WebSocket gateway or the in-process store the tests run against.
//!
//! ## Semantics
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      RemoteStore Contract                               │
//! │                                                                         │
//! │  set_merge(collection, doc_id, fields)                                 │
//! │    • Partial update: supplied fields overwrite, absent fields survive  │
//! │    • Creates the document when missing ⇒ replaying the same mutation   │
//! │      twice is idempotent (crash-after-write-before-delete is safe)     │
//! │                                                                         │
//! │  delete(collection, doc_id)                                            │
//! │    • Removing an already-absent document is not an error               │
//! │                                                                         │
//! │  fetch_all / fetch_recent / fetch_doc                                  │
//! │    • Shop-scoped snapshot reads (bulk resync)                          │
//! │    • fetch_recent orders by the createdAt field, newest first          │
//! │                                                                         │
//! │  subscribe(collection, shop_id)                                        │
//! │    • Incremental change stream: Added / Modified / Removed             │
//! │    • Per-collection ordering only - no cross-collection guarantees    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;

use crate::error::{SyncError, SyncResult};
use kirana_core::Collection;

pub mod memory;
pub mod ws;

pub use memory::MemoryRemote;
pub use ws::{WsRemote, WsRemoteConfig};

/// JSON field map of a remote document.
pub type FieldMap = serde_json::Map<String, serde_json::Value>;

// =============================================================================
// Documents & Changes
// =============================================================================

/// A document as stored remotely: its id plus its fields.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RemoteDocument {
    pub id: String,
    pub fields: FieldMap,
}

impl RemoteDocument {
    /// Deserializes the document fields into an entity type.
    pub fn decode<T: DeserializeOwned>(&self) -> SyncResult<T> {
        serde_json::from_value(serde_json::Value::Object(self.fields.clone()))
            .map_err(|e| SyncError::SerializationFailed(e.to_string()))
    }

    /// Deserializes into an entity, supplying the document id for writers
    /// that keep it out of the field map. Inventory documents identify
    /// themselves through `productId` instead, so those pass through as-is.
    pub fn decode_entity<T: DeserializeOwned>(&self) -> SyncResult<T> {
        if self.fields.contains_key("id") || self.fields.contains_key("productId") {
            return self.decode();
        }

        let mut fields = self.fields.clone();
        fields.insert("id".to_string(), serde_json::Value::String(self.id.clone()));

        serde_json::from_value(serde_json::Value::Object(fields))
            .map_err(|e| SyncError::SerializationFailed(e.to_string()))
    }

    /// Reads a string field, if present.
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(|v| v.as_str())
    }
}

/// What happened to a subscribed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteChangeKind {
    Added,
    Modified,
    Removed,
}

/// An incremental change event from a subscription.
///
/// For `Removed`, `doc` carries the last known snapshot - the listener
/// needs its fields to resolve natural keys (inventory is keyed by
/// `productId`, not by the document id).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RemoteChange {
    pub collection: Collection,
    pub kind: RemoteChangeKind,
    pub doc: RemoteDocument,
}

// =============================================================================
// The Trait
// =============================================================================

/// The remote document store, as the sync engine sees it.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Merge-writes fields into a document, creating it if missing.
    async fn set_merge(
        &self,
        collection: Collection,
        doc_id: &str,
        fields: FieldMap,
    ) -> SyncResult<()>;

    /// Deletes a document. Deleting an absent document succeeds.
    async fn delete(&self, collection: Collection, doc_id: &str) -> SyncResult<()>;

    /// Fetches every document in a collection belonging to one shop.
    async fn fetch_all(
        &self,
        collection: Collection,
        shop_id: &str,
    ) -> SyncResult<Vec<RemoteDocument>>;

    /// Fetches the most recent documents for a shop, ordered by the
    /// `createdAt` field descending, capped at `limit`.
    async fn fetch_recent(
        &self,
        collection: Collection,
        shop_id: &str,
        limit: u32,
    ) -> SyncResult<Vec<RemoteDocument>>;

    /// Fetches a single document by id.
    async fn fetch_doc(
        &self,
        collection: Collection,
        doc_id: &str,
    ) -> SyncResult<Option<RemoteDocument>>;

    /// Opens an incremental change stream for one shop's slice of a
    /// collection. The stream ends when the receiver is dropped.
    async fn subscribe(
        &self,
        collection: Collection,
        shop_id: &str,
    ) -> SyncResult<mpsc::Receiver<RemoteChange>>;
}
