//! # In-Process Remote Store
//!
//! A complete [`RemoteStore`] backed by process memory. Used by the test
//! suite and local development; sharing one instance between several
//! engines makes it the "shared remote" in multi-device scenarios.
//!
//! Fault injection mirrors what the field throws at the real gateway:
//! `set_offline(true)` fails every call (network down), `reject(...)` fails
//! writes to one document (server-side rule rejection).

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{SyncError, SyncResult};
use crate::remote::{FieldMap, RemoteChange, RemoteChangeKind, RemoteDocument, RemoteStore};
use kirana_core::Collection;

/// Channel depth per subscriber. A full subscriber drops events - the
/// listener recovers via bulk resync, same as a flaky real subscription.
const SUBSCRIBER_BUFFER: usize = 256;

struct Subscription {
    collection: Collection,
    shop_id: String,
    tx: mpsc::Sender<RemoteChange>,
}

/// In-process remote document store with fault injection.
#[derive(Default)]
pub struct MemoryRemote {
    collections: Mutex<HashMap<Collection, BTreeMap<String, FieldMap>>>,
    subscribers: Mutex<Vec<Subscription>>,
    offline: AtomicBool,
    rejected: Mutex<HashSet<(Collection, String)>>,
}

impl MemoryRemote {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Fault Injection
    // =========================================================================

    /// Makes every call fail with [`SyncError::Offline`] until cleared.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Makes writes to one document fail with [`SyncError::RemoteRejected`].
    pub fn reject(&self, collection: Collection, doc_id: &str) {
        self.rejected
            .lock()
            .unwrap()
            .insert((collection, doc_id.to_string()));
    }

    /// Clears a rejection.
    pub fn allow(&self, collection: Collection, doc_id: &str) {
        self.rejected
            .lock()
            .unwrap()
            .remove(&(collection, doc_id.to_string()));
    }

    // =========================================================================
    // Inspection (tests, seeding)
    // =========================================================================

    /// Number of documents in a collection.
    pub fn doc_count(&self, collection: Collection) -> usize {
        self.collections
            .lock()
            .unwrap()
            .get(&collection)
            .map(|c| c.len())
            .unwrap_or(0)
    }

    /// Raw field map of a document, if present.
    pub fn raw_doc(&self, collection: Collection, doc_id: &str) -> Option<FieldMap> {
        self.collections
            .lock()
            .unwrap()
            .get(&collection)
            .and_then(|c| c.get(doc_id))
            .cloned()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn check_online(&self) -> SyncResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(SyncError::Offline);
        }
        Ok(())
    }

    fn check_accepts(&self, collection: Collection, doc_id: &str) -> SyncResult<()> {
        if self
            .rejected
            .lock()
            .unwrap()
            .contains(&(collection, doc_id.to_string()))
        {
            return Err(SyncError::RemoteRejected {
                collection,
                doc_id: doc_id.to_string(),
                reason: "rejected by store rule".to_string(),
            });
        }
        Ok(())
    }

    /// Fans an event out to matching live subscribers, pruning dead ones.
    fn publish(&self, change: RemoteChange) {
        let shop_id = change.doc.str_field("shopId").unwrap_or("").to_string();

        let mut subs = self.subscribers.lock().unwrap();
        subs.retain(|sub| {
            if sub.collection != change.collection || sub.shop_id != shop_id {
                return !sub.tx.is_closed();
            }

            match sub.tx.try_send(change.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!(collection = %change.collection, "Subscriber lagging, dropping event");
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn set_merge(
        &self,
        collection: Collection,
        doc_id: &str,
        fields: FieldMap,
    ) -> SyncResult<()> {
        self.check_online()?;
        self.check_accepts(collection, doc_id)?;

        let (kind, doc) = {
            let mut store = self.collections.lock().unwrap();
            let docs = store.entry(collection).or_default();

            match docs.get_mut(doc_id) {
                Some(existing) => {
                    // Field-merge: supplied fields win, absent fields survive
                    for (k, v) in fields {
                        existing.insert(k, v);
                    }
                    (
                        RemoteChangeKind::Modified,
                        RemoteDocument {
                            id: doc_id.to_string(),
                            fields: existing.clone(),
                        },
                    )
                }
                None => {
                    docs.insert(doc_id.to_string(), fields.clone());
                    (
                        RemoteChangeKind::Added,
                        RemoteDocument {
                            id: doc_id.to_string(),
                            fields,
                        },
                    )
                }
            }
        };

        self.publish(RemoteChange {
            collection,
            kind,
            doc,
        });

        Ok(())
    }

    async fn delete(&self, collection: Collection, doc_id: &str) -> SyncResult<()> {
        self.check_online()?;
        self.check_accepts(collection, doc_id)?;

        let removed = {
            let mut store = self.collections.lock().unwrap();
            store.entry(collection).or_default().remove(doc_id)
        };

        // Absent documents delete silently; the removal event carries the
        // last snapshot so listeners can resolve natural keys
        if let Some(fields) = removed {
            self.publish(RemoteChange {
                collection,
                kind: RemoteChangeKind::Removed,
                doc: RemoteDocument {
                    id: doc_id.to_string(),
                    fields,
                },
            });
        }

        Ok(())
    }

    async fn fetch_all(
        &self,
        collection: Collection,
        shop_id: &str,
    ) -> SyncResult<Vec<RemoteDocument>> {
        self.check_online()?;

        let store = self.collections.lock().unwrap();
        let docs = store
            .get(&collection)
            .map(|c| {
                c.iter()
                    .filter(|(_, fields)| {
                        fields.get("shopId").and_then(|v| v.as_str()) == Some(shop_id)
                    })
                    .map(|(id, fields)| RemoteDocument {
                        id: id.clone(),
                        fields: fields.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(docs)
    }

    async fn fetch_recent(
        &self,
        collection: Collection,
        shop_id: &str,
        limit: u32,
    ) -> SyncResult<Vec<RemoteDocument>> {
        let mut docs = self.fetch_all(collection, shop_id).await?;

        // createdAt is RFC3339 UTC, so string order is time order
        docs.sort_by(|a, b| {
            let ka = a.str_field("createdAt").unwrap_or("");
            let kb = b.str_field("createdAt").unwrap_or("");
            kb.cmp(ka)
        });
        docs.truncate(limit as usize);

        Ok(docs)
    }

    async fn fetch_doc(
        &self,
        collection: Collection,
        doc_id: &str,
    ) -> SyncResult<Option<RemoteDocument>> {
        self.check_online()?;

        let store = self.collections.lock().unwrap();
        Ok(store
            .get(&collection)
            .and_then(|c| c.get(doc_id))
            .map(|fields| RemoteDocument {
                id: doc_id.to_string(),
                fields: fields.clone(),
            }))
    }

    async fn subscribe(
        &self,
        collection: Collection,
        shop_id: &str,
    ) -> SyncResult<mpsc::Receiver<RemoteChange>> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);

        self.subscribers.lock().unwrap().push(Subscription {
            collection,
            shop_id: shop_id.to_string(),
            tx,
        });

        Ok(rx)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, serde_json::Value)]) -> FieldMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_merge_preserves_absent_fields() {
        let remote = MemoryRemote::new();

        remote
            .set_merge(
                Collection::Products,
                "p1",
                fields(&[
                    ("shopId", "shop-1".into()),
                    ("name", "Dal".into()),
                    ("pricePaise", 14500.into()),
                ]),
            )
            .await
            .unwrap();

        // Partial update: only the price changes
        remote
            .set_merge(
                Collection::Products,
                "p1",
                fields(&[("pricePaise", 15000.into())]),
            )
            .await
            .unwrap();

        let doc = remote.raw_doc(Collection::Products, "p1").unwrap();
        assert_eq!(doc["name"], "Dal");
        assert_eq!(doc["pricePaise"], 15000);
    }

    #[tokio::test]
    async fn test_merge_is_idempotent_on_replay() {
        let remote = MemoryRemote::new();
        let f = fields(&[("shopId", "shop-1".into()), ("name", "Dal".into())]);

        remote
            .set_merge(Collection::Bills, "b1", f.clone())
            .await
            .unwrap();
        remote.set_merge(Collection::Bills, "b1", f).await.unwrap();

        assert_eq!(remote.doc_count(Collection::Bills), 1);
    }

    #[tokio::test]
    async fn test_offline_fails_everything() {
        let remote = MemoryRemote::new();
        remote.set_offline(true);

        let result = remote
            .set_merge(Collection::Products, "p1", FieldMap::new())
            .await;
        assert!(matches!(result, Err(SyncError::Offline)));

        remote.set_offline(false);
        assert!(remote
            .set_merge(
                Collection::Products,
                "p1",
                fields(&[("shopId", "shop-1".into())])
            )
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_rejection_targets_one_document() {
        let remote = MemoryRemote::new();
        remote.reject(Collection::Bills, "bad");

        let err = remote
            .set_merge(
                Collection::Bills,
                "bad",
                fields(&[("shopId", "shop-1".into())]),
            )
            .await;
        assert!(matches!(err, Err(SyncError::RemoteRejected { .. })));

        assert!(remote
            .set_merge(
                Collection::Bills,
                "good",
                fields(&[("shopId", "shop-1".into())]),
            )
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_subscription_scoped_by_shop() {
        let remote = MemoryRemote::new();
        let mut rx = remote
            .subscribe(Collection::Products, "shop-1")
            .await
            .unwrap();

        remote
            .set_merge(
                Collection::Products,
                "other",
                fields(&[("shopId", "shop-2".into())]),
            )
            .await
            .unwrap();
        remote
            .set_merge(
                Collection::Products,
                "mine",
                fields(&[("shopId", "shop-1".into())]),
            )
            .await
            .unwrap();

        let change = rx.recv().await.unwrap();
        assert_eq!(change.doc.id, "mine");
        assert_eq!(change.kind, RemoteChangeKind::Added);
    }

    #[tokio::test]
    async fn test_removal_carries_last_snapshot() {
        let remote = MemoryRemote::new();
        let mut rx = remote
            .subscribe(Collection::Inventory, "shop-1")
            .await
            .unwrap();

        remote
            .set_merge(
                Collection::Inventory,
                "p1",
                fields(&[("shopId", "shop-1".into()), ("productId", "p1".into())]),
            )
            .await
            .unwrap();
        remote.delete(Collection::Inventory, "p1").await.unwrap();

        let added = rx.recv().await.unwrap();
        assert_eq!(added.kind, RemoteChangeKind::Added);

        let removed = rx.recv().await.unwrap();
        assert_eq!(removed.kind, RemoteChangeKind::Removed);
        assert_eq!(removed.doc.str_field("productId"), Some("p1"));
    }

    #[tokio::test]
    async fn test_fetch_recent_orders_and_caps() {
        let remote = MemoryRemote::new();

        for (id, ts) in [
            ("b1", "2026-08-01T10:00:00Z"),
            ("b2", "2026-08-03T10:00:00Z"),
            ("b3", "2026-08-02T10:00:00Z"),
        ] {
            remote
                .set_merge(
                    Collection::Bills,
                    id,
                    fields(&[("shopId", "shop-1".into()), ("createdAt", ts.into())]),
                )
                .await
                .unwrap();
        }

        let recent = remote
            .fetch_recent(Collection::Bills, "shop-1", 2)
            .await
            .unwrap();

        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, "b2");
        assert_eq!(recent[1].id, "b3");
    }
}
