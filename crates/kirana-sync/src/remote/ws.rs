//! # WebSocket Gateway Remote
//!
//! [`RemoteStore`] implementation speaking the gateway protocol over the
//! reconnecting WebSocket transport.
//!
//! ## Request Correlation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      WsRemote Internals                                 │
//! │                                                                         │
//! │  set_merge() ──► DocWrite{request_id: 7} ──► transport ──► gateway     │
//! │       │                                                       │         │
//! │       │  pending: { 7 → oneshot::Sender }                     │         │
//! │       │                                                       ▼         │
//! │       └◄── oneshot ◄── router task ◄── WriteAck{request_id: 7}         │
//! │                                                                         │
//! │  subscribe() ──► Subscribe ──► SubscribeAck{subscription_id: 3}        │
//! │                                                                         │
//! │  subscriptions: { 3 → mpsc::Sender<RemoteChange> }                     │
//! │       ▲                                                                 │
//! │       └── router task ◄── ChangeEvent{subscription_id: 3, ...}         │
//! │                                                                         │
//! │  Each request is bounded by a timeout so a dead link surfaces as a     │
//! │  failed drain, not a hung queue. On disconnect, pending requests are   │
//! │  failed immediately.                                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Known limitation: change streams are NOT re-established after a
//! reconnect - the caller recovers with a bulk resync or a session restart.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::error::{SyncError, SyncResult};
use crate::protocol::{
    DocDeletePayload, DocWritePayload, FetchCollectionPayload, FetchDocPayload, GatewayMessage,
    HelloPayload, SubscribePayload, PROTOCOL_VERSION,
};
use crate::remote::{FieldMap, RemoteChange, RemoteDocument, RemoteStore};
use crate::transport::{Transport, TransportConfig, TransportHandle};
use kirana_core::Collection;

/// Channel depth per change stream.
const SUBSCRIBER_BUFFER: usize = 256;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the gateway client.
#[derive(Debug, Clone)]
pub struct WsRemoteConfig {
    pub url: String,
    pub device_id: String,
    pub shop_id: String,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub ping_interval: Duration,
}

impl WsRemoteConfig {
    /// Builds a gateway client config from the engine config.
    /// Fails when no gateway URL is configured.
    pub fn from_sync_config(config: &SyncConfig) -> SyncResult<Self> {
        let url = config
            .gateway_url()
            .ok_or_else(|| SyncError::InvalidConfig("No gateway URL configured".into()))?
            .to_string();

        // Validated here as well as in SyncConfig::validate - this type is
        // also constructed directly
        url::Url::parse(&url)?;

        Ok(WsRemoteConfig {
            url,
            device_id: config.device_id().to_string(),
            shop_id: config.shop_id().to_string(),
            request_timeout: config.sync.request_timeout(),
            connect_timeout: Duration::from_secs(config.sync.connect_timeout_secs),
            initial_backoff: Duration::from_millis(config.sync.initial_backoff_ms),
            max_backoff: Duration::from_secs(config.sync.max_backoff_secs),
            ping_interval: Duration::from_secs(config.sync.ping_interval_secs),
        })
    }
}

// =============================================================================
// WsRemote
// =============================================================================

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<GatewayMessage>>>>;
type SubscriptionMap = Arc<Mutex<HashMap<u64, mpsc::Sender<RemoteChange>>>>;

/// Remote store client over the WebSocket gateway.
pub struct WsRemote {
    transport: TransportHandle,
    pending: PendingMap,
    subscriptions: SubscriptionMap,
    next_request_id: AtomicU64,
    request_timeout: Duration,
}

impl WsRemote {
    /// Spawns the transport, router and handshake tasks and returns the
    /// ready-to-use remote.
    ///
    /// The connectivity monitor is driven by the transport: online exactly
    /// while the gateway connection is up.
    pub fn spawn(config: WsRemoteConfig, connectivity: ConnectivityMonitor) -> Arc<WsRemote> {
        let transport_config = TransportConfig {
            url: config.url.clone(),
            connect_timeout: config.connect_timeout,
            initial_backoff: config.initial_backoff,
            max_backoff: config.max_backoff,
            ping_interval: config.ping_interval,
        };

        let (transport, incoming_rx) = Transport::spawn(transport_config, connectivity.clone());

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let subscriptions: SubscriptionMap = Arc::new(Mutex::new(HashMap::new()));

        tokio::spawn(Self::router(
            incoming_rx,
            pending.clone(),
            subscriptions.clone(),
            transport.clone(),
        ));

        tokio::spawn(Self::handshake_loop(
            connectivity,
            transport.clone(),
            pending.clone(),
            config.device_id.clone(),
            config.shop_id.clone(),
        ));

        Arc::new(WsRemote {
            transport,
            pending,
            subscriptions,
            next_request_id: AtomicU64::new(1),
            request_timeout: config.request_timeout,
        })
    }

    /// Returns the transport handle. The remote outlives engine sessions;
    /// the embedding shell shuts the connection down through this on exit.
    pub fn transport(&self) -> &TransportHandle {
        &self.transport
    }

    /// Routes incoming messages: responses to their pending request,
    /// change events to their stream.
    async fn router(
        mut incoming_rx: mpsc::Receiver<GatewayMessage>,
        pending: PendingMap,
        subscriptions: SubscriptionMap,
        transport: TransportHandle,
    ) {
        while let Some(msg) = incoming_rx.recv().await {
            if let Some(request_id) = msg.response_request_id() {
                let waiter = pending.lock().unwrap().remove(&request_id);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(msg);
                    }
                    None => {
                        // Requester timed out or the connection cycled
                        debug!(request_id, "Response with no waiting request");
                    }
                }
                continue;
            }

            match msg {
                GatewayMessage::Welcome(welcome) => {
                    info!(shop_id = %welcome.shop_id, "Gateway handshake complete");
                }

                GatewayMessage::ChangeEvent(event) => {
                    let mut subs = subscriptions.lock().unwrap();
                    let mut drop_sub = false;

                    if let Some(tx) = subs.get(&event.subscription_id) {
                        match tx.try_send(event.change) {
                            Ok(()) => {}
                            Err(mpsc::error::TrySendError::Full(_)) => {
                                warn!(
                                    subscription_id = event.subscription_id,
                                    "Change stream consumer lagging, dropping event"
                                );
                            }
                            Err(mpsc::error::TrySendError::Closed(_)) => {
                                drop_sub = true;
                            }
                        }
                    }

                    if drop_sub {
                        subs.remove(&event.subscription_id);
                    }
                }

                GatewayMessage::Ping { timestamp } => {
                    let _ = transport.send(GatewayMessage::Pong { timestamp }).await;
                }

                GatewayMessage::Error { code, message, .. } => {
                    warn!(code = %code, message = %message, "Gateway error");
                }

                other => {
                    debug!(msg_type = other.type_name(), "Unhandled message");
                }
            }
        }

        debug!("Gateway router stopped");
    }

    /// Sends Hello on every reconnect; fails in-flight requests when the
    /// link drops (their connection is gone, waiting out the timeout would
    /// only stall the drain).
    async fn handshake_loop(
        connectivity: ConnectivityMonitor,
        transport: TransportHandle,
        pending: PendingMap,
        device_id: String,
        shop_id: String,
    ) {
        let mut rx = connectivity.subscribe();

        loop {
            let online = *rx.borrow_and_update();

            if online {
                let hello = GatewayMessage::Hello(HelloPayload {
                    device_id: device_id.clone(),
                    shop_id: shop_id.clone(),
                    protocol_version: PROTOCOL_VERSION,
                });

                if let Err(e) = transport.send(hello).await {
                    warn!(?e, "Failed to send Hello");
                }
            } else {
                // Dropping the senders wakes every waiter with Disconnected
                pending.lock().unwrap().clear();
            }

            if rx.changed().await.is_err() {
                break;
            }
        }
    }

    fn next_id(&self) -> u64 {
        self.next_request_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Sends a request and awaits its correlated response.
    async fn request(
        &self,
        request_id: u64,
        msg: GatewayMessage,
    ) -> SyncResult<GatewayMessage> {
        if !self.transport.is_connected().await {
            return Err(SyncError::Offline);
        }

        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(request_id, tx);

        if let Err(e) = self.transport.send(msg).await {
            self.pending.lock().unwrap().remove(&request_id);
            return Err(e);
        }

        match timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(SyncError::Disconnected),
            Err(_) => {
                self.pending.lock().unwrap().remove(&request_id);
                Err(SyncError::Timeout(self.request_timeout.as_secs()))
            }
        }
    }

    /// Interprets a WriteAck-or-Error response for a write request.
    fn expect_write_ack(
        response: GatewayMessage,
        collection: Collection,
        doc_id: &str,
    ) -> SyncResult<()> {
        match response {
            GatewayMessage::WriteAck(ack) if ack.ok => Ok(()),
            GatewayMessage::WriteAck(ack) => Err(SyncError::RemoteRejected {
                collection,
                doc_id: doc_id.to_string(),
                reason: ack.error.unwrap_or_else(|| "write rejected".to_string()),
            }),
            GatewayMessage::Error { code, message, .. } => Err(SyncError::RemoteRejected {
                collection,
                doc_id: doc_id.to_string(),
                reason: format!("{}: {}", code, message),
            }),
            other => Err(SyncError::UnexpectedResponse {
                expected: "WriteAck".to_string(),
                actual: other.type_name().to_string(),
            }),
        }
    }
}

#[async_trait]
impl RemoteStore for WsRemote {
    async fn set_merge(
        &self,
        collection: Collection,
        doc_id: &str,
        fields: FieldMap,
    ) -> SyncResult<()> {
        let request_id = self.next_id();
        let msg = GatewayMessage::DocWrite(DocWritePayload {
            request_id,
            collection,
            doc_id: doc_id.to_string(),
            fields,
            merge: true,
        });

        let response = self.request(request_id, msg).await?;
        Self::expect_write_ack(response, collection, doc_id)
    }

    async fn delete(&self, collection: Collection, doc_id: &str) -> SyncResult<()> {
        let request_id = self.next_id();
        let msg = GatewayMessage::DocDelete(DocDeletePayload {
            request_id,
            collection,
            doc_id: doc_id.to_string(),
        });

        let response = self.request(request_id, msg).await?;
        Self::expect_write_ack(response, collection, doc_id)
    }

    async fn fetch_all(
        &self,
        collection: Collection,
        shop_id: &str,
    ) -> SyncResult<Vec<RemoteDocument>> {
        let request_id = self.next_id();
        let msg = GatewayMessage::FetchCollection(FetchCollectionPayload {
            request_id,
            collection,
            shop_id: shop_id.to_string(),
            order_by_created_desc: false,
            limit: None,
        });

        match self.request(request_id, msg).await? {
            GatewayMessage::CollectionSnapshot(snapshot) => Ok(snapshot.docs),
            other => Err(SyncError::UnexpectedResponse {
                expected: "CollectionSnapshot".to_string(),
                actual: other.type_name().to_string(),
            }),
        }
    }

    async fn fetch_recent(
        &self,
        collection: Collection,
        shop_id: &str,
        limit: u32,
    ) -> SyncResult<Vec<RemoteDocument>> {
        let request_id = self.next_id();
        let msg = GatewayMessage::FetchCollection(FetchCollectionPayload {
            request_id,
            collection,
            shop_id: shop_id.to_string(),
            order_by_created_desc: true,
            limit: Some(limit),
        });

        match self.request(request_id, msg).await? {
            GatewayMessage::CollectionSnapshot(snapshot) => Ok(snapshot.docs),
            other => Err(SyncError::UnexpectedResponse {
                expected: "CollectionSnapshot".to_string(),
                actual: other.type_name().to_string(),
            }),
        }
    }

    async fn fetch_doc(
        &self,
        collection: Collection,
        doc_id: &str,
    ) -> SyncResult<Option<RemoteDocument>> {
        let request_id = self.next_id();
        let msg = GatewayMessage::FetchDoc(FetchDocPayload {
            request_id,
            collection,
            doc_id: doc_id.to_string(),
        });

        match self.request(request_id, msg).await? {
            GatewayMessage::DocSnapshot(snapshot) => Ok(snapshot.doc),
            other => Err(SyncError::UnexpectedResponse {
                expected: "DocSnapshot".to_string(),
                actual: other.type_name().to_string(),
            }),
        }
    }

    async fn subscribe(
        &self,
        collection: Collection,
        shop_id: &str,
    ) -> SyncResult<mpsc::Receiver<RemoteChange>> {
        let request_id = self.next_id();
        let msg = GatewayMessage::Subscribe(SubscribePayload {
            request_id,
            collection,
            shop_id: shop_id.to_string(),
        });

        match self.request(request_id, msg).await? {
            GatewayMessage::SubscribeAck(ack) => {
                let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
                self.subscriptions
                    .lock()
                    .unwrap()
                    .insert(ack.subscription_id, tx);

                debug!(
                    collection = %collection,
                    subscription_id = ack.subscription_id,
                    "Change stream opened"
                );

                Ok(rx)
            }
            other => Err(SyncError::UnexpectedResponse {
                expected: "SubscribeAck".to_string(),
                actual: other.type_name().to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;

    #[test]
    fn test_config_requires_gateway_url() {
        let config = SyncConfig::default();
        assert!(WsRemoteConfig::from_sync_config(&config).is_err());
    }

    #[test]
    fn test_config_from_sync_config() {
        let mut config = SyncConfig::default();
        config.shop.id = "shop-1".to_string();
        config.sync.gateway_url = Some("wss://sync.example.com/ws".to_string());

        let ws = WsRemoteConfig::from_sync_config(&config).unwrap();
        assert_eq!(ws.shop_id, "shop-1");
        assert_eq!(ws.request_timeout, Duration::from_secs(30));
    }
}
