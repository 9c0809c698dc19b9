//! # Gateway Protocol Messages
//!
//! Message types for the WebSocket document gateway.
//!
//! ## Protocol Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Gateway Protocol Messages                           │
//! │                                                                         │
//! │  HANDSHAKE FLOW                                                        │
//! │  ──────────────                                                        │
//! │  CLIENT  ───► Hello { device_id, shop_id, protocol_version }           │
//! │  GATEWAY ◄─── Welcome { shop_id, server_time }                         │
//! │                                                                         │
//! │  DOCUMENT WRITES (request/response by request_id)                      │
//! │  ────────────────────────────────────────────────                      │
//! │  CLIENT  ───► DocWrite  { request_id, collection, doc_id, fields }     │
//! │  CLIENT  ───► DocDelete { request_id, collection, doc_id }             │
//! │  GATEWAY ◄─── WriteAck  { request_id, ok, error? }                     │
//! │                                                                         │
//! │  SNAPSHOT READS (bulk resync)                                          │
//! │  ────────────────────────────                                          │
//! │  CLIENT  ───► FetchCollection { request_id, collection, shop_id, .. }  │
//! │  GATEWAY ◄─── CollectionSnapshot { request_id, docs: [...] }           │
//! │  CLIENT  ───► FetchDoc { request_id, collection, doc_id }              │
//! │  GATEWAY ◄─── DocSnapshot { request_id, doc? }                         │
//! │                                                                         │
//! │  CHANGE STREAMS (downward listener)                                    │
//! │  ──────────────────────────────────                                    │
//! │  CLIENT  ───► Subscribe { request_id, collection, shop_id }            │
//! │  GATEWAY ◄─── SubscribeAck { request_id, subscription_id }             │
//! │  GATEWAY ◄─── ChangeEvent { subscription_id, change }   (stream)       │
//! │  CLIENT  ───► Unsubscribe { subscription_id }                          │
//! │                                                                         │
//! │  KEEPALIVE / ERROR                                                     │
//! │  ─────────────────                                                     │
//! │  Both    ◄──► Ping / Pong { timestamp }                                │
//! │  GATEWAY ◄──► Error { code, message }                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Format
//! Messages are serialized as tagged JSON using serde's adjacently tagged
//! enum: `{ "type": "DocWrite", "payload": { ... } }`

use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};
use crate::remote::{FieldMap, RemoteChange, RemoteDocument};
use kirana_core::Collection;

/// Current protocol version.
pub const PROTOCOL_VERSION: u32 = 1;

// =============================================================================
// Main Message Enum (Tagged Union)
// =============================================================================

/// All gateway protocol messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum GatewayMessage {
    // =========================================================================
    // Handshake
    // =========================================================================
    /// Initial message from the client after connecting.
    Hello(HelloPayload),

    /// Gateway response after a successful handshake.
    Welcome(WelcomePayload),

    // =========================================================================
    // Document Writes
    // =========================================================================
    /// Merge-write fields into a document (creates it if missing).
    DocWrite(DocWritePayload),

    /// Delete a document.
    DocDelete(DocDeletePayload),

    /// Acknowledgement for DocWrite / DocDelete.
    WriteAck(WriteAckPayload),

    // =========================================================================
    // Snapshot Reads
    // =========================================================================
    /// Fetch a shop's slice of one collection.
    FetchCollection(FetchCollectionPayload),

    /// Response to FetchCollection.
    CollectionSnapshot(CollectionSnapshotPayload),

    /// Fetch a single document.
    FetchDoc(FetchDocPayload),

    /// Response to FetchDoc.
    DocSnapshot(DocSnapshotPayload),

    // =========================================================================
    // Change Streams
    // =========================================================================
    /// Open a change stream for a shop's slice of one collection.
    Subscribe(SubscribePayload),

    /// Response to Subscribe, carrying the stream id.
    SubscribeAck(SubscribeAckPayload),

    /// One incremental change on an open stream.
    ChangeEvent(ChangeEventPayload),

    /// Close a change stream.
    Unsubscribe { subscription_id: u64 },

    // =========================================================================
    // Keepalive / Error
    // =========================================================================
    /// Ping for keepalive.
    Ping { timestamp: String },

    /// Pong response for keepalive.
    Pong { timestamp: String },

    /// Error message, correlated to a request when request_id is present.
    Error {
        code: String,
        message: String,
        #[serde(default)]
        request_id: Option<u64>,
    },
}

impl GatewayMessage {
    /// Serializes to wire JSON.
    pub fn to_json(&self) -> SyncResult<String> {
        serde_json::to_string(self).map_err(|e| SyncError::SerializationFailed(e.to_string()))
    }

    /// Parses from wire JSON.
    pub fn from_json(json: &str) -> SyncResult<Self> {
        serde_json::from_str(json).map_err(|e| SyncError::InvalidMessage(e.to_string()))
    }

    /// Message type name, for logging.
    pub fn type_name(&self) -> &'static str {
        match self {
            GatewayMessage::Hello(_) => "Hello",
            GatewayMessage::Welcome(_) => "Welcome",
            GatewayMessage::DocWrite(_) => "DocWrite",
            GatewayMessage::DocDelete(_) => "DocDelete",
            GatewayMessage::WriteAck(_) => "WriteAck",
            GatewayMessage::FetchCollection(_) => "FetchCollection",
            GatewayMessage::CollectionSnapshot(_) => "CollectionSnapshot",
            GatewayMessage::FetchDoc(_) => "FetchDoc",
            GatewayMessage::DocSnapshot(_) => "DocSnapshot",
            GatewayMessage::Subscribe(_) => "Subscribe",
            GatewayMessage::SubscribeAck(_) => "SubscribeAck",
            GatewayMessage::ChangeEvent(_) => "ChangeEvent",
            GatewayMessage::Unsubscribe { .. } => "Unsubscribe",
            GatewayMessage::Ping { .. } => "Ping",
            GatewayMessage::Pong { .. } => "Pong",
            GatewayMessage::Error { .. } => "Error",
        }
    }

    /// The request id a response correlates to, when it is one.
    pub fn response_request_id(&self) -> Option<u64> {
        match self {
            GatewayMessage::WriteAck(p) => Some(p.request_id),
            GatewayMessage::CollectionSnapshot(p) => Some(p.request_id),
            GatewayMessage::DocSnapshot(p) => Some(p.request_id),
            GatewayMessage::SubscribeAck(p) => Some(p.request_id),
            GatewayMessage::Error { request_id, .. } => *request_id,
            _ => None,
        }
    }
}

// =============================================================================
// Payloads
// =============================================================================

/// Hello message sent by the client on connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloPayload {
    pub device_id: String,
    pub shop_id: String,
    pub protocol_version: u32,
}

/// Welcome message sent by the gateway after a successful handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WelcomePayload {
    pub shop_id: String,
    pub server_time: String,
}

/// Merge-write request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocWritePayload {
    pub request_id: u64,
    pub collection: Collection,
    pub doc_id: String,
    pub fields: FieldMap,
    /// Always true today; the field keeps replace semantics expressible.
    pub merge: bool,
}

/// Delete request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocDeletePayload {
    pub request_id: u64,
    pub collection: Collection,
    pub doc_id: String,
}

/// Write/delete acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteAckPayload {
    pub request_id: u64,
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Collection fetch request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchCollectionPayload {
    pub request_id: u64,
    pub collection: Collection,
    pub shop_id: String,
    /// Order by createdAt descending (recent-bills fetch).
    #[serde(default)]
    pub order_by_created_desc: bool,
    #[serde(default)]
    pub limit: Option<u32>,
}

/// Collection fetch response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSnapshotPayload {
    pub request_id: u64,
    pub docs: Vec<RemoteDocument>,
}

/// Single-document fetch request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchDocPayload {
    pub request_id: u64,
    pub collection: Collection,
    pub doc_id: String,
}

/// Single-document fetch response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocSnapshotPayload {
    pub request_id: u64,
    #[serde(default)]
    pub doc: Option<RemoteDocument>,
}

/// Change stream request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribePayload {
    pub request_id: u64,
    pub collection: Collection,
    pub shop_id: String,
}

/// Change stream confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeAckPayload {
    pub request_id: u64,
    pub subscription_id: u64,
}

/// One change on an open stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEventPayload {
    pub subscription_id: u64,
    pub change: RemoteChange,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_round_trip() {
        let msg = GatewayMessage::DocWrite(DocWritePayload {
            request_id: 7,
            collection: Collection::Bills,
            doc_id: "bill-1".to_string(),
            fields: FieldMap::new(),
            merge: true,
        });

        let json = msg.to_json().unwrap();
        assert!(json.contains("\"type\":\"DocWrite\""));
        assert!(json.contains("\"collection\":\"bills\""));

        let back = GatewayMessage::from_json(&json).unwrap();
        assert_eq!(back.type_name(), "DocWrite");
        assert_eq!(back.response_request_id(), None);
    }

    #[test]
    fn test_response_correlation_ids() {
        let ack = GatewayMessage::WriteAck(WriteAckPayload {
            request_id: 42,
            ok: true,
            error: None,
        });
        assert_eq!(ack.response_request_id(), Some(42));

        let err = GatewayMessage::Error {
            code: "forbidden".to_string(),
            message: "nope".to_string(),
            request_id: Some(42),
        };
        assert_eq!(err.response_request_id(), Some(42));

        let ping = GatewayMessage::Ping {
            timestamp: "t".to_string(),
        };
        assert_eq!(ping.response_request_id(), None);
    }

    #[test]
    fn test_invalid_json_rejected() {
        assert!(GatewayMessage::from_json("{not json").is_err());
        assert!(GatewayMessage::from_json("{\"type\":\"Nope\",\"payload\":{}}").is_err());
    }
}
