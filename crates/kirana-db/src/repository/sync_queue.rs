//! # Mutation Log Repository
//!
//! The outbox: an append-only, FIFO-ordered log of pending remote
//! operations.
//!
//! ## Entry Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Mutation Log Lifecycle                               │
//! │                                                                         │
//! │  Business operation                                                    │
//! │       │  enqueue() - SAME transaction as the entity write              │
//! │       ▼                                                                 │
//! │  ┌──────────────────────────────┐                                      │
//! │  │ sync_queue (pending, FIFO)   │◄─── pending() reads in id order      │
//! │  └──────┬───────────────┬───────┘                                      │
//! │         │ remote ack    │ failure                                      │
//! │         ▼               ▼                                               │
//! │    remove(id)     record_failure(id)  → attempts += 1                  │
//! │                         │                                               │
//! │                         │ attempts ≥ budget (or payload can            │
//! │                         │ never be valid)                              │
//! │                         ▼                                               │
//! │              move_to_dead_letter(id)  → quarantined, queue unblocked   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Rows are deleted on confirmed success, so the table only ever holds
//! not-yet-confirmed mutations and `COUNT(*)` IS the pending indicator.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};
use kirana_core::{
    Collection, DeadLetterEntry, MutationAction, MutationPayload, NewMutation, SyncQueueEntry,
};

/// Repository for mutation log operations.
#[derive(Debug, Clone)]
pub struct SyncQueueRepository {
    pool: SqlitePool,
}

impl SyncQueueRepository {
    /// Creates a new SyncQueueRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SyncQueueRepository { pool }
    }

    /// Appends a mutation to the log.
    ///
    /// Must run inside the SAME transaction as the business write it
    /// describes - that pairing is the core atomicity requirement of the
    /// whole sync design.
    pub async fn enqueue(
        &self,
        conn: &mut SqliteConnection,
        mutation: &NewMutation,
    ) -> DbResult<()> {
        debug!(
            collection = %mutation.collection,
            doc_id = %mutation.doc_id,
            action = mutation.action.as_str(),
            "Queuing mutation"
        );

        let payload_json = mutation
            .payload
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO sync_queue (
                collection, doc_id, action, payload, shop_id, attempts,
                last_error, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, 0, NULL, ?6)
            "#,
        )
        .bind(mutation.collection.as_str())
        .bind(&mutation.doc_id)
        .bind(mutation.action.as_str())
        .bind(payload_json)
        .bind(&mutation.shop_id)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Reads the full pending list in insertion order.
    ///
    /// The drain processes this list strictly in order, one entry at a
    /// time - the property that keeps per-document remote writes ordered.
    pub async fn pending(&self) -> DbResult<Vec<SyncQueueEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, collection, doc_id, action, payload, shop_id,
                   attempts, last_error, created_at
            FROM sync_queue
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_entry).collect()
    }

    /// Counts pending mutations (the UI's "N changes waiting" badge).
    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_queue")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Removes a confirmed entry from the log.
    pub async fn remove(&self, id: i64) -> DbResult<()> {
        sqlx::query("DELETE FROM sync_queue WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Records a failed delivery attempt; returns the new attempt count.
    pub async fn record_failure(&self, id: i64, error: &str) -> DbResult<i64> {
        sqlx::query(
            r#"
            UPDATE sync_queue SET
                attempts = attempts + 1,
                last_error = ?2
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        let attempts: i64 = sqlx::query_scalar("SELECT attempts FROM sync_queue WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .unwrap_or(0);

        Ok(attempts)
    }

    /// Quarantines an entry: copies it to the dead-letter table and removes
    /// it from the live queue, atomically.
    pub async fn move_to_dead_letter(&self, entry: &SyncQueueEntry, error: &str) -> DbResult<()> {
        warn!(
            id = entry.id,
            collection = %entry.collection,
            doc_id = %entry.doc_id,
            attempts = entry.attempts,
            error,
            "Moving mutation to dead letter"
        );

        let payload_json = entry
            .payload
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO sync_dead_letter (
                queue_id, collection, doc_id, action, payload, shop_id,
                attempts, last_error, created_at, failed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(entry.id)
        .bind(entry.collection.as_str())
        .bind(&entry.doc_id)
        .bind(entry.action.as_str())
        .bind(payload_json)
        .bind(&entry.shop_id)
        .bind(entry.attempts)
        .bind(error)
        .bind(entry.created_at)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM sync_queue WHERE id = ?1")
            .bind(entry.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(())
    }

    /// Counts quarantined mutations.
    pub async fn count_dead_letters(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_dead_letter")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Lists quarantined mutations, oldest first.
    pub async fn dead_letters(&self) -> DbResult<Vec<DeadLetterEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, queue_id, collection, doc_id, action, payload, shop_id,
                   attempts, last_error, created_at, failed_at
            FROM sync_dead_letter
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_dead_letter).collect()
    }
}

// =============================================================================
// Row Mapping
// =============================================================================

fn parse_collection(s: &str) -> DbResult<Collection> {
    s.parse::<Collection>()
        .map_err(|e| DbError::CorruptValue(e.to_string()))
}

fn parse_action(s: &str) -> DbResult<MutationAction> {
    s.parse::<MutationAction>()
        .map_err(|e| DbError::CorruptValue(e.to_string()))
}

fn parse_payload(json: Option<String>) -> DbResult<Option<MutationPayload>> {
    json.map(|j| serde_json::from_str(&j))
        .transpose()
        .map_err(|e| DbError::CorruptPayload(e.to_string()))
}

fn row_to_entry(row: SqliteRow) -> DbResult<SyncQueueEntry> {
    let collection: String = row.try_get("collection")?;
    let action: String = row.try_get("action")?;
    let payload: Option<String> = row.try_get("payload")?;

    Ok(SyncQueueEntry {
        id: row.try_get("id")?,
        collection: parse_collection(&collection)?,
        doc_id: row.try_get("doc_id")?,
        action: parse_action(&action)?,
        payload: parse_payload(payload)?,
        shop_id: row.try_get("shop_id")?,
        attempts: row.try_get("attempts")?,
        last_error: row.try_get("last_error")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_dead_letter(row: SqliteRow) -> DbResult<DeadLetterEntry> {
    let collection: String = row.try_get("collection")?;
    let action: String = row.try_get("action")?;
    let payload: Option<String> = row.try_get("payload")?;

    Ok(DeadLetterEntry {
        id: row.try_get("id")?,
        queue_id: row.try_get("queue_id")?,
        collection: parse_collection(&collection)?,
        doc_id: row.try_get("doc_id")?,
        action: parse_action(&action)?,
        payload: parse_payload(payload)?,
        shop_id: row.try_get("shop_id")?,
        attempts: row.try_get("attempts")?,
        last_error: row.try_get("last_error")?,
        created_at: row.try_get("created_at")?,
        failed_at: row.try_get("failed_at")?,
    })
}
