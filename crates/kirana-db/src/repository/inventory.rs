//! # Inventory Repository
//!
//! Database operations for stock records.
//!
//! Inventory is keyed by `product_id` - the natural key shared with the
//! remote store - so every lookup, upsert and removal resolves through that
//! key, never through a separate row id.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use kirana_core::Inventory;

/// Repository for inventory database operations.
#[derive(Debug, Clone)]
pub struct InventoryRepository {
    pool: SqlitePool,
}

impl InventoryRepository {
    /// Creates a new InventoryRepository.
    pub fn new(pool: SqlitePool) -> Self {
        InventoryRepository { pool }
    }

    // =========================================================================
    // Reads (pool)
    // =========================================================================

    /// Gets the stock record for a product.
    pub async fn get(&self, product_id: &str) -> DbResult<Option<Inventory>> {
        let inv = sqlx::query_as::<_, Inventory>(
            r#"
            SELECT product_id, shop_id, current_stock, low_stock_threshold,
                   last_updated, synced
            FROM inventory
            WHERE product_id = ?1
            "#,
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(inv)
    }

    /// Lists all stock records for a shop.
    pub async fn list_for_shop(&self, shop_id: &str) -> DbResult<Vec<Inventory>> {
        let rows = sqlx::query_as::<_, Inventory>(
            r#"
            SELECT product_id, shop_id, current_stock, low_stock_threshold,
                   last_updated, synced
            FROM inventory
            WHERE shop_id = ?1
            "#,
        )
        .bind(shop_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Lists stock records at or below their low-stock threshold.
    pub async fn low_stock(&self, shop_id: &str) -> DbResult<Vec<Inventory>> {
        let rows = sqlx::query_as::<_, Inventory>(
            r#"
            SELECT product_id, shop_id, current_stock, low_stock_threshold,
                   last_updated, synced
            FROM inventory
            WHERE shop_id = ?1 AND current_stock <= low_stock_threshold
            "#,
        )
        .bind(shop_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    // =========================================================================
    // Writes (transaction-scoped)
    // =========================================================================

    /// Gets a stock record inside an open transaction.
    pub async fn get_tx(
        &self,
        conn: &mut SqliteConnection,
        product_id: &str,
    ) -> DbResult<Option<Inventory>> {
        let inv = sqlx::query_as::<_, Inventory>(
            r#"
            SELECT product_id, shop_id, current_stock, low_stock_threshold,
                   last_updated, synced
            FROM inventory
            WHERE product_id = ?1
            "#,
        )
        .bind(product_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(inv)
    }

    /// Inserts a stock record.
    pub async fn insert(&self, conn: &mut SqliteConnection, inv: &Inventory) -> DbResult<()> {
        debug!(product_id = %inv.product_id, stock = inv.current_stock, "Inserting inventory");

        sqlx::query(
            r#"
            INSERT INTO inventory (
                product_id, shop_id, current_stock, low_stock_threshold,
                last_updated, synced
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&inv.product_id)
        .bind(&inv.shop_id)
        .bind(inv.current_stock)
        .bind(inv.low_stock_threshold)
        .bind(inv.last_updated)
        .bind(inv.synced)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Applies a stock delta (negative on checkout, positive on restock) and
    /// resets the synced flag.
    ///
    /// Returns the updated record so the caller can snapshot it into the
    /// mutation log within the same transaction.
    pub async fn adjust_stock(
        &self,
        conn: &mut SqliteConnection,
        product_id: &str,
        delta: i64,
        now: DateTime<Utc>,
    ) -> DbResult<Inventory> {
        let result = sqlx::query(
            r#"
            UPDATE inventory SET
                current_stock = current_stock + ?2,
                last_updated = ?3,
                synced = 0
            WHERE product_id = ?1
            "#,
        )
        .bind(product_id)
        .bind(delta)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Inventory", product_id));
        }

        self.get_tx(conn, product_id)
            .await?
            .ok_or_else(|| DbError::not_found("Inventory", product_id))
    }

    /// Deletes the stock record for a product.
    pub async fn delete(&self, conn: &mut SqliteConnection, product_id: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM inventory WHERE product_id = ?1")
            .bind(product_id)
            .execute(&mut *conn)
            .await?;

        Ok(())
    }

    // =========================================================================
    // Sync engine surface
    // =========================================================================

    /// Flips the synced flag after a confirmed remote write.
    pub async fn mark_synced(&self, product_id: &str) -> DbResult<()> {
        sqlx::query("UPDATE inventory SET synced = 1 WHERE product_id = ?1")
            .bind(product_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Upserts a stock record that arrived from the remote store.
    pub async fn upsert_synced(
        &self,
        conn: &mut SqliteConnection,
        inv: &Inventory,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO inventory (
                product_id, shop_id, current_stock, low_stock_threshold,
                last_updated, synced
            ) VALUES (?1, ?2, ?3, ?4, ?5, 1)
            ON CONFLICT(product_id) DO UPDATE SET
                shop_id = excluded.shop_id,
                current_stock = excluded.current_stock,
                low_stock_threshold = excluded.low_stock_threshold,
                last_updated = excluded.last_updated,
                synced = 1
            "#,
        )
        .bind(&inv.product_id)
        .bind(&inv.shop_id)
        .bind(inv.current_stock)
        .bind(inv.low_stock_threshold)
        .bind(inv.last_updated)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Deletes a stock record removed at the remote store, addressed by its
    /// natural key (`product_id`), not by a remote document id.
    pub async fn delete_remote(
        &self,
        conn: &mut SqliteConnection,
        product_id: &str,
    ) -> DbResult<()> {
        sqlx::query("DELETE FROM inventory WHERE product_id = ?1")
            .bind(product_id)
            .execute(&mut *conn)
            .await?;

        Ok(())
    }

    /// Clears every stock record for a shop (bulk resync).
    pub async fn clear_shop(&self, conn: &mut SqliteConnection, shop_id: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM inventory WHERE shop_id = ?1")
            .bind(shop_id)
            .execute(&mut *conn)
            .await?;

        Ok(())
    }
}
