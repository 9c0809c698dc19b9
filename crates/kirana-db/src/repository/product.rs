//! # Product Repository
//!
//! Database operations for the product catalog.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use kirana_core::Product;

/// Repository for product database operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    // =========================================================================
    // Reads (pool)
    // =========================================================================

    /// Gets a product by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, shop_id, name, barcode, price_paise, cost_price_paise,
                   category, unit, is_loose, synced
            FROM products
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Lists all products for a shop, ordered by name.
    pub async fn list_for_shop(&self, shop_id: &str) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, shop_id, name, barcode, price_paise, cost_price_paise,
                   category, unit, is_loose, synced
            FROM products
            WHERE shop_id = ?1
            ORDER BY name
            "#,
        )
        .bind(shop_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Finds a product by barcode within a shop.
    ///
    /// This is the scan path at the register - barcode is a natural key but
    /// only unique per shop, so the shop filter is part of the lookup.
    pub async fn find_by_barcode(&self, shop_id: &str, barcode: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, shop_id, name, barcode, price_paise, cost_price_paise,
                   category, unit, is_loose, synced
            FROM products
            WHERE shop_id = ?1 AND barcode = ?2
            "#,
        )
        .bind(shop_id)
        .bind(barcode)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Searches products by name substring within a shop.
    pub async fn search(&self, shop_id: &str, term: &str, limit: u32) -> DbResult<Vec<Product>> {
        let pattern = format!("%{}%", term);

        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, shop_id, name, barcode, price_paise, cost_price_paise,
                   category, unit, is_loose, synced
            FROM products
            WHERE shop_id = ?1 AND name LIKE ?2
            ORDER BY name
            LIMIT ?3
            "#,
        )
        .bind(shop_id)
        .bind(pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Counts products not yet confirmed at the remote store.
    pub async fn count_unsynced(&self, shop_id: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM products WHERE shop_id = ?1 AND synced = 0",
        )
        .bind(shop_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    // =========================================================================
    // Writes (transaction-scoped)
    // =========================================================================

    /// Gets a product inside an open transaction.
    ///
    /// Pool reads would need a second connection; with a transaction open
    /// they must go through the transaction's own connection.
    pub async fn get_tx(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
    ) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, shop_id, name, barcode, price_paise, cost_price_paise,
                   category, unit, is_loose, synced
            FROM products
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(product)
    }

    /// Inserts a product.
    pub async fn insert(&self, conn: &mut SqliteConnection, product: &Product) -> DbResult<()> {
        debug!(id = %product.id, name = %product.name, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, shop_id, name, barcode, price_paise, cost_price_paise,
                category, unit, is_loose, synced
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&product.id)
        .bind(&product.shop_id)
        .bind(&product.name)
        .bind(&product.barcode)
        .bind(product.price_paise)
        .bind(product.cost_price_paise)
        .bind(&product.category)
        .bind(&product.unit)
        .bind(product.is_loose)
        .bind(product.synced)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Updates a product in full, resetting its synced flag.
    pub async fn update(&self, conn: &mut SqliteConnection, product: &Product) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE products SET
                name = ?2, barcode = ?3, price_paise = ?4, cost_price_paise = ?5,
                category = ?6, unit = ?7, is_loose = ?8, synced = 0
            WHERE id = ?1
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(&product.barcode)
        .bind(product.price_paise)
        .bind(product.cost_price_paise)
        .bind(&product.category)
        .bind(&product.unit)
        .bind(product.is_loose)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", &product.id));
        }

        Ok(())
    }

    /// Deletes a product row.
    pub async fn delete(&self, conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM products WHERE id = ?1")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        Ok(())
    }

    // =========================================================================
    // Sync engine surface
    // =========================================================================

    /// Flips the synced flag after a confirmed remote write.
    pub async fn mark_synced(&self, id: &str) -> DbResult<()> {
        sqlx::query("UPDATE products SET synced = 1 WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Upserts a product that arrived from the remote store.
    ///
    /// Remote state is confirmed state, so the row lands with synced = 1.
    pub async fn upsert_synced(
        &self,
        conn: &mut SqliteConnection,
        product: &Product,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO products (
                id, shop_id, name, barcode, price_paise, cost_price_paise,
                category, unit, is_loose, synced
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 1)
            ON CONFLICT(id) DO UPDATE SET
                shop_id = excluded.shop_id,
                name = excluded.name,
                barcode = excluded.barcode,
                price_paise = excluded.price_paise,
                cost_price_paise = excluded.cost_price_paise,
                category = excluded.category,
                unit = excluded.unit,
                is_loose = excluded.is_loose,
                synced = 1
            "#,
        )
        .bind(&product.id)
        .bind(&product.shop_id)
        .bind(&product.name)
        .bind(&product.barcode)
        .bind(product.price_paise)
        .bind(product.cost_price_paise)
        .bind(&product.category)
        .bind(&product.unit)
        .bind(product.is_loose)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Deletes a product that was removed at the remote store.
    /// Missing rows are fine - the listener may see a removal twice.
    pub async fn delete_remote(&self, conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM products WHERE id = ?1")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        Ok(())
    }

    /// Clears every product row for a shop (bulk resync).
    pub async fn clear_shop(&self, conn: &mut SqliteConnection, shop_id: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM products WHERE shop_id = ?1")
            .bind(shop_id)
            .execute(&mut *conn)
            .await?;

        Ok(())
    }
}
