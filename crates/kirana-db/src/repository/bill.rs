//! # Bill Repository
//!
//! Database operations for bills.
//!
//! Bills are immutable once created (except for the local synced flag), and
//! their line items are a JSON snapshot column - the items were frozen at
//! checkout and are never queried relationally.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use kirana_core::{Bill, BillItem, BillStatus, PaymentMode};

/// Repository for bill database operations.
#[derive(Debug, Clone)]
pub struct BillRepository {
    pool: SqlitePool,
}

const BILL_COLUMNS: &str = r#"
    id, shop_id, items, total_paise, payment_mode,
    customer_id, customer_name, customer_phone,
    profit_paise, created_at, status, synced
"#;

impl BillRepository {
    /// Creates a new BillRepository.
    pub fn new(pool: SqlitePool) -> Self {
        BillRepository { pool }
    }

    // =========================================================================
    // Reads (pool)
    // =========================================================================

    /// Gets a bill by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Bill>> {
        let row = sqlx::query(&format!("SELECT {BILL_COLUMNS} FROM bills WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(row_to_bill).transpose()
    }

    /// Lists the most recent bills for a shop, newest first.
    pub async fn list_recent(&self, shop_id: &str, limit: u32) -> DbResult<Vec<Bill>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {BILL_COLUMNS} FROM bills
            WHERE shop_id = ?1
            ORDER BY created_at DESC
            LIMIT ?2
            "#
        ))
        .bind(shop_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_bill).collect()
    }

    /// Lists bills attributed to one customer, newest first.
    pub async fn list_for_customer(&self, shop_id: &str, customer_id: &str) -> DbResult<Vec<Bill>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {BILL_COLUMNS} FROM bills
            WHERE shop_id = ?1 AND customer_id = ?2
            ORDER BY created_at DESC
            "#
        ))
        .bind(shop_id)
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_bill).collect()
    }

    /// Counts bills not yet confirmed at the remote store.
    pub async fn count_unsynced(&self, shop_id: &str) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM bills WHERE shop_id = ?1 AND synced = 0")
                .bind(shop_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    // =========================================================================
    // Writes (transaction-scoped)
    // =========================================================================

    /// Inserts a bill.
    pub async fn insert(&self, conn: &mut SqliteConnection, bill: &Bill) -> DbResult<()> {
        debug!(id = %bill.id, total = bill.total_paise, "Inserting bill");

        let items_json = serde_json::to_string(&bill.items)?;

        sqlx::query(
            r#"
            INSERT INTO bills (
                id, shop_id, items, total_paise, payment_mode,
                customer_id, customer_name, customer_phone,
                profit_paise, created_at, status, synced
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&bill.id)
        .bind(&bill.shop_id)
        .bind(items_json)
        .bind(bill.total_paise)
        .bind(bill.payment_mode)
        .bind(&bill.customer_id)
        .bind(&bill.customer_name)
        .bind(&bill.customer_phone)
        .bind(bill.profit_paise)
        .bind(bill.created_at)
        .bind(bill.status)
        .bind(bill.synced)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    // =========================================================================
    // Sync engine surface
    // =========================================================================

    /// Flips the synced flag after a confirmed remote write.
    pub async fn mark_synced(&self, id: &str) -> DbResult<()> {
        sqlx::query("UPDATE bills SET synced = 1 WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Upserts a bill that arrived from the remote store (bulk resync).
    pub async fn upsert_synced(&self, conn: &mut SqliteConnection, bill: &Bill) -> DbResult<()> {
        let items_json = serde_json::to_string(&bill.items)?;

        sqlx::query(
            r#"
            INSERT INTO bills (
                id, shop_id, items, total_paise, payment_mode,
                customer_id, customer_name, customer_phone,
                profit_paise, created_at, status, synced
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 1)
            ON CONFLICT(id) DO UPDATE SET
                shop_id = excluded.shop_id,
                items = excluded.items,
                total_paise = excluded.total_paise,
                payment_mode = excluded.payment_mode,
                customer_id = excluded.customer_id,
                customer_name = excluded.customer_name,
                customer_phone = excluded.customer_phone,
                profit_paise = excluded.profit_paise,
                created_at = excluded.created_at,
                status = excluded.status,
                synced = 1
            "#,
        )
        .bind(&bill.id)
        .bind(&bill.shop_id)
        .bind(items_json)
        .bind(bill.total_paise)
        .bind(bill.payment_mode)
        .bind(&bill.customer_id)
        .bind(&bill.customer_name)
        .bind(&bill.customer_phone)
        .bind(bill.profit_paise)
        .bind(bill.created_at)
        .bind(bill.status)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Clears every bill row for a shop (bulk resync).
    pub async fn clear_shop(&self, conn: &mut SqliteConnection, shop_id: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM bills WHERE shop_id = ?1")
            .bind(shop_id)
            .execute(&mut *conn)
            .await?;

        Ok(())
    }
}

/// Maps a bill row, decoding the JSON items column.
fn row_to_bill(row: SqliteRow) -> DbResult<Bill> {
    let items_json: String = row.try_get("items")?;
    let items: Vec<BillItem> = serde_json::from_str(&items_json)?;

    Ok(Bill {
        id: row.try_get("id")?,
        shop_id: row.try_get("shop_id")?,
        items,
        total_paise: row.try_get("total_paise")?,
        payment_mode: row.try_get::<PaymentMode, _>("payment_mode")?,
        customer_id: row.try_get("customer_id")?,
        customer_name: row.try_get("customer_name")?,
        customer_phone: row.try_get("customer_phone")?,
        profit_paise: row.try_get("profit_paise")?,
        created_at: row.try_get("created_at")?,
        status: row.try_get::<BillStatus, _>("status")?,
        synced: row.try_get("synced")?,
    })
}
