//! # Customer Repository
//!
//! Database operations for customers and their khata ledger.
//!
//! ## The Khata Invariant
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  customer.khata_balance_paise == Σ(credit amounts) − Σ(debit amounts)  │
//! │                                                                         │
//! │  The balance column is a running total, never recomputed on read.      │
//! │  It is mutated ONLY by apply_khata(), and ops.rs calls apply_khata()   │
//! │  ONLY in the same transaction that inserts the ledger entry - so the   │
//! │  two can never drift, even across crashes.                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use kirana_core::{Customer, KhataTransaction};

/// Repository for customer and khata ledger operations.
#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    /// Creates a new CustomerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    // =========================================================================
    // Customer reads (pool)
    // =========================================================================

    /// Gets a customer by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>(
            r#"
            SELECT id, shop_id, name, phone, khata_balance_paise, last_visit, synced
            FROM customers
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(customer)
    }

    /// Lists all customers for a shop, ordered by name.
    pub async fn list_for_shop(&self, shop_id: &str) -> DbResult<Vec<Customer>> {
        let customers = sqlx::query_as::<_, Customer>(
            r#"
            SELECT id, shop_id, name, phone, khata_balance_paise, last_visit, synced
            FROM customers
            WHERE shop_id = ?1
            ORDER BY name
            "#,
        )
        .bind(shop_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(customers)
    }

    /// Finds a customer by phone number within a shop.
    pub async fn find_by_phone(&self, shop_id: &str, phone: &str) -> DbResult<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>(
            r#"
            SELECT id, shop_id, name, phone, khata_balance_paise, last_visit, synced
            FROM customers
            WHERE shop_id = ?1 AND phone = ?2
            "#,
        )
        .bind(shop_id)
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;

        Ok(customer)
    }

    // =========================================================================
    // Customer writes (transaction-scoped)
    // =========================================================================

    /// Gets a customer inside an open transaction.
    pub async fn get_tx(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
    ) -> DbResult<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>(
            r#"
            SELECT id, shop_id, name, phone, khata_balance_paise, last_visit, synced
            FROM customers
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(customer)
    }

    /// Inserts a customer.
    pub async fn insert(&self, conn: &mut SqliteConnection, customer: &Customer) -> DbResult<()> {
        debug!(id = %customer.id, name = %customer.name, "Inserting customer");

        sqlx::query(
            r#"
            INSERT INTO customers (
                id, shop_id, name, phone, khata_balance_paise, last_visit, synced
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&customer.id)
        .bind(&customer.shop_id)
        .bind(&customer.name)
        .bind(&customer.phone)
        .bind(customer.khata_balance_paise)
        .bind(customer.last_visit)
        .bind(customer.synced)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Applies a signed khata delta to the running balance (credits
    /// positive, debits negative), stamps the visit, resets synced.
    ///
    /// Must be called in the SAME transaction that inserts the matching
    /// ledger entry - see the module docs.
    pub async fn apply_khata(
        &self,
        conn: &mut SqliteConnection,
        customer_id: &str,
        signed_delta_paise: i64,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE customers SET
                khata_balance_paise = khata_balance_paise + ?2,
                last_visit = ?3,
                synced = 0
            WHERE id = ?1
            "#,
        )
        .bind(customer_id)
        .bind(signed_delta_paise)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Customer", customer_id));
        }

        Ok(())
    }

    // =========================================================================
    // Khata ledger
    // =========================================================================

    /// Inserts a ledger entry. Append-only: there is no update or delete.
    pub async fn insert_khata(
        &self,
        conn: &mut SqliteConnection,
        tx: &KhataTransaction,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO khata_transactions (
                id, shop_id, customer_id, amount_paise, entry_type,
                reference_bill_id, date, synced
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&tx.id)
        .bind(&tx.shop_id)
        .bind(&tx.customer_id)
        .bind(tx.amount_paise)
        .bind(tx.entry_type)
        .bind(&tx.reference_bill_id)
        .bind(tx.date)
        .bind(tx.synced)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Lists a customer's ledger entries, newest first.
    pub async fn khata_for_customer(&self, customer_id: &str) -> DbResult<Vec<KhataTransaction>> {
        let entries = sqlx::query_as::<_, KhataTransaction>(
            r#"
            SELECT id, shop_id, customer_id, amount_paise, entry_type,
                   reference_bill_id, date, synced
            FROM khata_transactions
            WHERE customer_id = ?1
            ORDER BY date DESC
            "#,
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Recomputes the ledger sum for a customer from scratch.
    ///
    /// Diagnostic counterpart of the running balance: the two must always
    /// agree (credits positive, debits negative).
    pub async fn ledger_sum(&self, customer_id: &str) -> DbResult<i64> {
        let sum: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT SUM(CASE WHEN entry_type = 'credit' THEN amount_paise
                            ELSE -amount_paise END)
            FROM khata_transactions
            WHERE customer_id = ?1
            "#,
        )
        .bind(customer_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(sum.unwrap_or(0))
    }

    // =========================================================================
    // Sync engine surface
    // =========================================================================

    /// Flips the synced flag after a confirmed remote write.
    pub async fn mark_synced(&self, id: &str) -> DbResult<()> {
        sqlx::query("UPDATE customers SET synced = 1 WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Upserts a customer that arrived from the remote store.
    pub async fn upsert_synced(
        &self,
        conn: &mut SqliteConnection,
        customer: &Customer,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO customers (
                id, shop_id, name, phone, khata_balance_paise, last_visit, synced
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1)
            ON CONFLICT(id) DO UPDATE SET
                shop_id = excluded.shop_id,
                name = excluded.name,
                phone = excluded.phone,
                khata_balance_paise = excluded.khata_balance_paise,
                last_visit = excluded.last_visit,
                synced = 1
            "#,
        )
        .bind(&customer.id)
        .bind(&customer.shop_id)
        .bind(&customer.name)
        .bind(&customer.phone)
        .bind(customer.khata_balance_paise)
        .bind(customer.last_visit)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Clears every customer row for a shop (bulk resync).
    pub async fn clear_shop(&self, conn: &mut SqliteConnection, shop_id: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM customers WHERE shop_id = ?1")
            .bind(shop_id)
            .execute(&mut *conn)
            .await?;

        Ok(())
    }
}
