//! # Expense Repository
//!
//! Database operations for shop expenses.

use sqlx::{SqliteConnection, SqlitePool};

use crate::error::DbResult;
use kirana_core::Expense;

/// Repository for expense database operations.
#[derive(Debug, Clone)]
pub struct ExpenseRepository {
    pool: SqlitePool,
}

impl ExpenseRepository {
    /// Creates a new ExpenseRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ExpenseRepository { pool }
    }

    /// Lists all expenses for a shop, newest first.
    pub async fn list_for_shop(&self, shop_id: &str) -> DbResult<Vec<Expense>> {
        let expenses = sqlx::query_as::<_, Expense>(
            r#"
            SELECT id, shop_id, title, amount_paise, category, date, synced
            FROM expenses
            WHERE shop_id = ?1
            ORDER BY date DESC
            "#,
        )
        .bind(shop_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(expenses)
    }

    /// Lists expenses in one category for a shop, newest first.
    pub async fn list_by_category(&self, shop_id: &str, category: &str) -> DbResult<Vec<Expense>> {
        let expenses = sqlx::query_as::<_, Expense>(
            r#"
            SELECT id, shop_id, title, amount_paise, category, date, synced
            FROM expenses
            WHERE shop_id = ?1 AND category = ?2
            ORDER BY date DESC
            "#,
        )
        .bind(shop_id)
        .bind(category)
        .fetch_all(&self.pool)
        .await?;

        Ok(expenses)
    }

    /// Inserts an expense.
    pub async fn insert(&self, conn: &mut SqliteConnection, expense: &Expense) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO expenses (
                id, shop_id, title, amount_paise, category, date, synced
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&expense.id)
        .bind(&expense.shop_id)
        .bind(&expense.title)
        .bind(expense.amount_paise)
        .bind(&expense.category)
        .bind(expense.date)
        .bind(expense.synced)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}
