//! # Store Settings Repository
//!
//! Database operations for the per-shop settings singleton.

use sqlx::{SqliteConnection, SqlitePool};

use crate::error::DbResult;
use kirana_core::StoreSettings;

/// Repository for store settings operations.
#[derive(Debug, Clone)]
pub struct SettingsRepository {
    pool: SqlitePool,
}

const SETTINGS_COLUMNS: &str = r#"
    id, shop_id, store_name, address, phone, upi_id, printer_name,
    auto_print, print_logo, gst_enabled, gst_number, gst_rate_bps,
    tax_inclusive, synced
"#;

impl SettingsRepository {
    /// Creates a new SettingsRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SettingsRepository { pool }
    }

    /// Gets the settings for a shop, if saved yet.
    pub async fn get_for_shop(&self, shop_id: &str) -> DbResult<Option<StoreSettings>> {
        let settings = sqlx::query_as::<_, StoreSettings>(&format!(
            "SELECT {SETTINGS_COLUMNS} FROM store_settings WHERE shop_id = ?1"
        ))
        .bind(shop_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(settings)
    }

    /// Upserts the settings singleton, resetting its synced flag.
    pub async fn upsert(
        &self,
        conn: &mut SqliteConnection,
        settings: &StoreSettings,
    ) -> DbResult<()> {
        self.upsert_with_synced(conn, settings, false).await
    }

    /// Upserts settings that arrived from the remote store.
    pub async fn upsert_synced(
        &self,
        conn: &mut SqliteConnection,
        settings: &StoreSettings,
    ) -> DbResult<()> {
        self.upsert_with_synced(conn, settings, true).await
    }

    async fn upsert_with_synced(
        &self,
        conn: &mut SqliteConnection,
        settings: &StoreSettings,
        synced: bool,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO store_settings (
                id, shop_id, store_name, address, phone, upi_id, printer_name,
                auto_print, print_logo, gst_enabled, gst_number, gst_rate_bps,
                tax_inclusive, synced
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            ON CONFLICT(id) DO UPDATE SET
                shop_id = excluded.shop_id,
                store_name = excluded.store_name,
                address = excluded.address,
                phone = excluded.phone,
                upi_id = excluded.upi_id,
                printer_name = excluded.printer_name,
                auto_print = excluded.auto_print,
                print_logo = excluded.print_logo,
                gst_enabled = excluded.gst_enabled,
                gst_number = excluded.gst_number,
                gst_rate_bps = excluded.gst_rate_bps,
                tax_inclusive = excluded.tax_inclusive,
                synced = excluded.synced
            "#,
        )
        .bind(&settings.id)
        .bind(&settings.shop_id)
        .bind(&settings.store_name)
        .bind(&settings.address)
        .bind(&settings.phone)
        .bind(&settings.upi_id)
        .bind(&settings.printer_name)
        .bind(settings.auto_print)
        .bind(settings.print_logo)
        .bind(settings.gst_enabled)
        .bind(&settings.gst_number)
        .bind(settings.gst_rate_bps)
        .bind(settings.tax_inclusive)
        .bind(synced)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Clears the settings row for a shop (bulk resync).
    pub async fn clear_shop(&self, conn: &mut SqliteConnection, shop_id: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM store_settings WHERE shop_id = ?1")
            .bind(shop_id)
            .execute(&mut *conn)
            .await?;

        Ok(())
    }
}
