//! Import ledger
//!
//! One row per fully loaded file name. The row is the only signal that a file
//! is done; it is written after the last chunk loads and never changed.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, info};

use super::storage::StorageError;

#[async_trait]
pub trait ImportLedger: Send + Sync {
    async fn already_imported(&self, file_name: &str) -> Result<bool, StorageError>;

    /// Record `file_name` as imported. Returns `false` if it was already there.
    async fn log_import(&self, file_name: &str) -> Result<bool, StorageError>;
}

/// Ledger backed by the `import_log` table
#[derive(Debug, Clone)]
pub struct PgImportLedger {
    pool: PgPool,
}

impl PgImportLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ImportLedger for PgImportLedger {
    async fn already_imported(&self, file_name: &str) -> Result<bool, StorageError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM import_log WHERE file_name = $1)")
                .bind(file_name)
                .fetch_one(&self.pool)
                .await?;

        debug!(file = %file_name, exists, "Ledger checked");
        Ok(exists)
    }

    async fn log_import(&self, file_name: &str) -> Result<bool, StorageError> {
        let result = sqlx::query(
            r#"
            INSERT INTO import_log (file_name, imported_at)
            VALUES ($1, NOW())
            ON CONFLICT (file_name) DO NOTHING
            "#,
        )
        .bind(file_name)
        .execute(&self.pool)
        .await?;

        let recorded = result.rows_affected() == 1;
        info!(file = %file_name, recorded, "Import logged");
        Ok(recorded)
    }
}
