//! Destination table for cleaned rows
//!
//! Every chunk is one independent multi-row `INSERT`. Chunks of a file are not
//! wrapped in a common transaction: when chunk k fails, chunks before it stay
//! stored and the import is not recorded, so the next attempt appends them
//! again.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use thiserror::Error;
use tracing::{debug, info};

use super::models::CleanedRecordBatch;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid table name: {0}")]
    InvalidTable(String),

    #[error("Write rejected: {0}")]
    Rejected(String),
}

/// Appends cleaned chunks to the destination
#[async_trait]
pub trait BatchLoader: Send + Sync {
    /// Append one chunk, returning the number of rows written
    async fn append(&self, batch: &CleanedRecordBatch) -> Result<u64, StorageError>;
}

/// PostgreSQL loader storing each row as JSONB
///
/// ```sql
/// CREATE TABLE call_logs (
///     id          BIGSERIAL PRIMARY KEY,
///     source_file TEXT NOT NULL,
///     row_number  BIGINT NOT NULL,
///     record      JSONB NOT NULL,
///     loaded_at   TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
#[derive(Debug, Clone)]
pub struct PgBatchLoader {
    pool: PgPool,
    table: String,
}

impl PgBatchLoader {
    pub fn new(pool: PgPool, table: impl Into<String>) -> Result<Self, StorageError> {
        let table = table.into();
        if !is_identifier(&table) {
            return Err(StorageError::InvalidTable(table));
        }
        Ok(Self { pool, table })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the destination table if it does not exist yet
    pub async fn ensure_table(&self) -> Result<(), StorageError> {
        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id          BIGSERIAL PRIMARY KEY,
                source_file TEXT NOT NULL,
                row_number  BIGINT NOT NULL,
                record      JSONB NOT NULL,
                loaded_at   TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            table = self.table
        );
        sqlx::query(&ddl).execute(&self.pool).await?;

        let index = format!(
            "CREATE INDEX IF NOT EXISTS {table}_source_file_idx ON {table} (source_file)",
            table = self.table
        );
        sqlx::query(&index).execute(&self.pool).await?;

        info!(table = %self.table, "Destination table ready");
        Ok(())
    }
}

#[async_trait]
impl BatchLoader for PgBatchLoader {
    async fn append(&self, batch: &CleanedRecordBatch) -> Result<u64, StorageError> {
        if batch.is_empty() {
            return Ok(0);
        }

        let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "INSERT INTO {} (source_file, row_number, record) ",
            self.table
        ));

        query_builder.push_values(&batch.rows, |mut b, row| {
            b.push_bind(batch.source_file.clone())
                .push_bind(row.number as i64)
                .push_bind(batch.row_as_json(row));
        });

        let result = query_builder.build().execute(&self.pool).await?;

        debug!(
            table = %self.table,
            file = %batch.source_file,
            chunk = batch.index,
            rows = result.rows_affected(),
            "Chunk appended"
        );
        Ok(result.rows_affected())
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && name.len() <= 63
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_check() {
        assert!(is_identifier("call_logs"));
        assert!(is_identifier("_staging"));
        assert!(!is_identifier("call-logs"));
        assert!(!is_identifier("1calls"));
        assert!(!is_identifier("calls; DROP TABLE import_log"));
        assert!(!is_identifier(""));
    }

    #[tokio::test]
    async fn test_loader_rejects_bad_table_name() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/incoming")
            .unwrap();
        let err = PgBatchLoader::new(pool, "calls logs").unwrap_err();
        assert!(matches!(err, StorageError::InvalidTable(_)));
    }
}
