//! Database context for managing the connection factory and repository access.

use std::path::Path;

use diesel_async::SimpleAsyncConnection;

use super::pool::{DbError, DbPool};
use super::receipt::DieselReceiptRepository;

/// Entry point for database operations.
///
/// Create one context per command or server, then use it to access repositories.
///
/// # Example
/// ```ignore
/// let ctx = DbContext::from_url("sqlite:receiptd.db");
/// ctx.init_schema().await?;
/// let receipts = ctx.receipts().get_all().await?;
/// ```
#[derive(Clone, Debug)]
pub struct DbContext {
    pool: DbPool,
}

impl DbContext {
    /// Create a context from a database URL or file path.
    pub fn from_url(database_url: &str) -> Self {
        Self {
            pool: DbPool::new(database_url),
        }
    }

    /// Create a context for a SQLite file.
    pub fn from_sqlite_path(db_path: &Path) -> Self {
        Self {
            pool: DbPool::from_path(db_path),
        }
    }

    /// Get the underlying connection factory.
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Get a receipt repository.
    pub fn receipts(&self) -> DieselReceiptRepository {
        DieselReceiptRepository::new(self.pool.clone())
    }

    /// Create tables if they don't exist.
    pub async fn init_schema(&self) -> Result<(), DbError> {
        let mut conn = self.pool.get().await?;
        conn.batch_execute(
            r#"
            CREATE TABLE IF NOT EXISTS receipts (
                id TEXT PRIMARY KEY,
                owner TEXT NOT NULL,
                image_url TEXT NOT NULL,
                uploaded_at TEXT NOT NULL,
                fields TEXT NOT NULL DEFAULT '{}'
            );

            CREATE INDEX IF NOT EXISTS idx_receipts_uploaded_at ON receipts(uploaded_at);
            CREATE INDEX IF NOT EXISTS idx_receipts_owner ON receipts(owner);
            "#,
        )
        .await
    }

    /// Open a connection and run a trivial query.
    pub async fn test_connection(&self) -> Result<(), DbError> {
        let mut conn = self.pool.get().await?;
        conn.batch_execute("SELECT 1;").await
    }
}
