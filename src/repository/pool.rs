//! Async SQLite connection factory.
//!
//! Uses diesel-async's SyncConnectionWrapper to provide an async interface
//! for SQLite. SQLite connections are cheap to open, so a connection is
//! established per operation rather than pooled.

use std::path::Path;

use diesel::sqlite::SqliteConnection;
use diesel_async::sync_connection_wrapper::SyncConnectionWrapper;
use diesel_async::{AsyncConnection, SimpleAsyncConnection};

use super::util::to_diesel_error;

/// Diesel error type alias.
pub type DbError = diesel::result::Error;

/// Async SQLite connection type.
pub type SqliteConn = SyncConnectionWrapper<SqliteConnection>;

/// How long a connection waits on a locked database before failing.
const BUSY_TIMEOUT_MS: u32 = 5_000;

/// SQLite connection factory shared by all repositories.
#[derive(Clone, Debug)]
pub struct DbPool {
    database_url: String,
}

impl DbPool {
    /// Create a pool from a database URL or plain file path.
    pub fn new(database_url: &str) -> Self {
        // Strip sqlite: prefix if present
        let url = database_url.strip_prefix("sqlite:").unwrap_or(database_url);
        Self {
            database_url: url.to_string(),
        }
    }

    /// Create pool from a file path.
    pub fn from_path(path: &Path) -> Self {
        Self::new(&path.display().to_string())
    }

    /// Get a connection.
    pub async fn get(&self) -> Result<SqliteConn, DbError> {
        let mut conn = SqliteConn::establish(&self.database_url)
            .await
            .map_err(to_diesel_error)?;
        conn.batch_execute(&format!("PRAGMA busy_timeout = {};", BUSY_TIMEOUT_MS))
            .await?;
        Ok(conn)
    }

    /// Get the database URL.
    pub fn database_url(&self) -> &str {
        &self.database_url
    }
}
