//! High-level database interface.

use std::path::PathBuf;

use directories::ProjectDirs;
use tracing::info;

use crate::error::{Result, StorageError};
use crate::pool::ConnectionPool;
use crate::repository::{AccountsRepo, AlertsRepo};

/// SQLite-backed store for CyberSafe accounts and alert history.
#[derive(Clone)]
pub struct Database {
    pub(crate) pool: ConnectionPool,
}

impl Database {
    /// Create a new database in the default app data directory.
    pub fn new() -> Result<Self> {
        Self::with_path(Self::default_db_path()?)
    }

    /// Create a new database at a specific path.
    pub fn with_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!("Opening database at: {:?}", path);
        let pool = ConnectionPool::new(&path)?;

        Ok(Self { pool })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let pool = ConnectionPool::in_memory()?;
        Ok(Self { pool })
    }

    /// Get the default database path.
    pub fn default_db_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "cybersafe", "cybersafe")
            .ok_or_else(|| StorageError::Config("Could not determine app data directory".into()))?;

        Ok(proj_dirs.data_dir().join("cybersafe.db"))
    }

    /// Number of registered accounts.
    pub fn count_accounts(&self) -> Result<i64> {
        let conn = self.pool.get()?;
        AccountsRepo::count(&conn)
    }

    /// Number of history rows for an account, Low included.
    pub fn count_alerts(&self, account_id: &str) -> Result<i64> {
        let conn = self.pool.get()?;
        AlertsRepo::count_for_account(&conn, account_id)
    }
}
