//! The single SQLite connection shared by the ledger.
//!
//! Every ledger operation takes the guard before it touches a row and keeps
//! it until its transaction ends, so two events for one account never
//! interleave their read and write of the safety score.

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{Result, StorageError};
use crate::schema::run_migrations;

/// Foreign keys on, WAL so dashboard reads don't wait on event writes,
/// and a 2 MB page cache.
const CONNECTION_PRAGMAS: &str = "
    PRAGMA foreign_keys = ON;
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;
    PRAGMA cache_size = -2000;
";

/// Cloneable handle to the ledger's connection.
#[derive(Clone)]
pub struct ConnectionPool {
    conn: Arc<Mutex<Connection>>,
}

impl ConnectionPool {
    /// Opens (or creates) the ledger file and brings its schema up to date.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        Self::prepare(Connection::open(path)?)
    }

    /// Private in-memory ledger, gone when the last handle drops.
    pub fn in_memory() -> Result<Self> {
        Self::prepare(Connection::open_in_memory()?)
    }

    fn prepare(conn: Connection) -> Result<Self> {
        conn.execute_batch(CONNECTION_PRAGMAS)?;
        run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Blocks until no other operation holds the connection.
    ///
    /// A panic while the guard was held poisons the lock; later callers get
    /// a `Config` error instead of a connection in an unknown state.
    pub fn get(&self) -> Result<ConnectionGuard<'_>> {
        self.conn
            .lock()
            .map(|guard| ConnectionGuard { guard })
            .map_err(|_| StorageError::Config("ledger connection poisoned".to_string()))
    }
}

/// Exclusive access to the connection until dropped.
pub struct ConnectionGuard<'a> {
    guard: MutexGuard<'a, Connection>,
}

impl std::ops::Deref for ConnectionGuard<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.guard
    }
}

impl std::ops::DerefMut for ConnectionGuard<'_> {
    fn deref_mut(&mut self) -> &mut Connection {
        &mut self.guard
    }
}
