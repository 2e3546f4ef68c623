//! CyberSafe Storage - SQLite persistence for the safety ledger.
//!
//! This crate implements [`cybersafe_core::SafetyLedger`] on SQLite:
//!
//! - one row per monitored account (safety, block flag, alert latch, contact)
//! - append-only alert history holding scores, never message text
//!
//! # Example
//!
//! ```no_run
//! use cybersafe_core::{NewAccount, SafetyLedger};
//! use cybersafe_storage::Database;
//!
//! let db = Database::in_memory().unwrap();
//! db.open_account(NewAccount::new("kid", "Kid")).unwrap();
//! let history = db.alert_history("kid", 100, false).unwrap();
//! assert!(history.is_empty());
//! ```

mod database;
pub mod error;
mod ledger;
mod pool;
pub mod repository;
mod schema;

pub use database::Database;
pub use error::{Result, StorageError};
pub use pool::ConnectionPool;
