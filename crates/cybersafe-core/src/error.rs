//! Error taxonomy for the safety pipeline.

use thiserror::Error;

use crate::ledger::LedgerError;

/// Errors surfaced by the front door, engine, and administrative operations.
#[derive(Debug, Error)]
pub enum SafetyError {
    /// Unknown account.
    #[error("account not found: {0}")]
    NotFound(String),

    /// Account id already registered.
    #[error("account already exists: {0}")]
    AlreadyExists(String),

    /// Malformed input, rejected before any side effect.
    #[error("validation error: {0}")]
    Validation(String),

    /// Ledger write failed; the transition was not applied.
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// Notification could not be delivered.
    #[error("dispatch failure: {0}")]
    Dispatch(String),

    /// Invalid policy or component configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<LedgerError> for SafetyError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound(id) => SafetyError::NotFound(id),
            LedgerError::AlreadyExists(id) => SafetyError::AlreadyExists(id),
            LedgerError::Persistence(msg) => SafetyError::Persistence(msg),
        }
    }
}

/// Result type for safety operations.
pub type Result<T> = std::result::Result<T, SafetyError>;
