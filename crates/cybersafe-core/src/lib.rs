//! CyberSafe Core - severity classification and the safety-state engine.
//!
//! This crate turns per-message risk scores from an external classifier into
//! two durable outcomes for a monitored account:
//!
//! - a one-time alert to a trusted contact once the account becomes blocked
//! - a decaying safety percentage that blocks the app when it reaches zero
//!
//! Message text never enters this crate; only numeric scores do.
//!
//! # Pipeline
//!
//! ```text
//! ScoringEvent -> FrontDoor (validate + classify, sync)
//!              -> SafetyWorker (queue)
//!              -> SafetyEngine -> SafetyLedger::commit_event
//!                              -> AlertDispatcher (only if the latch was won)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use cybersafe_core::{
//!     AlertDispatcher, FrontDoor, MemoryLedger, NewAccount, RiskScores, SafetyEngine,
//!     SafetyPolicy, SafetyWorker, ScoringEvent, SeverityClassifier, WorkerConfig,
//! };
//!
//! # async fn run() -> cybersafe_core::Result<()> {
//! let policy = SafetyPolicy::default();
//! let engine = Arc::new(SafetyEngine::new(
//!     Arc::new(MemoryLedger::new()),
//!     AlertDispatcher::log_only(),
//!     policy.clone(),
//! )?);
//! engine.open_account(NewAccount::new("kid", "Kid"))?;
//!
//! let worker = SafetyWorker::spawn(engine, WorkerConfig::default());
//! let door = FrontDoor::new(SeverityClassifier::new(&policy), worker.handle());
//!
//! let response = door.submit(ScoringEvent::new("kid", "WhatsApp", RiskScores::new(0.1, 0.9, 0.2)))?;
//! println!("{:?}", response.severity);
//!
//! worker.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod account;
pub mod classifier;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod ledger;
pub mod notifications;
pub mod policy;
pub mod worker;

pub use account::{
    Account, AlertRecord, Dashboard, NewAccount, NewAlertRecord, SafetyState, TrustedContact,
};
pub use classifier::{RiskScores, Severity, SeverityClassifier};
pub use engine::{AlertOutcome, ProcessOutcome, SafetyEngine, ScoringJob};
pub use error::{Result, SafetyError};
pub use ingest::{FrontDoor, IngestAction, ScoringEvent, SubmitResponse};
pub use ledger::{
    DeductionOutcome, LedgerError, LedgerResult, MemoryLedger, SafetyLedger, Transition,
};
pub use notifications::{AlertDispatcher, DispatchResult, NotificationChannel, NotificationConfig};
pub use policy::{DeductionTable, SafetyPolicy};
pub use worker::{SafetyWorker, WorkerConfig, WorkerHandle};
