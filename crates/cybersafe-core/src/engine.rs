//! The safety-state engine.
//!
//! Per account the engine drives a two-state machine over
//! `(safety_percentage, app_blocked)`:
//!
//! ```text
//!   Healthy --(deduction reaches 0)--> Blocked --(unlock)--> Healthy
//! ```
//!
//! `alert_already_sent` is a latch orthogonal to that state. Only the event
//! whose deduction performs the Healthy -> Blocked crossing can win it, and
//! only the winner dispatches an alert. A failed dispatch is logged and not
//! retried, and the latch stays set: a missed notification is preferred over
//! a duplicate one.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::account::{
    Account, AlertRecord, Dashboard, NewAccount, NewAlertRecord, TrustedContact,
};
use crate::classifier::{RiskScores, Severity};
use crate::error::{Result, SafetyError};
use crate::ledger::{LedgerError, SafetyLedger, Transition};
use crate::notifications::{AlertDispatcher, DispatchResult};
use crate::policy::SafetyPolicy;

/// Number of records shown on the dashboard.
pub const DASHBOARD_ALERT_LIMIT: usize = 100;

/// Summary line included in every alert.
const ALERT_SUMMARY: &str = "High-risk behavior detected.";

/// A classified event handed from the front door to the background lane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringJob {
    pub account_id: String,
    pub source_app: String,
    pub scores: RiskScores,
    pub severity: Severity,
    /// When the front door accepted the event.
    pub received_at: DateTime<Utc>,
}

/// What happened to the one-time alert for an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertOutcome {
    /// The event did not win the latch.
    NotTriggered,
    /// Latch won but the account has no trusted contact or parent email.
    NoRecipient,
    /// Latch won and the dispatcher was called.
    Dispatched(DispatchResult),
}

/// Result of processing one event.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessOutcome {
    pub transition: Transition,
    pub alert: AlertOutcome,
}

/// Orchestrates classification results, the ledger, and the dispatcher.
pub struct SafetyEngine {
    ledger: Arc<dyn SafetyLedger>,
    dispatcher: AlertDispatcher,
    policy: SafetyPolicy,
}

impl SafetyEngine {
    /// Creates an engine. The policy is validated here.
    pub fn new(
        ledger: Arc<dyn SafetyLedger>,
        dispatcher: AlertDispatcher,
        policy: SafetyPolicy,
    ) -> Result<Self> {
        policy.validate()?;
        Ok(Self {
            ledger,
            dispatcher,
            policy,
        })
    }

    /// The policy this engine applies.
    pub fn policy(&self) -> &SafetyPolicy {
        &self.policy
    }

    /// Applies one classified event.
    ///
    /// The ledger commit is all-or-nothing: on a persistence failure the
    /// event is dropped and the error returned, with no retry.
    pub async fn process(&self, job: ScoringJob) -> Result<ProcessOutcome> {
        let deduction = self.policy.deduction_for(job.severity);

        let record = NewAlertRecord {
            account_id: job.account_id.clone(),
            source_app: job.source_app.clone(),
            severity: job.severity,
            deduction,
            scores: job.scores,
            timestamp: job.received_at,
        };

        let transition = self.ledger.commit_event(record).map_err(|e| {
            error!(
                account_id = %job.account_id,
                severity = %job.severity,
                "Dropping scoring event: {}",
                e
            );
            SafetyError::from(e)
        })?;

        let outcome = &transition.deduction;
        if deduction > 0 {
            info!(
                account_id = %job.account_id,
                severity = %job.severity,
                previous = outcome.previous_safety,
                current = outcome.new_safety,
                "Safety deducted"
            );
        } else {
            debug!(account_id = %job.account_id, severity = %job.severity, "Event logged");
        }

        if outcome.crossed_into_block() {
            warn!(account_id = %job.account_id, "Safety reached zero, app blocked");
        }

        let alert = if transition.alert_latched {
            self.send_alert(&job.account_id, job.severity).await
        } else {
            AlertOutcome::NotTriggered
        };

        Ok(ProcessOutcome { transition, alert })
    }

    /// Dispatches the one-time alert after the latch has been won.
    async fn send_alert(&self, account_id: &str, severity: Severity) -> AlertOutcome {
        let recipient = match self.resolve_recipient(account_id) {
            Ok(Some(recipient)) => recipient,
            Ok(None) => {
                warn!(account_id, "Alert latched but no trusted contact or parent email");
                return AlertOutcome::NoRecipient;
            }
            Err(e) => {
                error!(account_id, "Alert latched but recipient lookup failed: {}", e);
                return AlertOutcome::Dispatched(DispatchResult::Failed);
            }
        };

        let result = self
            .dispatcher
            .dispatch(&recipient, severity, ALERT_SUMMARY)
            .await;

        match &result {
            DispatchResult::Sent => {
                info!(account_id, channel = self.dispatcher.channel_name(), "Trusted contact alerted")
            }
            failure => error!(
                account_id,
                channel = self.dispatcher.channel_name(),
                "{} (not retried)",
                SafetyError::Dispatch(format!("{:?}", failure))
            ),
        }

        AlertOutcome::Dispatched(result)
    }

    /// The account's trusted contact, falling back to the linked parent's email.
    fn resolve_recipient(&self, account_id: &str) -> Result<Option<TrustedContact>> {
        let account = self.ledger.read_account(account_id)?;

        if let Some(contact) = account.trusted_contact {
            return Ok(Some(contact));
        }

        let Some(parent_id) = account.parent_account_id else {
            return Ok(None);
        };

        match self.ledger.read_account(&parent_id) {
            Ok(parent) => Ok(parent
                .email
                .map(|email| TrustedContact::new(parent.display_name, email))),
            Err(LedgerError::NotFound(_)) => {
                warn!(account_id, parent_id = %parent_id, "Linked parent account not found");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    // === Administrative operations ===

    /// Registers a new account at full safety.
    pub fn open_account(&self, new: NewAccount) -> Result<Account> {
        new.validate()?;
        let account = self.ledger.open_account(new)?;
        info!(account_id = %account.account_id, "Account opened");
        Ok(account)
    }

    /// Unconditionally returns an account to Healthy and re-arms its alert.
    pub fn unlock_account(&self, account_id: &str) -> Result<Account> {
        let account = self.ledger.reset_account(account_id)?;
        info!(account_id, "Account unlocked");
        Ok(account)
    }

    /// Replaces the trusted contact. The alert latch is cleared because it
    /// referred to the previous contact.
    pub fn set_trusted_contact(
        &self,
        account_id: &str,
        contact: TrustedContact,
    ) -> Result<Account> {
        contact.validate()?;
        let account = self.ledger.set_trusted_contact(account_id, contact)?;
        info!(account_id, "Trusted contact updated, alert re-armed");
        Ok(account)
    }

    // === Queries ===

    /// Reads an account.
    pub fn account(&self, account_id: &str) -> Result<Account> {
        Ok(self.ledger.read_account(account_id)?)
    }

    /// Safety, block flag, and Medium/High alerts for the parent dashboard.
    pub fn dashboard(&self, account_id: &str) -> Result<Dashboard> {
        let account = self.ledger.read_account(account_id)?;
        let alerts = self
            .ledger
            .alert_history(account_id, DASHBOARD_ALERT_LIMIT, false)?;
        Ok(Dashboard::new(&account, alerts))
    }

    /// Full history including Low-severity records, newest first.
    pub fn alert_history(&self, account_id: &str, limit: usize) -> Result<Vec<AlertRecord>> {
        Ok(self.ledger.alert_history(account_id, limit, true)?)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::classifier::SeverityClassifier;
    use crate::ledger::{DeductionOutcome, LedgerResult, MemoryLedger};
    use crate::notifications::NotificationChannel;
    use crate::policy::FULL_SAFETY;

    /// Ledger implementing only the primitives, so `commit_event` runs the
    /// trait's default composition.
    #[derive(Default)]
    struct FakeLedger {
        accounts: Mutex<HashMap<String, Account>>,
        history: Mutex<Vec<AlertRecord>>,
        latch_calls: Mutex<usize>,
        fail_writes: AtomicBool,
    }

    impl FakeLedger {
        fn check_writable(&self) -> LedgerResult<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(LedgerError::Persistence("disk full".to_string()));
            }
            Ok(())
        }
    }

    impl SafetyLedger for FakeLedger {
        fn open_account(&self, new: NewAccount) -> LedgerResult<Account> {
            let account = Account::open(new, Utc::now());
            self.accounts
                .lock()
                .unwrap()
                .insert(account.account_id.clone(), account.clone());
            Ok(account)
        }

        fn read_account(&self, account_id: &str) -> LedgerResult<Account> {
            self.accounts
                .lock()
                .unwrap()
                .get(account_id)
                .cloned()
                .ok_or_else(|| LedgerError::NotFound(account_id.to_string()))
        }

        fn apply_deduction(&self, account_id: &str, amount: u8) -> LedgerResult<DeductionOutcome> {
            self.check_writable()?;
            let mut accounts = self.accounts.lock().unwrap();
            let account = accounts
                .get_mut(account_id)
                .ok_or_else(|| LedgerError::NotFound(account_id.to_string()))?;
            let outcome =
                DeductionOutcome::compute(account.safety_percentage, account.app_blocked, amount);
            account.safety_percentage = outcome.new_safety;
            account.app_blocked = outcome.is_now_blocked;
            Ok(outcome)
        }

        fn latch_alert_sent(&self, account_id: &str) -> LedgerResult<bool> {
            *self.latch_calls.lock().unwrap() += 1;
            let mut accounts = self.accounts.lock().unwrap();
            let account = accounts
                .get_mut(account_id)
                .ok_or_else(|| LedgerError::NotFound(account_id.to_string()))?;
            let won = !account.alert_already_sent;
            account.alert_already_sent = true;
            Ok(won)
        }

        fn append_history(&self, record: NewAlertRecord) -> LedgerResult<AlertRecord> {
            self.check_writable()?;
            let mut history = self.history.lock().unwrap();
            let record = AlertRecord::from_new(history.len() as i64 + 1, record);
            history.push(record.clone());
            Ok(record)
        }

        fn reset_account(&self, account_id: &str) -> LedgerResult<Account> {
            let mut accounts = self.accounts.lock().unwrap();
            let account = accounts
                .get_mut(account_id)
                .ok_or_else(|| LedgerError::NotFound(account_id.to_string()))?;
            account.safety_percentage = FULL_SAFETY;
            account.app_blocked = false;
            account.alert_already_sent = false;
            Ok(account.clone())
        }

        fn set_trusted_contact(
            &self,
            account_id: &str,
            contact: TrustedContact,
        ) -> LedgerResult<Account> {
            let mut accounts = self.accounts.lock().unwrap();
            let account = accounts
                .get_mut(account_id)
                .ok_or_else(|| LedgerError::NotFound(account_id.to_string()))?;
            account.trusted_contact = Some(contact);
            account.alert_already_sent = false;
            Ok(account.clone())
        }

        fn alert_history(
            &self,
            account_id: &str,
            limit: usize,
            include_low: bool,
        ) -> LedgerResult<Vec<AlertRecord>> {
            Ok(self
                .history
                .lock()
                .unwrap()
                .iter()
                .rev()
                .filter(|r| r.account_id == account_id)
                .filter(|r| include_low || r.severity.is_reportable())
                .take(limit)
                .cloned()
                .collect())
        }
    }

    #[derive(Default)]
    struct RecordingChannel {
        sent: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl NotificationChannel for RecordingChannel {
        async fn send(&self, address: &str, _subject: &str, _body: &str) -> bool {
            self.sent.lock().unwrap().push(address.to_string());
            !self.fail
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    fn policy() -> SafetyPolicy {
        SafetyPolicy::with_thresholds(0.8, 0.5).unwrap()
    }

    fn setup(
        ledger: Arc<dyn SafetyLedger>,
        fail_dispatch: bool,
    ) -> (SafetyEngine, Arc<RecordingChannel>) {
        let channel = Arc::new(RecordingChannel {
            fail: fail_dispatch,
            ..RecordingChannel::default()
        });
        let engine =
            SafetyEngine::new(ledger, AlertDispatcher::new(channel.clone()), policy()).unwrap();
        engine
            .open_account(
                NewAccount::new("kid", "Kid")
                    .with_trusted_contact(TrustedContact::new("Aunt May", "may@example.com")),
            )
            .unwrap();
        (engine, channel)
    }

    fn job(engine: &SafetyEngine, insult: f64, threat: f64, bullying: f64) -> ScoringJob {
        let scores = RiskScores::new(insult, threat, bullying);
        ScoringJob {
            account_id: "kid".to_string(),
            source_app: "Instagram".to_string(),
            scores,
            severity: SeverityClassifier::new(engine.policy()).classify(&scores),
            received_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_high_events_walk_to_blocked() {
        let fake = Arc::new(FakeLedger::default());
        let (engine, channel) = setup(fake.clone(), false);

        // First High: 100 -> 50, no alert
        let first = engine.process(job(&engine, 0.1, 0.95, 0.2)).await.unwrap();
        assert_eq!(first.transition.record.severity, Severity::High);
        assert_eq!(first.transition.record.deduction, 50);
        assert_eq!(first.transition.deduction.previous_safety, 100);
        assert_eq!(first.transition.deduction.new_safety, 50);
        assert!(!first.transition.deduction.is_now_blocked);
        assert_eq!(first.alert, AlertOutcome::NotTriggered);

        // Second High: 50 -> 0, blocked, alert once
        let second = engine.process(job(&engine, 0.1, 0.95, 0.2)).await.unwrap();
        assert!(second.transition.deduction.crossed_into_block());
        assert_eq!(second.alert, AlertOutcome::Dispatched(DispatchResult::Sent));
        assert_eq!(*channel.sent.lock().unwrap(), vec!["may@example.com"]);

        // Third High: stays at 0, no second alert
        let third = engine.process(job(&engine, 0.1, 0.95, 0.2)).await.unwrap();
        assert!(third.transition.deduction.was_blocked);
        assert!(third.transition.deduction.is_now_blocked);
        assert_eq!(third.transition.deduction.new_safety, 0);
        assert_eq!(third.alert, AlertOutcome::NotTriggered);
        assert_eq!(channel.sent.lock().unwrap().len(), 1);

        // Latch is only attempted on the crossing event
        assert_eq!(*fake.latch_calls.lock().unwrap(), 1);

        let account = engine.account("kid").unwrap();
        assert!(account.app_blocked);
        assert!(account.alert_already_sent);
    }

    #[tokio::test]
    async fn test_low_event_is_recorded_without_deduction() {
        let (engine, channel) = setup(Arc::new(FakeLedger::default()), false);

        let outcome = engine.process(job(&engine, 0.05, 0.02, 0.1)).await.unwrap();
        assert_eq!(outcome.transition.record.severity, Severity::Low);
        assert_eq!(outcome.transition.record.deduction, 0);
        assert_eq!(outcome.transition.deduction.new_safety, 100);

        assert_eq!(engine.account("kid").unwrap().safety_percentage, 100);
        assert_eq!(engine.alert_history("kid", 10).unwrap().len(), 1);
        assert!(engine.dashboard("kid").unwrap().alerts.is_empty());
        assert!(channel.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_medium_event_deducts_five() {
        let (engine, _) = setup(Arc::new(MemoryLedger::new()), false);

        let outcome = engine.process(job(&engine, 0.6, 0.0, 0.0)).await.unwrap();
        assert_eq!(outcome.transition.record.severity, Severity::Medium);
        assert_eq!(outcome.transition.deduction.new_safety, 95);

        let dashboard = engine.dashboard("kid").unwrap();
        assert_eq!(dashboard.safety_percentage, 95);
        assert_eq!(dashboard.alerts.len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_failure_keeps_latch() {
        let (engine, channel) = setup(Arc::new(MemoryLedger::new()), true);

        engine.process(job(&engine, 0.9, 0.0, 0.0)).await.unwrap();
        let second = engine.process(job(&engine, 0.9, 0.0, 0.0)).await.unwrap();
        assert_eq!(second.alert, AlertOutcome::Dispatched(DispatchResult::Failed));

        // Not retried on later events
        engine.process(job(&engine, 0.9, 0.0, 0.0)).await.unwrap();
        assert_eq!(channel.sent.lock().unwrap().len(), 1);
        assert!(engine.account("kid").unwrap().alert_already_sent);
    }

    #[tokio::test]
    async fn test_persistence_failure_drops_event() {
        let fake = Arc::new(FakeLedger::default());
        let (engine, _) = setup(fake.clone(), false);
        fake.fail_writes.store(true, Ordering::SeqCst);

        let err = engine.process(job(&engine, 0.9, 0.0, 0.0)).await.unwrap_err();
        assert!(matches!(err, SafetyError::Persistence(_)));

        let account = engine.account("kid").unwrap();
        assert_eq!(account.safety_percentage, 100);
        assert!(fake.history.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_account_is_not_found() {
        let (engine, _) = setup(Arc::new(MemoryLedger::new()), false);
        let mut ghost = job(&engine, 0.9, 0.0, 0.0);
        ghost.account_id = "ghost".to_string();

        assert!(matches!(
            engine.process(ghost).await,
            Err(SafetyError::NotFound(_))
        ));
        assert!(matches!(
            engine.unlock_account("ghost"),
            Err(SafetyError::NotFound(_))
        ));
        assert!(matches!(
            engine.dashboard("ghost"),
            Err(SafetyError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unlock_restores_and_rearms() {
        let (engine, channel) = setup(Arc::new(MemoryLedger::new()), false);

        for _ in 0..2 {
            engine.process(job(&engine, 0.9, 0.0, 0.0)).await.unwrap();
        }
        assert!(engine.account("kid").unwrap().app_blocked);

        let account = engine.unlock_account("kid").unwrap();
        assert_eq!(account.safety_percentage, 100);
        assert!(!account.app_blocked);
        assert!(!account.alert_already_sent);

        for _ in 0..2 {
            engine.process(job(&engine, 0.9, 0.0, 0.0)).await.unwrap();
        }
        assert_eq!(channel.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_contact_change_rearms_latch() {
        let (engine, _) = setup(Arc::new(MemoryLedger::new()), false);
        for _ in 0..2 {
            engine.process(job(&engine, 0.9, 0.0, 0.0)).await.unwrap();
        }
        assert!(engine.account("kid").unwrap().alert_already_sent);

        let account = engine
            .set_trusted_contact("kid", TrustedContact::new("Coach", "coach@example.com"))
            .unwrap();
        assert!(!account.alert_already_sent);
        assert_eq!(
            account.trusted_contact.map(|c| c.contact_address),
            Some("coach@example.com".to_string())
        );

        assert!(matches!(
            engine.set_trusted_contact("kid", TrustedContact::new("", "x")),
            Err(SafetyError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_parent_email_fallback() {
        let channel = Arc::new(RecordingChannel::default());
        let engine = SafetyEngine::new(
            Arc::new(MemoryLedger::new()),
            AlertDispatcher::new(channel.clone()),
            policy(),
        )
        .unwrap();
        engine
            .open_account(NewAccount::new("mom", "Mom").with_email("mom@example.com"))
            .unwrap();
        engine
            .open_account(NewAccount::new("kid", "Kid").with_parent("mom"))
            .unwrap();

        for _ in 0..2 {
            engine.process(job(&engine, 0.9, 0.0, 0.0)).await.unwrap();
        }
        assert_eq!(*channel.sent.lock().unwrap(), vec!["mom@example.com"]);
    }

    #[tokio::test]
    async fn test_no_recipient_still_latches() {
        let engine = SafetyEngine::new(
            Arc::new(MemoryLedger::new()),
            AlertDispatcher::log_only(),
            policy(),
        )
        .unwrap();
        engine.open_account(NewAccount::new("kid", "Kid")).unwrap();

        engine.process(job(&engine, 0.9, 0.0, 0.0)).await.unwrap();
        let second = engine.process(job(&engine, 0.9, 0.0, 0.0)).await.unwrap();
        assert_eq!(second.alert, AlertOutcome::NoRecipient);
        assert!(engine.account("kid").unwrap().alert_already_sent);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_high_events_alert_once() {
        for ledger in [
            Arc::new(FakeLedger::default()) as Arc<dyn SafetyLedger>,
            Arc::new(MemoryLedger::new()) as Arc<dyn SafetyLedger>,
        ] {
            let (engine, channel) = setup(ledger, false);
            let engine = Arc::new(engine);

            let mut handles = Vec::new();
            for _ in 0..32 {
                let engine = Arc::clone(&engine);
                let job = job(&engine, 0.0, 1.0, 0.0);
                handles.push(tokio::spawn(async move { engine.process(job).await }));
            }

            let mut crossings = 0;
            let mut latches = 0;
            for handle in handles {
                let outcome = handle.await.unwrap().unwrap();
                if outcome.transition.deduction.crossed_into_block() {
                    crossings += 1;
                }
                if outcome.transition.alert_latched {
                    latches += 1;
                }
            }

            assert_eq!(crossings, 1);
            assert_eq!(latches, 1);
            assert_eq!(channel.sent.lock().unwrap().len(), 1);
            assert_eq!(engine.account("kid").unwrap().safety_percentage, 0);
        }
    }

    #[test]
    fn test_invalid_policy_is_rejected() {
        let policy = SafetyPolicy {
            high_risk_threshold: 0.3,
            medium_risk_threshold: 0.6,
            ..SafetyPolicy::default()
        };
        let result = SafetyEngine::new(
            Arc::new(MemoryLedger::new()),
            AlertDispatcher::log_only(),
            policy,
        );
        assert!(matches!(result, Err(SafetyError::Config(_))));
    }
}
