//! `SafetyLedger` over SQLite.
//!
//! Each operation holds the pooled connection for its whole transaction, so
//! read-modify-write sequences on one account cannot interleave.

use chrono::Utc;
use cybersafe_core::{
    Account, AlertRecord, DeductionOutcome, LedgerResult, NewAccount, NewAlertRecord,
    SafetyLedger, TrustedContact, Transition,
};
use rusqlite::TransactionBehavior;
use tracing::debug;

use crate::database::Database;
use crate::error::StorageError;
use crate::repository::{AccountsRepo, AlertsRepo};

impl SafetyLedger for Database {
    fn open_account(&self, new: NewAccount) -> LedgerResult<Account> {
        let conn = self.pool.get()?;
        let account = Account::open(new, Utc::now());
        AccountsRepo::insert(&conn, &account)?;
        Ok(account)
    }

    fn read_account(&self, account_id: &str) -> LedgerResult<Account> {
        let conn = self.pool.get()?;
        Ok(AccountsRepo::require(&conn, account_id)?)
    }

    fn apply_deduction(&self, account_id: &str, amount: u8) -> LedgerResult<DeductionOutcome> {
        let mut conn = self.pool.get()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StorageError::from)?;

        let account = AccountsRepo::require(&tx, account_id)?;
        let outcome =
            DeductionOutcome::compute(account.safety_percentage, account.app_blocked, amount);
        AccountsRepo::update_safety(
            &tx,
            account_id,
            outcome.new_safety,
            outcome.is_now_blocked,
            Utc::now(),
        )?;

        tx.commit().map_err(StorageError::from)?;
        Ok(outcome)
    }

    fn latch_alert_sent(&self, account_id: &str) -> LedgerResult<bool> {
        let conn = self.pool.get()?;
        Ok(AccountsRepo::try_latch_alert(&conn, account_id, Utc::now())?)
    }

    fn append_history(&self, record: NewAlertRecord) -> LedgerResult<AlertRecord> {
        let conn = self.pool.get()?;
        if !AccountsRepo::exists(&conn, &record.account_id)? {
            return Err(StorageError::NotFound(record.account_id).into());
        }
        let id = AlertsRepo::insert(&conn, &record)?;
        Ok(AlertRecord::from_new(id, record))
    }

    fn reset_account(&self, account_id: &str) -> LedgerResult<Account> {
        let conn = self.pool.get()?;
        AccountsRepo::reset(&conn, account_id, Utc::now())?;
        Ok(AccountsRepo::require(&conn, account_id)?)
    }

    fn set_trusted_contact(
        &self,
        account_id: &str,
        contact: TrustedContact,
    ) -> LedgerResult<Account> {
        let conn = self.pool.get()?;
        AccountsRepo::set_trusted_contact(&conn, account_id, &contact, Utc::now())?;
        Ok(AccountsRepo::require(&conn, account_id)?)
    }

    fn alert_history(
        &self,
        account_id: &str,
        limit: usize,
        include_low: bool,
    ) -> LedgerResult<Vec<AlertRecord>> {
        let conn = self.pool.get()?;
        if !AccountsRepo::exists(&conn, account_id)? {
            return Err(StorageError::NotFound(account_id.to_string()).into());
        }
        Ok(AlertsRepo::get_for_account(
            &conn,
            account_id,
            limit,
            include_low,
        )?)
    }

    /// Deduction, latch, and history append in one IMMEDIATE transaction.
    fn commit_event(&self, record: NewAlertRecord) -> LedgerResult<Transition> {
        let mut conn = self.pool.get()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StorageError::from)?;
        let now = Utc::now();

        let account = AccountsRepo::require(&tx, &record.account_id)?;
        let deduction = if record.deduction == 0 {
            DeductionOutcome::unchanged(&account)
        } else {
            let outcome = DeductionOutcome::compute(
                account.safety_percentage,
                account.app_blocked,
                record.deduction,
            );
            AccountsRepo::update_safety(
                &tx,
                &record.account_id,
                outcome.new_safety,
                outcome.is_now_blocked,
                now,
            )?;
            outcome
        };

        let alert_latched = deduction.crossed_into_block()
            && AccountsRepo::try_latch_alert(&tx, &record.account_id, now)?;

        let id = AlertsRepo::insert(&tx, &record)?;
        tx.commit().map_err(StorageError::from)?;

        debug!(
            account_id = %record.account_id,
            id,
            new_safety = deduction.new_safety,
            alert_latched,
            "Committed scoring event"
        );

        Ok(Transition {
            deduction,
            alert_latched,
            record: AlertRecord::from_new(id, record),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use cybersafe_core::{LedgerError, RiskScores, Severity};

    use super::*;

    fn db_with(account_id: &str) -> Database {
        let db = Database::in_memory().unwrap();
        db.open_account(
            NewAccount::new(account_id, "Kid")
                .with_trusted_contact(TrustedContact::new("Aunt May", "may@example.com")),
        )
        .unwrap();
        db
    }

    fn event(account_id: &str, severity: Severity, deduction: u8) -> NewAlertRecord {
        NewAlertRecord {
            account_id: account_id.to_string(),
            source_app: "Instagram".to_string(),
            severity,
            deduction,
            scores: RiskScores::new(0.3, 0.9, 0.1),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_open_and_read() {
        let db = db_with("kid");
        let account = db.read_account("kid").unwrap();
        assert_eq!(account.safety_percentage, 100);
        assert_eq!(
            account.trusted_contact,
            Some(TrustedContact::new("Aunt May", "may@example.com"))
        );

        assert!(matches!(
            db.open_account(NewAccount::new("kid", "Again")),
            Err(LedgerError::AlreadyExists(_))
        ));
        assert!(matches!(
            db.read_account("ghost"),
            Err(LedgerError::NotFound(_))
        ));
    }

    #[test]
    fn test_primitives_compose() {
        let db = db_with("kid");

        let outcome = db.apply_deduction("kid", 60).unwrap();
        assert_eq!(outcome.new_safety, 40);
        assert!(!outcome.is_now_blocked);

        let outcome = db.apply_deduction("kid", 60).unwrap();
        assert_eq!(outcome.new_safety, 0);
        assert!(outcome.crossed_into_block());

        assert!(db.latch_alert_sent("kid").unwrap());
        assert!(!db.latch_alert_sent("kid").unwrap());

        let record = db.append_history(event("kid", Severity::High, 50)).unwrap();
        assert!(record.id > 0);
        assert!(matches!(
            db.append_history(event("ghost", Severity::High, 50)),
            Err(LedgerError::NotFound(_))
        ));
    }

    #[test]
    fn test_commit_event_scenario() {
        let db = db_with("kid");

        let first = db.commit_event(event("kid", Severity::High, 50)).unwrap();
        assert_eq!(first.deduction.new_safety, 50);
        assert!(!first.alert_latched);

        let second = db.commit_event(event("kid", Severity::High, 50)).unwrap();
        assert!(second.deduction.crossed_into_block());
        assert!(second.alert_latched);

        let third = db.commit_event(event("kid", Severity::High, 50)).unwrap();
        assert!(!third.alert_latched);

        let account = db.read_account("kid").unwrap();
        assert_eq!(account.safety_percentage, 0);
        assert!(account.app_blocked);
        assert!(account.alert_already_sent);
        assert_eq!(db.count_alerts("kid").unwrap(), 3);
    }

    #[test]
    fn test_low_event_is_recorded_but_hidden() {
        let db = db_with("kid");
        let transition = db.commit_event(event("kid", Severity::Low, 0)).unwrap();
        assert_eq!(transition.deduction.new_safety, 100);

        assert_eq!(db.alert_history("kid", 100, true).unwrap().len(), 1);
        assert!(db.alert_history("kid", 100, false).unwrap().is_empty());
        assert!(matches!(
            db.alert_history("ghost", 100, true),
            Err(LedgerError::NotFound(_))
        ));
    }

    #[test]
    fn test_history_orders_by_event_time() {
        let db = db_with("kid");
        let t0 = Utc::now();

        let mut late = event("kid", Severity::High, 50);
        late.timestamp = t0 + chrono::Duration::seconds(5);
        let mut early = event("kid", Severity::Medium, 5);
        early.timestamp = t0;

        db.commit_event(late).unwrap();
        db.commit_event(early).unwrap();

        let history = db.alert_history("kid", 10, false).unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].timestamp >= history[1].timestamp);
        assert_eq!(history[0].severity, Severity::High);
        assert!(history[0].id < history[1].id);
    }

    #[test]
    fn test_failed_commit_rolls_back() {
        let db = db_with("kid");
        db.pool
            .get()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER reject_alerts BEFORE INSERT ON alerts
                 BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
            )
            .unwrap();

        let err = db
            .commit_event(event("kid", Severity::High, 100))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Persistence(_)));

        let account = db.read_account("kid").unwrap();
        assert_eq!(account.safety_percentage, 100);
        assert!(!account.app_blocked);
        assert!(!account.alert_already_sent);
    }

    #[test]
    fn test_reset_and_contact_rearm() {
        let db = db_with("kid");
        db.commit_event(event("kid", Severity::High, 100)).unwrap();

        let first = db.reset_account("kid").unwrap();
        let second = db.reset_account("kid").unwrap();
        assert_eq!(first.safety_percentage, 100);
        assert_eq!(second.safety_percentage, 100);
        assert!(!second.app_blocked && !second.alert_already_sent);

        db.latch_alert_sent("kid").unwrap();
        let account = db
            .set_trusted_contact("kid", TrustedContact::new("Coach", "coach@example.com"))
            .unwrap();
        assert!(!account.alert_already_sent);
        assert_eq!(account.trusted_contact.unwrap().name, "Coach");

        assert!(matches!(
            db.reset_account("ghost"),
            Err(LedgerError::NotFound(_))
        ));
        assert!(matches!(
            db.set_trusted_contact("ghost", TrustedContact::new("A", "b")),
            Err(LedgerError::NotFound(_))
        ));
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cybersafe.db");

        {
            let db = Database::with_path(&path).unwrap();
            db.open_account(NewAccount::new("kid", "Kid")).unwrap();
            db.commit_event(event("kid", Severity::High, 50)).unwrap();
        }

        let db = Database::with_path(&path).unwrap();
        let account = db.read_account("kid").unwrap();
        assert_eq!(account.safety_percentage, 50);
        assert_eq!(db.alert_history("kid", 100, false).unwrap().len(), 1);
    }

    #[test]
    fn test_concurrent_commits_latch_exactly_once() {
        let db = Arc::new(db_with("kid"));
        let latches = Arc::new(AtomicUsize::new(0));

        std::thread::scope(|scope| {
            for _ in 0..12 {
                let db = Arc::clone(&db);
                let latches = Arc::clone(&latches);
                scope.spawn(move || {
                    let t = db.commit_event(event("kid", Severity::High, 50)).unwrap();
                    if t.alert_latched {
                        latches.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(latches.load(Ordering::SeqCst), 1);
        assert_eq!(db.count_alerts("kid").unwrap(), 12);
    }
}
