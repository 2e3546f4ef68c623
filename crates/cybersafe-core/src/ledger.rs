//! The safety ledger: per-account mutable state plus append-only history.
//!
//! Every method is a single-account atomic operation. Correctness under
//! concurrent processing comes from these operations, not from serializing
//! events per account.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use thiserror::Error;

use crate::account::{Account, AlertRecord, NewAccount, NewAlertRecord, TrustedContact};

/// Errors reported by a ledger implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// No account with this id.
    #[error("account not found: {0}")]
    NotFound(String),

    /// An account with this id is already registered.
    #[error("account already exists: {0}")]
    AlreadyExists(String),

    /// The underlying store failed; nothing was written.
    #[error("{0}")]
    Persistence(String),
}

/// Result type for ledger operations.
pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// Before/after view of a single deduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeductionOutcome {
    pub previous_safety: u8,
    pub new_safety: u8,
    pub was_blocked: bool,
    pub is_now_blocked: bool,
}

impl DeductionOutcome {
    /// Computes the outcome of deducting `amount` from an account, floored at 0.
    pub fn compute(previous_safety: u8, was_blocked: bool, amount: u8) -> Self {
        let new_safety = previous_safety.saturating_sub(amount);
        Self {
            previous_safety,
            new_safety,
            was_blocked,
            is_now_blocked: new_safety == 0,
        }
    }

    /// Outcome for an event that did not touch the account.
    pub fn unchanged(account: &Account) -> Self {
        Self {
            previous_safety: account.safety_percentage,
            new_safety: account.safety_percentage,
            was_blocked: account.app_blocked,
            is_now_blocked: account.app_blocked,
        }
    }

    /// True only for the first crossing into the blocked state.
    pub fn crossed_into_block(&self) -> bool {
        self.is_now_blocked && !self.was_blocked
    }
}

/// Everything one scoring event changed in the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub deduction: DeductionOutcome,
    /// Whether this event won the one-time alert latch.
    pub alert_latched: bool,
    pub record: AlertRecord,
}

/// Storage contract for account safety state.
pub trait SafetyLedger: Send + Sync {
    /// Creates an account at full safety.
    fn open_account(&self, new: NewAccount) -> LedgerResult<Account>;

    /// Reads an account.
    fn read_account(&self, account_id: &str) -> LedgerResult<Account>;

    /// Atomically deducts `amount` (floored at 0) and sets `app_blocked`
    /// to `new_safety == 0`, returning the before/after values.
    fn apply_deduction(&self, account_id: &str, amount: u8) -> LedgerResult<DeductionOutcome>;

    /// Compare-and-set of the alert latch from false to true.
    ///
    /// Returns true only for the caller that performed the transition.
    fn latch_alert_sent(&self, account_id: &str) -> LedgerResult<bool>;

    /// Appends an immutable history entry.
    fn append_history(&self, record: NewAlertRecord) -> LedgerResult<AlertRecord>;

    /// Restores (100, unblocked, unlatched) in one write.
    fn reset_account(&self, account_id: &str) -> LedgerResult<Account>;

    /// Replaces the trusted contact and re-arms the alert latch.
    fn set_trusted_contact(
        &self,
        account_id: &str,
        contact: TrustedContact,
    ) -> LedgerResult<Account>;

    /// History for an account, newest first.
    fn alert_history(
        &self,
        account_id: &str,
        limit: usize,
        include_low: bool,
    ) -> LedgerResult<Vec<AlertRecord>>;

    /// Applies one scoring event: deduction, latch on the falling edge, and
    /// history append.
    ///
    /// This default composes the primitives and is NOT atomic across them;
    /// a failure midway can leave a deduction without its history entry.
    /// Stores that can update several fields in one transaction should
    /// override it.
    fn commit_event(&self, record: NewAlertRecord) -> LedgerResult<Transition> {
        let deduction = if record.deduction == 0 {
            let account = self.read_account(&record.account_id)?;
            DeductionOutcome::unchanged(&account)
        } else {
            self.apply_deduction(&record.account_id, record.deduction)?
        };

        let alert_latched =
            deduction.crossed_into_block() && self.latch_alert_sent(&record.account_id)?;

        let record = self.append_history(record)?;

        Ok(Transition {
            deduction,
            alert_latched,
            record,
        })
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    accounts: HashMap<String, Account>,
    history: Vec<AlertRecord>,
    next_id: i64,
}

impl MemoryState {
    fn account_mut(&mut self, account_id: &str) -> LedgerResult<&mut Account> {
        self.accounts
            .get_mut(account_id)
            .ok_or_else(|| LedgerError::NotFound(account_id.to_string()))
    }

    fn push_history(&mut self, record: NewAlertRecord) -> AlertRecord {
        self.next_id += 1;
        let record = AlertRecord::from_new(self.next_id, record);
        self.history.push(record.clone());
        record
    }
}

/// Process-local ledger behind a single mutex.
///
/// Used for tests and single-node deployments without a database.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: Mutex<MemoryState>,
}

impl MemoryLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> LedgerResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| LedgerError::Persistence("memory ledger poisoned".to_string()))
    }
}

impl SafetyLedger for MemoryLedger {
    fn open_account(&self, new: NewAccount) -> LedgerResult<Account> {
        let mut state = self.lock()?;
        if state.accounts.contains_key(&new.account_id) {
            return Err(LedgerError::AlreadyExists(new.account_id));
        }
        let account = Account::open(new, Utc::now());
        state
            .accounts
            .insert(account.account_id.clone(), account.clone());
        Ok(account)
    }

    fn read_account(&self, account_id: &str) -> LedgerResult<Account> {
        let state = self.lock()?;
        state
            .accounts
            .get(account_id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(account_id.to_string()))
    }

    fn apply_deduction(&self, account_id: &str, amount: u8) -> LedgerResult<DeductionOutcome> {
        let mut state = self.lock()?;
        let account = state.account_mut(account_id)?;

        let outcome =
            DeductionOutcome::compute(account.safety_percentage, account.app_blocked, amount);
        account.safety_percentage = outcome.new_safety;
        account.app_blocked = outcome.is_now_blocked;
        account.updated_at = Utc::now();

        Ok(outcome)
    }

    fn latch_alert_sent(&self, account_id: &str) -> LedgerResult<bool> {
        let mut state = self.lock()?;
        let account = state.account_mut(account_id)?;

        if account.alert_already_sent {
            return Ok(false);
        }
        account.alert_already_sent = true;
        account.updated_at = Utc::now();
        Ok(true)
    }

    fn append_history(&self, record: NewAlertRecord) -> LedgerResult<AlertRecord> {
        let mut state = self.lock()?;
        Ok(state.push_history(record))
    }

    fn reset_account(&self, account_id: &str) -> LedgerResult<Account> {
        let mut state = self.lock()?;
        let account = state.account_mut(account_id)?;

        account.safety_percentage = crate::policy::FULL_SAFETY;
        account.app_blocked = false;
        account.alert_already_sent = false;
        account.updated_at = Utc::now();

        Ok(account.clone())
    }

    fn set_trusted_contact(
        &self,
        account_id: &str,
        contact: TrustedContact,
    ) -> LedgerResult<Account> {
        let mut state = self.lock()?;
        let account = state.account_mut(account_id)?;

        account.trusted_contact = Some(contact);
        account.alert_already_sent = false;
        account.updated_at = Utc::now();

        Ok(account.clone())
    }

    fn alert_history(
        &self,
        account_id: &str,
        limit: usize,
        include_low: bool,
    ) -> LedgerResult<Vec<AlertRecord>> {
        let state = self.lock()?;
        if !state.accounts.contains_key(account_id) {
            return Err(LedgerError::NotFound(account_id.to_string()));
        }

        let mut records: Vec<AlertRecord> = state
            .history
            .iter()
            .filter(|r| r.account_id == account_id)
            .filter(|r| include_low || r.severity.is_reportable())
            .cloned()
            .collect();
        // Event time first; id breaks ties between equal timestamps.
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        records.truncate(limit);
        Ok(records)
    }

    fn commit_event(&self, record: NewAlertRecord) -> LedgerResult<Transition> {
        let mut state = self.lock()?;
        let account = state.account_mut(&record.account_id)?;

        let deduction = if record.deduction == 0 {
            DeductionOutcome::unchanged(account)
        } else {
            let outcome = DeductionOutcome::compute(
                account.safety_percentage,
                account.app_blocked,
                record.deduction,
            );
            account.safety_percentage = outcome.new_safety;
            account.app_blocked = outcome.is_now_blocked;
            account.updated_at = Utc::now();
            outcome
        };

        let alert_latched = deduction.crossed_into_block() && !account.alert_already_sent;
        if alert_latched {
            account.alert_already_sent = true;
        }

        let record = state.push_history(record);

        Ok(Transition {
            deduction,
            alert_latched,
            record,
        })
    }
}
