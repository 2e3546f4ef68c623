//! Monitored accounts and their alert history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classifier::{RiskScores, Severity};
use crate::error::{Result, SafetyError};
use crate::policy::FULL_SAFETY;

/// The person notified when an account first becomes blocked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustedContact {
    /// Name used in the greeting.
    pub name: String,
    /// Delivery address (email or phone, depending on the channel).
    #[serde(alias = "email")]
    pub contact_address: String,
}

impl TrustedContact {
    /// Creates a new trusted contact.
    pub fn new(name: impl Into<String>, contact_address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contact_address: contact_address.into(),
        }
    }

    /// Rejects blank names and addresses.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(SafetyError::Validation(
                "trusted contact name must not be empty".to_string(),
            ));
        }
        if self.contact_address.trim().is_empty() {
            return Err(SafetyError::Validation(
                "trusted contact address must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Block state of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyState {
    /// Safety above zero, app usable.
    Healthy,
    /// Safety at zero, app blocked until unlocked.
    Blocked,
}

/// A monitored account as held by the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: String,
    pub display_name: String,
    pub email: Option<String>,
    /// 0..=100, only ever decreases until an unlock.
    pub safety_percentage: u8,
    pub app_blocked: bool,
    /// One-time alert latch.
    pub alert_already_sent: bool,
    pub trusted_contact: Option<TrustedContact>,
    /// Lookup-only reference to a linked parent account.
    pub parent_account_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Builds a fresh account at full safety.
    pub fn open(new: NewAccount, now: DateTime<Utc>) -> Self {
        Self {
            account_id: new.account_id,
            display_name: new.display_name,
            email: new.email,
            safety_percentage: FULL_SAFETY,
            app_blocked: false,
            alert_already_sent: false,
            trusted_contact: new.trusted_contact,
            parent_account_id: new.parent_account_id,
            created_at: now,
            updated_at: now,
        }
    }

    /// Current block state.
    pub fn state(&self) -> SafetyState {
        if self.app_blocked {
            SafetyState::Blocked
        } else {
            SafetyState::Healthy
        }
    }
}

/// Parameters for registering a new account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAccount {
    pub account_id: String,
    pub display_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub parent_account_id: Option<String>,
    #[serde(default)]
    pub trusted_contact: Option<TrustedContact>,
}

impl NewAccount {
    /// Creates registration parameters with only the required fields.
    pub fn new(account_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            display_name: display_name.into(),
            email: None,
            parent_account_id: None,
            trusted_contact: None,
        }
    }

    /// Sets the account email.
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Links a parent account.
    pub fn with_parent(mut self, parent_account_id: impl Into<String>) -> Self {
        self.parent_account_id = Some(parent_account_id.into());
        self
    }

    /// Sets the trusted contact.
    pub fn with_trusted_contact(mut self, contact: TrustedContact) -> Self {
        self.trusted_contact = Some(contact);
        self
    }

    /// Rejects blank identifiers and invalid contacts.
    pub fn validate(&self) -> Result<()> {
        if self.account_id.trim().is_empty() {
            return Err(SafetyError::Validation(
                "account_id must not be empty".to_string(),
            ));
        }
        if let Some(contact) = &self.trusted_contact {
            contact.validate()?;
        }
        Ok(())
    }
}

/// An alert history entry waiting to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAlertRecord {
    pub account_id: String,
    pub source_app: String,
    pub severity: Severity,
    /// Safety points deducted for this event.
    pub deduction: u8,
    pub scores: RiskScores,
    /// When the front door accepted the event.
    pub timestamp: DateTime<Utc>,
}

/// A persisted, immutable alert history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: i64,
    pub account_id: String,
    pub source_app: String,
    pub severity: Severity,
    pub deduction: u8,
    pub scores: RiskScores,
    pub timestamp: DateTime<Utc>,
}

impl AlertRecord {
    /// Attaches a storage id to a pending record.
    pub fn from_new(id: i64, record: NewAlertRecord) -> Self {
        Self {
            id,
            account_id: record.account_id,
            source_app: record.source_app,
            severity: record.severity,
            deduction: record.deduction,
            scores: record.scores,
            timestamp: record.timestamp,
        }
    }
}

/// Read-only view for the parent dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    pub account_id: String,
    pub safety_percentage: u8,
    pub app_blocked: bool,
    pub state: SafetyState,
    /// Medium and High records only, newest first.
    pub alerts: Vec<AlertRecord>,
}

impl Dashboard {
    /// Builds the view, dropping Low-severity records.
    pub fn new(account: &Account, history: Vec<AlertRecord>) -> Self {
        Self {
            account_id: account.account_id.clone(),
            safety_percentage: account.safety_percentage,
            app_blocked: account.app_blocked,
            state: account.state(),
            alerts: history
                .into_iter()
                .filter(|r| r.severity.is_reportable())
                .collect(),
        }
    }
}
