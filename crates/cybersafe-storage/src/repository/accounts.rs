//! Accounts repository.

use chrono::{DateTime, Utc};
use cybersafe_core::{Account, TrustedContact};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{Result, StorageError};
use crate::repository::{format_datetime, parse_datetime, to_sql_bool};

const ACCOUNT_COLUMNS: &str = "account_id, display_name, email, safety_percentage, app_blocked,
     alert_already_sent, contact_name, contact_address, parent_account_id, created_at, updated_at";

/// Repository for account operations.
pub struct AccountsRepo;

impl AccountsRepo {
    /// Insert a new account. The primary key decides duplicates, so two
    /// racing registrations yield exactly one `AlreadyExists`.
    pub fn insert(conn: &Connection, account: &Account) -> Result<()> {
        let (contact_name, contact_address) = split_contact(account.trusted_contact.as_ref());

        conn.execute(
            "INSERT INTO accounts (account_id, display_name, email, safety_percentage, app_blocked,
                 alert_already_sent, contact_name, contact_address, parent_account_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                account.account_id,
                account.display_name,
                account.email,
                account.safety_percentage,
                to_sql_bool(account.app_blocked),
                to_sql_bool(account.alert_already_sent),
                contact_name,
                contact_address,
                account.parent_account_id,
                format_datetime(account.created_at),
                format_datetime(account.updated_at),
            ],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(ref failure, _)
                if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
            {
                StorageError::AlreadyExists(account.account_id.clone())
            }
            other => StorageError::Database(other),
        })?;

        Ok(())
    }

    /// Get an account by id.
    pub fn get(conn: &Connection, account_id: &str) -> Result<Option<Account>> {
        let account = conn
            .query_row(
                &format!("SELECT {} FROM accounts WHERE account_id = ?1", ACCOUNT_COLUMNS),
                [account_id],
                row_to_account,
            )
            .optional()?;

        Ok(account)
    }

    /// Get an account by id, or `NotFound`.
    pub fn require(conn: &Connection, account_id: &str) -> Result<Account> {
        Self::get(conn, account_id)?.ok_or_else(|| StorageError::NotFound(account_id.to_string()))
    }

    /// Check whether an account exists.
    pub fn exists(conn: &Connection, account_id: &str) -> Result<bool> {
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM accounts WHERE account_id = ?1",
                [account_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Write safety percentage and block flag together.
    pub fn update_safety(
        conn: &Connection,
        account_id: &str,
        safety_percentage: u8,
        app_blocked: bool,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let changed = conn.execute(
            "UPDATE accounts SET safety_percentage = ?1, app_blocked = ?2, updated_at = ?3
             WHERE account_id = ?4",
            params![
                safety_percentage,
                to_sql_bool(app_blocked),
                format_datetime(now),
                account_id
            ],
        )?;
        require_changed(changed, account_id)
    }

    /// Set the alert latch if it is not already set.
    ///
    /// Returns true if this call flipped it.
    pub fn try_latch_alert(conn: &Connection, account_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE accounts SET alert_already_sent = 1, updated_at = ?1
             WHERE account_id = ?2 AND alert_already_sent = 0",
            params![format_datetime(now), account_id],
        )?;

        if changed == 1 {
            return Ok(true);
        }
        if !Self::exists(conn, account_id)? {
            return Err(StorageError::NotFound(account_id.to_string()));
        }
        Ok(false)
    }

    /// Restore full safety, unblock, and clear the latch.
    pub fn reset(conn: &Connection, account_id: &str, now: DateTime<Utc>) -> Result<()> {
        let changed = conn.execute(
            "UPDATE accounts
             SET safety_percentage = 100, app_blocked = 0, alert_already_sent = 0, updated_at = ?1
             WHERE account_id = ?2",
            params![format_datetime(now), account_id],
        )?;
        require_changed(changed, account_id)
    }

    /// Replace the trusted contact and clear the latch.
    pub fn set_trusted_contact(
        conn: &Connection,
        account_id: &str,
        contact: &TrustedContact,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let changed = conn.execute(
            "UPDATE accounts
             SET contact_name = ?1, contact_address = ?2, alert_already_sent = 0, updated_at = ?3
             WHERE account_id = ?4",
            params![
                contact.name,
                contact.contact_address,
                format_datetime(now),
                account_id
            ],
        )?;
        require_changed(changed, account_id)
    }

    /// Count all accounts.
    pub fn count(conn: &Connection) -> Result<i64> {
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM accounts", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn require_changed(changed: usize, account_id: &str) -> Result<()> {
    if changed == 0 {
        Err(StorageError::NotFound(account_id.to_string()))
    } else {
        Ok(())
    }
}

fn split_contact(contact: Option<&TrustedContact>) -> (Option<&str>, Option<&str>) {
    match contact {
        Some(c) => (Some(c.name.as_str()), Some(c.contact_address.as_str())),
        None => (None, None),
    }
}

fn row_to_account(row: &Row<'_>) -> rusqlite::Result<Account> {
    let contact_name: Option<String> = row.get(6)?;
    let contact_address: Option<String> = row.get(7)?;

    Ok(Account {
        account_id: row.get(0)?,
        display_name: row.get(1)?,
        email: row.get(2)?,
        safety_percentage: row.get(3)?,
        app_blocked: row.get::<_, i64>(4)? != 0,
        alert_already_sent: row.get::<_, i64>(5)? != 0,
        trusted_contact: match (contact_name, contact_address) {
            (Some(name), Some(address)) => Some(TrustedContact::new(name, address)),
            _ => None,
        },
        parent_account_id: row.get(8)?,
        created_at: parse_datetime(&row.get::<_, String>(9)?),
        updated_at: parse_datetime(&row.get::<_, String>(10)?),
    })
}
