//! Database schema and migrations.

use rusqlite::Connection;
use tracing::info;

use crate::error::Result;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 3;

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    if current_version < SCHEMA_VERSION {
        info!(
            "Running migrations from version {} to {}",
            current_version, SCHEMA_VERSION
        );

        if current_version < 1 {
            migrate_v1(conn)?;
        }

        if current_version < 2 {
            migrate_v2(conn)?;
        }

        if current_version < 3 {
            migrate_v3(conn)?;
        }

        set_schema_version(conn, SCHEMA_VERSION)?;
        info!("Migrations complete");
    }

    Ok(())
}

/// Get the current schema version.
fn get_schema_version(conn: &Connection) -> Result<i32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        [],
    )?;

    let version: Option<i32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .ok();

    Ok(version.unwrap_or(0))
}

/// Set the schema version.
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// Migration to version 1: accounts and alert history.
fn migrate_v1(conn: &Connection) -> Result<()> {
    info!("Applying migration v1: Accounts and alert history");

    // Accounts - mutable safety state, one row per monitored account
    conn.execute(
        "CREATE TABLE IF NOT EXISTS accounts (
            account_id TEXT PRIMARY KEY,
            display_name TEXT NOT NULL,
            email TEXT,
            safety_percentage INTEGER NOT NULL DEFAULT 100
                CHECK (safety_percentage BETWEEN 0 AND 100),
            app_blocked INTEGER NOT NULL DEFAULT 0,
            alert_already_sent INTEGER NOT NULL DEFAULT 0,
            contact_name TEXT,
            contact_address TEXT,
            parent_account_id TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    // Alerts - append-only, scores only (never message text)
    conn.execute(
        "CREATE TABLE IF NOT EXISTS alerts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_id TEXT NOT NULL REFERENCES accounts (account_id),
            source_app TEXT NOT NULL,
            severity TEXT NOT NULL,
            deduction INTEGER NOT NULL,
            insult REAL NOT NULL,
            threat REAL NOT NULL,
            bullying REAL NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_alerts_account ON alerts (account_id, id)",
        [],
    )?;

    Ok(())
}

/// Migration to version 2: parent lookups and history immutability.
fn migrate_v2(conn: &Connection) -> Result<()> {
    info!("Applying migration v2: Parent index and immutable history");

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_accounts_parent ON accounts (parent_account_id)",
        [],
    )?;

    conn.execute_batch(
        "CREATE TRIGGER IF NOT EXISTS alerts_no_update
            BEFORE UPDATE ON alerts
            BEGIN SELECT RAISE(ABORT, 'alert history is append-only'); END;
         CREATE TRIGGER IF NOT EXISTS alerts_no_delete
            BEFORE DELETE ON alerts
            BEGIN SELECT RAISE(ABORT, 'alert history is append-only'); END;",
    )?;

    Ok(())
}

/// Migration to version 3: history reads ordered by event time.
fn migrate_v3(conn: &Connection) -> Result<()> {
    info!("Applying migration v3: Event-time history index");

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_alerts_account_time ON alerts (account_id, created_at)",
        [],
    )?;

    Ok(())
}
