//! Alert history repository.
//!
//! Rows are append-only; the schema rejects updates and deletes.

use cybersafe_core::{AlertRecord, NewAlertRecord, RiskScores, Severity};
use rusqlite::{params, Connection, Row};

use crate::error::Result;
use crate::repository::{format_datetime, parse_datetime};

/// Repository for alert history.
pub struct AlertsRepo;

impl AlertsRepo {
    /// Append a record, returning its id.
    pub fn insert(conn: &Connection, record: &NewAlertRecord) -> Result<i64> {
        conn.execute(
            "INSERT INTO alerts (account_id, source_app, severity, deduction, insult, threat, bullying, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.account_id,
                record.source_app,
                record.severity.as_str(),
                record.deduction,
                record.scores.insult,
                record.scores.threat,
                record.scores.bullying,
                format_datetime(record.timestamp),
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// Recent records for an account, newest event first.
    pub fn get_for_account(
        conn: &Connection,
        account_id: &str,
        limit: usize,
        include_low: bool,
    ) -> Result<Vec<AlertRecord>> {
        let sql = if include_low {
            "SELECT id, account_id, source_app, severity, deduction, insult, threat, bullying, created_at
             FROM alerts WHERE account_id = ?1
             ORDER BY created_at DESC, id DESC LIMIT ?2"
        } else {
            "SELECT id, account_id, source_app, severity, deduction, insult, threat, bullying, created_at
             FROM alerts WHERE account_id = ?1 AND severity != 'Low'
             ORDER BY created_at DESC, id DESC LIMIT ?2"
        };

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = conn.prepare(sql)?;
        let records = stmt
            .query_map(params![account_id, limit], row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Count records for an account.
    pub fn count_for_account(conn: &Connection, account_id: &str) -> Result<i64> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM alerts WHERE account_id = ?1",
            [account_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<AlertRecord> {
    let severity: String = row.get(3)?;
    let severity = Severity::parse(&severity).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown severity: {}", severity).into(),
        )
    })?;

    Ok(AlertRecord {
        id: row.get(0)?,
        account_id: row.get(1)?,
        source_app: row.get(2)?,
        severity,
        deduction: row.get(4)?,
        scores: RiskScores::new(row.get(5)?, row.get(6)?, row.get(7)?),
        timestamp: parse_datetime(&row.get::<_, String>(8)?),
    })
}
