//! Database repositories for each table.

pub mod accounts;
pub mod alerts;

use chrono::{DateTime, SecondsFormat, Utc};

pub use accounts::AccountsRepo;
pub use alerts::AlertsRepo;

/// Parses a stored timestamp, falling back to now for unreadable values.
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|dt| dt.and_utc())
        })
        .unwrap_or_else(|_| Utc::now())
}

/// Fixed-width UTC timestamp, so text order matches time order.
pub(crate) fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn to_sql_bool(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
