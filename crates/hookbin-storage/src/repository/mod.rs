//! Database repositories for each table.

pub mod requests;
pub mod sessions;
pub mod tokens;

pub use requests::RequestsRepo;
pub use sessions::SessionsRepo;
pub use tokens::TokensRepo;

use chrono::{DateTime, SecondsFormat, Utc};

/// Formats a timestamp for storage.
///
/// Fixed-width UTC so that text ordering matches time ordering.
pub(crate) fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a datetime from SQLite format.
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|dt| dt.and_utc())
        })
        .unwrap_or_else(|_| Utc::now())
}
