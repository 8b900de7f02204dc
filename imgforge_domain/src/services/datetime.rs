//! RFC3339/ISO-8601 timestamp helpers.
//!
//! Spec §4.1: "Timestamps stored as ISO-8601 UTC text; comparisons always use
//! the store's date function against ISO strings." Every entity timestamp in
//! this crate is a `String` in this format rather than a native `DateTime`
//! column, so the Catalog can do its range filtering with plain text
//! comparison.

use chrono::{DateTime, Utc};

use crate::error::DomainError;

/// The current instant, formatted as RFC3339 with a `Z` suffix.
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Parses a stored timestamp back into a `DateTime<Utc>`, rejecting anything
/// that isn't valid RFC3339. Used when an API boundary needs to do date
/// arithmetic instead of a lexical string comparison (e.g. `pollingTimeout`
/// deadlines).
pub fn parse_iso8601(value: &str) -> Result<DateTime<Utc>, DomainError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DomainError::configuration(format!("invalid RFC3339 timestamp '{value}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let now = now_iso8601();
        let parsed = parse_iso8601(&now).unwrap();
        assert_eq!(parsed.to_rfc3339_opts(chrono::SecondsFormat::Millis, true), now);
    }

    #[test]
    fn rejects_non_rfc3339() {
        assert!(parse_iso8601("not-a-date").is_err());
        assert!(parse_iso8601("2024-01-01").is_err());
    }
}
