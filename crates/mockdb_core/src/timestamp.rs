use chrono::{DateTime, Utc};

/// Placeholder for "never fetched" on freshly defaulted pages.
pub const EPOCH_SENTINEL: &str = "0001-01-01T00:00:00Z";
/// Placeholder written to stage timestamps when a page is reset.
pub const FETCHING_SENTINEL: &str = "2001-01-01T00:00:00Z";

/// UTC timestamp with microsecond precision and trailing zeros trimmed.
pub fn time_stamp(at: DateTime<Utc>) -> String {
    let base = at.format("%Y-%m-%dT%H:%M:%S").to_string();
    let micros = at.timestamp_subsec_micros();
    if micros == 0 {
        return format!("{base}Z");
    }
    let fraction = format!("{micros:06}");
    format!("{base}.{}Z", fraction.trim_end_matches('0'))
}
