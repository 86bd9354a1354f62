//! Display formatting for delta timestamps.

use chrono::{DateTime, Local};

const TIME_ONLY_FORMAT: &str = "%H:%M:%S";
const TIMESTAMP_FORMAT: &str = "%m/%d %H:%M:%S";

/// Format an ISO-8601 timestamp for the table: time-only when it falls on
/// `now`'s calendar day, date plus time otherwise. Unparsable input passes
/// through verbatim.
pub fn format_timestamp(iso: &str, now: DateTime<Local>) -> String {
    match DateTime::parse_from_rfc3339(iso) {
        Ok(parsed) => {
            let local = parsed.with_timezone(&Local);
            if local.date_naive() == now.date_naive() {
                local.format(TIME_ONLY_FORMAT).to_string()
            } else {
                local.format(TIMESTAMP_FORMAT).to_string()
            }
        }
        Err(_) => iso.to_string(),
    }
}

/// [`format_timestamp`] against the current wall clock.
pub fn format_timestamp_now(iso: &str) -> String {
    format_timestamp(iso, Local::now())
}

/// The current wall clock, time-only. Used when a delta carries no
/// timestamp at all, which renders as "received just now".
pub fn format_now() -> String {
    Local::now().format(TIME_ONLY_FORMAT).to_string()
}
