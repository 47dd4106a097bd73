//! Trim-window helpers for the `HH:MM:SS` format the service accepts.
//!
//! These gate interactive controls, so malformed text never panics or
//! errors: it falls back to the nearest safe bound (`start` to zero, `end`
//! to the full duration) and validation simply answers `false` when there is
//! nothing sensible to check against.

use regex::Regex;

/// Returns `true` for the exact zero-padded `HH:MM:SS` shape.
///
/// Hours may take more than two digits for very long media; minutes and
/// seconds must stay below 60 for the value to round-trip.
fn is_hms(text: &str) -> bool {
    let re = match Regex::new(r"^\d{2,}:\d{2}:\d{2}$") {
        Ok(re) => re,
        Err(_) => return false,
    };
    re.is_match(text)
}

/// Parse `HH:MM:SS` into whole seconds. Any other shape yields `None`.
pub fn to_seconds(text: &str) -> Option<u64> {
    if !is_hms(text) {
        return None;
    }
    let mut parts = text.split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: u64 = parts.next()?.parse().ok()?;
    if minutes >= 60 || seconds >= 60 {
        return None;
    }
    Some(hours * 3600 + minutes * 60 + seconds)
}

/// Format whole seconds as zero-padded `HH:MM:SS`.
///
/// Round-trip law: `to_seconds(&full_duration(d)) == Some(d)` for any `d`.
pub fn full_duration(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

/// A trim range is valid iff `start < end <= duration`, in seconds.
///
/// Malformed `start` falls back to zero, malformed `end` to the full
/// duration. A malformed `duration` leaves nothing to validate against and
/// the range is rejected.
pub fn is_valid_range(start: &str, end: &str, duration: &str) -> bool {
    let max = match to_seconds(duration) {
        Some(max) => max,
        None => return false,
    };
    let start = to_seconds(start).unwrap_or(0);
    let end = to_seconds(end).unwrap_or(max);
    start < end && end <= max
}

/// Trim fields to carry in a prepare request.
///
/// A field equal to its full-range default (zero for `start`, the full
/// duration for `end`) is dropped; the service reads the absence as
/// "no trim" on that side. Malformed text counts as the default.
pub fn effective_trim(
    start: &str,
    end: &str,
    duration_seconds: u64,
) -> (Option<String>, Option<String>) {
    let start_seconds = to_seconds(start).unwrap_or(0);
    let end_seconds = to_seconds(end).unwrap_or(duration_seconds);

    let start_field = if start_seconds == 0 {
        None
    } else {
        Some(start.to_string())
    };
    let end_field = if end_seconds == duration_seconds {
        None
    } else {
        Some(end.to_string())
    };
    (start_field, end_field)
}

/// Recognizes the "no trim" pair: start at zero and end at the full duration.
pub fn is_full_range(start: &str, end: &str, duration_seconds: u64) -> bool {
    effective_trim(start, end, duration_seconds) == (None, None)
}
