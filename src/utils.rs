// src/utils.rs
// Command-line value parsing for block ranges and start times

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Span of a fetch: either wall-clock time or a fixed number of blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSpec {
    Time(Duration),
    Blocks(u64),
}

/// Parse `<magnitude><unit>`: `s`, `m`, `h`, `d`, `w` for time spans, `b`
/// or no unit for a block count. Whitespace and case are ignored.
pub fn parse_range(input: &str) -> Option<RangeSpec> {
    let s = input.trim().to_lowercase();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    if digits.is_empty() {
        return None;
    }
    let magnitude: i64 = digits.parse().ok()?;

    let seconds_per_unit = match unit.trim() {
        "" | "b" => return Some(RangeSpec::Blocks(magnitude as u64)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 60 * 60 * 24,
        "w" => 60 * 60 * 24 * 7,
        _ => return None,
    };
    let seconds = magnitude.checked_mul(seconds_per_unit)?;
    // chrono panics past i64::MAX milliseconds
    if seconds > i64::MAX / 1000 {
        return None;
    }
    Some(RangeSpec::Time(Duration::seconds(seconds)))
}

/// End of a time range starting at `start`, or `None` when it falls outside
/// what `DateTime` can represent.
pub fn range_end(start: DateTime<Utc>, span: Duration) -> Option<DateTime<Utc>> {
    start.checked_add_signed(span)
}

/// Parse a start time: `now`, unix seconds, RFC 3339, `YYYY-MM-DD HH:MM:SS`
/// (UTC) or `YYYY-MM-DD` (midnight UTC).
pub fn parse_start_time(input: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let s = input.trim();
    if s.eq_ignore_ascii_case("now") {
        return Some(now);
    }
    if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
        return Utc.timestamp_opt(s.parse().ok()?, 0).single();
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&t));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| Utc.from_utc_datetime(&t))
}
