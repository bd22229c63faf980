//! Validation of the event timestamp wire format `YYYY-MM-DD HH:MM:SS.mmm`.

use chrono::NaiveDateTime;
use regex::Regex;
use std::sync::OnceLock;

pub const TIMESTAMP_PATTERN: &str = r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}\.\d{3}$";

/// chrono format equivalent of [`TIMESTAMP_PATTERN`].
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

fn timestamp_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(TIMESTAMP_PATTERN).expect("timestamp regex must compile"))
}

/// Textual check only; calendar validity is not required.
pub fn is_valid_timestamp(value: &str) -> bool {
    timestamp_regex().is_match(value)
}

/// Parse a well-formed timestamp. Returns `None` for malformed or impossible
/// dates such as month 13.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    if !is_valid_timestamp(value) {
        return None;
    }
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT).ok()
}

/// Earliest and latest of the parseable timestamps, if any.
pub fn event_span<'a, I>(values: I) -> Option<(NaiveDateTime, NaiveDateTime)>
where
    I: IntoIterator<Item = &'a str>,
{
    values
        .into_iter()
        .filter_map(parse_timestamp)
        .fold(None, |span, ts| match span {
            None => Some((ts, ts)),
            Some((lo, hi)) => Some((lo.min(ts), hi.max(ts))),
        })
}
