//! Turns the engine's raw status report into a typed status.
//!
//! The engine reports its last backup time as display text that embeds
//! bidirectional text-direction marks (U+200E, U+200F and friends). Those marks
//! break any date parser, so the text is always filtered down to ASCII first
//! and only then parsed.

use super::state::ProtectionState;
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;

/// Layouts the engine has been seen to emit, tried in order. Slash dates are
/// month first; day-first text is only safe as RFC 3339.
const DATE_TIME_LAYOUTS: &[&str] = &[
    "%m/%d/%Y %I:%M %p",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

const DATE_LAYOUTS: &[&str] = &["%m/%d/%Y", "%Y-%m-%d"];

/// Time of the last completed backup, as far as the report tells us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "at", rename_all = "snake_case")]
pub enum LastBackup {
    Known(DateTime<Utc>),
    /// The timestamp text could not be parsed. Treated as unknown, which
    /// schedules a backup immediately.
    ParseFailure,
}

impl LastBackup {
    pub fn known(self) -> Option<DateTime<Utc>> {
        match self {
            LastBackup::Known(at) => Some(at),
            LastBackup::ParseFailure => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NormalizedStatus {
    pub state: ProtectionState,
    pub last_backup: LastBackup,
}

impl NormalizedStatus {
    /// Status used when the engine could not be queried at all.
    pub fn update_failed() -> Self {
        Self {
            state: ProtectionState::update_failed(),
            last_backup: LastBackup::ParseFailure,
        }
    }
}

/// Normalize a raw `(flags, timestamp text)` report.
pub fn normalize(raw_flags: u32, raw_timestamp: &str) -> NormalizedStatus {
    let filtered = strip_non_ascii(raw_timestamp);
    let last_backup = match parse_timestamp(&filtered) {
        Some(at) => LastBackup::Known(at),
        None => LastBackup::ParseFailure,
    };

    NormalizedStatus {
        state: ProtectionState::from_bits(raw_flags),
        last_backup,
    }
}

/// Stage one: keep only code points below 128.
pub fn strip_non_ascii(text: &str) -> String {
    text.chars().filter(|c| c.is_ascii()).collect()
}

/// Stage two: parse ASCII timestamp text. Offset-less layouts are read in the
/// host's local time zone.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.is_empty() {
        return None;
    }

    if let Ok(at) = DateTime::parse_from_rfc3339(&text) {
        return Some(at.with_timezone(&Utc));
    }

    let naive = DATE_TIME_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(&text, layout).ok())
        .or_else(|| {
            DATE_LAYOUTS
                .iter()
                .find_map(|layout| NaiveDate::parse_from_str(&text, layout).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })?;

    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|at| at.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::state::Quality;

    fn local_naive(at: DateTime<Utc>) -> NaiveDateTime {
        at.with_timezone(&Local).naive_local()
    }

    fn expected(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .and_then(|date| date.and_hms_opt(h, mi, s))
            .unwrap()
    }

    #[test]
    fn test_strip_non_ascii_removes_direction_marks() {
        let raw = "\u{200E}2/14/2019 \u{200F}\u{200E}10:32 \u{200F}\u{200E}AM";
        assert_eq!(strip_non_ascii(raw), "2/14/2019 10:32 AM");
    }

    #[test]
    fn test_direction_marks_do_not_change_parsed_value() {
        let plain = [
            "2/14/2019 10:32 AM",
            "12/31/2023 11:59:58 PM",
            "2024-03-05 07:15:00",
            "2024-03-05T07:15:00",
        ];
        let marks = ['\u{200E}', '\u{200F}', '\u{202A}', '\u{202C}', '\u{2066}', '\u{2069}'];

        for text in plain {
            let clean = normalize(0xFF, text).last_backup;
            assert!(matches!(clean, LastBackup::Known(_)), "failed to parse {text}");

            for mark in marks {
                let wrapped: String = text
                    .split(' ')
                    .map(|part| format!("{mark}{part}{mark}"))
                    .collect::<Vec<_>>()
                    .join(" ");
                assert_eq!(normalize(0xFF, &wrapped).last_backup, clean, "mark {mark:?} in {text}");
            }
        }
    }

    #[test]
    fn test_parses_engine_layout_in_local_time() {
        let status = normalize(0xFF, "\u{200E}2/14/2019 \u{200E}10:32 AM");
        let at = status.last_backup.known().unwrap();
        assert_eq!(local_naive(at), expected(2019, 2, 14, 10, 32, 0));
    }

    #[test]
    fn test_parses_rfc3339_with_offset() {
        let at = parse_timestamp("2024-01-02T03:04:05+02:00").unwrap();
        assert_eq!(at.to_rfc3339(), "2024-01-02T01:04:05+00:00");
    }

    #[test]
    fn test_slash_dates_are_month_first() {
        let at = parse_timestamp("03/04/2024 10:00").unwrap();
        assert_eq!(local_naive(at), expected(2024, 3, 4, 10, 0, 0));
        // day-first text with a day above 12 does not parse at all
        assert_eq!(parse_timestamp("25/04/2024 10:00"), None);
        // RFC 3339 is unambiguous regardless of locale
        let at = normalize(0xFF, "\u{200E}2024-04-03T10:00:00+00:00").last_backup.known();
        assert_eq!(at.map(|at| at.to_rfc3339()), Some("2024-04-03T10:00:00+00:00".to_string()));
    }

    #[test]
    fn test_date_only_is_midnight() {
        let at = parse_timestamp("2024-06-01").unwrap();
        assert_eq!(local_naive(at), expected(2024, 6, 1, 0, 0, 0));
    }

    #[test]
    fn test_garbage_is_parse_failure_not_epoch_or_now() {
        for text in ["", "   ", "\u{200E}\u{200F}", "never", "13/45/2019 99:99"] {
            let status = normalize(0x01, text);
            assert_eq!(status.last_backup, LastBackup::ParseFailure, "input {text:?}");
            assert_eq!(status.last_backup.known(), None);
        }
    }

    #[test]
    fn test_flags_pass_through() {
        let status = normalize(0x1FF, "2024-03-05 07:15:00");
        assert!(status.state.is_running());
        assert_eq!(status.state.quality(), Quality::NoError);

        let status = normalize(0x8000_0016, "");
        assert_eq!(status.state.bits(), 0x8000_0016);
        assert_eq!(status.state.quality(), Quality::TooMuchBehind);
    }

    #[test]
    fn test_update_failed_status() {
        let status = NormalizedStatus::update_failed();
        assert!(status.state.is_update_failed());
        assert_eq!(status.last_backup, LastBackup::ParseFailure);
    }
}
