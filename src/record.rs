// Copyright (c) 2025 Robert August Vincent II <pillarsdotnet@gmail.com>
// Co-author: Cursor-AI.

//! One completed timer interval, and the text forms it is stored and shown in.
//!
//! On disk a record is a `[start, end, duration]` triple of strings:
//! timestamps as `YYYY-MM-DD HH:MM:SS`, duration as `H:MM:SS` (hours unbounded).

use chrono::{NaiveDateTime, TimeDelta, Timelike};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::warn;

/// Timestamp format used in the data file and in every export.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A finished session. Immutable once built; `end >= start` always holds and the duration is never negative.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRecord", into = "RawRecord")]
pub struct SessionRecord {
    start: NaiveDateTime,
    end: NaiveDateTime,
    duration: TimeDelta,
}

impl SessionRecord {
    /// Builds a record from two instants. Both are truncated to whole seconds first,
    /// so `end - start` equals the stored duration exactly. An `end` before `start`
    /// (clock stepped back) is clamped to `start`.
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        let start = truncate_to_second(start);
        let end = truncate_to_second(end).max(start);
        Self {
            start,
            end,
            duration: TimeDelta::seconds((end - start).num_seconds()),
        }
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    pub fn duration(&self) -> TimeDelta {
        self.duration
    }

    pub fn start_text(&self) -> String {
        self.start().format(TIMESTAMP_FORMAT).to_string()
    }

    pub fn end_text(&self) -> String {
        self.end().format(TIMESTAMP_FORMAT).to_string()
    }

    pub fn duration_text(&self) -> String {
        format_duration(self.duration())
    }

    /// `N. Start: <start>, End: <end>, Duration: <duration>` (1-based `n`).
    pub fn history_line(&self, n: usize) -> String {
        format!(
            "{}. Start: {}, End: {}, Duration: {}",
            n,
            self.start_text(),
            self.end_text(),
            self.duration_text()
        )
    }
}

/// Drops sub-second precision.
pub fn truncate_to_second(t: NaiveDateTime) -> NaiveDateTime {
    t.with_nanosecond(0).unwrap_or(t)
}

/// Formats elapsed time as `H:MM:SS`; negative values clamp to `0:00:00`.
pub fn format_duration(d: TimeDelta) -> String {
    let secs = d.num_seconds().max(0);
    format!("{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

/// Parses `H:MM:SS`, or the long form `N day(s), H:MM:SS` found in older data files.
/// The day count may be negative (`-1 day, 23:20:00` is minus forty minutes).
pub fn parse_duration(s: &str) -> Option<TimeDelta> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"^(?:(-?\d+) days?, )?(\d+):([0-5]\d):([0-5]\d)$").expect("valid duration regex")
    });
    let caps = re.captures(s.trim())?;
    let days: i64 = caps.get(1).map_or(Some(0), |m| m.as_str().parse().ok())?;
    let hours: i64 = caps[2].parse().ok()?;
    let minutes: i64 = caps[3].parse().ok()?;
    let seconds: i64 = caps[4].parse().ok()?;
    let total = days
        .checked_mul(86_400)?
        .checked_add(hours.checked_mul(3600)?)?
        .checked_add(minutes * 60 + seconds)?;
    TimeDelta::try_seconds(total)
}

/// Parses a `YYYY-MM-DD HH:MM:SS` timestamp.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT).ok()
}

/// Wire form of a record: `[start, end, duration]`.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct RawRecord(String, String, String);

impl From<SessionRecord> for RawRecord {
    fn from(r: SessionRecord) -> Self {
        RawRecord(r.start_text(), r.end_text(), r.duration_text())
    }
}

impl TryFrom<RawRecord> for SessionRecord {
    type Error = String;

    fn try_from(raw: RawRecord) -> Result<Self, Self::Error> {
        let RawRecord(start, end, duration) = raw;
        let start_dt = parse_timestamp(&start).ok_or_else(|| format!("bad start time \"{}\"", start))?;
        let end_dt = parse_timestamp(&end).ok_or_else(|| format!("bad end time \"{}\"", end))?;
        let duration = parse_duration(&duration).ok_or_else(|| format!("bad duration \"{}\"", duration))?;
        if end_dt < start_dt || duration < TimeDelta::zero() {
            // Clock stepped back mid-session (DST fall-back); older files hold a negative duration.
            warn!(start = %start, end = %end, "session ends before it starts; clamped to zero length");
            return Ok(SessionRecord::new(start_dt, end_dt));
        }
        // Stored duration is kept as written; older files can differ from end - start by a second.
        Ok(SessionRecord {
            start: start_dt,
            end: end_dt,
            duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 2, 20)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_new_computes_duration() {
        let r = SessionRecord::new(at(9, 0, 0), at(10, 30, 5));
        assert_eq!(r.duration(), TimeDelta::seconds(5405));
        assert_eq!(r.duration_text(), "1:30:05");
        assert_eq!(r.end() - r.start(), r.duration());
    }

    #[test]
    fn test_new_truncates_sub_second_precision() {
        let start = at(9, 0, 0) + TimeDelta::milliseconds(900);
        let end = at(9, 0, 2) + TimeDelta::milliseconds(100);
        let r = SessionRecord::new(start, end);
        assert_eq!(r.start(), at(9, 0, 0));
        assert_eq!(r.end(), at(9, 0, 2));
        assert_eq!(r.duration_text(), "0:00:02");
    }

    #[test]
    fn test_new_clamps_backwards_clock() {
        let r = SessionRecord::new(at(10, 0, 0), at(9, 0, 0));
        assert_eq!(r.end(), r.start());
        assert_eq!(r.duration_text(), "0:00:00");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(TimeDelta::zero()), "0:00:00");
        assert_eq!(format_duration(TimeDelta::seconds(59)), "0:00:59");
        assert_eq!(format_duration(TimeDelta::seconds(3600)), "1:00:00");
        assert_eq!(format_duration(TimeDelta::seconds(90_061)), "25:01:01");
        assert_eq!(format_duration(TimeDelta::seconds(-5)), "0:00:00");
    }

    #[test]
    fn test_parse_duration_short_form() {
        assert_eq!(parse_duration("0:00:02"), Some(TimeDelta::seconds(2)));
        assert_eq!(parse_duration("12:34:56"), Some(TimeDelta::seconds(45_296)));
        assert_eq!(parse_duration("25:01:01"), Some(TimeDelta::seconds(90_061)));
    }

    #[test]
    fn test_parse_duration_day_form() {
        assert_eq!(parse_duration("1 day, 1:01:01"), Some(TimeDelta::seconds(90_061)));
        assert_eq!(parse_duration("2 days, 0:00:00"), Some(TimeDelta::seconds(172_800)));
    }

    #[test]
    fn test_parse_duration_invalid() {
        assert!(parse_duration("").is_none());
        assert!(parse_duration("1:2:3").is_none());
        assert!(parse_duration("0:60:00").is_none());
        assert!(parse_duration("- 1 day, 23:59:59").is_none());
        assert!(parse_duration("abc").is_none());
    }

    #[test]
    fn test_parse_duration_negative_day_form() {
        assert_eq!(parse_duration("-1 day, 23:20:00"), Some(TimeDelta::seconds(-2400)));
        assert_eq!(parse_duration("-1 day, 23:59:59"), Some(TimeDelta::seconds(-1)));
    }

    #[test]
    fn test_deserialize_clamps_session_across_clock_step_back() {
        let json = r#"["2025-11-02 01:50:00","2025-11-02 01:10:00","-1 day, 23:20:00"]"#;
        let r: SessionRecord = serde_json::from_str(json).unwrap();
        assert_eq!(r.start_text(), "2025-11-02 01:50:00");
        assert_eq!(r.end(), r.start());
        assert_eq!(r.duration_text(), "0:00:00");
    }

    #[test]
    fn test_history_line() {
        let r = SessionRecord::new(at(9, 0, 0), at(9, 0, 2));
        assert_eq!(
            r.history_line(1),
            "1. Start: 2025-02-20 09:00:00, End: 2025-02-20 09:00:02, Duration: 0:00:02"
        );
    }

    #[test]
    fn test_serializes_as_string_triple() {
        let r = SessionRecord::new(at(9, 0, 0), at(9, 0, 2));
        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(json, r#"["2025-02-20 09:00:00","2025-02-20 09:00:02","0:00:02"]"#);
    }

    #[test]
    fn test_deserialize_keeps_stored_duration() {
        let json = r#"["2025-02-20 09:00:00","2025-02-20 09:00:02","0:00:01"]"#;
        let r: SessionRecord = serde_json::from_str(json).unwrap();
        assert_eq!(r.duration(), TimeDelta::seconds(1));
    }

    #[test]
    fn test_deserialize_rejects_malformed() {
        let bad = [
            r#"["2025-02-20 09:00","2025-02-20 09:00:02","0:00:02"]"#,
            r#"["2025-02-20 09:00:00","2025-02-20 09:00:02","two seconds"]"#,
            r#"["2025-02-20 09:00:00","2025-02-20 09:00:02","-1 days 0:00:00"]"#,
            r#"["2025-02-20 09:00:00","2025-02-20 09:00:02"]"#,
        ];
        for json in bad {
            assert!(serde_json::from_str::<SessionRecord>(json).is_err(), "accepted {}", json);
        }
    }
}
