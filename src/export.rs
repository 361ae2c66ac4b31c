// Copyright (c) 2025 Robert August Vincent II <pillarsdotnet@gmail.com>
// Co-author: Cursor-AI.

//! Manual exports: one client's history as text, every client's history as CSV.

use crate::error::{Result, TrackerError};
use crate::record::SessionRecord;
use crate::store::Sessions;
use std::borrow::Cow;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tracing::debug;

pub const CSV_HEADER: [&str; 4] = ["Client", "Start Time", "End Time", "Duration"];

/// Writes `Session History for <client>` followed by one numbered line per session.
pub fn write_history_text<W: Write>(out: &mut W, client: &str, records: &[SessionRecord]) -> io::Result<()> {
    writeln!(out, "Session History for {}", client)?;
    for (i, record) in records.iter().enumerate() {
        writeln!(out, "{}", record.history_line(i + 1))?;
    }
    Ok(())
}

/// Writes the CSV header and one row per session, clients in store order. Rows end in CRLF.
pub fn write_sessions_csv<W: Write>(out: &mut W, sessions: &Sessions) -> io::Result<()> {
    write_csv_row(out, &CSV_HEADER)?;
    for (client, records) in sessions {
        for record in records {
            write_csv_row(
                out,
                &[
                    client.as_str(),
                    &record.start_text(),
                    &record.end_text(),
                    &record.duration_text(),
                ],
            )?;
        }
    }
    Ok(())
}

fn write_csv_row<W: Write>(out: &mut W, fields: &[&str]) -> io::Result<()> {
    let row: Vec<Cow<'_, str>> = fields.iter().map(|f| csv_field(f)).collect();
    write!(out, "{}\r\n", row.join(","))
}

/// Quotes a field containing a comma, quote, or line break; inner quotes are doubled.
fn csv_field(s: &str) -> Cow<'_, str> {
    if s.contains([',', '"', '\r', '\n']) {
        Cow::Owned(format!("\"{}\"", s.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(s)
    }
}

/// Saves one client's history to `path` as plain text.
pub fn save_history_text(path: &Path, client: &str, records: &[SessionRecord]) -> Result<()> {
    write_file(path, |out| write_history_text(out, client, records))?;
    debug!(path = %path.display(), client, sessions = records.len(), "saved history");
    Ok(())
}

/// Saves every client's history to `path` as CSV.
pub fn export_csv(path: &Path, sessions: &Sessions) -> Result<()> {
    write_file(path, |out| write_sessions_csv(out, sessions))?;
    debug!(path = %path.display(), clients = sessions.len(), "exported CSV");
    Ok(())
}

fn write_file<F>(path: &Path, body: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<fs::File>) -> io::Result<()>,
{
    let export_err = |source| TrackerError::Export {
        path: path.to_path_buf(),
        source,
    };
    let file = fs::File::create(path).map_err(export_err)?;
    let mut out = BufWriter::new(file);
    body(&mut out).map_err(export_err)?;
    out.flush().map_err(export_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeDelta};

    fn record(h: u32, secs: i64) -> SessionRecord {
        let start = NaiveDate::from_ymd_opt(2025, 2, 20)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap();
        SessionRecord::new(start, start + TimeDelta::seconds(secs))
    }

    #[test]
    fn test_history_text() {
        let mut out = Vec::new();
        write_history_text(&mut out, "Acme", &[record(9, 2), record(10, 3661)]).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Session History for Acme\n\
             1. Start: 2025-02-20 09:00:00, End: 2025-02-20 09:00:02, Duration: 0:00:02\n\
             2. Start: 2025-02-20 10:00:00, End: 2025-02-20 11:01:01, Duration: 1:01:01\n"
        );
    }

    #[test]
    fn test_history_text_empty() {
        let mut out = Vec::new();
        write_history_text(&mut out, "Acme", &[]).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "Session History for Acme\n");
    }

    #[test]
    fn test_csv_rows_across_clients() {
        let mut sessions = Sessions::new();
        sessions.insert("Acme".to_string(), vec![record(9, 2), record(10, 60)]);
        sessions.insert("Globex".to_string(), vec![record(13, 5)]);
        sessions.insert("Initech".to_string(), Vec::new());
        let mut out = Vec::new();
        write_sessions_csv(&mut out, &sessions).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Client,Start Time,End Time,Duration",
                "Acme,2025-02-20 09:00:00,2025-02-20 09:00:02,0:00:02",
                "Acme,2025-02-20 10:00:00,2025-02-20 10:01:00,0:01:00",
                "Globex,2025-02-20 13:00:00,2025-02-20 13:00:05,0:00:05",
            ]
        );
        assert!(text.ends_with("\r\n"));
    }

    #[test]
    fn test_csv_quotes_awkward_client_names() {
        let mut sessions = Sessions::new();
        sessions.insert("Globex, \"Inc\"".to_string(), vec![record(9, 1)]);
        let mut out = Vec::new();
        write_sessions_csv(&mut out, &sessions).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("\"Globex, \"\"Inc\"\"\",2025-02-20 09:00:00"));
    }

    #[test]
    fn test_export_csv_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("all.csv");
        let mut sessions = Sessions::new();
        sessions.insert("Acme".to_string(), vec![record(9, 2)]);
        export_csv(&path, &sessions).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "Client,Start Time,End Time,Duration\r\nAcme,2025-02-20 09:00:00,2025-02-20 09:00:02,0:00:02\r\n"
        );
    }

    #[test]
    fn test_export_to_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no-such-dir").join("history.txt");
        let result = save_history_text(&path, "Acme", &[record(9, 2)]);
        assert!(matches!(result, Err(TrackerError::Export { .. })));
    }
}
