// Copyright (c) 2025 Robert August Vincent II <pillarsdotnet@gmail.com>
// Co-author: Cursor-AI.

//! Client → session history mapping, persisted as one JSON object.
//!
//! Every mutation rewrites the whole file. There is no locking: an external edit
//! made between load and the next save is overwritten (last writer wins).

use crate::error::{Result, TrackerError};
use crate::record::SessionRecord;
use chrono::Local;
use indexmap::IndexMap;
use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Client name → chronological session list, clients in the order they were added
/// (or the order they appear in the data file).
pub type Sessions = IndexMap<String, Vec<SessionRecord>>;

/// Reads the store at `path`. A missing file yields an empty mapping.
pub fn load_sessions(path: &Path) -> Result<Sessions> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no session data yet");
            return Ok(Sessions::new());
        }
        Err(e) => {
            return Err(TrackerError::Load {
                path: path.to_path_buf(),
                details: e.to_string(),
            })
        }
    };
    let sessions: Sessions = serde_json::from_str(&content).map_err(|e| TrackerError::Load {
        path: path.to_path_buf(),
        details: e.to_string(),
    })?;
    debug!(path = %path.display(), clients = sessions.len(), "loaded session data");
    Ok(sessions)
}

/// Serializes the whole mapping and replaces the file at `path`.
/// Writes a sibling `.tmp` file and renames it over the target, creating the parent directory if needed.
pub fn persist_sessions(path: &Path, sessions: &Sessions) -> Result<()> {
    let persist_err = |source: io::Error| TrackerError::Persist {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(persist_err)?;
    }
    let json = serde_json::to_vec_pretty(sessions).map_err(|e| persist_err(io::Error::other(e)))?;
    let tmp = sibling_with_suffix(path, ".tmp");
    let write_tmp = || -> io::Result<()> {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(&json)?;
        f.write_all(b"\n")?;
        f.sync_all()
    };
    if let Err(e) = write_tmp().and_then(|()| fs::rename(&tmp, path)) {
        let _ = fs::remove_file(&tmp);
        return Err(persist_err(e));
    }
    debug!(path = %path.display(), clients = sessions.len(), "saved session data");
    Ok(())
}

/// Moves an unreadable store to `<file>.<YYMMDDHHMMSS>.corrupt` so the next save cannot overwrite it.
pub fn quarantine_unreadable(path: &Path) -> io::Result<PathBuf> {
    let stamp = Local::now().format("%y%m%d%H%M%S").to_string();
    let dest = sibling_with_suffix(path, &format!(".{}.corrupt", stamp));
    fs::rename(path, &dest)?;
    Ok(dest)
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("billable_tracker_data.json"));
    name.push(suffix);
    path.with_file_name(name)
}

/// Destination for records produced by the timer.
pub trait RecordSink {
    fn append_record(&mut self, client: &str, record: SessionRecord) -> Result<()>;
}

/// In-memory mapping plus the file it is mirrored to.
#[derive(Debug)]
pub struct SessionStore {
    path: PathBuf,
    sessions: Sessions,
}

impl SessionStore {
    /// Loads the store from `path`; missing file → empty store.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let sessions = load_sessions(&path)?;
        Ok(Self { path, sessions })
    }

    /// An empty store bound to `path`. Nothing is written until the first mutation.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            sessions: Sessions::new(),
        }
    }

    /// Loads the store, falling back to an empty one if the file is unreadable.
    /// The unreadable file is moved aside first. The load error is returned so the caller can report it.
    pub fn load_or_recover(path: impl Into<PathBuf>) -> (Self, Option<TrackerError>) {
        let path = path.into();
        match Self::load(path.clone()) {
            Ok(store) => (store, None),
            Err(e) => {
                warn!(error = %e, "starting with empty session data");
                match quarantine_unreadable(&path) {
                    Ok(dest) => warn!(moved_to = %dest.display(), "kept unreadable session data"),
                    Err(qe) => warn!(error = %qe, "could not move unreadable session data aside"),
                }
                (Self::empty(path), Some(e))
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sessions(&self) -> &Sessions {
        &self.sessions
    }

    /// Client names in insertion order.
    pub fn clients(&self) -> impl Iterator<Item = &str> {
        self.sessions.keys().map(String::as_str)
    }

    pub fn contains(&self, client: &str) -> bool {
        self.sessions.contains_key(client)
    }

    pub fn history(&self, client: &str) -> Option<&[SessionRecord]> {
        self.sessions.get(client).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Writes the current mapping to disk.
    pub fn persist(&self) -> Result<()> {
        persist_sessions(&self.path, &self.sessions)
    }

    pub fn add_client(&mut self, client: &str) -> Result<()> {
        if self.sessions.contains_key(client) {
            return Err(TrackerError::DuplicateClient(client.to_string()));
        }
        self.sessions.insert(client.to_string(), Vec::new());
        debug!(client, "added client");
        self.persist()
    }

    /// Removes the client together with its history.
    pub fn remove_client(&mut self, client: &str) -> Result<()> {
        if self.sessions.shift_remove(client).is_none() {
            return Err(TrackerError::UnknownClient(client.to_string()));
        }
        debug!(client, "removed client");
        self.persist()
    }

    /// Clears the client's history; the client itself stays.
    pub fn reset_history(&mut self, client: &str) -> Result<()> {
        let history = self
            .sessions
            .get_mut(client)
            .ok_or_else(|| TrackerError::UnknownClient(client.to_string()))?;
        history.clear();
        debug!(client, "reset history");
        self.persist()
    }
}

impl RecordSink for SessionStore {
    fn append_record(&mut self, client: &str, record: SessionRecord) -> Result<()> {
        let history = self
            .sessions
            .get_mut(client)
            .ok_or_else(|| TrackerError::UnknownClient(client.to_string()))?;
        debug!(client, duration = %record.duration_text(), "appending session");
        history.push(record);
        self.persist()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};
    use std::collections::BTreeSet;

    fn at(d: u32, h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 2, d)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn record(d: u32, h: u32, secs: i64) -> SessionRecord {
        let start = at(d, h, 0, 0);
        SessionRecord::new(start, start + chrono::TimeDelta::seconds(secs))
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::load(dir.path().join("data.json")).unwrap();
        assert!(store.is_empty());
        assert!(!dir.path().join("data.json").exists());
    }

    #[test]
    fn test_load_unparsable_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        fs::write(&path, "{not json").unwrap();
        let result = SessionStore::load(&path);
        assert!(matches!(result, Err(TrackerError::Load { .. })));
        assert_eq!(fs::read_to_string(&path).unwrap(), "{not json");
    }

    #[test]
    fn test_load_bad_record_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        fs::write(&path, r#"{"Acme": [["yesterday", "today", "0:00:01"]]}"#).unwrap();
        assert!(matches!(SessionStore::load(&path), Err(TrackerError::Load { .. })));
    }

    #[test]
    fn test_load_original_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        fs::write(
            &path,
            r#"{"Acme": [["2025-02-20 09:00:00", "2025-02-21 10:00:00", "1 day, 1:00:00"]], "Globex": []}"#,
        )
        .unwrap();
        let store = SessionStore::load(&path).unwrap();
        assert_eq!(store.clients().collect::<Vec<_>>(), vec!["Acme", "Globex"]);
        let history = store.history("Acme").unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].duration_text(), "25:00:00");
        assert_eq!(store.history("Globex"), Some(&[][..]));
    }

    #[test]
    fn test_load_or_recover_moves_corrupt_file_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        fs::write(&path, "garbage").unwrap();
        let (store, err) = SessionStore::load_or_recover(&path);
        assert!(matches!(err, Some(TrackerError::Load { .. })));
        assert!(store.is_empty());
        assert!(!path.exists());
        let kept: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().ends_with(".corrupt"))
            .collect();
        assert_eq!(kept.len(), 1);
        assert_eq!(fs::read_to_string(kept[0].path()).unwrap(), "garbage");
    }

    #[test]
    fn test_persist_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        let mut sessions = Sessions::new();
        sessions.insert("Acme".to_string(), vec![record(3, 9, 2), record(1, 9, 60), record(2, 9, 3600)]);
        sessions.insert("Globex, Inc.".to_string(), vec![record(4, 13, 45)]);
        sessions.insert("Initech".to_string(), Vec::new());
        persist_sessions(&path, &sessions).unwrap();
        let loaded = load_sessions(&path).unwrap();
        assert_eq!(loaded, sessions);
        assert!(loaded.keys().eq(sessions.keys()));
    }

    #[test]
    fn test_client_order_follows_data_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        fs::write(&path, r#"{"Zeta": [], "Acme": [], "Moxie": []}"#).unwrap();
        let mut store = SessionStore::load(&path).unwrap();
        assert_eq!(store.clients().collect::<Vec<_>>(), vec!["Zeta", "Acme", "Moxie"]);
        store.add_client("Beta").unwrap();
        store.remove_client("Acme").unwrap();
        let reloaded = SessionStore::load(&path).unwrap();
        assert_eq!(reloaded.clients().collect::<Vec<_>>(), vec!["Zeta", "Moxie", "Beta"]);
    }

    #[test]
    fn test_load_keeps_session_across_clock_step_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        fs::write(
            &path,
            r#"{"Acme": [["2025-11-02 01:50:00", "2025-11-02 01:10:00", "-1 day, 23:20:00"]],
                "Globex": [["2025-11-03 09:00:00", "2025-11-03 09:30:00", "0:30:00"]]}"#,
        )
        .unwrap();
        let (store, err) = SessionStore::load_or_recover(&path);
        assert!(err.is_none(), "{:?}", err);
        assert!(path.exists());
        assert_eq!(store.clients().collect::<Vec<_>>(), vec!["Acme", "Globex"]);
        assert_eq!(store.history("Acme").unwrap()[0].duration_text(), "0:00:00");
        assert_eq!(store.history("Globex").unwrap()[0].duration_text(), "0:30:00");
    }

    #[test]
    fn test_persist_creates_parent_and_leaves_no_tmp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".billable_tracker").join("data.json");
        persist_sessions(&path, &Sessions::new()).unwrap();
        assert!(path.exists());
        let names: Vec<String> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["data.json".to_string()]);
    }

    #[test]
    fn test_persist_failure_keeps_memory_state() {
        let dir = tempfile::tempdir().unwrap();
        // The parent "directory" is a regular file, so every write fails.
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "").unwrap();
        let mut store = SessionStore::empty(blocker.join("data.json"));
        let result = store.add_client("Acme");
        assert!(matches!(result, Err(TrackerError::Persist { .. })));
        assert!(store.contains("Acme"));
    }

    #[test]
    fn test_add_client_persists_empty_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        let mut store = SessionStore::load(&path).unwrap();
        store.add_client("Acme").unwrap();
        let reloaded = SessionStore::load(&path).unwrap();
        assert_eq!(reloaded.history("Acme"), Some(&[][..]));
    }

    #[test]
    fn test_add_client_duplicate_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        let mut store = SessionStore::load(&path).unwrap();
        store.add_client("Acme").unwrap();
        store.append_record("Acme", record(1, 9, 10)).unwrap();
        let before = store.sessions().clone();
        let on_disk = fs::read_to_string(&path).unwrap();
        let result = store.add_client("Acme");
        assert!(matches!(result, Err(TrackerError::DuplicateClient(ref c)) if c == "Acme"));
        assert_eq!(store.sessions(), &before);
        assert_eq!(fs::read_to_string(&path).unwrap(), on_disk);
    }

    #[test]
    fn test_client_set_is_added_minus_removed() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SessionStore::empty(dir.path().join("data.json"));
        let added = ["a", "b", "c", "d", "e"];
        let removed = ["b", "e"];
        for c in added {
            store.add_client(c).unwrap();
        }
        for c in removed {
            store.remove_client(c).unwrap();
        }
        let expected: BTreeSet<&str> = added.iter().copied().filter(|c| !removed.contains(c)).collect();
        assert_eq!(store.clients().collect::<BTreeSet<_>>(), expected);
        let reloaded = SessionStore::load(store.path()).unwrap();
        assert_eq!(reloaded.clients().collect::<BTreeSet<_>>(), expected);
    }

    #[test]
    fn test_remove_client_cascades_and_unknown_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SessionStore::empty(dir.path().join("data.json"));
        store.add_client("Acme").unwrap();
        store.append_record("Acme", record(1, 9, 10)).unwrap();
        store.remove_client("Acme").unwrap();
        assert!(store.history("Acme").is_none());
        assert!(matches!(store.remove_client("Acme"), Err(TrackerError::UnknownClient(_))));
    }

    #[test]
    fn test_append_record_unknown_client() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SessionStore::empty(dir.path().join("data.json"));
        let result = store.append_record("Nobody", record(1, 9, 10));
        assert!(matches!(result, Err(TrackerError::UnknownClient(ref c)) if c == "Nobody"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_append_record_keeps_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SessionStore::empty(dir.path().join("data.json"));
        store.add_client("Acme").unwrap();
        let records = [record(1, 9, 10), record(1, 11, 20), record(1, 13, 30)];
        for r in &records {
            store.append_record("Acme", r.clone()).unwrap();
        }
        assert_eq!(store.history("Acme").unwrap(), &records[..]);
        let reloaded = SessionStore::load(store.path()).unwrap();
        assert_eq!(reloaded.history("Acme").unwrap(), &records[..]);
    }

    #[test]
    fn test_reset_history_only_affects_one_client() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SessionStore::empty(dir.path().join("data.json"));
        store.add_client("Acme").unwrap();
        store.add_client("Globex").unwrap();
        store.append_record("Acme", record(1, 9, 10)).unwrap();
        store.append_record("Globex", record(1, 10, 20)).unwrap();
        store.reset_history("Acme").unwrap();
        assert_eq!(store.history("Acme"), Some(&[][..]));
        assert_eq!(store.history("Globex").unwrap().len(), 1);
        assert!(matches!(store.reset_history("Nobody"), Err(TrackerError::UnknownClient(_))));
    }
}
