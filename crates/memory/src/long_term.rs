//! Append-only long-term log.
//!
//! Turns are appended as single JSON lines to one file. The whole log is
//! kept in memory after the first load so searches never touch disk.
//! Write failures are logged and swallowed: losing a durability write must
//! not interrupt the conversation.

use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::Deserialize;

use rk_domain::error::{Error, Result};
use rk_domain::trace::TraceEvent;
use rk_domain::{Role, Turn};

pub struct LongTermLog {
    path: PathBuf,
    entries: RwLock<Vec<Turn>>,
}

impl LongTermLog {
    /// Open (or lazily create) the log at `path`, loading existing entries.
    ///
    /// A missing or unreadable file yields an empty log.
    pub fn open(path: &Path) -> Self {
        let entries = match read_log_file(path) {
            Ok(entries) => {
                if !entries.is_empty() {
                    tracing::info!(count = entries.len(), path = %path.display(), "loaded long-term memory");
                }
                entries
            }
            Err(e) => {
                tracing::warn!(error = %e, path = %path.display(), "failed to load long-term memory");
                Vec::new()
            }
        };
        Self {
            path: path.to_path_buf(),
            entries: RwLock::new(entries),
        }
    }

    /// Append a turn. The in-memory log is updated even if the disk write
    /// fails.
    pub fn append(&self, turn: Turn) {
        if let Err(e) = self.write_to_disk(&turn) {
            tracing::warn!(error = %e, path = %self.path.display(), "long-term memory write failed");
        }
        self.entries.write().push(turn);

        TraceEvent::LongTermAppend { entries: 1 }.emit();
    }

    /// Case-sensitive substring search over turn contents, in insertion order.
    pub fn search(&self, needle: &str) -> Vec<Turn> {
        self.entries
            .read()
            .iter()
            .filter(|t| t.content().contains(needle))
            .cloned()
            .collect()
    }

    /// Forget every entry and truncate the file.
    ///
    /// The in-memory log is emptied even when the file cannot be truncated;
    /// the error is returned so the caller can report it.
    pub fn clear(&self) -> Result<()> {
        let mut entries = self.entries.write();
        let removed = entries.len();
        entries.clear();

        if self.path.exists() {
            std::fs::File::create(&self.path).map_err(Error::Io)?;
        }
        tracing::info!(removed, path = %self.path.display(), "long-term memory cleared");
        TraceEvent::LongTermCleared { removed }.emit();
        Ok(())
    }

    pub fn entries(&self) -> Vec<Turn> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // ── Private helpers ───────────────────────────────────────────────

    fn write_to_disk(&self, turn: &Turn) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(Error::Io)?;
            }
        }
        let mut line = serde_json::to_string(turn)
            .map_err(|e| Error::Persistence(format!("serializing turn: {e}")))?;
        line.push('\n');

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(Error::Io)?;
        file.write_all(line.as_bytes()).map_err(Error::Io)?;
        Ok(())
    }
}

/// Entry shape of the older whole-file JSON array format, which had no
/// timestamps.
#[derive(Deserialize)]
struct LegacyEntry {
    role: String,
    content: String,
}

fn read_log_file(path: &Path) -> Result<Vec<Turn>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = std::fs::read_to_string(path).map_err(Error::Io)?;

    if raw.trim_start().starts_with('[') {
        let legacy: Vec<LegacyEntry> = serde_json::from_str(&raw)?;
        return Ok(legacy
            .into_iter()
            .map(|e| Turn::new(e.role.parse().unwrap_or(Role::User), e.content))
            .collect());
    }

    let mut turns = Vec::new();
    for line in raw.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Turn>(line) {
            Ok(turn) => turns.push(turn),
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed long-term memory line");
            }
        }
    }
    Ok(turns)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("lt.jsonl");

        let log = LongTermLog::open(&path);
        log.append(Turn::user("first"));
        log.append(Turn::assistant("second"));
        drop(log);

        let reopened = LongTermLog::open(&path);
        let entries = reopened.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].content(), "first");
        assert_eq!(entries[1].role(), Role::Assistant);
    }

    #[test]
    fn search_is_case_sensitive_and_ordered() {
        let dir = tempfile::tempdir().unwrap();
        let log = LongTermLog::open(&dir.path().join("lt.jsonl"));
        log.append(Turn::user("I like Rust"));
        log.append(Turn::user("rust never sleeps"));
        log.append(Turn::user("Rust again"));

        let hits = log.search("Rust");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].content(), "I like Rust");
        assert_eq!(hits[1].content(), "Rust again");
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lt.jsonl");
        let good = serde_json::to_string(&Turn::user("ok")).unwrap();
        std::fs::write(&path, format!("{good}\nnot json\n\n")).unwrap();

        let log = LongTermLog::open(&path);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn loads_legacy_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("long_term_memory.json");
        std::fs::write(
            &path,
            r#"[{"role":"user","content":"hi"},{"role":"ai","content":"hello"}]"#,
        )
        .unwrap();

        let log = LongTermLog::open(&path);
        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].role(), Role::Assistant);
    }

    #[test]
    fn clear_empties_memory_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lt.jsonl");

        let log = LongTermLog::open(&path);
        log.append(Turn::user("forget me"));
        log.append(Turn::assistant("done"));
        log.clear().unwrap();

        assert!(log.is_empty());
        assert!(log.search("forget").is_empty());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");

        // Appends after a clear start a fresh log.
        log.append(Turn::user("new start"));
        drop(log);
        let reopened = LongTermLog::open(&path);
        let entries = reopened.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].content(), "new start");
    }

    #[test]
    fn clear_before_any_write_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lt.jsonl");
        let log = LongTermLog::open(&path);
        log.clear().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn clear_reports_truncate_failure_but_forgets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocked");
        std::fs::create_dir(&path).unwrap();

        let log = LongTermLog::open(&path);
        log.append(Turn::user("still here"));
        let err = log.clear().unwrap_err();
        assert!(matches!(err, Error::Io(_)), "{err}");
        assert!(log.is_empty());
    }

    #[test]
    fn write_failure_keeps_in_memory_entry() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be makes every open fail.
        let path = dir.path().join("blocked");
        std::fs::create_dir(&path).unwrap();

        let log = LongTermLog::open(&path);
        log.append(Turn::user("still here"));
        assert_eq!(log.search("still").len(), 1);
    }
}
