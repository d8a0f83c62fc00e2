//! Bounded, persisted per-job diagnostic log.
//!
//! Every lifecycle event (upload request/response, each poll, timeouts,
//! parse failures) leaves a timestamped [`LogEntry`] here, keyed by job id.
//! This is the debugging surface for "what actually happened to that
//! document": the short user-facing error messages point at the log, and
//! the log holds the full backend response bodies.
//!
//! # Shape
//!
//! * Newest first, capped at [`MAX_ENTRIES_PER_JOB`] entries per job; the
//!   oldest entries are evicted when the cap is hit.
//! * Dual home: an in-memory map plus one JSON file per job under the
//!   store's directory. Every append rewrites the job's file with the full
//!   truncated sequence.
//! * Lazy reconciliation: reads prefer a non-empty durable copy and seed
//!   memory with it, so logs survive process restarts without an explicit
//!   load step.
//! * Persistence is best-effort. A full disk or unwritable directory must
//!   never take polling down, so write failures are swallowed with a
//!   `warn!` and memory stays authoritative.
//!
//! # Why injectable?
//!
//! The store is constructed explicitly and shared via `Arc`, never global.
//! Every test points its controller at a fresh temp directory and asserts
//! on exactly the entries its own scenario produced; nothing leaks between
//! tests or between embedding applications.

use crate::error::DocpollError;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

/// Maximum entries retained per job. Oldest evicted first.
pub const MAX_ENTRIES_PER_JOB: usize = 200;

/// Reserved log key for failures that happen before the backend has issued
/// a job id (a rejected or unreachable upload has nowhere else to go).
pub const UNSUBMITTED_KEY: &str = "unsubmitted";

/// Diagnostic category of a log entry.
///
/// Serialised in SCREAMING_SNAKE_CASE (`"UPLOAD_REQUEST"`, …), which is
/// also the on-disk format of the per-job files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogTag {
    UploadRequest,
    UploadResponse,
    UploadError,
    PollRequest,
    PollResponse,
    PollError,
    PollTimeout,
    ParseError,
    DisplayExtraction,
    ShowRawResponse,
    DebugNote,
}

impl LogTag {
    /// The wire/display name, identical to the serialised form.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogTag::UploadRequest => "UPLOAD_REQUEST",
            LogTag::UploadResponse => "UPLOAD_RESPONSE",
            LogTag::UploadError => "UPLOAD_ERROR",
            LogTag::PollRequest => "POLL_REQUEST",
            LogTag::PollResponse => "POLL_RESPONSE",
            LogTag::PollError => "POLL_ERROR",
            LogTag::PollTimeout => "POLL_TIMEOUT",
            LogTag::ParseError => "PARSE_ERROR",
            LogTag::DisplayExtraction => "DISPLAY_EXTRACTION",
            LogTag::ShowRawResponse => "SHOW_RAW_RESPONSE",
            LogTag::DebugNote => "DEBUG_NOTE",
        }
    }
}

impl std::fmt::Display for LogTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One diagnostic record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// ISO-8601 creation instant, millisecond precision, UTC.
    pub ts: String,
    pub tag: LogTag,
    /// Free-form detail: a plain message or a full response body.
    pub detail: Value,
}

/// The per-job log store. See the module docs for the shape.
#[derive(Debug)]
pub struct JobLogStore {
    dir: PathBuf,
    entries: Mutex<HashMap<String, VecDeque<LogEntry>>>,
    live: broadcast::Sender<(String, LogEntry)>,
}

impl JobLogStore {
    /// Create a store rooted at `dir`.
    ///
    /// The directory is created lazily on the first persisted write, so
    /// construction never touches the filesystem and never fails.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let (live, _) = broadcast::channel(256);
        Self {
            dir: dir.into(),
            entries: Mutex::new(HashMap::new()),
            live,
        }
    }

    /// The directory holding the durable per-job files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Append a timestamped entry for `job_id`, evicting past the cap, and
    /// mirror the truncated sequence to disk.
    ///
    /// Infallible by design: persistence problems are downgraded to a
    /// `warn!` and the entry still lands in memory and on the live stream.
    pub fn append(&self, job_id: &str, tag: LogTag, detail: impl Into<Value>) {
        let entry = LogEntry {
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            tag,
            detail: detail.into(),
        };

        debug!("[{}] job {}: {}", tag.as_str(), job_id, entry.detail);

        let snapshot: Vec<LogEntry> = {
            let mut map = self.lock();
            let queue = map.entry(job_id.to_string()).or_default();
            queue.push_front(entry.clone());
            queue.truncate(MAX_ENTRIES_PER_JOB);
            queue.iter().cloned().collect()
        };

        self.persist(job_id, &snapshot);
        let _ = self.live.send((job_id.to_string(), entry));
    }

    /// Append a free-form `DEBUG_NOTE`.
    pub fn note(&self, job_id: &str, message: impl Into<String>) {
        self.append(job_id, LogTag::DebugNote, Value::String(message.into()));
    }

    /// Entries for a job, newest first.
    ///
    /// Prefers a non-empty durable copy (and seeds memory with it), falls
    /// back to the in-memory copy, then to empty. Never errors: an
    /// unreadable or corrupt file is treated as absent.
    pub fn entries(&self, job_id: &str) -> Vec<LogEntry> {
        if let Some(stored) = self.load_durable(job_id) {
            if !stored.is_empty() {
                self.lock()
                    .insert(job_id.to_string(), stored.iter().cloned().collect());
                return stored;
            }
        }
        self.lock()
            .get(job_id)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Remove all entries for a job, in memory and on disk.
    pub fn clear(&self, job_id: &str) {
        self.lock().remove(job_id);
        if let Err(err) = fs::remove_file(self.file_path(job_id)) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove job log file for '{}': {}", job_id, err);
            }
        }
    }

    /// Every job id with entries in memory or on disk, sorted and deduped.
    pub fn tracked_job_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().keys().cloned().collect();
        if let Ok(dir) = fs::read_dir(&self.dir) {
            for file in dir.flatten() {
                let name = file.file_name();
                let Some(name) = name.to_str() else { continue };
                if let Some(stem) = name.strip_suffix(".json") {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// The full sequence for a job as pretty-printed JSON, suitable for a
    /// downloadable artifact. Read-only with respect to the log itself.
    pub fn export(&self, job_id: &str) -> String {
        let entries = self.entries(job_id);
        serde_json::to_string_pretty(&entries).unwrap_or_else(|_| "[]".to_string())
    }

    /// Write [`Self::export`] to `path`.
    pub fn export_to_file(&self, job_id: &str, path: &Path) -> Result<(), DocpollError> {
        fs::write(path, self.export(job_id)).map_err(|source| DocpollError::LogExportFailed {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Subscribe to entries as they are appended, across all jobs.
    ///
    /// The channel is bounded; a receiver that falls far behind misses
    /// entries rather than blocking appends.
    pub fn subscribe(&self) -> broadcast::Receiver<(String, LogEntry)> {
        self.live.subscribe()
    }

    /// [`Self::subscribe`] wrapped as a `Stream`. Lag shows up as `Err`
    /// items marking the gap; the stream then resumes with the oldest
    /// retained entry.
    pub fn entry_stream(&self) -> BroadcastStream<(String, LogEntry)> {
        BroadcastStream::new(self.live.subscribe())
    }

    // ── Internals ────────────────────────────────────────────────────────

    // A poisoned map must not take polling down with it; the data is plain
    // and always left consistent, so recover the guard.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, VecDeque<LogEntry>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn file_path(&self, job_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_id(job_id)))
    }

    fn persist(&self, job_id: &str, entries: &[LogEntry]) {
        let result = (|| -> std::io::Result<()> {
            fs::create_dir_all(&self.dir)?;
            let json = serde_json::to_vec(entries).map_err(std::io::Error::other)?;
            let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
            tmp.write_all(&json)?;
            // Atomic swap: readers see the old sequence or the new one,
            // never a torn file.
            tmp.persist(self.file_path(job_id)).map_err(|e| e.error)?;
            Ok(())
        })();

        if let Err(err) = result {
            warn!("Failed to persist job log for '{}': {}", job_id, err);
        }
    }

    fn load_durable(&self, job_id: &str) -> Option<Vec<LogEntry>> {
        let bytes = fs::read(self.file_path(job_id)).ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(entries) => Some(entries),
            Err(err) => {
                warn!("Ignoring corrupt job log file for '{}': {}", job_id, err);
                None
            }
        }
    }
}

/// Keep file names safe without losing the id: anything outside
/// `[A-Za-z0-9._-]` becomes `_`. Backend ids are URL-safe in practice, so
/// this is a no-op except for hostile input.
fn sanitize_id(job_id: &str) -> String {
    job_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;
    use tokio_stream::StreamExt;

    fn fresh_store() -> (TempDir, JobLogStore) {
        let dir = TempDir::new().unwrap();
        let store = JobLogStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn append_orders_newest_first() {
        let (_dir, store) = fresh_store();
        store.append("job-1", LogTag::UploadRequest, json!({"n": 1}));
        store.append("job-1", LogTag::UploadResponse, json!({"n": 2}));
        store.append("job-1", LogTag::PollRequest, json!({"n": 3}));

        let entries = store.entries("job-1");
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].tag, LogTag::PollRequest);
        assert_eq!(entries[0].detail, json!({"n": 3}));
        assert_eq!(entries[2].tag, LogTag::UploadRequest);
    }

    #[test]
    fn cap_evicts_oldest_entries() {
        let (_dir, store) = fresh_store();
        for i in 0..(MAX_ENTRIES_PER_JOB + 5) {
            store.append("job-1", LogTag::DebugNote, json!(i));
        }

        let entries = store.entries("job-1");
        assert_eq!(entries.len(), MAX_ENTRIES_PER_JOB);
        // Newest kept at the front, the five oldest gone.
        assert_eq!(entries[0].detail, json!(MAX_ENTRIES_PER_JOB + 4));
        assert_eq!(entries[MAX_ENTRIES_PER_JOB - 1].detail, json!(5));
    }

    #[test]
    fn clear_removes_memory_and_file() {
        let (dir, store) = fresh_store();
        store.append("job-1", LogTag::DebugNote, "hello");
        assert!(dir.path().join("job-1.json").exists());

        store.clear("job-1");
        assert!(store.entries("job-1").is_empty());
        assert!(!dir.path().join("job-1.json").exists());
    }

    #[test]
    fn reads_prefer_durable_copy_and_seed_memory() {
        let dir = TempDir::new().unwrap();
        {
            let first = JobLogStore::new(dir.path());
            first.append("job-1", LogTag::PollResponse, json!({"status": "done"}));
            first.append("job-1", LogTag::DisplayExtraction, json!({"ok": true}));
        }

        // A second store over the same directory sees the persisted log.
        let second = JobLogStore::new(dir.path());
        let entries = second.entries("job-1");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].tag, LogTag::DisplayExtraction);

        // The read seeded memory: the durable file can vanish and the
        // entries remain reachable.
        fs::remove_file(dir.path().join("job-1.json")).unwrap();
        assert_eq!(second.entries("job-1").len(), 2);
    }

    #[test]
    fn unknown_job_yields_empty() {
        let (_dir, store) = fresh_store();
        assert!(store.entries("never-seen").is_empty());
    }

    #[test]
    fn persist_failure_is_swallowed() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("occupied");
        fs::write(&blocker, b"a plain file, not a directory").unwrap();

        // The store's "directory" is a file, so every persist fails.
        let store = JobLogStore::new(&blocker);
        store.append("job-1", LogTag::DebugNote, "still works");

        let entries = store.entries("job-1");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].detail, json!("still works"));
    }

    #[test]
    fn corrupt_file_falls_back_and_is_replaced() {
        let (dir, store) = fresh_store();
        fs::create_dir_all(dir.path()).unwrap();
        fs::write(dir.path().join("job-1.json"), b"{ not json").unwrap();

        assert!(store.entries("job-1").is_empty());

        store.append("job-1", LogTag::DebugNote, "fresh");
        let entries = store.entries("job-1");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].detail, json!("fresh"));
    }

    #[test]
    fn tracked_ids_union_memory_and_disk() {
        let (dir, store) = fresh_store();
        store.append("alpha", LogTag::DebugNote, "in memory and on disk");

        let orphan = serde_json::to_vec(&vec![LogEntry {
            ts: "2026-01-01T00:00:00.000Z".into(),
            tag: LogTag::DebugNote,
            detail: json!("written by an earlier run"),
        }])
        .unwrap();
        fs::write(dir.path().join("beta.json"), orphan).unwrap();

        assert_eq!(store.tracked_job_ids(), vec!["alpha", "beta"]);
    }

    #[test]
    fn export_round_trips() {
        let (_dir, store) = fresh_store();
        store.append("job-1", LogTag::PollTimeout, json!({"elapsedMs": 300000}));
        store.append("job-1", LogTag::DebugNote, "after the timeout");

        let exported = store.export("job-1");
        let parsed: Vec<LogEntry> = serde_json::from_str(&exported).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].tag, LogTag::DebugNote);
        assert_eq!(parsed[1].tag, LogTag::PollTimeout);
    }

    #[test]
    fn export_to_file_writes_artifact() {
        let (dir, store) = fresh_store();
        store.note("job-1", "artifact test");

        let out = dir.path().join("docpoll-logs-job-1.json");
        store.export_to_file("job-1", &out).unwrap();
        let parsed: Vec<LogEntry> =
            serde_json::from_slice(&fs::read(&out).unwrap()).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].tag, LogTag::DebugNote);
    }

    #[test]
    fn tags_serialise_screaming_snake() {
        assert_eq!(
            serde_json::to_string(&LogTag::UploadRequest).unwrap(),
            "\"UPLOAD_REQUEST\""
        );
        assert_eq!(
            serde_json::to_string(&LogTag::ShowRawResponse).unwrap(),
            "\"SHOW_RAW_RESPONSE\""
        );
        assert_eq!(LogTag::PollTimeout.as_str(), "POLL_TIMEOUT");
    }

    #[test]
    fn hostile_ids_cannot_escape_the_directory() {
        let (dir, store) = fresh_store();
        store.append("../escape", LogTag::DebugNote, "contained");
        assert!(dir.path().join(".._escape.json").exists());
    }

    #[tokio::test]
    async fn live_stream_delivers_appends() {
        let (_dir, store) = fresh_store();
        let mut rx = store.subscribe();

        store.append("job-1", LogTag::PollResponse, json!({"status": "processing"}));

        let (job_id, entry) = rx.recv().await.unwrap();
        assert_eq!(job_id, "job-1");
        assert_eq!(entry.tag, LogTag::PollResponse);
    }

    #[tokio::test]
    async fn entry_stream_yields_entries() {
        let (_dir, store) = fresh_store();
        let mut stream = store.entry_stream();

        store.note("job-2", "streamed");

        let item = stream.next().await.unwrap().unwrap();
        assert_eq!(item.0, "job-2");
        assert_eq!(item.1.tag, LogTag::DebugNote);
    }
}
