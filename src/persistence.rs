//! # Snapshot Persistence
//!
//! The history and settings are persisted together as one JSON document:
//!
//! ```json
//! {
//!   "locationsByDate": { "2024-01-01": [ { "id": "...", "timestamp": 0, "coords": { ... } } ] },
//!   "trackingSettings": { "foregroundInterval": 5000, ... }
//! }
//! ```
//!
//! Storage backends only move that document in and out of durable storage:
//!
//! 1. [`JsonFileStorage`] - a file on disk, replaced atomically on each write
//! 2. [`MemoryStorage`] - a shared in-process slot (tests, ephemeral sessions)
//! 3. `SqliteStorage` - a key/value row in SQLite (feature `persistence`)
//!
//! Writes run on a background thread owned by [`SnapshotWriter`]. Mutations
//! hand it a snapshot and return immediately; consecutive snapshots queued
//! behind a slow write are coalesced so only the newest is written.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{LocationHistoryError, Result};
use crate::{DayKey, LocationSample, TrackingSettings};

/// Key under which the document is stored in key/value backends.
pub const STORAGE_KEY: &str = "location-storage";

// ============================================================================
// Document
// ============================================================================

/// Owned form of the persisted document, as read back from storage.
///
/// Day keys stay as raw strings here; the store validates them on restore.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedDocument {
    #[serde(default)]
    pub locations_by_date: BTreeMap<String, Vec<LocationSample>>,
    #[serde(default)]
    pub tracking_settings: TrackingSettings,
}

/// Top-level field names of the document.
const DOCUMENT_SECTIONS: [&str; 2] = ["locationsByDate", "trackingSettings"];

/// Key of the `{"state": {...}, "version": n}` envelope some writers wrap
/// the document in.
const ENVELOPE_STATE_KEY: &str = "state";

impl PersistedDocument {
    /// Decode a document from JSON.
    ///
    /// A document wrapped in a `state` envelope is unwrapped. JSON that carries
    /// neither section is rejected rather than read as an empty history, so a
    /// later save cannot overwrite data this version does not understand.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;

        let body = if has_sections(&value) {
            value
        } else {
            let keys = describe_keys(&value);
            match value {
                Value::Object(mut map) => map
                    .remove(ENVELOPE_STATE_KEY)
                    .filter(has_sections)
                    .ok_or(LocationHistoryError::UnrecognizedDocument { message: keys })?,
                _ => return Err(LocationHistoryError::UnrecognizedDocument { message: keys }),
            }
        };

        Ok(serde_json::from_value(body)?)
    }
}

fn has_sections(value: &Value) -> bool {
    DOCUMENT_SECTIONS.iter().any(|key| value.get(key).is_some())
}

fn describe_keys(value: &Value) -> String {
    match value {
        Value::Object(map) if map.is_empty() => "empty object".to_string(),
        Value::Object(map) => {
            let keys: Vec<&str> = map.keys().map(String::as_str).collect();
            format!("top-level keys [{}]", keys.join(", "))
        }
        other => format!("expected an object, found {}", json_kind(other)),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Borrowed view used for encoding without copying samples.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DocumentRef<'a> {
    locations_by_date: BTreeMap<String, &'a [LocationSample]>,
    tracking_settings: &'a TrackingSettings,
}

/// Point-in-time copy of the persisted subset of store state.
///
/// Day sequences are shared with the store, so taking a snapshot costs one
/// reference-count bump per day rather than a copy of every sample.
#[derive(Debug, Clone, Default)]
pub struct HistorySnapshot {
    pub days: BTreeMap<DayKey, Arc<Vec<LocationSample>>>,
    pub settings: TrackingSettings,
}

impl HistorySnapshot {
    /// Encode the snapshot as the persisted JSON document.
    pub fn to_json(&self) -> Result<String> {
        let document = DocumentRef {
            locations_by_date: self
                .days
                .iter()
                .map(|(day, samples)| (day.to_string(), samples.as_slice()))
                .collect(),
            tracking_settings: &self.settings,
        };
        Ok(serde_json::to_string(&document)?)
    }

    /// Total samples across all days.
    pub fn sample_count(&self) -> usize {
        self.days.values().map(|d| d.len()).sum()
    }
}

// ============================================================================
// Storage Backends
// ============================================================================

/// Durable home for the persisted document.
///
/// Implementations are moved onto the writer thread, so they must be `Send`.
pub trait SnapshotStorage: Send {
    /// Read the stored document, or `None` if nothing has been written yet.
    fn read(&self) -> Result<Option<String>>;

    /// Replace the stored document.
    fn write(&self, document: &str) -> Result<()>;

    /// Short description for log lines.
    fn describe(&self) -> String;
}

/// Document stored as a JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SnapshotStorage for JsonFileStorage {
    fn read(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, document: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        // Write-then-rename so a crash mid-write leaves the previous document intact
        let tmp = self.temp_path();
        fs::write(&tmp, document)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}

/// Document held in memory. Clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    slot: Arc<Mutex<Option<String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an existing document.
    pub fn with_document(document: impl Into<String>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(document.into()))),
        }
    }

    /// Current contents of the slot.
    pub fn contents(&self) -> Option<String> {
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl SnapshotStorage for MemoryStorage {
    fn read(&self) -> Result<Option<String>> {
        Ok(self.contents())
    }

    fn write(&self, document: &str) -> Result<()> {
        *self
            .slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(document.to_string());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// Document stored in a SQLite key/value table.
#[cfg(feature = "persistence")]
pub struct SqliteStorage {
    db: rusqlite::Connection,
    db_path: String,
}

#[cfg(feature = "persistence")]
impl SqliteStorage {
    /// Open (or create) the database at the given path.
    pub fn new(db_path: &str) -> Result<Self> {
        let db = rusqlite::Connection::open(db_path)?;
        Self::init_schema(&db)?;
        Ok(Self {
            db,
            db_path: db_path.to_string(),
        })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::new(":memory:")
    }

    fn init_schema(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER DEFAULT (strftime('%s', 'now'))
            );
            "#,
        )
    }
}

#[cfg(feature = "persistence")]
impl SnapshotStorage for SqliteStorage {
    fn read(&self) -> Result<Option<String>> {
        use rusqlite::OptionalExtension;

        let value = self
            .db
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?",
                rusqlite::params![STORAGE_KEY],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn write(&self, document: &str) -> Result<()> {
        self.db.execute(
            "INSERT OR REPLACE INTO kv_store (key, value, updated_at)
             VALUES (?, ?, strftime('%s', 'now'))",
            rusqlite::params![STORAGE_KEY, document],
        )?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("sqlite {}", self.db_path)
    }
}

// ============================================================================
// Background Writer
// ============================================================================

enum WriterCommand {
    Write(HistorySnapshot),
    Flush(Sender<Option<String>>),
}

/// Fire-and-forget snapshot writer running on its own thread.
///
/// Write failures are logged and remembered until the next [`flush`](Self::flush),
/// which reports them; they never reach the mutation that queued the snapshot.
pub struct SnapshotWriter {
    sender: Option<Sender<WriterCommand>>,
    handle: Option<JoinHandle<()>>,
}

impl SnapshotWriter {
    /// Spawn the writer thread, taking ownership of the storage backend.
    pub fn spawn(storage: Box<dyn SnapshotStorage>) -> Result<Self> {
        let (sender, receiver) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("snapshot-writer".to_string())
            .spawn(move || run_writer(storage, receiver))?;

        Ok(Self {
            sender: Some(sender),
            handle: Some(handle),
        })
    }

    /// Queue a snapshot for writing. Never blocks.
    pub fn submit(&self, snapshot: HistorySnapshot) {
        let sent = self
            .sender
            .as_ref()
            .map(|s| s.send(WriterCommand::Write(snapshot)).is_ok())
            .unwrap_or(false);
        if !sent {
            log::warn!("[SnapshotWriter] Writer thread gone, snapshot dropped");
        }
    }

    /// Block until every queued snapshot has been written.
    ///
    /// Returns the most recent write failure since the previous flush, if any.
    pub fn flush(&self) -> Result<()> {
        let unavailable = |message: &str| LocationHistoryError::WriterUnavailable {
            message: message.to_string(),
        };

        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| unavailable("writer shut down"))?;
        let (ack_tx, ack_rx) = mpsc::channel();
        sender
            .send(WriterCommand::Flush(ack_tx))
            .map_err(|_| unavailable("writer thread exited"))?;

        match ack_rx.recv() {
            Ok(None) => Ok(()),
            Ok(Some(message)) => Err(LocationHistoryError::WriteFailed { message }),
            Err(_) => Err(unavailable("writer thread exited")),
        }
    }
}

impl Drop for SnapshotWriter {
    fn drop(&mut self) {
        // Closing the channel lets the thread drain what is queued and exit
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("[SnapshotWriter] Writer thread panicked");
            }
        }
    }
}

fn run_writer(storage: Box<dyn SnapshotStorage>, receiver: Receiver<WriterCommand>) {
    log::info!("[SnapshotWriter] Started ({})", storage.describe());
    let mut last_error: Option<String> = None;
    let mut pending: Option<HistorySnapshot> = None;

    loop {
        // Block only when there is nothing left to write
        let command = if pending.is_some() {
            match receiver.try_recv() {
                Ok(cmd) => Some(cmd),
                Err(mpsc::TryRecvError::Empty) => None,
                Err(mpsc::TryRecvError::Disconnected) => None,
            }
        } else {
            match receiver.recv() {
                Ok(cmd) => Some(cmd),
                Err(_) => break,
            }
        };

        match command {
            Some(WriterCommand::Write(snapshot)) => {
                // Newer snapshot supersedes the queued one
                pending = Some(snapshot);
            }
            Some(WriterCommand::Flush(ack)) => {
                if let Some(snapshot) = pending.take() {
                    write_snapshot(storage.as_ref(), &snapshot, &mut last_error);
                }
                let _ = ack.send(last_error.take());
            }
            None => {
                if let Some(snapshot) = pending.take() {
                    write_snapshot(storage.as_ref(), &snapshot, &mut last_error);
                }
            }
        }
    }

    log::info!("[SnapshotWriter] Stopped");
}

fn write_snapshot(
    storage: &dyn SnapshotStorage,
    snapshot: &HistorySnapshot,
    last_error: &mut Option<String>,
) {
    let result = snapshot.to_json().and_then(|doc| storage.write(&doc));
    match result {
        Ok(()) => log::debug!(
            "[SnapshotWriter] Wrote {} days, {} samples",
            snapshot.days.len(),
            snapshot.sample_count()
        ),
        Err(e) => {
            log::warn!("[SnapshotWriter] Write to {} failed: {}", storage.describe(), e);
            *last_error = Some(e.to_string());
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Coordinates;

    fn snapshot_with(day: &str, ids: &[&str]) -> HistorySnapshot {
        let samples: Vec<LocationSample> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| {
                LocationSample::new(*id, 1_000 * i as i64, Coordinates::new(51.5, -0.12))
            })
            .collect();
        let mut days = BTreeMap::new();
        days.insert(DayKey::parse(day).unwrap(), Arc::new(samples));
        HistorySnapshot {
            days,
            settings: TrackingSettings::default(),
        }
    }

    #[test]
    fn test_document_round_trip() {
        let snapshot = snapshot_with("2024-01-01", &["a", "b"]);
        let json = snapshot.to_json().unwrap();
        let doc = PersistedDocument::from_json(&json).unwrap();

        assert_eq!(doc.locations_by_date.len(), 1);
        let samples = &doc.locations_by_date["2024-01-01"];
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].id, "a");
        assert_eq!(samples[1].id, "b");
        assert_eq!(doc.tracking_settings, TrackingSettings::default());
    }

    #[test]
    fn test_missing_section_defaults() {
        let doc = PersistedDocument::from_json(r#"{"trackingSettings":{}}"#).unwrap();
        assert!(doc.locations_by_date.is_empty());
        assert_eq!(doc.tracking_settings, TrackingSettings::default());

        let doc = PersistedDocument::from_json(r#"{"locationsByDate":{}}"#).unwrap();
        assert_eq!(doc.tracking_settings, TrackingSettings::default());
    }

    #[test]
    fn test_unrecognized_document_rejected() {
        for json in ["{}", r#"{"foo":1}"#, "[]", r#"{"state":{"other":true},"version":0}"#] {
            let err = PersistedDocument::from_json(json).unwrap_err();
            assert!(
                matches!(err, LocationHistoryError::UnrecognizedDocument { .. }),
                "{} gave {:?}",
                json,
                err
            );
        }
    }

    #[test]
    fn test_state_envelope_unwrapped() {
        let json = r#"{
            "state": {
                "locationsByDate": {
                    "2024-01-01": [{"id":"a","timestamp":1704103200000,
                                    "coords":{"latitude":1.0,"longitude":2.0}}]
                },
                "trackingSettings": {"accuracyLevel":"high"}
            },
            "version": 0
        }"#;
        let doc = PersistedDocument::from_json(json).unwrap();
        assert_eq!(doc.locations_by_date["2024-01-01"][0].id, "a");
        assert_eq!(doc.tracking_settings.accuracy_level, crate::AccuracyLevel::High);
    }

    #[test]
    fn test_memory_storage_shared_slot() {
        let storage = MemoryStorage::new();
        let view = storage.clone();
        assert_eq!(storage.read().unwrap(), None);
        storage.write("{}").unwrap();
        assert_eq!(view.contents().as_deref(), Some("{}"));
    }

    #[test]
    fn test_json_file_storage_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::new(dir.path().join("nested").join("history.json"));
        assert_eq!(storage.read().unwrap(), None);

        storage.write("{\"locationsByDate\":{}}").unwrap();
        assert_eq!(
            storage.read().unwrap().as_deref(),
            Some("{\"locationsByDate\":{}}")
        );
    }

    #[test]
    fn test_writer_flush_writes_latest() {
        let storage = MemoryStorage::new();
        let writer = SnapshotWriter::spawn(Box::new(storage.clone())).unwrap();

        writer.submit(snapshot_with("2024-01-01", &["a"]));
        writer.submit(snapshot_with("2024-01-01", &["a", "b"]));
        writer.flush().unwrap();

        let doc = PersistedDocument::from_json(&storage.contents().unwrap()).unwrap();
        assert_eq!(doc.locations_by_date["2024-01-01"].len(), 2);
    }

    #[test]
    fn test_writer_drains_on_drop() {
        let storage = MemoryStorage::new();
        {
            let writer = SnapshotWriter::spawn(Box::new(storage.clone())).unwrap();
            writer.submit(snapshot_with("2024-02-02", &["x"]));
        }
        let doc = PersistedDocument::from_json(&storage.contents().unwrap()).unwrap();
        assert!(doc.locations_by_date.contains_key("2024-02-02"));
    }

    struct FailingStorage;

    impl SnapshotStorage for FailingStorage {
        fn read(&self) -> Result<Option<String>> {
            Ok(None)
        }

        fn write(&self, _document: &str) -> Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only").into())
        }

        fn describe(&self) -> String {
            "failing".to_string()
        }
    }

    #[test]
    fn test_writer_reports_failure_on_flush_only() {
        let writer = SnapshotWriter::spawn(Box::new(FailingStorage)).unwrap();
        writer.submit(snapshot_with("2024-01-01", &["a"]));

        let err = writer.flush().unwrap_err();
        assert!(err.to_string().contains("read-only"));

        // Error is reported once
        assert!(writer.flush().is_ok());
    }

    #[cfg(feature = "persistence")]
    #[test]
    fn test_sqlite_storage_round_trip() {
        let storage = SqliteStorage::in_memory().unwrap();
        assert_eq!(storage.read().unwrap(), None);
        storage.write("{\"a\":1}").unwrap();
        storage.write("{\"a\":2}").unwrap();
        assert_eq!(storage.read().unwrap().as_deref(), Some("{\"a\":2}"));
    }
}
