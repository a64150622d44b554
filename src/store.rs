//! # History Store
//!
//! Append-only, date-partitioned store of location samples.
//!
//! ## Architecture
//!
//! The store is an owned value; callers pass it by reference to whatever needs
//! it (the tracking session, the FFI object, the UI layer). It manages:
//! - Samples grouped by [`DayKey`], insertion order preserved per day
//! - A single "latest known location" slot, independent of the history
//! - User tracking preferences
//! - Change notification over channels
//! - Snapshot persistence through a background [`SnapshotWriter`]
//!
//! Every mutation updates memory first and then queues a snapshot; persistence
//! failures never reach the caller of a mutation.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use log::{debug, info, warn};

use crate::error::Result;
use crate::persistence::{
    HistorySnapshot, JsonFileStorage, PersistedDocument, SnapshotStorage, SnapshotWriter,
};
use crate::{DateFilter, DayKey, DayZone, LocationSample, SettingsUpdate, TrackingSettings};

// ============================================================================
// Core Types
// ============================================================================

/// Configuration for opening a file-backed store.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryConfig {
    /// Path of the JSON snapshot document
    pub storage_path: PathBuf,
    /// Time zone used to derive day keys. Default: device local time
    pub zone: DayZone,
}

impl HistoryConfig {
    pub fn new(storage_path: impl Into<PathBuf>) -> Self {
        Self {
            storage_path: storage_path.into(),
            zone: DayZone::Local,
        }
    }

    pub fn with_zone(mut self, zone: DayZone) -> Self {
        self.zone = zone;
        self
    }
}

/// Store change notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    SampleAppended { day: DayKey, id: String },
    LatestLocationChanged,
    DayCleared { day: DayKey },
    HistoryCleared,
    SettingsChanged,
}

/// One day's samples plus the ids already present in it.
#[derive(Debug, Clone, Default)]
struct DayTrack {
    samples: Arc<Vec<LocationSample>>,
    ids: HashSet<String>,
}

impl DayTrack {
    /// Append unless the id is already present.
    fn push(&mut self, sample: LocationSample) -> bool {
        if !self.ids.insert(sample.id.clone()) {
            return false;
        }
        Arc::make_mut(&mut self.samples).push(sample);
        true
    }
}

// ============================================================================
// History Store
// ============================================================================

/// The date-partitioned location history.
pub struct HistoryStore {
    // Invariant: no empty DayTrack is ever stored
    days: BTreeMap<DayKey, DayTrack>,
    latest: Option<LocationSample>,
    settings: TrackingSettings,
    zone: DayZone,

    subscribers: Vec<Sender<StoreEvent>>,
    writer: Option<SnapshotWriter>,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryStore {
    /// Create an empty, unpersisted store partitioned by local time.
    pub fn new() -> Self {
        Self::with_zone(DayZone::Local)
    }

    /// Create an empty, unpersisted store partitioned in the given zone.
    pub fn with_zone(zone: DayZone) -> Self {
        Self {
            days: BTreeMap::new(),
            latest: None,
            settings: TrackingSettings::default(),
            zone,
            subscribers: Vec::new(),
            writer: None,
        }
    }

    /// Open a store backed by a JSON file, loading any existing history.
    pub fn open(config: &HistoryConfig) -> Result<Self> {
        Self::with_storage(JsonFileStorage::new(&config.storage_path), config.zone)
    }

    /// Open a store over any storage backend.
    ///
    /// The persisted document is loaded eagerly and replaces in-memory state;
    /// the backend is then handed to a background writer for all later saves.
    pub fn with_storage<S>(storage: S, zone: DayZone) -> Result<Self>
    where
        S: SnapshotStorage + 'static,
    {
        let mut store = Self::with_zone(zone);
        let source = storage.describe();

        if let Some(json) = storage.read()? {
            let document = PersistedDocument::from_json(&json)?;
            store.restore(document);
        }
        info!(
            "[HistoryStore] Loaded {} days, {} samples from {}",
            store.days.len(),
            store.point_count(),
            source
        );

        store.writer = Some(SnapshotWriter::spawn(Box::new(storage))?);
        Ok(store)
    }

    /// Replace in-memory history and settings with a persisted document.
    ///
    /// Empty days and duplicate ids are dropped. Samples filed under a key
    /// that is not a valid date are re-filed by their own timestamp.
    fn restore(&mut self, document: PersistedDocument) {
        self.days.clear();
        self.settings = document.tracking_settings;

        for (key, samples) in document.locations_by_date {
            match DayKey::parse(&key) {
                Ok(day) => {
                    for sample in samples {
                        self.insert(day, sample);
                    }
                }
                Err(e) => {
                    warn!(
                        "[HistoryStore] {}; re-partitioning {} samples by timestamp",
                        e,
                        samples.len()
                    );
                    for sample in samples {
                        let day = self.zone.day_key(sample.timestamp);
                        self.insert(day, sample);
                    }
                }
            }
        }
    }

    fn insert(&mut self, day: DayKey, sample: LocationSample) -> bool {
        self.days.entry(day).or_default().push(sample)
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Append a sample to its day and make it the latest known location.
    ///
    /// Samples are accepted as-is (no range validation, no re-sorting).
    /// Returns `false` if a sample with the same id is already recorded for
    /// that day; the latest slot is overwritten either way.
    pub fn append(&mut self, sample: LocationSample) -> bool {
        let day = self.zone.day_key(sample.timestamp);
        let id = sample.id.clone();
        self.latest = Some(sample.clone());

        let is_new_day = !self.days.contains_key(&day);
        if !self.insert(day, sample) {
            debug!("[HistoryStore] Duplicate sample {} on {} ignored", id, day);
            self.emit(StoreEvent::LatestLocationChanged);
            return false;
        }
        if is_new_day {
            debug!("[HistoryStore] Started day {}", day);
        }

        self.emit(StoreEvent::SampleAppended { day, id });
        self.persist();
        true
    }

    /// Overwrite the latest known location without touching the history.
    pub fn set_latest_location(&mut self, sample: LocationSample) {
        self.latest = Some(sample);
        self.emit(StoreEvent::LatestLocationChanged);
    }

    /// Remove every recorded day. The latest known location is kept.
    pub fn clear_all(&mut self) {
        let removed = self.days.len();
        self.days.clear();
        info!("[HistoryStore] Cleared {} days", removed);
        self.emit(StoreEvent::HistoryCleared);
        self.persist();
    }

    /// Remove one day entirely. Returns `false` (and does nothing) if absent.
    pub fn clear_day(&mut self, day: &DayKey) -> bool {
        match self.days.remove(day) {
            Some(track) => {
                info!(
                    "[HistoryStore] Cleared {} ({} samples)",
                    day,
                    track.samples.len()
                );
                self.emit(StoreEvent::DayCleared { day: *day });
                self.persist();
                true
            }
            None => false,
        }
    }

    /// Merge a partial settings update.
    pub fn update_settings(&mut self, update: &SettingsUpdate) {
        self.settings.merge(update);
        for advisory in self.settings.advisories() {
            debug!("[HistoryStore] Setting outside recommended range: {:?}", advisory);
        }
        self.emit(StoreEvent::SettingsChanged);
        self.persist();
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Samples recorded on a day, in insertion order. Empty if the day is absent.
    pub fn locations_for_day(&self, day: &DayKey) -> Vec<LocationSample> {
        self.days
            .get(day)
            .map(|track| track.samples.as_ref().clone())
            .unwrap_or_default()
    }

    /// Every sample, day by day in ascending key order, each day in insertion order.
    ///
    /// This is partition-then-concatenate, not a global timestamp sort.
    pub fn all_locations_flat(&self) -> Vec<LocationSample> {
        self.days
            .values()
            .flat_map(|track| track.samples.iter().cloned())
            .collect()
    }

    /// Samples admitted by a date filter.
    pub fn locations_for(&self, filter: &DateFilter) -> Vec<LocationSample> {
        match filter {
            DateFilter::All => self.all_locations_flat(),
            DateFilter::Day(day) => self.locations_for_day(day),
        }
    }

    /// Days with at least one sample, oldest first.
    pub fn day_keys(&self) -> Vec<DayKey> {
        self.days.keys().copied().collect()
    }

    /// Days with at least one sample, newest first (date picker order).
    pub fn days_newest_first(&self) -> Vec<DayKey> {
        self.days.keys().rev().copied().collect()
    }

    /// Iterate over days and their samples, oldest first.
    pub fn days(&self) -> impl Iterator<Item = (&DayKey, &[LocationSample])> {
        self.days
            .iter()
            .map(|(day, track)| (day, track.samples.as_slice()))
    }

    pub fn contains_day(&self, day: &DayKey) -> bool {
        self.days.contains_key(day)
    }

    pub fn has_history(&self) -> bool {
        !self.days.is_empty()
    }

    /// Total number of recorded samples.
    pub fn point_count(&self) -> usize {
        self.days.values().map(|t| t.samples.len()).sum()
    }

    pub fn point_count_for_day(&self, day: &DayKey) -> usize {
        self.days.get(day).map(|t| t.samples.len()).unwrap_or(0)
    }

    /// The most recently appended (or explicitly set) sample.
    pub fn latest_location(&self) -> Option<&LocationSample> {
        self.latest.as_ref()
    }

    pub fn settings(&self) -> &TrackingSettings {
        &self.settings
    }

    pub fn zone(&self) -> DayZone {
        self.zone
    }

    /// Day key a timestamp would be filed under.
    pub fn day_key_for(&self, timestamp_ms: i64) -> DayKey {
        self.zone.day_key(timestamp_ms)
    }

    // ========================================================================
    // Notification & Persistence
    // ========================================================================

    /// Subscribe to change events. Dropping the receiver unsubscribes.
    pub fn subscribe(&mut self) -> Receiver<StoreEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    /// Copy of the persisted subset of state.
    pub fn snapshot(&self) -> HistorySnapshot {
        HistorySnapshot {
            days: self
                .days
                .iter()
                .map(|(day, track)| (*day, Arc::clone(&track.samples)))
                .collect(),
            settings: self.settings.clone(),
        }
    }

    /// Whether mutations are being persisted.
    pub fn is_persistent(&self) -> bool {
        self.writer.is_some()
    }

    /// Block until all queued snapshots are durable.
    ///
    /// Reports a write failure that happened since the last flush. A store
    /// without storage flushes trivially.
    pub fn flush(&self) -> Result<()> {
        match &self.writer {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }

    fn emit(&mut self, event: StoreEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn persist(&self) {
        if let Some(writer) = &self.writer {
            writer.submit(self.snapshot());
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
