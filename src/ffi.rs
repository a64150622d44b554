//! FFI bindings for mobile platforms (iOS/Android).
//!
//! This module provides the UniFFI bindings that expose the history store to
//! Kotlin and Swift. The host owns a [`LocationHistory`] object; day keys cross
//! the boundary as `YYYY-MM-DD` strings. Free functions are prefixed with
//! `ffi_` to avoid naming conflicts with the internal API.

use std::sync::{Arc, Mutex, MutexGuard};

use log::{info, warn};

use crate::geo_utils::compute_bounds;
use crate::stats::saturating_count;
use crate::tracking::{Clock, SampleIdAllocator, SystemClock};
use crate::{
    compute_stats, format_distance, format_duration, init_logging, Bounds, Coordinates, DateFilter,
    DayKey, HistoryConfig, HistoryStore, LocationSample, SettingsUpdate, TrackingSettings,
    TripStats,
};

/// Location history handle owned by the host app.
#[derive(uniffi::Object)]
pub struct LocationHistory {
    store: Mutex<HistoryStore>,
    ids: Mutex<SampleIdAllocator>,
}

impl LocationHistory {
    fn from_store(store: HistoryStore) -> Arc<Self> {
        Arc::new(Self {
            store: Mutex::new(store),
            ids: Mutex::new(SampleIdAllocator::new()),
        })
    }

    fn store(&self) -> MutexGuard<'_, HistoryStore> {
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Parse an optional day key. `None` selects every day.
fn parse_filter(day: Option<String>) -> Option<DateFilter> {
    match day {
        None => Some(DateFilter::All),
        Some(key) => match DayKey::parse(&key) {
            Ok(day) => Some(DateFilter::Day(day)),
            Err(e) => {
                warn!("[LocationHistory] {}", e);
                None
            }
        },
    }
}

/// Open (or create) a history backed by a JSON file.
/// Returns `None` if an existing file cannot be read or decoded.
#[uniffi::export]
pub fn open_location_history(storage_path: String) -> Option<Arc<LocationHistory>> {
    init_logging();
    info!("[LocationHistory] Opening {}", storage_path);
    match HistoryStore::open(&HistoryConfig::new(storage_path)) {
        Ok(store) => Some(LocationHistory::from_store(store)),
        Err(e) => {
            warn!("[LocationHistory] Open failed: {}", e);
            None
        }
    }
}

/// Create a history that is never persisted.
#[uniffi::export]
pub fn in_memory_location_history() -> Arc<LocationHistory> {
    init_logging();
    LocationHistory::from_store(HistoryStore::new())
}

#[uniffi::export]
impl LocationHistory {
    /// Record a fix received now. Returns the stored sample.
    pub fn record_fix(&self, coordinates: Coordinates) -> LocationSample {
        let now = SystemClock.now_ms();
        let id = self
            .ids
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .next_id(now);
        let sample = LocationSample::new(id, now, coordinates);
        self.store().append(sample.clone());
        sample
    }

    /// Append a fully formed sample. `false` if its id already exists that day.
    pub fn append(&self, sample: LocationSample) -> bool {
        self.store().append(sample)
    }

    pub fn set_latest_location(&self, sample: LocationSample) {
        self.store().set_latest_location(sample);
    }

    /// Samples for a day, or every sample when `day` is `None`.
    pub fn locations(&self, day: Option<String>) -> Vec<LocationSample> {
        match parse_filter(day) {
            Some(filter) => self.store().locations_for(&filter),
            None => Vec::new(),
        }
    }

    pub fn all_locations(&self) -> Vec<LocationSample> {
        self.store().all_locations_flat()
    }

    /// Recorded days, oldest first.
    pub fn day_keys(&self) -> Vec<String> {
        self.store().day_keys().iter().map(DayKey::to_string).collect()
    }

    /// Recorded days, newest first.
    pub fn days_newest_first(&self) -> Vec<String> {
        self.store()
            .days_newest_first()
            .iter()
            .map(DayKey::to_string)
            .collect()
    }

    pub fn clear_day(&self, day: String) -> bool {
        match DayKey::parse(&day) {
            Ok(day) => self.store().clear_day(&day),
            Err(e) => {
                warn!("[LocationHistory] {}", e);
                false
            }
        }
    }

    pub fn clear_all(&self) {
        self.store().clear_all();
    }

    pub fn latest_location(&self) -> Option<LocationSample> {
        self.store().latest_location().cloned()
    }

    pub fn settings(&self) -> TrackingSettings {
        self.store().settings().clone()
    }

    pub fn update_settings(&self, update: SettingsUpdate) -> TrackingSettings {
        let mut store = self.store();
        store.update_settings(&update);
        store.settings().clone()
    }

    /// Trip statistics for a day (or all days). `None` when there is nothing recorded.
    pub fn stats(&self, day: Option<String>) -> Option<TripStats> {
        compute_stats(&self.locations(day))
    }

    /// Bounding box for map framing.
    pub fn bounds(&self, day: Option<String>) -> Option<Bounds> {
        compute_bounds(&self.locations(day))
    }

    pub fn point_count(&self) -> u32 {
        saturating_count(self.store().point_count())
    }

    /// Wait for pending writes. `false` if a write failed since the last flush.
    pub fn flush(&self) -> bool {
        match self.store().flush() {
            Ok(()) => true,
            Err(e) => {
                warn!("[LocationHistory] Flush failed: {}", e);
                false
            }
        }
    }
}

#[uniffi::export]
pub fn ffi_format_distance(meters: f64) -> String {
    format_distance(meters)
}

#[uniffi::export]
pub fn ffi_format_duration(ms: i64) -> String {
    format_duration(ms)
}
