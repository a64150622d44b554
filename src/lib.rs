//! # Location History
//!
//! Date-partitioned GPS location history with trip statistics.
//!
//! This library provides:
//! - An append-only store of location samples grouped by local calendar day
//! - Haversine path length, duration and display formatting
//! - Snapshot persistence (JSON file, in-memory, or SQLite) written off the hot path
//! - A tracking session state machine over a platform location provider
//!
//! ## Features
//!
//! - **`persistence`** - Enable the SQLite snapshot backend
//! - **`parallel`** - Compute per-day summaries with rayon
//! - **`ffi`** - Enable FFI bindings for mobile platforms (iOS/Android)
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use location_history::{compute_stats, Coordinates, DayZone, HistoryStore, LocationSample};
//!
//! let mut store = HistoryStore::with_zone(DayZone::utc());
//! store.append(LocationSample::new("1", 1_704_103_200_000, Coordinates::new(51.5074, -0.1278)));
//! store.append(LocationSample::new("2", 1_704_103_260_000, Coordinates::new(51.5090, -0.1300)));
//!
//! let day = store.day_keys()[0];
//! let stats = compute_stats(&store.locations_for_day(&day)).unwrap();
//! assert_eq!(stats.point_count, 2);
//! assert_eq!(stats.duration_ms, 60_000);
//! ```

use serde::{Deserialize, Deserializer, Serialize};

// Unified error handling
pub mod error;
pub use error::{LocationHistoryError, Result};

// Geographic utilities (distance, duration, formatting, bounds)
pub mod geo_utils;
pub use geo_utils::{format_distance, format_duration, haversine_distance};

// Calendar-day partitioning
pub mod day_key;
pub use day_key::{DateFilter, DayKey, DayZone};

// Tracking preferences
pub mod settings;
pub use settings::{
    AccuracyLevel, ProviderAccuracy, SettingsAdvisory, SettingsUpdate, TrackingSettings,
};

// Snapshot persistence and storage backends
pub mod persistence;
#[cfg(feature = "persistence")]
pub use persistence::SqliteStorage;
pub use persistence::{JsonFileStorage, MemoryStorage, SnapshotStorage, SnapshotWriter};

// Date-partitioned history store
pub mod store;
pub use store::{HistoryConfig, HistoryStore, StoreEvent};

// Trip statistics
pub mod stats;
pub use stats::{
    compute_stats, compute_stats_with, daily_summaries, DaySummary, SampleOrdering, StatsOptions,
    TripStats,
};

// Tracking session controller
pub mod tracking;
pub use tracking::{
    Clock, LocationProvider, PermissionStatus, SampleIdAllocator, SystemClock, TrackingError,
    TrackingSession, TrackingState, WatchId, WatchOptions,
};

// FFI bindings for mobile platforms (iOS/Android)
#[cfg(feature = "ffi")]
pub mod ffi;

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!();

/// Initialize logging for Android (only used in FFI)
#[cfg(all(feature = "ffi", target_os = "android"))]
pub(crate) fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("LocationHistoryRust"),
    );
}

#[cfg(all(feature = "ffi", not(target_os = "android")))]
pub(crate) fn init_logging() {
    // No-op on non-Android platforms
}

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use location_history::GpsPoint;
/// let point = GpsPoint::new(51.5074, -0.1278); // London
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// Position and sensor metadata of a single fix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[serde(rename_all = "camelCase")]
pub struct Coordinates {
    #[serde(deserialize_with = "f64_or_nan")]
    pub latitude: f64,
    #[serde(deserialize_with = "f64_or_nan")]
    pub longitude: f64,
    /// Meters above the WGS84 ellipsoid
    pub altitude: Option<f64>,
    /// Horizontal accuracy radius in meters
    pub accuracy: Option<f64>,
    pub altitude_accuracy: Option<f64>,
    /// Degrees clockwise from true north, `[0, 360)`
    pub heading: Option<f64>,
    /// Meters per second; some sensors report negative values when unknown
    pub speed: Option<f64>,
}

impl Coordinates {
    /// Create coordinates with no sensor metadata.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude: None,
            accuracy: None,
            altitude_accuracy: None,
            heading: None,
            speed: None,
        }
    }

    /// The latitude/longitude pair.
    pub fn point(&self) -> GpsPoint {
        GpsPoint::new(self.latitude, self.longitude)
    }
}

/// JSON has no NaN or infinity; serde_json writes them as `null`.
fn f64_or_nan<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

/// One recorded GPS fix.
///
/// Samples are never edited once recorded; the store hands out copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct LocationSample {
    /// Unique within a session
    pub id: String,
    /// Capture instant, milliseconds since the Unix epoch
    pub timestamp: i64,
    #[serde(rename = "coords")]
    pub coordinates: Coordinates,
}

impl LocationSample {
    /// Create a new sample.
    pub fn new(id: impl Into<String>, timestamp: i64, coordinates: Coordinates) -> Self {
        Self {
            id: id.into(),
            timestamp,
            coordinates,
        }
    }

    /// The sample's latitude/longitude pair.
    pub fn point(&self) -> GpsPoint {
        self.coordinates.point()
    }
}

/// Bounding box of a set of samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Get the center point of the bounds.
    pub fn center(&self) -> GpsPoint {
        GpsPoint::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
