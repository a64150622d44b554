//! # Tracking Session
//!
//! Drives a platform location provider and feeds its fixes into a
//! [`HistoryStore`].
//!
//! The session owns the only record of whether a GPS subscription is live:
//!
//! ```text
//! Idle ──start──▶ Requesting ──permission + initial fix + watch──▶ Active
//!   ▲                 │                                             │
//!   └──── failure ────┘                                             │
//!   └──────────────────────────────── stop ─────────────────────────┘
//! ```
//!
//! Fixes are adapted into [`LocationSample`]s at receipt: the id comes from a
//! [`SampleIdAllocator`] and the timestamp from the session's [`Clock`].

use chrono::Utc;
use log::{debug, info, warn};
use thiserror::Error;

use crate::settings::ProviderAccuracy;
use crate::{Coordinates, HistoryStore, LocationSample, TrackingSettings};

// ============================================================================
// Provider Interface
// ============================================================================

/// Result of a permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
    Undetermined,
}

/// Handle of an open position subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(pub u64);

/// Parameters for a position subscription.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatchOptions {
    pub accuracy: ProviderAccuracy,
    pub distance_interval_meters: f64,
    pub time_interval_ms: u32,
}

impl WatchOptions {
    /// Subscription parameters for foreground tracking.
    pub fn from_settings(settings: &TrackingSettings) -> Self {
        Self {
            accuracy: settings.accuracy_level.provider_accuracy(),
            distance_interval_meters: settings.distance_interval_meters,
            time_interval_ms: settings.foreground_interval_ms,
        }
    }
}

/// Errors raised while starting a tracking session.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackingError {
    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Location sensor error: {message}")]
    Sensor { message: String },
}

/// Platform location services.
///
/// Implemented by the host (or a test double). Time and distance filtering of
/// fixes happen inside the provider.
pub trait LocationProvider {
    /// Ask for foreground location access.
    fn request_permission(&mut self) -> Result<PermissionStatus, TrackingError>;

    /// Ask for background location access. Tracking continues in the
    /// foreground when this is not granted.
    fn request_background_permission(&mut self) -> Result<PermissionStatus, TrackingError> {
        Ok(PermissionStatus::Undetermined)
    }

    /// One-shot position fix.
    fn current_position(&mut self, accuracy: ProviderAccuracy)
        -> Result<Coordinates, TrackingError>;

    /// Open a subscription. Fixes are delivered to [`TrackingSession::on_fix`].
    fn watch_position(&mut self, options: &WatchOptions) -> Result<WatchId, TrackingError>;

    /// Release a subscription.
    fn clear_watch(&mut self, watch: WatchId);
}

/// Source of receipt timestamps.
pub trait Clock {
    /// Current time, milliseconds since the Unix epoch.
    fn now_ms(&self) -> i64;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

// ============================================================================
// Sample Ids
// ============================================================================

/// Issues sample ids from receipt timestamps.
///
/// An id is the receipt millisecond as a decimal string, bumped past the
/// previously issued value when the clock has not advanced.
#[derive(Debug, Clone, Default)]
pub struct SampleIdAllocator {
    last: Option<i64>,
}

impl SampleIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self, now_ms: i64) -> String {
        let id = match self.last {
            Some(last) if now_ms <= last => last + 1,
            _ => now_ms,
        };
        self.last = Some(id);
        id.to_string()
    }
}

// ============================================================================
// Session
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingState {
    Idle,
    Requesting,
    Active { watch: WatchId },
}

/// Tracking session controller.
pub struct TrackingSession<P: LocationProvider, C: Clock = SystemClock> {
    provider: P,
    clock: C,
    ids: SampleIdAllocator,
    state: TrackingState,
}

impl<P: LocationProvider> TrackingSession<P, SystemClock> {
    pub fn new(provider: P) -> Self {
        Self::with_clock(provider, SystemClock)
    }
}

impl<P: LocationProvider, C: Clock> TrackingSession<P, C> {
    pub fn with_clock(provider: P, clock: C) -> Self {
        Self {
            provider,
            clock,
            ids: SampleIdAllocator::new(),
            state: TrackingState::Idle,
        }
    }

    pub fn state(&self) -> TrackingState {
        self.state
    }

    pub fn is_tracking(&self) -> bool {
        matches!(self.state, TrackingState::Active { .. })
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    /// Start tracking, reporting failure as `false`.
    pub fn start(&mut self, store: &mut HistoryStore) -> bool {
        match self.try_start(store) {
            Ok(()) => true,
            Err(e) => {
                warn!("[TrackingSession] Failed to start: {}", e);
                false
            }
        }
    }

    /// Start tracking.
    ///
    /// Requests permission, records an initial fix, then opens a subscription
    /// configured from the store's settings. On any failure the session
    /// returns to idle. Starting an active session does nothing.
    pub fn try_start(&mut self, store: &mut HistoryStore) -> Result<(), TrackingError> {
        if self.is_tracking() {
            debug!("[TrackingSession] Already active");
            return Ok(());
        }

        self.state = TrackingState::Requesting;
        match self.begin(store) {
            Ok(watch) => {
                self.state = TrackingState::Active { watch };
                info!("[TrackingSession] Active (watch {})", watch.0);
                Ok(())
            }
            Err(e) => {
                self.state = TrackingState::Idle;
                Err(e)
            }
        }
    }

    fn begin(&mut self, store: &mut HistoryStore) -> Result<WatchId, TrackingError> {
        if self.provider.request_permission()? != PermissionStatus::Granted {
            return Err(TrackingError::PermissionDenied);
        }

        match self.provider.request_background_permission() {
            Ok(PermissionStatus::Granted) => {}
            Ok(status) => info!(
                "[TrackingSession] Background permission {:?}, tracking in foreground only",
                status
            ),
            Err(e) => warn!("[TrackingSession] Background permission request failed: {}", e),
        }

        let initial = self.provider.current_position(ProviderAccuracy::Balanced)?;
        self.record(store, initial);

        let options = WatchOptions::from_settings(store.settings());
        debug!("[TrackingSession] Watching with {:?}", options);
        self.provider.watch_position(&options)
    }

    /// Deliver a fix from the subscription. Ignored unless active.
    pub fn on_fix(&mut self, store: &mut HistoryStore, coordinates: Coordinates) -> bool {
        if !self.is_tracking() {
            debug!("[TrackingSession] Fix received while not active, ignored");
            return false;
        }
        self.record(store, coordinates);
        true
    }

    fn record(&mut self, store: &mut HistoryStore, coordinates: Coordinates) {
        let now = self.clock.now_ms();
        let id = self.ids.next_id(now);
        if !coordinates.point().is_valid() {
            warn!(
                "[TrackingSession] Fix {} out of range: ({}, {})",
                id, coordinates.latitude, coordinates.longitude
            );
        }
        store.append(LocationSample::new(id, now, coordinates));
    }

    /// Stop tracking. Returns `false` if no subscription was active.
    pub fn stop(&mut self) -> bool {
        match std::mem::replace(&mut self.state, TrackingState::Idle) {
            TrackingState::Active { watch } => {
                self.provider.clear_watch(watch);
                info!("[TrackingSession] Stopped (watch {})", watch.0);
                true
            }
            _ => false,
        }
    }
}

impl<P: LocationProvider, C: Clock> Drop for TrackingSession<P, C> {
    fn drop(&mut self) {
        if let TrackingState::Active { watch } = self.state {
            self.provider.clear_watch(watch);
        }
    }
}
