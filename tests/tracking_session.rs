//! End-to-end tracking: a scripted provider feeds fixes into a persisted store.

use std::collections::VecDeque;

use location_history::{
    Coordinates, DayZone, HistoryStore, LocationProvider, MemoryStorage, PermissionStatus,
    ProviderAccuracy, SystemClock, TrackingError, TrackingSession, TrackingState, WatchId,
    WatchOptions,
};

/// Provider that replays a fixed route.
struct ScriptedProvider {
    route: VecDeque<Coordinates>,
    background: PermissionStatus,
    watching: Option<WatchId>,
}

impl ScriptedProvider {
    fn new(points: &[(f64, f64)]) -> Self {
        Self {
            route: points
                .iter()
                .map(|&(lat, lng)| Coordinates::new(lat, lng))
                .collect(),
            background: PermissionStatus::Denied,
            watching: None,
        }
    }

    fn next_fix(&mut self) -> Option<Coordinates> {
        self.route.pop_front()
    }
}

impl LocationProvider for ScriptedProvider {
    fn request_permission(&mut self) -> Result<PermissionStatus, TrackingError> {
        Ok(PermissionStatus::Granted)
    }

    fn request_background_permission(&mut self) -> Result<PermissionStatus, TrackingError> {
        Ok(self.background)
    }

    fn current_position(
        &mut self,
        _accuracy: ProviderAccuracy,
    ) -> Result<Coordinates, TrackingError> {
        self.next_fix().ok_or(TrackingError::Sensor {
            message: "no fix".to_string(),
        })
    }

    fn watch_position(&mut self, _options: &WatchOptions) -> Result<WatchId, TrackingError> {
        let watch = WatchId(7);
        self.watching = Some(watch);
        Ok(watch)
    }

    fn clear_watch(&mut self, watch: WatchId) {
        assert_eq!(self.watching, Some(watch));
        self.watching = None;
    }
}

#[test]
fn session_records_route_and_persists() {
    let _ = env_logger::builder().is_test(true).try_init();

    let storage = MemoryStorage::new();
    let mut store = HistoryStore::with_storage(storage.clone(), DayZone::utc()).unwrap();
    let mut session = TrackingSession::new(ScriptedProvider::new(&[
        (51.5000, -0.1200),
        (51.5010, -0.1200),
        (51.5020, -0.1200),
    ]));

    // Background denied still tracks in the foreground
    assert!(session.start(&mut store));
    assert_eq!(session.state(), TrackingState::Active { watch: WatchId(7) });

    while let Some(fix) = session.provider_mut().next_fix() {
        assert!(session.on_fix(&mut store, fix));
    }
    assert!(session.stop());
    assert!(session.provider().watching.is_none());

    assert_eq!(store.point_count(), 3);
    let all = store.all_locations_flat();
    let ids: Vec<i64> = all.iter().map(|s| s.id.parse().unwrap()).collect();
    assert!(ids.windows(2).all(|w| w[0] < w[1]));

    store.flush().unwrap();
    let reopened = HistoryStore::with_storage(storage, DayZone::utc()).unwrap();
    assert_eq!(reopened.all_locations_flat(), all);
}

#[test]
fn sensor_failure_leaves_store_untouched() {
    let mut store = HistoryStore::new();
    let mut session: TrackingSession<_, SystemClock> =
        TrackingSession::new(ScriptedProvider::new(&[]));

    assert!(matches!(
        session.try_start(&mut store),
        Err(TrackingError::Sensor { .. })
    ));
    assert!(!session.is_tracking());
    assert!(!store.has_history());
    assert!(store.latest_location().is_none());
}
