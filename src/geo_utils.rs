//! Geographic utilities: distance, duration, formatting and bounds.
//!
//! Distances use a fixed Earth radius of 6,371 km so results are reproducible
//! across platforms that render the same history.

use geo::{BoundingRect, MultiPoint, Point};

use crate::{Bounds, GpsPoint, LocationSample};

/// Earth radius used for great-circle distances, in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Calculate the haversine (great-circle) distance between two GPS points in meters.
///
/// Symmetric, and exactly `0.0` for identical coordinates. The intermediate
/// term is clamped to `[0, 1]` so antipodal points never produce NaN.
///
/// # Example
/// ```
/// use location_history::GpsPoint;
/// use location_history::geo_utils::haversine_distance;
///
/// let london = GpsPoint::new(51.5074, -0.1278);
/// let paris = GpsPoint::new(48.8566, 2.3522);
/// let meters = haversine_distance(&london, &paris);
/// assert!((meters - 343_500.0).abs() < 5_000.0);
/// ```
pub fn haversine_distance(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    let phi1 = p1.latitude.to_radians();
    let phi2 = p2.latitude.to_radians();
    let delta_phi = (p2.latitude - p1.latitude).to_radians();
    let delta_lambda = (p2.longitude - p1.longitude).to_radians();

    let a = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    let a = a.clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_METERS * c
}

/// Total length of a polyline in meters, summed over consecutive pairs.
pub fn path_length(points: &[GpsPoint]) -> f64 {
    points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum()
}

/// Milliseconds between two timestamps. Negative when `end_ms < start_ms`.
pub fn duration_ms(start_ms: i64, end_ms: i64) -> i64 {
    end_ms - start_ms
}

/// Format a distance for display: `"850 m"` below one kilometer, `"1.25 km"` above.
pub fn format_distance(meters: f64) -> String {
    if meters < 1000.0 {
        format!("{} m", meters.round() as i64)
    } else {
        format!("{:.2} km", meters / 1000.0)
    }
}

/// Format a duration for display.
///
/// Leading zero units are omitted and seconds are dropped once hours are
/// present: `"42s"`, `"3m 5s"`, `"2h 15m"`.
pub fn format_duration(ms: i64) -> String {
    // Floor division so negative durations render like the positive ones
    let seconds = ms.div_euclid(1000);
    let minutes = seconds.div_euclid(60);
    let hours = minutes.div_euclid(60);

    if hours > 0 {
        format!("{}h {}m", hours, minutes % 60)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds % 60)
    } else {
        format!("{}s", seconds)
    }
}

/// Compute the bounding box of a sample sequence for map framing.
///
/// Returns `None` for an empty sequence.
pub fn compute_bounds(samples: &[LocationSample]) -> Option<Bounds> {
    let points: MultiPoint<f64> = samples
        .iter()
        .map(|s| Point::new(s.coordinates.longitude, s.coordinates.latitude))
        .collect();

    points.bounding_rect().map(|rect| Bounds {
        min_lat: rect.min().y,
        max_lat: rect.max().y,
        min_lng: rect.min().x,
        max_lng: rect.max().x,
    })
}
