//! Trip statistics over a sequence of samples.
//!
//! Distance is the path length along the sequence in the order given; samples
//! recorded out of chronological order therefore overstate travel distance and
//! may yield a negative duration. [`SampleOrdering::ByTimestamp`] sorts a copy
//! before aggregating when that is not wanted.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::geo_utils::{duration_ms, format_distance, format_duration, path_length};
use crate::{DayKey, GpsPoint, HistoryStore, LocationSample};

/// Aggregate statistics for a sample sequence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[serde(rename_all = "camelCase")]
pub struct TripStats {
    pub point_count: u32,
    pub total_distance_meters: f64,
    /// Last timestamp minus first. Not clamped, so it can be negative
    pub duration_ms: i64,
}

impl TripStats {
    pub fn formatted_distance(&self) -> String {
        format_distance(self.total_distance_meters)
    }

    pub fn formatted_duration(&self) -> String {
        format_duration(self.duration_ms)
    }
}

/// Order in which samples are walked when aggregating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleOrdering {
    /// Sequence order, exactly as recorded
    #[default]
    AsRecorded,
    /// Stable sort by timestamp first
    ByTimestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsOptions {
    pub ordering: SampleOrdering,
}

impl StatsOptions {
    pub fn by_timestamp() -> Self {
        Self {
            ordering: SampleOrdering::ByTimestamp,
        }
    }
}

/// Compute statistics in recorded order.
///
/// Returns `None` for an empty sequence; a single sample yields zero distance
/// and zero duration.
///
/// # Example
/// ```
/// use location_history::{compute_stats, Coordinates, LocationSample};
///
/// let samples = vec![
///     LocationSample::new("a", 0, Coordinates::new(0.0, 0.0)),
///     LocationSample::new("b", 3_000, Coordinates::new(0.0, 0.01)),
/// ];
/// let stats = compute_stats(&samples).unwrap();
/// assert_eq!(stats.point_count, 2);
/// assert_eq!(stats.duration_ms, 3_000);
/// assert!(compute_stats(&[]).is_none());
/// ```
pub fn compute_stats(samples: &[LocationSample]) -> Option<TripStats> {
    compute_stats_with(samples, &StatsOptions::default())
}

/// Compute statistics with an explicit sample ordering.
pub fn compute_stats_with(samples: &[LocationSample], options: &StatsOptions) -> Option<TripStats> {
    let (first, last) = (samples.first()?, samples.last()?);

    let ordered: Cow<'_, [LocationSample]> = match options.ordering {
        SampleOrdering::AsRecorded => Cow::Borrowed(samples),
        SampleOrdering::ByTimestamp => {
            let mut sorted = samples.to_vec();
            sorted.sort_by_key(|s| s.timestamp);
            Cow::Owned(sorted)
        }
    };

    let points: Vec<GpsPoint> = ordered.iter().map(LocationSample::point).collect();
    let duration = match options.ordering {
        SampleOrdering::AsRecorded => duration_ms(first.timestamp, last.timestamp),
        SampleOrdering::ByTimestamp => {
            duration_ms(ordered[0].timestamp, ordered[ordered.len() - 1].timestamp)
        }
    };

    Some(TripStats {
        point_count: saturating_count(samples.len()),
        total_distance_meters: path_length(&points),
        duration_ms: duration,
    })
}

/// Statistics for one recorded day.
#[derive(Debug, Clone, PartialEq)]
pub struct DaySummary {
    pub day: DayKey,
    pub stats: TripStats,
}

/// Per-day statistics for every recorded day, oldest first.
///
/// With the `parallel` feature days are aggregated on the rayon pool.
pub fn daily_summaries(store: &HistoryStore) -> Vec<DaySummary> {
    let days: Vec<(&DayKey, &[LocationSample])> = store.days().collect();

    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;

        days.par_iter()
            .filter_map(|(day, samples)| summarize(day, samples))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        days.iter()
            .filter_map(|(day, samples)| summarize(day, samples))
            .collect()
    }
}

/// Narrow a collection length to a `u32` count, saturating at `u32::MAX`.
pub(crate) fn saturating_count(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

fn summarize(day: &DayKey, samples: &[LocationSample]) -> Option<DaySummary> {
    compute_stats(samples).map(|stats| DaySummary { day: *day, stats })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_utils::haversine_distance;
    use crate::{Coordinates, DayZone};

    fn sample(id: &str, timestamp: i64, lat: f64, lng: f64) -> LocationSample {
        LocationSample::new(id, timestamp, Coordinates::new(lat, lng))
    }

    #[test]
    fn test_empty_is_none() {
        assert!(compute_stats(&[]).is_none());
        assert!(compute_stats_with(&[], &StatsOptions::by_timestamp()).is_none());
    }

    #[test]
    fn test_single_sample() {
        let stats = compute_stats(&[sample("a", 42, 51.5, -0.12)]).unwrap();
        assert_eq!(stats.point_count, 1);
        assert_eq!(stats.total_distance_meters, 0.0);
        assert_eq!(stats.duration_ms, 0);
    }

    #[test]
    fn test_pairwise_sum() {
        let a = sample("a", 0, 47.0, 8.0);
        let b = sample("b", 1_000, 47.01, 8.0);
        let c = sample("c", 3_000, 47.02, 8.0);
        let stats = compute_stats(&[a.clone(), b.clone(), c.clone()]).unwrap();

        let expected =
            haversine_distance(&a.point(), &b.point()) + haversine_distance(&b.point(), &c.point());
        assert_eq!(stats.total_distance_meters, expected);
        assert_eq!(stats.duration_ms, 3_000);
    }

    #[test]
    fn test_out_of_order_kept_by_default() {
        let samples = vec![
            sample("a", 0, 0.0, 0.0),
            sample("c", 2_000, 0.02, 0.0),
            sample("b", 1_000, 0.01, 0.0),
        ];
        let recorded = compute_stats(&samples).unwrap();
        let sorted = compute_stats_with(&samples, &StatsOptions::by_timestamp()).unwrap();

        assert_eq!(recorded.duration_ms, 1_000);
        assert_eq!(sorted.duration_ms, 2_000);
        assert!(recorded.total_distance_meters > sorted.total_distance_meters * 1.4);
        assert_eq!(recorded.point_count, sorted.point_count);
    }

    #[test]
    fn test_negative_duration_not_clamped() {
        let samples = vec![sample("a", 5_000, 0.0, 0.0), sample("b", 1_000, 0.0, 0.0)];
        assert_eq!(compute_stats(&samples).unwrap().duration_ms, -4_000);
    }

    #[test]
    fn test_count_saturates() {
        assert_eq!(saturating_count(3), 3);
        assert_eq!(saturating_count(u32::MAX as usize), u32::MAX);
        assert_eq!(saturating_count(usize::MAX), u32::MAX);
    }

    #[test]
    fn test_formatted_fields() {
        let stats = TripStats {
            point_count: 10,
            total_distance_meters: 1_500.0,
            duration_ms: 125_000,
        };
        assert_eq!(stats.formatted_distance(), "1.50 km");
        assert_eq!(stats.formatted_duration(), "2m 5s");
    }

    #[test]
    fn test_daily_summaries_per_day() {
        // 2024-01-01T10:00:00Z
        let base = 1_704_103_200_000;
        let mut store = HistoryStore::with_zone(DayZone::utc());
        store.append(sample("a", base, 0.0, 0.0));
        store.append(sample("b", base + 60_000, 0.0, 0.01));
        store.append(sample("c", base + 86_400_000, 0.0, 0.0));

        let summaries = daily_summaries(&store);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].day.to_string(), "2024-01-01");
        assert_eq!(summaries[0].stats.point_count, 2);
        assert_eq!(summaries[0].stats.duration_ms, 60_000);
        assert_eq!(summaries[1].stats.point_count, 1);
    }
}
