//! Tracking preferences and their partial-update merge.
//!
//! Settings only hold user preferences. Whether a GPS subscription is live is
//! owned by [`crate::tracking::TrackingSession`]; snapshots written by older
//! builds may still carry an `isTracking` field, which is ignored on load.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

/// Recommended range for the foreground polling interval (UI hint only).
pub const FOREGROUND_INTERVAL_RANGE_MS: RangeInclusive<u32> = 5_000..=60_000;

/// Recommended range for the distance filter (UI hint only).
pub const DISTANCE_INTERVAL_RANGE_METERS: RangeInclusive<f64> = 5.0..=50.0;

/// Requested GPS accuracy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
#[serde(rename_all = "lowercase")]
pub enum AccuracyLevel {
    Low,
    #[default]
    Balanced,
    High,
}

/// Accuracy constant handed to the platform location provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderAccuracy {
    Lowest,
    Balanced,
    Highest,
}

impl AccuracyLevel {
    /// Map the user preference onto the provider's accuracy scale.
    pub fn provider_accuracy(self) -> ProviderAccuracy {
        match self {
            AccuracyLevel::Low => ProviderAccuracy::Lowest,
            AccuracyLevel::Balanced => ProviderAccuracy::Balanced,
            AccuracyLevel::High => ProviderAccuracy::Highest,
        }
    }
}

/// User tracking preferences, persisted alongside the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[serde(rename_all = "camelCase", default)]
pub struct TrackingSettings {
    /// Time between fixes while the app is in the foreground.
    /// Default: 5000 ms
    #[serde(rename = "foregroundInterval")]
    pub foreground_interval_ms: u32,

    /// Time between fixes while the app is backgrounded.
    /// Default: 60000 ms
    #[serde(rename = "backgroundInterval")]
    pub background_interval_ms: u32,

    /// Minimum movement before the provider reports a new fix.
    /// Default: 10 meters
    #[serde(rename = "distanceInterval")]
    pub distance_interval_meters: f64,

    /// Default: balanced
    pub accuracy_level: AccuracyLevel,
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self {
            foreground_interval_ms: 5_000,
            background_interval_ms: 60_000,
            distance_interval_meters: 10.0,
            accuracy_level: AccuracyLevel::Balanced,
        }
    }
}

/// Partial settings update. `None` fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct SettingsUpdate {
    pub foreground_interval_ms: Option<u32>,
    pub background_interval_ms: Option<u32>,
    pub distance_interval_meters: Option<f64>,
    pub accuracy_level: Option<AccuracyLevel>,
}

/// A preference outside its recommended range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SettingsAdvisory {
    ForegroundIntervalOutOfRange { value_ms: u32 },
    DistanceIntervalOutOfRange { value_meters: f64 },
}

impl TrackingSettings {
    /// Shallow field replacement. Values are not checked against the
    /// recommended ranges.
    pub fn merge(&mut self, update: &SettingsUpdate) {
        if let Some(v) = update.foreground_interval_ms {
            self.foreground_interval_ms = v;
        }
        if let Some(v) = update.background_interval_ms {
            self.background_interval_ms = v;
        }
        if let Some(v) = update.distance_interval_meters {
            self.distance_interval_meters = v;
        }
        if let Some(v) = update.accuracy_level {
            self.accuracy_level = v;
        }
    }

    /// List preferences that fall outside their recommended ranges.
    pub fn advisories(&self) -> Vec<SettingsAdvisory> {
        let mut out = Vec::new();
        if !FOREGROUND_INTERVAL_RANGE_MS.contains(&self.foreground_interval_ms) {
            out.push(SettingsAdvisory::ForegroundIntervalOutOfRange {
                value_ms: self.foreground_interval_ms,
            });
        }
        if !DISTANCE_INTERVAL_RANGE_METERS.contains(&self.distance_interval_meters) {
            out.push(SettingsAdvisory::DistanceIntervalOutOfRange {
                value_meters: self.distance_interval_meters,
            });
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_replaces_only_given_fields() {
        let mut settings = TrackingSettings::default();
        settings.merge(&SettingsUpdate {
            accuracy_level: Some(AccuracyLevel::High),
            ..Default::default()
        });

        assert_eq!(settings.accuracy_level, AccuracyLevel::High);
        assert_eq!(settings.foreground_interval_ms, 5_000);
        assert_eq!(settings.distance_interval_meters, 10.0);
    }

    #[test]
    fn test_merge_does_not_enforce_bounds() {
        let mut settings = TrackingSettings::default();
        settings.merge(&SettingsUpdate {
            foreground_interval_ms: Some(1_000),
            distance_interval_meters: Some(500.0),
            ..Default::default()
        });

        assert_eq!(settings.foreground_interval_ms, 1_000);
        assert_eq!(settings.distance_interval_meters, 500.0);
        assert_eq!(settings.advisories().len(), 2);
    }

    #[test]
    fn test_defaults_are_within_recommended_ranges() {
        assert!(TrackingSettings::default().advisories().is_empty());
    }

    #[test]
    fn test_json_field_names() {
        let json = serde_json::to_value(TrackingSettings::default()).unwrap();
        assert_eq!(json["foregroundInterval"], 5000);
        assert_eq!(json["backgroundInterval"], 60000);
        assert_eq!(json["distanceInterval"], 10.0);
        assert_eq!(json["accuracyLevel"], "balanced");
    }

    #[test]
    fn test_legacy_is_tracking_is_ignored() {
        let settings: TrackingSettings = serde_json::from_str(
            r#"{"isTracking":true,"foregroundInterval":10000,"accuracyLevel":"low"}"#,
        )
        .unwrap();
        assert_eq!(settings.foreground_interval_ms, 10_000);
        assert_eq!(settings.accuracy_level, AccuracyLevel::Low);
        // Missing fields fall back to defaults
        assert_eq!(settings.background_interval_ms, 60_000);
    }

    #[test]
    fn test_provider_accuracy_mapping() {
        assert_eq!(AccuracyLevel::Low.provider_accuracy(), ProviderAccuracy::Lowest);
        assert_eq!(AccuracyLevel::Balanced.provider_accuracy(), ProviderAccuracy::Balanced);
        assert_eq!(AccuracyLevel::High.provider_accuracy(), ProviderAccuracy::Highest);
    }
}
