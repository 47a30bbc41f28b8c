//! Allocator policy configuration.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::lifecycle::{DEFAULT_CANCELLATION_WINDOW_SECS, default_cancellation_window};
use crate::reporting::PeakSelection;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::env;

/// Allocator policy knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AllocatorConfig {
    /// How long after booking a cancellation is honored, in seconds (default: 30 minutes)
    pub cancellation_window_secs: i64,
    /// Return a cancelled order's tickets to the pool (default: true)
    pub release_on_cancel: bool,
    /// Which date `peak_cancellation_date` reports (default: fewest)
    pub peak_selection: PeakSelection,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            cancellation_window_secs: DEFAULT_CANCELLATION_WINDOW_SECS,
            release_on_cancel: true,
            peak_selection: PeakSelection::Fewest,
        }
    }
}

/// A window in seconds is usable if it is non-negative and fits a [`Duration`].
fn valid_window(secs: i64) -> Option<Duration> {
    Duration::try_seconds(secs).filter(|window| *window >= Duration::zero())
}

impl AllocatorConfig {
    /// Load configuration from environment variables.
    ///
    /// Missing or unparsable values fall back to the defaults:
    ///
    /// - `ALLOCATOR_CANCELLATION_WINDOW_SECS` (1800)
    /// - `ALLOCATOR_RELEASE_ON_CANCEL` (true)
    /// - `ALLOCATOR_PEAK_SELECTION` (`fewest` | `most`, default `fewest`)
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup, with the same keys and
    /// fallbacks as [`from_env`](Self::from_env).
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            cancellation_window_secs: lookup("ALLOCATOR_CANCELLATION_WINDOW_SECS")
                .and_then(|s| s.parse().ok())
                .filter(|secs: &i64| valid_window(*secs).is_some())
                .unwrap_or(defaults.cancellation_window_secs),
            release_on_cancel: lookup("ALLOCATOR_RELEASE_ON_CANCEL")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.release_on_cancel),
            peak_selection: lookup("ALLOCATOR_PEAK_SELECTION")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.peak_selection),
        }
    }

    /// The booking window as a [`Duration`].
    ///
    /// Out-of-range or negative `cancellation_window_secs` yield the default window.
    #[must_use]
    pub fn cancellation_window(&self) -> Duration {
        valid_window(self.cancellation_window_secs).unwrap_or_else(default_cancellation_window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_match_thirty_minute_window() {
        let config = AllocatorConfig::default();
        assert_eq!(config.cancellation_window(), Duration::minutes(30));
        assert!(config.release_on_cancel);
        assert_eq!(config.peak_selection, PeakSelection::Fewest);
    }

    #[test]
    fn reads_all_variables() {
        let config = AllocatorConfig::from_lookup(lookup(&[
            ("ALLOCATOR_CANCELLATION_WINDOW_SECS", "60"),
            ("ALLOCATOR_RELEASE_ON_CANCEL", "false"),
            ("ALLOCATOR_PEAK_SELECTION", "most"),
        ]));

        assert_eq!(config.cancellation_window(), Duration::seconds(60));
        assert!(!config.release_on_cancel);
        assert_eq!(config.peak_selection, PeakSelection::Most);
    }

    #[test]
    fn missing_variables_keep_defaults() {
        assert_eq!(AllocatorConfig::from_lookup(|_| None), AllocatorConfig::default());
    }

    #[test]
    fn unparsable_values_fall_back() {
        let config = AllocatorConfig::from_lookup(lookup(&[
            ("ALLOCATOR_CANCELLATION_WINDOW_SECS", "half an hour"),
            ("ALLOCATOR_RELEASE_ON_CANCEL", "yes"),
            ("ALLOCATOR_PEAK_SELECTION", "median"),
        ]));
        assert_eq!(config, AllocatorConfig::default());
    }

    #[test]
    fn out_of_range_window_is_rejected() {
        for secs in ["-1", "9223372036854775807", "9223372036854776"] {
            let vars = [("ALLOCATOR_CANCELLATION_WINDOW_SECS", secs)];
            let config = AllocatorConfig::from_lookup(lookup(&vars));
            assert_eq!(
                config.cancellation_window_secs, DEFAULT_CANCELLATION_WINDOW_SECS,
                "{secs} should fall back"
            );
        }
    }

    #[test]
    fn window_never_panics_on_extreme_values() {
        for secs in [i64::MAX, i64::MIN, -5] {
            let config = AllocatorConfig {
                cancellation_window_secs: secs,
                ..AllocatorConfig::default()
            };
            assert_eq!(config.cancellation_window(), Duration::minutes(30));
        }
    }
}
