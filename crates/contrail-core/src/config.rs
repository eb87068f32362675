//! Tunable thresholds for every component, grouped in one serde-friendly
//! struct so a binary can load it from a config file.
//!
//! Each component takes only the slice it needs (see the `*_config`
//! accessors); nothing here is read from process-wide state.

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

/// Engine configuration. All durations are whole minutes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  /// A leg not updated for this long is re-observed (triage step 5).
  pub refresh_after_minutes:             i64,
  /// Open legs silent for this long are force-closed on read.
  pub auto_close_after_minutes:          i64,
  /// Overdue legs silent for this long drop out of the current view.
  pub stale_after_minutes:               i64,
  /// How far in the future a scheduled departure may lie before an airborne
  /// leg is assumed to be anchored on the wrong day.
  pub future_tolerance_minutes:          i64,
  /// Longest plausible actual departure-to-arrival duration.
  pub max_leg_duration_minutes:          i64,
  /// An actual departure earlier than scheduled by more than this is a slip
  /// past midnight and gets a day added. At 0 every backwards gap wraps.
  pub early_departure_tolerance_minutes: i64,
  /// Delays within +/- this band are categorised as "on time".
  pub delay_band_minutes:                i64,
  /// Upper bound on legs reconciled concurrently in one batch.
  pub max_parallel_legs:                 usize,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      refresh_after_minutes:             15,
      auto_close_after_minutes:          60,
      stale_after_minutes:               120,
      future_tolerance_minutes:          6 * 60,
      max_leg_duration_minutes:          24 * 60,
      early_departure_tolerance_minutes: 0,
      delay_band_minutes:                10,
      max_parallel_legs:                 16,
    }
  }
}

impl EngineConfig {
  pub fn refresh_config(&self) -> RefreshConfig {
    RefreshConfig {
      refresh_after: TimeDelta::minutes(self.refresh_after_minutes),
    }
  }

  pub fn normalizer_config(&self) -> NormalizerConfig {
    NormalizerConfig {
      future_tolerance:          TimeDelta::minutes(self.future_tolerance_minutes),
      max_leg_duration:          TimeDelta::minutes(self.max_leg_duration_minutes),
      early_departure_tolerance: TimeDelta::minutes(
        self.early_departure_tolerance_minutes,
      ),
    }
  }

  pub fn partition_config(&self) -> PartitionConfig {
    PartitionConfig {
      stale_after:      TimeDelta::minutes(self.stale_after_minutes),
      delay_band:       self.delay_band_minutes,
      max_leg_duration: TimeDelta::minutes(self.max_leg_duration_minutes),
    }
  }

  pub fn auto_close_after(&self) -> TimeDelta {
    TimeDelta::minutes(self.auto_close_after_minutes)
  }
}

// ─── Component slices ────────────────────────────────────────────────────────

/// Input to [`crate::triage::RefreshPolicy::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshConfig {
  pub refresh_after: TimeDelta,
}

/// Input to [`crate::timestamp::Normalizer::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizerConfig {
  pub future_tolerance:          TimeDelta,
  pub max_leg_duration:          TimeDelta,
  pub early_departure_tolerance: TimeDelta,
}

/// Input to [`crate::partition::Partitioner::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionConfig {
  pub stale_after:      TimeDelta,
  pub delay_band:       i64,
  pub max_leg_duration: TimeDelta,
}

impl Default for RefreshConfig {
  fn default() -> Self { EngineConfig::default().refresh_config() }
}

impl Default for NormalizerConfig {
  fn default() -> Self { EngineConfig::default().normalizer_config() }
}

impl Default for PartitionConfig {
  fn default() -> Self { EngineConfig::default().partition_config() }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn partial_config_falls_back_to_defaults() {
    let cfg: EngineConfig =
      serde_json::from_str(r#"{"refresh_after_minutes": 10}"#).unwrap();
    assert_eq!(cfg.refresh_after_minutes, 10);
    assert_eq!(cfg.auto_close_after_minutes, 60);
    assert_eq!(cfg.refresh_config().refresh_after, TimeDelta::minutes(10));
  }
}
