//! Refresh policy: decides, before any scraping happens, whether a leg seen
//! on the live feed needs a fresh status observation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  config::RefreshConfig, leg::DynamicRecord, live::LiveSignal, static_data::StaticRecord,
  status::LegStatus,
};

/// Why a leg does or does not need re-observation. Variants are listed in
/// evaluation order; the first that applies wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshDecision {
  /// Static metadata is missing or lacks airline, origin or destination.
  IncompleteStatic,
  /// No dynamic record exists yet.
  NoDynamicRecord,
  /// The stored leg has arrived.
  Closed,
  /// The aircraft reports on-ground while the leg is stored en route.
  LandingSuspected,
  /// The stored leg has not been updated for too long.
  Outdated,
  /// Stored state is recent enough to trust.
  Fresh,
}

impl RefreshDecision {
  pub fn is_required(self) -> bool { !matches!(self, Self::Closed | Self::Fresh) }
}

/// Pure function of stored state plus the live on-ground flag.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefreshPolicy {
  config: RefreshConfig,
}

impl RefreshPolicy {
  pub fn new(config: RefreshConfig) -> Self { Self { config } }

  pub fn decide(
    &self,
    static_record: Option<&StaticRecord>,
    latest: Option<&DynamicRecord>,
    signal: &LiveSignal,
    now: DateTime<Utc>,
  ) -> RefreshDecision {
    if !static_record.is_some_and(StaticRecord::is_complete) {
      return RefreshDecision::IncompleteStatic;
    }
    let Some(latest) = latest else {
      return RefreshDecision::NoDynamicRecord;
    };

    match latest.status {
      LegStatus::Arrived => RefreshDecision::Closed,
      LegStatus::EnRoute if signal.on_ground => RefreshDecision::LandingSuspected,
      _ if now - latest.last_update > self.config.refresh_after => RefreshDecision::Outdated,
      _ => RefreshDecision::Fresh,
    }
  }

  /// Shorthand for `decide(..).is_required()`.
  pub fn needs_refresh(
    &self,
    static_record: Option<&StaticRecord>,
    latest: Option<&DynamicRecord>,
    signal: &LiveSignal,
    now: DateTime<Utc>,
  ) -> bool {
    self.decide(static_record, latest, signal, now).is_required()
  }
}
