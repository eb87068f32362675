//! Dynamic records: one row per leg, enriched on every observation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{identity::LegIdentity, status::LegStatus};

/// The stored state of one leg.
///
/// Actual timestamps only ever move from absent to present; see
/// [`crate::merge::merge`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicRecord {
  pub identity:          LegIdentity,
  pub scheduled_arrival: Option<DateTime<Utc>>,
  pub actual_departure:  Option<DateTime<Utc>>,
  pub actual_arrival:    Option<DateTime<Utc>>,
  pub status:            LegStatus,
  pub last_update:       DateTime<Utc>,
}

impl DynamicRecord {
  pub fn unique_key(&self) -> String { self.identity.unique_key() }

  pub fn scheduled_departure(&self) -> DateTime<Utc> {
    self.identity.scheduled_departure_at()
  }

  /// Arrived with an observed arrival time, as opposed to auto-closed.
  pub fn has_landed(&self) -> bool {
    self.status == LegStatus::Arrived && self.actual_arrival.is_some()
  }
}
