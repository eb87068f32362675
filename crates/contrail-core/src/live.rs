//! Live-feed types: the cheap on-ground signal used by triage, and the
//! append-only positional/weather snapshots stamped with a leg identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::LegIdentity;

/// What the live feed says about an aircraft right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveSignal {
  pub callsign:  String,
  pub tail_id:   String,
  pub on_ground: bool,
}

/// Weather at the aircraft position at request time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Weather {
  pub temperature:      Option<f64>,
  pub wind_speed:       Option<f64>,
  pub gust_speed:       Option<f64>,
  pub visibility:       Option<f64>,
  pub cloud_coverage:   Option<f64>,
  pub rain:             Option<f64>,
  pub global_condition: Option<String>,
}

/// One positional observation as it comes off the live feed, before it is
/// tied to a leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveObservation {
  /// Shared by every observation of one extraction batch.
  pub request_id:    Uuid,
  pub callsign:      String,
  pub tail_id:       String,
  pub observed_at:   DateTime<Utc>,
  pub longitude:     f64,
  pub latitude:      f64,
  pub baro_altitude: Option<f64>,
  pub geo_altitude:  Option<f64>,
  pub on_ground:     bool,
  pub velocity:      Option<f64>,
  pub vertical_rate: Option<f64>,
  #[serde(default)]
  pub weather:       Weather,
}

impl LiveObservation {
  /// Attach the observation to the leg it belongs to.
  pub fn stamp(self, identity: LegIdentity) -> LiveSnapshot {
    LiveSnapshot {
      snapshot_id: Uuid::new_v4(),
      request_id: self.request_id,
      identity,
      observed_at: self.observed_at,
      longitude: self.longitude,
      latitude: self.latitude,
      baro_altitude: self.baro_altitude,
      geo_altitude: self.geo_altitude,
      on_ground: self.on_ground,
      velocity: self.velocity,
      vertical_rate: self.vertical_rate,
      weather: self.weather,
    }
  }
}

/// A stored live snapshot. Never updated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveSnapshot {
  pub snapshot_id:   Uuid,
  pub request_id:    Uuid,
  pub identity:      LegIdentity,
  pub observed_at:   DateTime<Utc>,
  pub longitude:     f64,
  pub latitude:      f64,
  pub baro_altitude: Option<f64>,
  pub geo_altitude:  Option<f64>,
  pub on_ground:     bool,
  pub velocity:      Option<f64>,
  pub vertical_rate: Option<f64>,
  pub weather:       Weather,
}
