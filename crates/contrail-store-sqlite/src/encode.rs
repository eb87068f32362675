//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Instants are stored as fixed-width RFC 3339 strings so that they sort
//! lexically. Identity dates and times use the same formats as the unique
//! key. Weather is stored as compact JSON.

use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Utc};
use contrail_core::{
  identity::LegIdentity,
  leg::DynamicRecord,
  live::{LiveSnapshot, Weather},
  static_data::StaticRecord,
  status::{AutoClosure, LegStatus},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339_opts(SecondsFormat::Micros, true) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

// ─── Identity components ─────────────────────────────────────────────────────

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn encode_time(t: NaiveTime) -> String { t.format("%H:%M").to_string() }

fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_time(s: &str) -> Result<NaiveTime> {
  NaiveTime::parse_from_str(s, "%H:%M").map_err(|e| Error::DateParse(e.to_string()))
}

// ─── LegStatus ───────────────────────────────────────────────────────────────

pub fn encode_status(s: LegStatus) -> &'static str {
  match s {
    LegStatus::Departing => "departing",
    LegStatus::EnRoute => "en route",
    LegStatus::Arrived => "arrived",
    LegStatus::Unknown => "unknown",
  }
}

pub fn decode_status(s: &str) -> Result<LegStatus> {
  s.parse()
    .map_err(|_| contrail_core::Error::UnknownStatusLabel(s.to_owned()).into())
}

// ─── Weather ─────────────────────────────────────────────────────────────────

pub fn encode_weather(w: &Weather) -> Result<String> { Ok(serde_json::to_string(w)?) }

pub fn decode_weather(s: &str) -> Result<Weather> { Ok(serde_json::from_str(s)?) }

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawLeg::from_row`].
pub const LEG_COLUMNS: &str = "callsign, tail_id, flight_date, scheduled_departure, \
                               scheduled_arrival, actual_departure, actual_arrival, \
                               status, last_update";

/// Raw strings read directly from a `legs` row.
pub struct RawLeg {
  pub callsign:            String,
  pub tail_id:             String,
  pub flight_date:         String,
  pub scheduled_departure: String,
  pub scheduled_arrival:   Option<String>,
  pub actual_departure:    Option<String>,
  pub actual_arrival:      Option<String>,
  pub status:              String,
  pub last_update:         String,
}

impl RawLeg {
  /// Read the columns listed in [`LEG_COLUMNS`], in order.
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      callsign:            row.get(0)?,
      tail_id:             row.get(1)?,
      flight_date:         row.get(2)?,
      scheduled_departure: row.get(3)?,
      scheduled_arrival:   row.get(4)?,
      actual_departure:    row.get(5)?,
      actual_arrival:      row.get(6)?,
      status:              row.get(7)?,
      last_update:         row.get(8)?,
    })
  }

  pub fn into_record(self) -> Result<DynamicRecord> {
    let identity = LegIdentity::resolve(
      Some(&self.callsign),
      Some(&self.tail_id),
      Some(decode_date(&self.flight_date)?),
      Some(decode_time(&self.scheduled_departure)?),
    )?;

    Ok(DynamicRecord {
      identity,
      scheduled_arrival: decode_opt_dt(self.scheduled_arrival)?,
      actual_departure: decode_opt_dt(self.actual_departure)?,
      actual_arrival: decode_opt_dt(self.actual_arrival)?,
      status: decode_status(&self.status)?,
      last_update: decode_dt(&self.last_update)?,
    })
  }
}

/// Encoded form of a [`DynamicRecord`], ready to bind.
pub struct EncodedLeg {
  pub unique_key:          String,
  pub callsign:            String,
  pub tail_id:             String,
  pub flight_date:         String,
  pub scheduled_departure: String,
  pub scheduled_arrival:   Option<String>,
  pub actual_departure:    Option<String>,
  pub actual_arrival:      Option<String>,
  pub status:              &'static str,
  pub last_update:         String,
}

impl From<&DynamicRecord> for EncodedLeg {
  fn from(r: &DynamicRecord) -> Self {
    Self {
      unique_key:          r.unique_key(),
      callsign:            r.identity.callsign.clone(),
      tail_id:             r.identity.tail_id.clone(),
      flight_date:         encode_date(r.identity.flight_date),
      scheduled_departure: encode_time(r.identity.scheduled_departure),
      scheduled_arrival:   r.scheduled_arrival.map(encode_dt),
      actual_departure:    r.actual_departure.map(encode_dt),
      actual_arrival:      r.actual_arrival.map(encode_dt),
      status:              encode_status(r.status),
      last_update:         encode_dt(r.last_update),
    }
  }
}

/// Raw strings read directly from a `closures` row.
pub struct RawClosure {
  pub unique_key:      String,
  pub previous_status: String,
  pub silent_since:    String,
  pub closed_at:       String,
}

impl RawClosure {
  pub fn into_closure(self) -> Result<AutoClosure> {
    Ok(AutoClosure {
      unique_key:      self.unique_key,
      previous_status: decode_status(&self.previous_status)?,
      silent_since:    decode_dt(&self.silent_since)?,
      closed_at:       decode_dt(&self.closed_at)?,
    })
  }
}

/// Raw values read directly from a `static_flights` row.
pub struct RawStatic {
  pub callsign:            String,
  pub airline:             Option<String>,
  pub origin_code:         Option<String>,
  pub destination_code:    Option<String>,
  pub origin_airport:      Option<String>,
  pub destination_airport: Option<String>,
  pub origin_city:         Option<String>,
  pub destination_city:    Option<String>,
  pub commercial:          Option<bool>,
}

impl RawStatic {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      callsign:            row.get(0)?,
      airline:             row.get(1)?,
      origin_code:         row.get(2)?,
      destination_code:    row.get(3)?,
      origin_airport:      row.get(4)?,
      destination_airport: row.get(5)?,
      origin_city:         row.get(6)?,
      destination_city:    row.get(7)?,
      commercial:          row.get(8)?,
    })
  }

  pub fn into_static(self) -> StaticRecord {
    StaticRecord {
      callsign:            self.callsign,
      airline:             self.airline,
      origin_code:         self.origin_code,
      destination_code:    self.destination_code,
      origin_airport:      self.origin_airport,
      destination_airport: self.destination_airport,
      origin_city:         self.origin_city,
      destination_city:    self.destination_city,
      commercial:          self.commercial,
    }
  }
}

/// Raw values read directly from a `live_snapshots` row.
pub struct RawSnapshot {
  pub snapshot_id:   String,
  pub request_id:    String,
  pub unique_key:    String,
  pub observed_at:   String,
  pub longitude:     f64,
  pub latitude:      f64,
  pub baro_altitude: Option<f64>,
  pub geo_altitude:  Option<f64>,
  pub on_ground:     bool,
  pub velocity:      Option<f64>,
  pub vertical_rate: Option<f64>,
  pub weather:       String,
}

impl RawSnapshot {
  pub fn into_snapshot(self) -> Result<LiveSnapshot> {
    Ok(LiveSnapshot {
      snapshot_id:   decode_uuid(&self.snapshot_id)?,
      request_id:    decode_uuid(&self.request_id)?,
      identity:      LegIdentity::from_unique_key(&self.unique_key)?,
      observed_at:   decode_dt(&self.observed_at)?,
      longitude:     self.longitude,
      latitude:      self.latitude,
      baro_altitude: self.baro_altitude,
      geo_altitude:  self.geo_altitude,
      on_ground:     self.on_ground,
      velocity:      self.velocity,
      vertical_rate: self.vertical_rate,
      weather:       decode_weather(&self.weather)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn encoded_instants_sort_chronologically() {
    let early = Utc.with_ymd_and_hms(2025, 3, 1, 9, 5, 0).unwrap();
    let late = early + chrono::TimeDelta::milliseconds(1500);
    assert!(encode_dt(early) < encode_dt(late));
    assert_eq!(decode_dt(&encode_dt(late)).unwrap(), late);
  }

  #[test]
  fn status_labels_match_their_display() {
    for s in [LegStatus::Departing, LegStatus::EnRoute, LegStatus::Arrived] {
      assert_eq!(encode_status(s), s.to_string());
      assert_eq!(decode_status(encode_status(s)).unwrap(), s);
    }
    assert!(matches!(decode_status("landed"), Err(Error::Core(_))));
  }
}
