//! Leg identity, the natural key of a dynamic record.
//!
//! A leg is addressed by `(callsign, tail id, flight date, scheduled
//! departure)`. The single-field unique key is a plain concatenation of the
//! four components and can be rebuilt from them at any time.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Separator between the components of a unique key. Components containing
/// it are rejected, which keeps the key injective.
pub const KEY_SEPARATOR: char = '|';

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M";

/// The composite identity of one scheduled flight instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LegIdentity {
  /// Upper-cased, trimmed callsign (e.g. `AFR1234`).
  pub callsign:            String,
  /// Lower-cased, trimmed aircraft identifier (ICAO 24-bit address).
  pub tail_id:             String,
  pub flight_date:         NaiveDate,
  /// Scheduled departure time of day, minute precision.
  pub scheduled_departure: NaiveTime,
}

impl LegIdentity {
  /// Derive the canonical identity from raw components.
  ///
  /// Fails when any anchor is missing: a leg without a callsign or a
  /// scheduled time cannot be addressed.
  pub fn resolve(
    callsign: Option<&str>,
    tail_id: Option<&str>,
    flight_date: Option<NaiveDate>,
    scheduled_departure: Option<NaiveTime>,
  ) -> Result<Self> {
    let callsign = callsign
      .map(str::trim)
      .filter(|c| !c.is_empty())
      .ok_or(Error::MissingCallsign)?
      .to_uppercase();
    let tail_id = tail_id
      .map(str::trim)
      .filter(|t| !t.is_empty())
      .ok_or_else(|| Error::MissingTailId(callsign.clone()))?
      .to_lowercase();
    let flight_date =
      flight_date.ok_or_else(|| Error::MissingFlightDate(callsign.clone()))?;
    let scheduled_departure = scheduled_departure
      .ok_or_else(|| Error::MissingScheduledDeparture(callsign.clone()))?;

    for component in [&callsign, &tail_id] {
      if component.contains(KEY_SEPARATOR) {
        return Err(Error::InvalidIdentityComponent(component.clone()));
      }
    }

    Ok(Self {
      callsign,
      tail_id,
      flight_date,
      scheduled_departure: truncate_to_minute(scheduled_departure),
    })
  }

  /// Build the identity anchored on an absolute scheduled departure.
  pub fn anchored_at(
    callsign: Option<&str>,
    tail_id: Option<&str>,
    scheduled_departure: Option<DateTime<Utc>>,
  ) -> Result<Self> {
    Self::resolve(
      callsign,
      tail_id,
      scheduled_departure.map(|at| at.date_naive()),
      scheduled_departure.map(|at| at.time()),
    )
  }

  /// The single-field surrogate used as the upsert key.
  pub fn unique_key(&self) -> String {
    format!(
      "{callsign}{sep}{tail}{sep}{date}{sep}{time}",
      callsign = self.callsign,
      tail = self.tail_id,
      date = self.flight_date.format(DATE_FORMAT),
      time = self.scheduled_departure.format(TIME_FORMAT),
      sep = KEY_SEPARATOR,
    )
  }

  /// Inverse of [`LegIdentity::unique_key`].
  pub fn from_unique_key(key: &str) -> Result<Self> {
    let invalid = || Error::InvalidIdentityComponent(key.to_owned());
    let mut parts = key.split(KEY_SEPARATOR);
    let (Some(callsign), Some(tail), Some(date), Some(time), None) = (
      parts.next(),
      parts.next(),
      parts.next(),
      parts.next(),
      parts.next(),
    ) else {
      return Err(invalid());
    };

    let date = NaiveDate::parse_from_str(date, DATE_FORMAT).map_err(|_| invalid())?;
    let time = NaiveTime::parse_from_str(time, TIME_FORMAT).map_err(|_| invalid())?;
    Self::resolve(Some(callsign), Some(tail), Some(date), Some(time))
  }

  /// Scheduled departure as an absolute instant.
  pub fn scheduled_departure_at(&self) -> DateTime<Utc> {
    self.flight_date.and_time(self.scheduled_departure).and_utc()
  }
}

impl fmt::Display for LegIdentity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.unique_key())
  }
}

fn truncate_to_minute(t: NaiveTime) -> NaiveTime {
  t.with_second(0)
    .and_then(|t| t.with_nanosecond(0))
    .unwrap_or(t)
}

#[cfg(test)]
mod tests {
  use std::collections::HashSet;

  use super::*;

  fn date(d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(2025, 3, d).unwrap() }

  fn time(h: u32, m: u32) -> NaiveTime { NaiveTime::from_hms_opt(h, m, 0).unwrap() }

  #[test]
  fn unique_key_is_deterministic_and_normalised() {
    let a = LegIdentity::resolve(
      Some(" afr1234 "),
      Some("39856A"),
      Some(date(1)),
      Some(time(9, 30)),
    )
    .unwrap();
    let b = LegIdentity::resolve(
      Some("AFR1234"),
      Some("39856a"),
      Some(date(1)),
      Some(NaiveTime::from_hms_opt(9, 30, 42).unwrap()),
    )
    .unwrap();

    assert_eq!(a, b);
    assert_eq!(a.unique_key(), "AFR1234|39856a|2025-03-01|09:30");
  }

  #[test]
  fn distinct_composites_give_distinct_keys() {
    let mut keys = HashSet::new();
    for callsign in ["AFR1", "AFR12"] {
      for tail in ["2abc", "3abc"] {
        for d in [1, 2] {
          for (h, m) in [(9, 30), (21, 30)] {
            let id = LegIdentity::resolve(
              Some(callsign),
              Some(tail),
              Some(date(d)),
              Some(time(h, m)),
            )
            .unwrap();
            assert!(keys.insert(id.unique_key()));
          }
        }
      }
    }
    assert_eq!(keys.len(), 16);
  }

  #[test]
  fn key_round_trips_through_components() {
    let id =
      LegIdentity::resolve(Some("AFR7"), Some("abc123"), Some(date(9)), Some(time(23, 50)))
        .unwrap();
    assert_eq!(LegIdentity::from_unique_key(&id.unique_key()).unwrap(), id);
  }

  #[test]
  fn missing_anchor_is_rejected() {
    assert!(matches!(
      LegIdentity::resolve(None, Some("abc"), Some(date(1)), Some(time(9, 0))),
      Err(Error::MissingCallsign)
    ));
    assert!(matches!(
      LegIdentity::resolve(Some("   "), Some("abc"), Some(date(1)), Some(time(9, 0))),
      Err(Error::MissingCallsign)
    ));
    assert!(matches!(
      LegIdentity::resolve(Some("AFR1"), Some("abc"), Some(date(1)), None),
      Err(Error::MissingScheduledDeparture(_))
    ));
    assert!(matches!(
      LegIdentity::resolve(Some("AFR1"), None, Some(date(1)), Some(time(9, 0))),
      Err(Error::MissingTailId(_))
    ));
  }

  #[test]
  fn separator_in_component_is_rejected() {
    assert!(matches!(
      LegIdentity::resolve(Some("AF|R1"), Some("abc"), Some(date(1)), Some(time(9, 0))),
      Err(Error::InvalidIdentityComponent(_))
    ));
  }
}
