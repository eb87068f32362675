//! Lifecycle states and the transitions between them.
//!
//! A raw status phrase is classified by prefix into one of three meaningful
//! states (or `unknown`). [`step`] then decides, against the previously
//! stored record, whether the observation opens a fresh cycle or updates the
//! stored leg in place, and which observed times must be captured.
//! [`auto_close`] force-closes open legs that have gone silent.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::{identity::LegIdentity, leg::DynamicRecord};

// ─── States ──────────────────────────────────────────────────────────────────

/// Where a leg is in its lifecycle.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
pub enum LegStatus {
  #[serde(rename = "departing")]
  #[strum(serialize = "departing")]
  Departing,
  #[serde(rename = "en route")]
  #[strum(serialize = "en route")]
  EnRoute,
  #[serde(rename = "arrived")]
  #[strum(serialize = "arrived")]
  Arrived,
  /// Terminal-ambiguous: the phrase carried no usable information. Never
  /// persisted.
  #[serde(rename = "unknown")]
  #[strum(serialize = "unknown")]
  Unknown,
}

impl LegStatus {
  /// `departing` or `en route`.
  pub fn is_open(self) -> bool { matches!(self, Self::Departing | Self::EnRoute) }

  /// `en route` or `arrived`: the aircraft has left the gate.
  pub fn has_departed(self) -> bool { matches!(self, Self::EnRoute | Self::Arrived) }

  pub fn is_known(self) -> bool { self != Self::Unknown }
}

// ─── Classification ──────────────────────────────────────────────────────────

/// Ordered `(prefixes, state)` table; the first matching row wins.
pub const STATUS_PREFIXES: &[(&[&str], LegStatus)] = &[
  (
    &["expected to depart", "scheduled", "taxiing for takeoff"],
    LegStatus::Departing,
  ),
  (
    &["en route", "arriving shortly", "ready to land"],
    LegStatus::EnRoute,
  ),
  (
    &["just landed", "landed", "just arrived", "arrived"],
    LegStatus::Arrived,
  ),
];

/// Classify a raw status phrase as scraped from a status page.
pub fn classify(raw: &str) -> LegStatus {
  let phrase = raw
    .split_whitespace()
    .collect::<Vec<_>>()
    .join(" ")
    .to_lowercase();

  STATUS_PREFIXES
    .iter()
    .find(|(prefixes, _)| prefixes.iter().any(|p| phrase.starts_with(p)))
    .map_or(LegStatus::Unknown, |(_, status)| *status)
}

// ─── Transitions ─────────────────────────────────────────────────────────────

/// What an observation does to the stored leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
  /// The status was `unknown`, or replayed an earlier phase of a leg that
  /// has landed; the leg is left untouched this cycle.
  Untouched,
  /// A new dynamic record is initialised.
  FreshCycle,
  /// The stored record is updated in place.
  InPlace { from: LegStatus },
}

/// Which observed times the merge should carry. Fields not captured are
/// passed on as absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capture {
  pub scheduled_arrival: bool,
  pub actual_departure:  bool,
  pub actual_arrival:    bool,
}

/// The outcome of [`step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
  pub transition: Transition,
  pub capture:    Capture,
}

/// Decide what an observation of `observed` for `identity` does, given the
/// latest stored record for the same callsign and tail.
///
/// A closed previous record only starts a fresh cycle when the new identity
/// differs from it: an identical key is the same physical leg, so it is
/// updated in place (or left untouched once it has landed).
pub fn step(
  previous: Option<&DynamicRecord>,
  identity: &LegIdentity,
  observed: LegStatus,
) -> Step {
  if !observed.is_known() {
    return Step { transition: Transition::Untouched, capture: Capture::default() };
  }

  match previous {
    // A landed leg only takes further `arrived` observations; an earlier
    // phase for the same leg is a stale replay.
    Some(prev)
      if prev.identity == *identity && prev.has_landed() && observed != LegStatus::Arrived =>
    {
      Step { transition: Transition::Untouched, capture: Capture::default() }
    }
    // The same leg, including one that was auto-closed and is seen again.
    Some(prev) if prev.identity == *identity => Step {
      transition: Transition::InPlace { from: prev.status },
      capture:    Capture {
        scheduled_arrival: prev.scheduled_arrival.is_none(),
        actual_departure:  observed.has_departed() && prev.actual_departure.is_none(),
        actual_arrival:    observed == LegStatus::Arrived && prev.actual_arrival.is_none(),
      },
    },
    // No record, or a different leg under the same callsign: start over.
    _ => Step {
      transition: Transition::FreshCycle,
      capture:    Capture {
        scheduled_arrival: true,
        actual_departure:  observed.has_departed(),
        actual_arrival:    observed == LegStatus::Arrived,
      },
    },
  }
}

// ─── Auto-closure ────────────────────────────────────────────────────────────

/// Parameters of an auto-closing read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoClose {
  pub now:     DateTime<Utc>,
  pub timeout: TimeDelta,
}

impl AutoClose {
  pub fn new(now: DateTime<Utc>, timeout: TimeDelta) -> Self { Self { now, timeout } }

  /// Last-update instants strictly before this are overdue.
  pub fn cutoff(&self) -> DateTime<Utc> { self.now - self.timeout }
}

/// A forced, time-driven transition to `arrived`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoClosure {
  pub unique_key:      String,
  pub previous_status: LegStatus,
  /// The last update the leg had before it was closed.
  pub silent_since:    DateTime<Utc>,
  pub closed_at:       DateTime<Utc>,
}

/// Close `record` if it is open and silent past the timeout. Returns the
/// closure event, or `None` when the record is left as is.
pub fn auto_close(record: &mut DynamicRecord, policy: AutoClose) -> Option<AutoClosure> {
  if !record.status.is_open() || record.last_update >= policy.cutoff() {
    return None;
  }

  let closure = AutoClosure {
    unique_key:      record.unique_key(),
    previous_status: record.status,
    silent_since:    record.last_update,
    closed_at:       policy.now,
  };
  record.status = LegStatus::Arrived;
  record.last_update = policy.now;
  Some(closure)
}

#[cfg(test)]
mod tests {
  use std::str::FromStr;

  use chrono::{NaiveDate, NaiveTime, TimeZone};

  use super::*;

  fn identity(h: u32) -> LegIdentity {
    LegIdentity::resolve(
      Some("AFR1234"),
      Some("39856a"),
      NaiveDate::from_ymd_opt(2025, 3, 1),
      NaiveTime::from_hms_opt(h, 0, 0),
    )
    .unwrap()
  }

  fn record(status: LegStatus) -> DynamicRecord {
    DynamicRecord {
      identity: identity(9),
      scheduled_arrival: None,
      actual_departure: None,
      actual_arrival: None,
      status,
      last_update: Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap(),
    }
  }

  #[test]
  fn classifies_by_prefix() {
    assert_eq!(classify("Scheduled"), LegStatus::Departing);
    assert_eq!(classify("Taxiing for takeoff"), LegStatus::Departing);
    assert_eq!(classify("En Route\nOn Time"), LegStatus::EnRoute);
    assert_eq!(classify("Arriving shortly"), LegStatus::EnRoute);
    assert_eq!(classify("Landed \n 5 minutes ago"), LegStatus::Arrived);
    assert_eq!(classify("Just arrived"), LegStatus::Arrived);
    assert_eq!(classify("Diverted"), LegStatus::Unknown);
    assert_eq!(classify(""), LegStatus::Unknown);
  }

  #[test]
  fn labels_round_trip() {
    assert_eq!(LegStatus::EnRoute.to_string(), "en route");
    assert_eq!(LegStatus::from_str("en route").unwrap(), LegStatus::EnRoute);
    assert_eq!(
      serde_json::to_string(&LegStatus::EnRoute).unwrap(),
      "\"en route\""
    );
  }

  #[test]
  fn unknown_leaves_leg_untouched() {
    let prev = record(LegStatus::EnRoute);
    let s = step(Some(&prev), &identity(9), LegStatus::Unknown);
    assert_eq!(s.transition, Transition::Untouched);
  }

  #[test]
  fn no_previous_record_starts_fresh_cycle() {
    let s = step(None, &identity(9), LegStatus::EnRoute);
    assert_eq!(s.transition, Transition::FreshCycle);
    assert!(s.capture.actual_departure);
    assert!(!s.capture.actual_arrival);

    let s = step(None, &identity(9), LegStatus::Departing);
    assert!(!s.capture.actual_departure);
  }

  #[test]
  fn arrived_previous_of_another_leg_starts_fresh_cycle() {
    let prev = record(LegStatus::Arrived);
    let s = step(Some(&prev), &identity(17), LegStatus::Departing);
    assert_eq!(s.transition, Transition::FreshCycle);
  }

  #[test]
  fn landed_leg_ignores_replayed_earlier_phase() {
    let mut prev = record(LegStatus::Arrived);
    prev.actual_arrival = Some(Utc.with_ymd_and_hms(2025, 3, 1, 11, 55, 0).unwrap());

    for replayed in [LegStatus::Departing, LegStatus::EnRoute] {
      let s = step(Some(&prev), &identity(9), replayed);
      assert_eq!(s.transition, Transition::Untouched);
      assert_eq!(s.capture, Capture::default());
    }

    let s = step(Some(&prev), &identity(9), LegStatus::Arrived);
    assert_eq!(s.transition, Transition::InPlace { from: LegStatus::Arrived });
    assert!(!s.capture.actual_arrival);
  }

  #[test]
  fn auto_closed_leg_seen_again_is_reopened_in_place() {
    // Closed by the timeout, never observed landing.
    let prev = record(LegStatus::Arrived);
    let s = step(Some(&prev), &identity(9), LegStatus::EnRoute);
    assert_eq!(s.transition, Transition::InPlace { from: LegStatus::Arrived });
    assert!(s.capture.actual_departure);
  }

  #[test]
  fn different_identity_starts_fresh_cycle() {
    let prev = record(LegStatus::EnRoute);
    let s = step(Some(&prev), &identity(17), LegStatus::Departing);
    assert_eq!(s.transition, Transition::FreshCycle);
  }

  #[test]
  fn transition_into_en_route_captures_departure_once() {
    let prev = record(LegStatus::Departing);
    let s = step(Some(&prev), &identity(9), LegStatus::EnRoute);
    assert_eq!(s.transition, Transition::InPlace { from: LegStatus::Departing });
    assert!(s.capture.actual_departure);

    let mut prev = record(LegStatus::EnRoute);
    prev.actual_departure = Some(Utc.with_ymd_and_hms(2025, 3, 1, 9, 5, 0).unwrap());
    let s = step(Some(&prev), &identity(9), LegStatus::EnRoute);
    assert!(!s.capture.actual_departure);
  }

  #[test]
  fn skipped_en_route_backfills_departure() {
    let prev = record(LegStatus::Departing);
    let s = step(Some(&prev), &identity(9), LegStatus::Arrived);
    assert!(s.capture.actual_departure);
    assert!(s.capture.actual_arrival);
  }

  #[test]
  fn silent_open_leg_is_auto_closed() {
    let mut rec = record(LegStatus::EnRoute);
    let now = rec.last_update + TimeDelta::minutes(90);
    let closure = auto_close(&mut rec, AutoClose::new(now, TimeDelta::minutes(60))).unwrap();

    assert_eq!(closure.previous_status, LegStatus::EnRoute);
    assert_eq!(rec.status, LegStatus::Arrived);
    assert_eq!(rec.last_update, now);

    // A second pass over the closed record is a no-op.
    assert!(auto_close(&mut rec, AutoClose::new(now, TimeDelta::minutes(60))).is_none());
  }

  #[test]
  fn recent_or_closed_legs_are_not_auto_closed() {
    let mut rec = record(LegStatus::Departing);
    let now = rec.last_update + TimeDelta::minutes(30);
    assert!(auto_close(&mut rec, AutoClose::new(now, TimeDelta::minutes(60))).is_none());

    let mut rec = record(LegStatus::Arrived);
    let now = rec.last_update + TimeDelta::hours(10);
    assert!(auto_close(&mut rec, AutoClose::new(now, TimeDelta::minutes(60))).is_none());
  }
}
