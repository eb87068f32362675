//! Splits stored legs into the `done` and `current` views served downstream.
//!
//! Both views are derived from stored dynamic records and "now" only. Delays
//! and timestamps that are not known serialize as explicit `null`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{
  Result,
  config::PartitionConfig,
  leg::DynamicRecord,
  live::LiveSnapshot,
  static_data::StaticRecord,
  status::LegStatus,
  timestamp::{DurationAnomaly, LegTimes},
};

// ─── Row type ────────────────────────────────────────────────────────────────

/// Delay bucket relative to the configured band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum DelayCategory {
  #[serde(rename = "early")]
  #[strum(serialize = "early")]
  Early,
  #[serde(rename = "on time")]
  #[strum(serialize = "on time")]
  OnTime,
  #[serde(rename = "late")]
  #[strum(serialize = "late")]
  Late,
}

impl DelayCategory {
  pub fn of(delay_minutes: i64, band: i64) -> Self {
    if delay_minutes > band {
      Self::Late
    } else if delay_minutes < -band {
      Self::Early
    } else {
      Self::OnTime
    }
  }
}

/// A dynamic record with its derived delay fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegView {
  pub unique_key:          String,
  pub callsign:            String,
  pub tail_id:             String,
  pub flight_date:         NaiveDate,
  pub status:              LegStatus,
  pub scheduled_departure: DateTime<Utc>,
  pub actual_departure:    Option<DateTime<Utc>>,
  pub scheduled_arrival:   Option<DateTime<Utc>>,
  pub actual_arrival:      Option<DateTime<Utc>>,
  /// Minutes; absent when either departure time is unknown.
  pub departure_delay:     Option<i64>,
  /// Minutes; absent when either arrival time is unknown.
  pub arrival_delay:       Option<i64>,
  pub departure_status:    Option<DelayCategory>,
  pub arrival_status:      Option<DelayCategory>,
  /// Set when the actual duration is implausible; delays are then absent.
  pub anomaly:             Option<DurationAnomaly>,
  pub last_update:         DateTime<Utc>,
}

impl LegView {
  pub fn from_record(record: &DynamicRecord, config: &PartitionConfig) -> Self {
    let times = LegTimes {
      scheduled_departure: Some(record.scheduled_departure()),
      actual_departure:    record.actual_departure,
      scheduled_arrival:   record.scheduled_arrival,
      actual_arrival:      record.actual_arrival,
    };
    let anomaly = times.duration_anomaly(config.max_leg_duration);
    let plausible = anomaly.is_none();
    let departure_delay = times.departure_delay().filter(|_| plausible);
    let arrival_delay = times.arrival_delay().filter(|_| plausible);

    Self {
      unique_key: record.unique_key(),
      callsign: record.identity.callsign.clone(),
      tail_id: record.identity.tail_id.clone(),
      flight_date: record.identity.flight_date,
      status: record.status,
      scheduled_departure: record.scheduled_departure(),
      actual_departure: record.actual_departure,
      scheduled_arrival: record.scheduled_arrival,
      actual_arrival: record.actual_arrival,
      departure_delay,
      arrival_delay,
      departure_status: departure_delay.map(|d| DelayCategory::of(d, config.delay_band)),
      arrival_status: arrival_delay.map(|d| DelayCategory::of(d, config.delay_band)),
      anomaly,
      last_update: record.last_update,
    }
  }
}

// ─── Views ───────────────────────────────────────────────────────────────────

/// Which view a reader asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Timeline {
  /// In-progress, non-stale legs.
  Live,
  /// Completed legs with a computable arrival delay.
  Historical,
  /// `live` followed by `historical`.
  #[default]
  All,
}

/// The two disjoint views, each sorted by last update, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Views {
  pub done:    Vec<LegView>,
  pub current: Vec<LegView>,
}

impl Views {
  /// Rows for `timeline`, optionally restricted to one callsign and capped.
  pub fn select(
    &self,
    timeline: Timeline,
    callsign: Option<&str>,
    limit: Option<usize>,
  ) -> Vec<LegView> {
    let rows: Vec<&LegView> = match timeline {
      Timeline::Live => self.current.iter().collect(),
      Timeline::Historical => self.done.iter().collect(),
      Timeline::All => self.current.iter().chain(&self.done).collect(),
    };

    let mut rows: Vec<LegView> = rows
      .into_iter()
      .filter(|r| callsign.is_none_or(|c| r.callsign.eq_ignore_ascii_case(c)))
      .cloned()
      .collect();
    rows.sort_by(|a, b| b.last_update.cmp(&a.last_update));
    if let Some(limit) = limit {
      rows.truncate(limit);
    }
    rows
  }

  pub fn to_json(&self) -> Result<serde_json::Value> { Ok(serde_json::to_value(self)?) }
}

/// Derives [`Views`] from stored records.
#[derive(Debug, Clone, Copy, Default)]
pub struct Partitioner {
  config: PartitionConfig,
}

impl Partitioner {
  pub fn new(config: PartitionConfig) -> Self { Self { config } }

  /// An open leg that should have landed by now and has been silent for
  /// longer than the staleness window.
  pub fn is_stale(&self, record: &DynamicRecord, now: DateTime<Utc>) -> bool {
    record.actual_arrival.is_none()
      && record.scheduled_arrival.is_some_and(|sa| now > sa)
      && now - record.last_update > self.config.stale_after
  }

  pub fn partition<'a>(
    &self,
    records: impl IntoIterator<Item = &'a DynamicRecord>,
    now: DateTime<Utc>,
  ) -> Views {
    let mut views = Views::default();
    for record in records {
      let view = LegView::from_record(record, &self.config);
      match record.status {
        LegStatus::Arrived if view.arrival_delay.is_some() => views.done.push(view),
        status if status.is_open() && !self.is_stale(record, now) => views.current.push(view),
        _ => {}
      }
    }

    views.done.sort_by(|a, b| b.last_update.cmp(&a.last_update));
    views.current.sort_by(|a, b| b.last_update.cmp(&a.last_update));
    views
  }
}

// ─── Per-callsign detail ─────────────────────────────────────────────────────

/// A view row together with the live snapshots stamped with its identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegDetail {
  #[serde(flatten)]
  pub leg:       LegView,
  pub live_data: Vec<LiveSnapshot>,
}

/// Static metadata plus the done and current legs of one callsign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallsignView {
  #[serde(flatten)]
  pub metadata: StaticRecord,
  pub history:  Vec<LegDetail>,
  pub live:     Vec<LegDetail>,
}

#[cfg(test)]
mod tests {
  use chrono::{NaiveTime, TimeDelta, TimeZone};

  use super::*;
  use crate::identity::LegIdentity;

  fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, d, h, m, 0).unwrap()
  }

  fn leg(callsign: &str, status: LegStatus) -> DynamicRecord {
    DynamicRecord {
      identity: LegIdentity::resolve(
        Some(callsign),
        Some("39856a"),
        NaiveDate::from_ymd_opt(2025, 3, 1),
        NaiveTime::from_hms_opt(8, 0, 0),
      )
      .unwrap(),
      scheduled_arrival: Some(at(1, 10, 0)),
      actual_departure: Some(at(1, 8, 5)),
      actual_arrival: None,
      status,
      last_update: at(1, 9, 0),
    }
  }

  #[test]
  fn arrived_leg_with_arrival_delay_is_done() {
    let mut r = leg("AFR1", LegStatus::Arrived);
    r.actual_arrival = Some(at(1, 10, 25));
    let views = Partitioner::default().partition([&r], at(1, 11, 0));

    assert_eq!(views.done.len(), 1);
    assert!(views.current.is_empty());
    let row = &views.done[0];
    assert_eq!(row.departure_delay, Some(5));
    assert_eq!(row.arrival_delay, Some(25));
    assert_eq!(row.arrival_status, Some(DelayCategory::Late));
    assert_eq!(row.departure_status, Some(DelayCategory::OnTime));
  }

  #[test]
  fn arrived_leg_without_arrival_time_is_in_neither_view() {
    let r = leg("AFR1", LegStatus::Arrived);
    let views = Partitioner::default().partition([&r], at(1, 11, 0));
    assert!(views.done.is_empty());
    assert!(views.current.is_empty());
  }

  #[test]
  fn stale_en_route_leg_is_dropped_from_current() {
    // Scheduled arrival an hour ago, last update ten hours ago.
    let mut r = leg("AFR1", LegStatus::EnRoute);
    r.scheduled_arrival = Some(at(1, 19, 0));
    let now = at(1, 20, 0);
    r.last_update = now - TimeDelta::hours(10);

    let views = Partitioner::default().partition([&r], now);
    assert!(views.current.is_empty());
    assert!(Partitioner::default().is_stale(&r, now));
  }

  #[test]
  fn recent_open_legs_are_current() {
    let departing = leg("AFR1", LegStatus::Departing);
    let en_route = leg("AFR2", LegStatus::EnRoute);
    let views = Partitioner::default().partition([&departing, &en_route], at(1, 9, 30));
    assert_eq!(views.current.len(), 2);
  }

  #[test]
  fn absent_delays_serialize_as_null() {
    let r = leg("AFR1", LegStatus::EnRoute);
    let views = Partitioner::default().partition([&r], at(1, 9, 30));
    let json = views.to_json().unwrap()["current"][0].clone();
    assert!(json["arrival_delay"].is_null());
    assert!(json.as_object().unwrap().contains_key("actual_arrival"));
    assert_eq!(json["departure_delay"], 5);
    assert_eq!(json["status"], "en route");
  }

  #[test]
  fn select_filters_sorts_and_limits() {
    let mut a = leg("AFR1", LegStatus::EnRoute);
    a.last_update = at(1, 9, 10);
    let mut b = leg("AFR2", LegStatus::Departing);
    b.last_update = at(1, 9, 20);
    let mut c = leg("AFR1", LegStatus::Arrived);
    c.actual_arrival = Some(at(1, 9, 55));
    c.last_update = at(1, 9, 56);

    let views = Partitioner::default().partition([&a, &b, &c], at(1, 10, 0));
    let all = views.select(Timeline::All, None, None);
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].status, LegStatus::Arrived);

    let afr1 = views.select(Timeline::All, Some("afr1"), Some(1));
    assert_eq!(afr1.len(), 1);
    assert_eq!(afr1[0].callsign, "AFR1");

    assert_eq!(views.select(Timeline::Live, None, None).len(), 2);
    assert_eq!("historical".parse::<Timeline>().unwrap(), Timeline::Historical);
  }
}
