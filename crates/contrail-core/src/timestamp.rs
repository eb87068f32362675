//! Timestamp normalization.
//!
//! Status pages only give a time of day; the date comes from a separate hint
//! that is anchored on the day the leg was observed. This module turns the
//! pair into absolute instants and repairs the two ways that goes wrong:
//!
//! 1. an airborne leg observed after midnight is anchored on "today" although
//!    it departed yesterday (global day shift);
//! 2. a departure or arrival slipped past midnight relative to its reference
//!    (local wrap).
//!
//! Legs whose actual duration is still implausible afterwards are flagged
//! rather than fed into delay figures.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::{config::NormalizerConfig, status::LegStatus};

// ─── Time-of-day parsing ─────────────────────────────────────────────────────

/// Extract a time of day from scraped text.
///
/// A 12-hour token (`08:45PM`, `8:45 pm`) anywhere in the text wins over a
/// 24-hour one (`20:45`, `20:45:10`). Returns `None` when neither is found.
pub fn parse_time_of_day(text: &str) -> Option<NaiveTime> {
  let tokens = clock_tokens(text);

  tokens
    .iter()
    .filter_map(|t| t.meridiem.map(|m| (t.clock, m)))
    .find_map(|(clock, m)| {
      NaiveTime::parse_from_str(&format!("{}{m}", hour_minute(clock)), "%I:%M%p").ok()
    })
    .or_else(|| {
      tokens.iter().filter(|t| t.meridiem.is_none()).find_map(|t| {
        NaiveTime::parse_from_str(t.clock, "%H:%M:%S")
          .or_else(|_| NaiveTime::parse_from_str(t.clock, "%H:%M"))
          .ok()
      })
    })
}

struct ClockToken<'a> {
  /// `H:MM`, `HH:MM` or `HH:MM:SS`.
  clock:    &'a str,
  meridiem: Option<&'static str>,
}

fn clock_tokens(text: &str) -> Vec<ClockToken<'_>> {
  let bytes = text.as_bytes();
  let digits_from = |mut i: usize| {
    while i < bytes.len() && bytes[i].is_ascii_digit() {
      i += 1;
    }
    i
  };

  let mut tokens = Vec::new();
  let mut i = 0;
  while i < bytes.len() {
    if !bytes[i].is_ascii_digit() {
      i += 1;
      continue;
    }

    let start = i;
    let hour_end = digits_from(start);
    if hour_end - start > 2 || bytes.get(hour_end) != Some(&b':') {
      i = hour_end;
      continue;
    }

    let minute_end = digits_from(hour_end + 1);
    if minute_end - hour_end - 1 != 2 {
      i = minute_end;
      continue;
    }

    let mut end = minute_end;
    if bytes.get(end) == Some(&b':') {
      let second_end = digits_from(end + 1);
      if second_end - end - 1 == 2 {
        end = second_end;
      }
    }

    tokens.push(ClockToken { clock: &text[start..end], meridiem: meridiem_after(&text[end..]) });
    i = end;
  }
  tokens
}

/// `HH:MM` part of a clock token; 12-hour tokens drop their seconds.
fn hour_minute(clock: &str) -> &str {
  match clock.match_indices(':').nth(1) {
    Some((i, _)) => &clock[..i],
    None => clock,
  }
}

fn meridiem_after(rest: &str) -> Option<&'static str> {
  let rest = rest.strip_prefix(' ').unwrap_or(rest);
  let marker = rest.get(..2)?;
  let standalone = !rest[2..].starts_with(|c: char| c.is_ascii_alphabetic());
  match marker.to_ascii_uppercase().as_str() {
    "AM" if standalone => Some("AM"),
    "PM" if standalone => Some("PM"),
    _ => None,
  }
}

/// Combine a date and an optional time string into an absolute instant.
/// Unparseable text yields `None`.
pub fn combine(date: NaiveDate, text: Option<&str>) -> Option<DateTime<Utc>> {
  text
    .and_then(parse_time_of_day)
    .map(|t| date.and_time(t).and_utc())
}

// ─── Normalizer ──────────────────────────────────────────────────────────────

/// Raw time-of-day strings of one observation, each optionally absent.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawTimes<'a> {
  pub scheduled_departure: Option<&'a str>,
  pub actual_departure:    Option<&'a str>,
  pub scheduled_arrival:   Option<&'a str>,
  pub actual_arrival:      Option<&'a str>,
}

/// Absolute timestamps of one leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LegTimes {
  pub scheduled_departure: Option<DateTime<Utc>>,
  pub actual_departure:    Option<DateTime<Utc>>,
  pub scheduled_arrival:   Option<DateTime<Utc>>,
  pub actual_arrival:      Option<DateTime<Utc>>,
}

impl LegTimes {
  /// Departure delay in minutes, when both departure times are known.
  pub fn departure_delay(&self) -> Option<i64> {
    minutes_between(self.scheduled_departure, self.actual_departure)
  }

  /// Arrival delay in minutes, when both arrival times are known.
  pub fn arrival_delay(&self) -> Option<i64> {
    minutes_between(self.scheduled_arrival, self.actual_arrival)
  }

  /// Flag an actual departure-to-arrival duration that is negative or longer
  /// than `max`.
  pub fn duration_anomaly(&self, max: TimeDelta) -> Option<DurationAnomaly> {
    let duration = self.actual_arrival? - self.actual_departure?;
    if duration < TimeDelta::zero() {
      Some(DurationAnomaly::Negative { minutes: duration.num_minutes() })
    } else if duration > max {
      Some(DurationAnomaly::Excessive { minutes: duration.num_minutes() })
    } else {
      None
    }
  }
}

fn minutes_between(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Option<i64> {
  Some((to? - from?).num_minutes())
}

/// An implausible leg duration left after normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DurationAnomaly {
  Negative { minutes: i64 },
  Excessive { minutes: i64 },
}

/// Output of [`Normalizer::normalize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedTimes {
  pub times:           LegTimes,
  /// Absent unless both departure times are known and the leg is plausible.
  pub departure_delay: Option<i64>,
  /// Absent unless both arrival times are known and the leg is plausible.
  pub arrival_delay:   Option<i64>,
  pub anomaly:         Option<DurationAnomaly>,
}

/// Builds absolute timestamps from a date plus time-of-day strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer {
  config: NormalizerConfig,
}

impl Normalizer {
  pub fn new(config: NormalizerConfig) -> Self { Self { config } }

  /// Parse and normalize the raw strings of one observation.
  pub fn normalize(
    &self,
    date: NaiveDate,
    raw: &RawTimes<'_>,
    status: LegStatus,
    now: DateTime<Utc>,
  ) -> NormalizedTimes {
    let candidates = LegTimes {
      scheduled_departure: combine(date, raw.scheduled_departure),
      actual_departure:    combine(date, raw.actual_departure),
      scheduled_arrival:   combine(date, raw.scheduled_arrival),
      actual_arrival:      combine(date, raw.actual_arrival),
    };
    self.normalize_times(candidates, status, now)
  }

  /// Apply the day-shift, wrap and duration rules to candidate instants that
  /// were all anchored on the same date.
  pub fn normalize_times(
    &self,
    mut t: LegTimes,
    status: LegStatus,
    now: DateTime<Utc>,
  ) -> NormalizedTimes {
    let one_day = TimeDelta::days(1);
    let horizon = now + self.config.future_tolerance;
    let too_far = |at: Option<DateTime<Utc>>| at.is_some_and(|at| at > horizon);

    // Global day shift.
    if status.has_departed() && too_far(t.scheduled_departure) {
      t.scheduled_departure = t.scheduled_departure.map(|at| at - one_day);
      t.scheduled_arrival = t.scheduled_arrival.map(|at| at - one_day);
      if too_far(t.actual_departure) {
        t.actual_departure = t.actual_departure.map(|at| at - one_day);
      }
      if too_far(t.actual_arrival) {
        t.actual_arrival = t.actual_arrival.map(|at| at - one_day);
      }
    }

    // Local wraps.
    if let (Some(sched), Some(actual)) = (t.scheduled_departure, t.actual_departure)
      && sched - actual > self.config.early_departure_tolerance
    {
      t.actual_departure = Some(actual + one_day);
    }
    if let (Some(dep), Some(arr)) = (t.scheduled_departure, t.scheduled_arrival)
      && arr < dep
    {
      t.scheduled_arrival = Some(arr + one_day);
    }
    if let (Some(dep), Some(arr)) = (t.actual_departure.or(t.scheduled_departure), t.actual_arrival)
      && arr < dep
    {
      t.actual_arrival = Some(arr + one_day);
    }

    let anomaly = t.duration_anomaly(self.config.max_leg_duration);
    let plausible = anomaly.is_none();
    NormalizedTimes {
      times: t,
      departure_delay: t.departure_delay().filter(|_| plausible),
      arrival_delay: t.arrival_delay().filter(|_| plausible),
      anomaly,
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn date() -> NaiveDate { NaiveDate::from_ymd_opt(2025, 3, 1).unwrap() }

  fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, d, h, m, 0).unwrap()
  }

  fn normalizer() -> Normalizer { Normalizer::new(NormalizerConfig::default()) }

  #[test]
  fn parses_twelve_hour_tokens_in_text() {
    let t = |h, m| NaiveTime::from_hms_opt(h, m, 0);
    assert_eq!(parse_time_of_day("08:45PM CET"), t(20, 45));
    assert_eq!(parse_time_of_day("Departed 12:05AM"), t(0, 5));
    assert_eq!(parse_time_of_day("12:30 pm"), t(12, 30));
    assert_eq!(parse_time_of_day("9:15AM"), t(9, 15));
  }

  #[test]
  fn parses_twenty_four_hour_tokens() {
    assert_eq!(parse_time_of_day("23:50"), NaiveTime::from_hms_opt(23, 50, 0));
    assert_eq!(parse_time_of_day("07:05:30"), NaiveTime::from_hms_opt(7, 5, 30));
  }

  #[test]
  fn garbage_is_absent_not_fatal() {
    assert_eq!(parse_time_of_day(""), None);
    assert_eq!(parse_time_of_day("--"), None);
    assert_eq!(parse_time_of_day("25:99"), None);
    assert_eq!(parse_time_of_day("123:45"), None);
    assert_eq!(combine(date(), Some("n/a")), None);
    assert_eq!(combine(date(), None), None);
  }

  #[test]
  fn departure_slipping_past_midnight_is_twenty_minutes_late() {
    let raw = RawTimes {
      scheduled_departure: Some("23:50"),
      actual_departure: Some("00:10"),
      ..Default::default()
    };
    let n = normalizer().normalize(date(), &raw, LegStatus::EnRoute, at(2, 0, 30));

    assert_eq!(n.times.actual_departure, Some(at(2, 0, 10)));
    assert_eq!(n.departure_delay, Some(20));
  }

  #[test]
  fn departure_before_schedule_wraps_by_default() {
    let raw = RawTimes {
      scheduled_departure: Some("10:00"),
      actual_departure: Some("09:55"),
      ..Default::default()
    };
    let n = normalizer().normalize(date(), &raw, LegStatus::EnRoute, at(1, 10, 30));
    assert_eq!(n.times.actual_departure, Some(at(2, 9, 55)));
    assert_eq!(n.departure_delay, Some(1435));
  }

  #[test]
  fn early_departure_within_tolerance_is_not_wrapped() {
    let normalizer = Normalizer::new(NormalizerConfig {
      early_departure_tolerance: TimeDelta::hours(6),
      ..NormalizerConfig::default()
    });
    let raw = RawTimes {
      scheduled_departure: Some("10:00"),
      actual_departure: Some("09:55"),
      ..Default::default()
    };
    let n = normalizer.normalize(date(), &raw, LegStatus::EnRoute, at(1, 10, 30));
    assert_eq!(n.times.actual_departure, Some(at(1, 9, 55)));
    assert_eq!(n.departure_delay, Some(-5));
  }

  #[test]
  fn overnight_route_wraps_arrivals() {
    let raw = RawTimes {
      scheduled_departure: Some("22:00"),
      actual_departure: Some("22:10"),
      scheduled_arrival: Some("06:00"),
      actual_arrival: Some("05:50"),
    };
    let n = normalizer().normalize(date(), &raw, LegStatus::Arrived, at(2, 7, 0));

    assert_eq!(n.times.scheduled_arrival, Some(at(2, 6, 0)));
    assert_eq!(n.times.actual_arrival, Some(at(2, 5, 50)));
    assert_eq!(n.arrival_delay, Some(-10));
    assert_eq!(n.anomaly, None);
  }

  #[test]
  fn airborne_leg_anchored_on_wrong_day_is_shifted_back() {
    // Observed at 00:30 on the 2nd about a leg that left at 23:00 on the 1st,
    // but the date hint says the 2nd.
    let raw = RawTimes {
      scheduled_departure: Some("23:00"),
      actual_departure: Some("23:05"),
      scheduled_arrival: Some("01:00"),
      actual_arrival: None,
    };
    let hint = NaiveDate::from_ymd_opt(2025, 3, 2).unwrap();
    let n = normalizer().normalize(hint, &raw, LegStatus::EnRoute, at(2, 0, 30));

    assert_eq!(n.times.scheduled_departure, Some(at(1, 23, 0)));
    assert_eq!(n.times.actual_departure, Some(at(1, 23, 5)));
    assert_eq!(n.times.scheduled_arrival, Some(at(2, 1, 0)));
    assert_eq!(n.departure_delay, Some(5));
  }

  #[test]
  fn departing_leg_is_never_day_shifted() {
    let raw = RawTimes { scheduled_departure: Some("23:00"), ..Default::default() };
    let n = normalizer().normalize(date(), &raw, LegStatus::Departing, at(1, 8, 0));
    assert_eq!(n.times.scheduled_departure, Some(at(1, 23, 0)));
  }

  #[test]
  fn implausible_duration_is_flagged_and_has_no_delays() {
    let times = LegTimes {
      scheduled_departure: Some(at(1, 10, 0)),
      actual_departure:    Some(at(1, 10, 0)),
      scheduled_arrival:   Some(at(3, 12, 0)),
      actual_arrival:      Some(at(3, 12, 0)),
    };
    let n = normalizer().normalize_times(times, LegStatus::Arrived, at(3, 13, 0));

    assert!(matches!(n.anomaly, Some(DurationAnomaly::Excessive { .. })));
    assert_eq!(n.departure_delay, None);
    assert_eq!(n.arrival_delay, None);
  }

  #[test]
  fn delays_are_absent_not_zero() {
    let raw = RawTimes { scheduled_departure: Some("10:00"), ..Default::default() };
    let n = normalizer().normalize(date(), &raw, LegStatus::Departing, at(1, 9, 0));
    assert_eq!(n.departure_delay, None);
    assert_eq!(n.arrival_delay, None);
  }
}
