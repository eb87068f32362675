//! Per-callsign static metadata (airline, route).
//!
//! Created once per callsign and refined over time: a placeholder may be
//! replaced by a concrete value, never the other way round.

use serde::{Deserialize, Serialize};

/// Text the scraper emits when a field is not really known.
const PLACEHOLDERS: &[&str] = &["", "unknown", "n/a", "na", "-", "--", "none", "null"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticRecord {
  pub callsign:            String,
  pub airline:             Option<String>,
  pub origin_code:         Option<String>,
  pub destination_code:    Option<String>,
  pub origin_airport:      Option<String>,
  pub destination_airport: Option<String>,
  pub origin_city:         Option<String>,
  pub destination_city:    Option<String>,
  /// `None` while it is not known whether this is a commercial service.
  pub commercial:          Option<bool>,
}

impl StaticRecord {
  /// An empty record for `callsign`.
  pub fn new(callsign: impl Into<String>) -> Self {
    Self {
      callsign:            callsign.into().trim().to_uppercase(),
      airline:             None,
      origin_code:         None,
      destination_code:    None,
      origin_airport:      None,
      destination_airport: None,
      origin_city:         None,
      destination_city:    None,
      commercial:          None,
    }
  }

  /// Airline, origin and destination are all concrete.
  pub fn is_complete(&self) -> bool {
    [&self.airline, &self.origin_code, &self.destination_code]
      .into_iter()
      .all(|v| concrete(v.as_deref()).is_some())
  }

  /// Replace placeholder text with `None` and trim the rest.
  pub fn cleaned(self) -> Self {
    let clean = |v: Option<String>| concrete(v.as_deref()).map(str::to_owned);
    Self {
      callsign:            self.callsign.trim().to_uppercase(),
      airline:             clean(self.airline),
      origin_code:         clean(self.origin_code).map(|c| c.to_uppercase()),
      destination_code:    clean(self.destination_code).map(|c| c.to_uppercase()),
      origin_airport:      clean(self.origin_airport),
      destination_airport: clean(self.destination_airport),
      origin_city:         clean(self.origin_city),
      destination_city:    clean(self.destination_city),
      commercial:          self.commercial,
    }
  }

  /// Fold `incoming` into `self`: concrete incoming values win, absent ones
  /// keep what is already known.
  pub fn refine(self, incoming: Self) -> Self {
    let (old, new) = (self.cleaned(), incoming.cleaned());
    Self {
      callsign:            old.callsign,
      airline:             new.airline.or(old.airline),
      origin_code:         new.origin_code.or(old.origin_code),
      destination_code:    new.destination_code.or(old.destination_code),
      origin_airport:      new.origin_airport.or(old.origin_airport),
      destination_airport: new.destination_airport.or(old.destination_airport),
      origin_city:         new.origin_city.or(old.origin_city),
      destination_city:    new.destination_city.or(old.destination_city),
      commercial:          new.commercial.or(old.commercial),
    }
  }
}

fn concrete(v: Option<&str>) -> Option<&str> {
  v.map(str::trim)
    .filter(|v| !PLACEHOLDERS.contains(&v.to_lowercase().as_str()))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn placeholders_are_not_complete() {
    let r = StaticRecord {
      airline: Some("Air France".into()),
      origin_code: Some("CDG".into()),
      destination_code: Some("Unknown".into()),
      ..StaticRecord::new("AFR1")
    };
    assert!(!r.is_complete());
  }

  #[test]
  fn refine_never_downgrades() {
    let known = StaticRecord {
      airline: Some("Air France".into()),
      origin_code: Some("cdg".into()),
      destination_code: Some("JFK".into()),
      commercial: Some(true),
      ..StaticRecord::new("AFR1")
    };
    let placeholder = StaticRecord {
      airline: Some("unknown".into()),
      origin_code: Some("  ".into()),
      destination_city: Some("New York, NY".into()),
      ..StaticRecord::new("afr1")
    };

    let refined = known.refine(placeholder);
    assert_eq!(refined.airline.as_deref(), Some("Air France"));
    assert_eq!(refined.origin_code.as_deref(), Some("CDG"));
    assert_eq!(refined.destination_city.as_deref(), Some("New York, NY"));
    assert_eq!(refined.commercial, Some(true));
    assert!(refined.is_complete());
  }
}
