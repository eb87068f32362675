//! Field-level merge of an observation into the stored leg.
//!
//! The storage backend runs the same rule in its upsert conflict clause, so
//! two racing writers of one leg converge whatever order they land in.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result, identity::LegIdentity, leg::DynamicRecord, status::LegStatus,
};

/// The fields one observation contributes to a leg.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedFields {
  pub callsign:            Option<String>,
  pub tail_id:             Option<String>,
  pub flight_date:         Option<NaiveDate>,
  pub scheduled_departure: Option<NaiveTime>,
  pub scheduled_arrival:   Option<DateTime<Utc>>,
  pub actual_departure:    Option<DateTime<Utc>>,
  pub actual_arrival:      Option<DateTime<Utc>>,
  pub status:              LegStatus,
  pub observed_at:         DateTime<Utc>,
}

impl ObservedFields {
  /// The identity these fields address, if the anchors are present.
  pub fn identity(&self) -> Result<LegIdentity> {
    LegIdentity::resolve(
      self.callsign.as_deref(),
      self.tail_id.as_deref(),
      self.flight_date,
      self.scheduled_departure,
    )
  }
}

/// Merge `incoming` over `existing`.
///
/// Actual times and the scheduled arrival are coalesced (incoming wins when
/// present, existing is kept otherwise); status and last update are
/// overwritten, except that a leg which has landed stays `arrived`.
/// `existing` is ignored unless it is the same leg. Observations
/// without identity anchors or with an `unknown` status are rejected.
pub fn merge(existing: Option<&DynamicRecord>, incoming: &ObservedFields) -> Result<DynamicRecord> {
  let identity = incoming.identity()?;
  if !incoming.status.is_known() {
    return Err(Error::UnknownStatus(identity.unique_key()));
  }

  let existing = existing.filter(|e| e.identity == identity);
  let keep = |new: Option<DateTime<Utc>>, old: fn(&DynamicRecord) -> Option<DateTime<Utc>>| {
    new.or_else(|| existing.and_then(old))
  };

  Ok(DynamicRecord {
    scheduled_arrival: keep(incoming.scheduled_arrival, |e| e.scheduled_arrival),
    actual_departure:  keep(incoming.actual_departure, |e| e.actual_departure),
    actual_arrival:    keep(incoming.actual_arrival, |e| e.actual_arrival),
    status:            existing
      .filter(|e| e.has_landed())
      .map_or(incoming.status, |e| e.status),
    last_update:       incoming.observed_at,
    identity,
  })
}
