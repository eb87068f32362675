//! [`Reconciler`] runs one scheduling cycle's worth of observations
//! through triage, normalization, the status machine and the merge, and
//! writes the result through a [`LegStore`].
//!
//! Every leg touches only its own unique key, so a batch is reconciled
//! concurrently; a storage failure on one leg does not affect the others.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::{sync::Semaphore, task::JoinSet};

use crate::{
  config::EngineConfig,
  identity::LegIdentity,
  leg::DynamicRecord,
  live::{LiveObservation, LiveSignal},
  merge::{ObservedFields, merge},
  partition::{CallsignView, LegDetail, Partitioner, Timeline, Views},
  static_data::StaticRecord,
  status::{self, AutoClose, AutoClosure, LegStatus, Transition, classify},
  store::LegStore,
  timestamp::{DurationAnomaly, Normalizer, RawTimes},
  triage::{RefreshDecision, RefreshPolicy},
};

// ─── Inbound types ───────────────────────────────────────────────────────────

/// A raw status observation as produced by the scraper. Any field may be
/// absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawObservation {
  pub callsign:            Option<String>,
  pub tail_id:             Option<String>,
  pub raw_status:          Option<String>,
  /// Date the time-of-day strings are anchored on; defaults to today.
  pub flight_date_hint:    Option<NaiveDate>,
  pub scheduled_departure: Option<String>,
  pub actual_departure:    Option<String>,
  pub scheduled_arrival:   Option<String>,
  pub actual_arrival:      Option<String>,
}

impl RawObservation {
  fn raw_times(&self) -> RawTimes<'_> {
    RawTimes {
      scheduled_departure: self.scheduled_departure.as_deref(),
      actual_departure:    self.actual_departure.as_deref(),
      scheduled_arrival:   self.scheduled_arrival.as_deref(),
      actual_arrival:      self.actual_arrival.as_deref(),
    }
  }
}

// ─── Outcomes ────────────────────────────────────────────────────────────────

/// Why a single leg could not be reconciled.
#[derive(Debug, Error)]
pub enum ReconcileError<E> {
  /// The observation cannot be addressed or merged.
  #[error("observation rejected: {0}")]
  Rejected(#[source] crate::Error),

  #[error("store error: {0}")]
  Store(#[source] E),
}

/// What reconciling one observation did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
  pub callsign: Option<String>,
  #[serde(serialize_with = "transition_label")]
  pub transition: Transition,
  /// The stored row; absent when the leg was left untouched.
  pub record: Option<DynamicRecord>,
  pub anomaly: Option<DurationAnomaly>,
  /// Set when reading the previous leg force-closed it.
  pub closure: Option<AutoClosure>,
}

/// A leg that failed, with the reason as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegFailure {
  pub callsign: Option<String>,
  pub reason:   String,
}

/// Summary of one [`Reconciler::reconcile_batch`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
  pub created:    usize,
  pub updated:    usize,
  pub untouched:  usize,
  /// Identity failures: the observation could not be addressed.
  pub rejected:   usize,
  /// Stored legs whose duration was implausible after normalization.
  pub anomalous:  usize,
  /// Storage failures.
  pub failed:     usize,
  pub closures:   Vec<AutoClosure>,
  pub failures:   Vec<LegFailure>,
}

impl BatchReport {
  fn record(&mut self, outcome: Outcome) {
    match outcome.transition {
      Transition::Untouched => self.untouched += 1,
      Transition::FreshCycle => self.created += 1,
      Transition::InPlace { .. } => self.updated += 1,
    }
    if outcome.anomaly.is_some() {
      self.anomalous += 1;
    }
    self.closures.extend(outcome.closure);
  }

  fn fail(&mut self, callsign: Option<String>, rejected: bool, reason: String) {
    if rejected {
      self.rejected += 1;
    } else {
      self.failed += 1;
    }
    self.failures.push(LegFailure { callsign, reason });
  }
}

/// Summary of one [`Reconciler::triage`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriageReport {
  /// Signals whose leg must be re-observed this cycle.
  pub to_refresh: Vec<LiveSignal>,
  pub skipped:    usize,
  pub failures:   Vec<LegFailure>,
}

/// Summary of one [`Reconciler::record_snapshots`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotReport {
  pub stored:   usize,
  /// No leg could be stamped on the snapshot.
  pub skipped:  usize,
  pub failures: Vec<LegFailure>,
}

// ─── Reconciler ──────────────────────────────────────────────────────────────

/// Wires the components together over a shared store.
pub struct Reconciler<S> {
  store:       Arc<S>,
  config:      EngineConfig,
  policy:      RefreshPolicy,
  normalizer:  Normalizer,
  partitioner: Partitioner,
}

impl<S> Reconciler<S>
where
  S: LegStore + 'static,
{
  pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
    Self {
      policy: RefreshPolicy::new(config.refresh_config()),
      normalizer: Normalizer::new(config.normalizer_config()),
      partitioner: Partitioner::new(config.partition_config()),
      store,
      config,
    }
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  fn auto_close(&self, now: DateTime<Utc>) -> AutoClose {
    AutoClose::new(now, self.config.auto_close_after())
  }

  // ── Triage ────────────────────────────────────────────────────────────

  /// Decide whether the leg behind `signal` must be re-observed.
  pub async fn needs_refresh(
    &self,
    signal: &LiveSignal,
    now: DateTime<Utc>,
  ) -> Result<RefreshDecision, S::Error> {
    let callsign = signal.callsign.trim().to_uppercase();
    let tail_id = signal.tail_id.trim().to_lowercase();

    let static_record = self.store.get_static(&callsign).await?;
    let latest = self
      .store
      .latest_leg(&callsign, &tail_id, self.auto_close(now))
      .await?;
    if let Some(closure) = latest.as_ref().and_then(|r| r.closure.as_ref()) {
      log_closure(closure);
    }

    Ok(self.policy.decide(
      static_record.as_ref(),
      latest.as_ref().map(|r| &r.record),
      signal,
      now,
    ))
  }

  /// Select the signals whose legs need a fresh observation.
  pub async fn triage(&self, signals: Vec<LiveSignal>, now: DateTime<Utc>) -> TriageReport {
    let mut report = TriageReport::default();
    for signal in signals {
      match self.needs_refresh(&signal, now).await {
        Ok(decision) if decision.is_required() => {
          tracing::debug!(callsign = %signal.callsign, ?decision, "refresh required");
          report.to_refresh.push(signal);
        }
        Ok(_) => report.skipped += 1,
        Err(e) => {
          tracing::error!(callsign = %signal.callsign, error = %e, "triage lookup failed");
          report.failures.push(LegFailure {
            callsign: Some(signal.callsign),
            reason:   e.to_string(),
          });
        }
      }
    }
    tracing::info!(
      to_refresh = report.to_refresh.len(),
      skipped = report.skipped,
      failed = report.failures.len(),
      "triage complete"
    );
    report
  }

  // ── Reconciliation ────────────────────────────────────────────────────

  /// Reconcile one observation and upsert the result.
  pub async fn reconcile(
    &self,
    obs: &RawObservation,
    now: DateTime<Utc>,
  ) -> Result<Outcome, ReconcileError<S::Error>> {
    let observed = classify(obs.raw_status.as_deref().unwrap_or_default());
    if !observed.is_known() {
      tracing::debug!(callsign = ?obs.callsign, raw = ?obs.raw_status, "unknown status, leg left untouched");
      return Ok(Outcome {
        callsign:   obs.callsign.clone(),
        transition: Transition::Untouched,
        record:     None,
        anomaly:    None,
        closure:    None,
      });
    }

    let date = obs.flight_date_hint.unwrap_or_else(|| now.date_naive());
    let normalized = self.normalizer.normalize(date, &obs.raw_times(), observed, now);
    let identity = LegIdentity::anchored_at(
      obs.callsign.as_deref(),
      obs.tail_id.as_deref(),
      normalized.times.scheduled_departure,
    )
    .map_err(ReconcileError::Rejected)?;

    let previous = self
      .store
      .latest_leg(&identity.callsign, &identity.tail_id, self.auto_close(now))
      .await
      .map_err(ReconcileError::Store)?;
    let closure = previous.as_ref().and_then(|r| r.closure.clone());
    if let Some(closure) = &closure {
      log_closure(closure);
    }
    let previous = previous.map(|r| r.record);

    let step = status::step(previous.as_ref(), &identity, observed);
    if step.transition == Transition::Untouched {
      tracing::debug!(
        unique_key = %identity.unique_key(),
        status = %observed,
        "leg has landed, replayed phase ignored"
      );
      return Ok(Outcome {
        callsign: Some(identity.callsign),
        transition: step.transition,
        record: None,
        anomaly: None,
        closure,
      });
    }

    let times = normalized.times;
    let fields = ObservedFields {
      callsign: Some(identity.callsign.clone()),
      tail_id: Some(identity.tail_id.clone()),
      flight_date: Some(identity.flight_date),
      scheduled_departure: Some(identity.scheduled_departure),
      scheduled_arrival: times.scheduled_arrival.filter(|_| step.capture.scheduled_arrival),
      actual_departure: times.actual_departure.filter(|_| step.capture.actual_departure),
      actual_arrival: times.actual_arrival.filter(|_| step.capture.actual_arrival),
      status: observed,
      observed_at: now,
    };

    let base = previous.as_ref().filter(|p| p.identity == identity);
    let merged = merge(base, &fields).map_err(ReconcileError::Rejected)?;
    let unique_key = merged.unique_key();
    let stored = self
      .store
      .upsert_leg(merged)
      .await
      .map_err(ReconcileError::Store)?;

    match step.transition {
      Transition::FreshCycle => {
        tracing::info!(%unique_key, status = %observed, "new leg cycle");
      }
      Transition::InPlace { from } if from != observed => {
        tracing::info!(%unique_key, %from, to = %observed, "leg transition");
      }
      _ => tracing::debug!(%unique_key, status = %observed, "leg refreshed"),
    }
    if let Some(anomaly) = &normalized.anomaly {
      tracing::warn!(%unique_key, ?anomaly, "implausible leg duration, excluded from delays");
    }

    Ok(Outcome {
      callsign: Some(identity.callsign),
      transition: step.transition,
      record: Some(stored),
      anomaly: normalized.anomaly,
      closure,
    })
  }

  /// Reconcile a batch concurrently. Failures are counted per leg.
  pub async fn reconcile_batch(
    self: &Arc<Self>,
    observations: Vec<RawObservation>,
    now: DateTime<Utc>,
  ) -> BatchReport {
    let permits = Arc::new(Semaphore::new(self.config.max_parallel_legs.max(1)));
    let mut tasks = JoinSet::new();

    for obs in observations {
      let this = Arc::clone(self);
      let permits = Arc::clone(&permits);
      tasks.spawn(async move {
        let _permit = permits.acquire_owned().await;
        let result = this.reconcile(&obs, now).await;
        (obs.callsign, result)
      });
    }

    let mut report = BatchReport::default();
    while let Some(joined) = tasks.join_next().await {
      match joined {
        Ok((_, Ok(outcome))) => report.record(outcome),
        Ok((callsign, Err(ReconcileError::Rejected(e)))) => {
          tracing::warn!(callsign = ?callsign, error = %e, "observation rejected");
          report.fail(callsign, true, e.to_string());
        }
        Ok((callsign, Err(ReconcileError::Store(e)))) => {
          tracing::error!(callsign = ?callsign, error = %e, "failed to store leg");
          report.fail(callsign, false, e.to_string());
        }
        Err(e) => {
          tracing::error!(error = %e, "reconcile task aborted");
          report.fail(None, false, e.to_string());
        }
      }
    }

    tracing::info!(
      created = report.created,
      updated = report.updated,
      untouched = report.untouched,
      rejected = report.rejected,
      anomalous = report.anomalous,
      failed = report.failed,
      "batch reconciled"
    );
    report
  }

  // ── Static metadata ───────────────────────────────────────────────────

  /// Store (or refine) static metadata records.
  pub async fn ingest_static(&self, records: Vec<StaticRecord>) -> Vec<LegFailure> {
    let mut failures = Vec::new();
    for record in records {
      let callsign = record.callsign.clone();
      if let Err(e) = self.store.upsert_static(record.cleaned()).await {
        tracing::error!(%callsign, error = %e, "failed to store static metadata");
        failures.push(LegFailure { callsign: Some(callsign), reason: e.to_string() });
      }
    }
    failures
  }

  // ── Live snapshots ────────────────────────────────────────────────────

  /// Stamp live observations with their leg identity and append them.
  pub async fn record_snapshots(
    &self,
    observations: Vec<LiveObservation>,
    now: DateTime<Utc>,
  ) -> SnapshotReport {
    let mut report = SnapshotReport::default();
    for obs in observations {
      let callsign = obs.callsign.trim().to_uppercase();
      let tail_id = obs.tail_id.trim().to_lowercase();
      let latest = match self.store.latest_leg(&callsign, &tail_id, self.auto_close(now)).await {
        Ok(latest) => latest,
        Err(e) => {
          report.failures.push(LegFailure { callsign: Some(callsign), reason: e.to_string() });
          continue;
        }
      };

      if let Some(closure) = latest.as_ref().and_then(|r| r.closure.as_ref()) {
        log_closure(closure);
      }

      let Some(leg) = latest
        .map(|r| r.record)
        .filter(|leg| self.accepts_snapshot(leg, obs.observed_at))
      else {
        tracing::debug!(%callsign, "no leg to stamp snapshot on");
        report.skipped += 1;
        continue;
      };

      match self.store.append_snapshot(obs.stamp(leg.identity)).await {
        Ok(()) => report.stored += 1,
        Err(e) => {
          tracing::error!(%callsign, error = %e, "failed to store snapshot");
          report.failures.push(LegFailure { callsign: Some(callsign), reason: e.to_string() });
        }
      }
    }
    report
  }

  /// Open legs take every snapshot; an arrived leg only those taken around
  /// its last update.
  fn accepts_snapshot(&self, leg: &DynamicRecord, observed_at: DateTime<Utc>) -> bool {
    leg.status != LegStatus::Arrived
      || observed_at - leg.last_update <= self.config.refresh_config().refresh_after
  }

  // ── Closure and views ─────────────────────────────────────────────────

  /// Force-close every silent open leg.
  pub async fn close_stale(&self, now: DateTime<Utc>) -> Result<Vec<AutoClosure>, S::Error> {
    let closures = self.store.close_stale(self.auto_close(now)).await?;
    closures.iter().for_each(log_closure);
    Ok(closures)
  }

  /// The `done` / `current` views over every stored leg.
  pub async fn views(&self, now: DateTime<Utc>) -> Result<Views, S::Error> {
    let listing = self.store.list_legs(Some(self.auto_close(now))).await?;
    listing.closures.iter().for_each(log_closure);
    Ok(self.partitioner.partition(&listing.records, now))
  }

  /// Static metadata plus the legs of one callsign with their snapshots.
  /// `None` when the callsign has no static record.
  pub async fn callsign_view(
    &self,
    callsign: &str,
    now: DateTime<Utc>,
  ) -> Result<Option<CallsignView>, S::Error> {
    let callsign = callsign.trim().to_uppercase();
    let Some(metadata) = self.store.get_static(&callsign).await? else {
      return Ok(None);
    };
    let views = self.views(now).await?;

    let mut history = Vec::new();
    for leg in views.select(Timeline::Historical, Some(&callsign), None) {
      let live_data = self.store.snapshots_for(&leg.unique_key).await?;
      history.push(LegDetail { leg, live_data });
    }
    let mut live = Vec::new();
    for leg in views.select(Timeline::Live, Some(&callsign), None) {
      let live_data = self.store.snapshots_for(&leg.unique_key).await?;
      live.push(LegDetail { leg, live_data });
    }

    Ok(Some(CallsignView { metadata, history, live }))
  }
}

fn log_closure(closure: &AutoClosure) {
  tracing::info!(
    unique_key = %closure.unique_key,
    previous = %closure.previous_status,
    silent_since = %closure.silent_since,
    "leg auto-closed"
  );
}

/// Serializes a [`Transition`] as a short label. The previous state of an
/// in-place update is not part of the label, so outcomes are write-only.
fn transition_label<S: serde::Serializer>(t: &Transition, s: S) -> Result<S::Ok, S::Error> {
  s.serialize_str(match t {
    Transition::Untouched => "untouched",
    Transition::FreshCycle => "fresh_cycle",
    Transition::InPlace { .. } => "in_place",
  })
}

#[cfg(test)]
mod tests {
  use chrono::{NaiveTime, TimeZone};

  use super::*;

  #[test]
  fn outcome_serializes_transition_as_label() {
    let identity = LegIdentity::resolve(
      Some("AFR1234"),
      Some("39856a"),
      NaiveDate::from_ymd_opt(2025, 3, 1),
      NaiveTime::from_hms_opt(9, 0, 0),
    )
    .unwrap();
    let record = DynamicRecord {
      identity,
      scheduled_arrival: None,
      actual_departure: None,
      actual_arrival: None,
      status: LegStatus::EnRoute,
      last_update: Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap(),
    };
    let outcome = Outcome {
      callsign:   Some("AFR1234".into()),
      transition: Transition::InPlace { from: LegStatus::Departing },
      record:     Some(record),
      anomaly:    None,
      closure:    None,
    };

    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["transition"], "in_place");
    assert_eq!(json["record"]["status"], "en route");
  }
}
