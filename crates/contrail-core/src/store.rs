//! The `LegStore` trait and its read types.
//!
//! The trait is implemented by storage backends (e.g.
//! `contrail-store-sqlite`). The reconciler and the binary depend on this
//! abstraction, not on any concrete backend.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::{
  leg::DynamicRecord,
  live::LiveSnapshot,
  static_data::StaticRecord,
  status::{AutoClose, AutoClosure},
};

// ─── Read types ──────────────────────────────────────────────────────────────

/// A leg as read, after any auto-closure the read triggered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegRead {
  pub record:  DynamicRecord,
  /// Set when this read force-closed the leg.
  pub closure: Option<AutoClosure>,
}

/// Every stored leg plus the closures the listing triggered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegListing {
  pub records:  Vec<DynamicRecord>,
  pub closures: Vec<AutoClosure>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a leg store backend.
///
/// Dynamic records are written only through [`LegStore::upsert_leg`], whose
/// conflict resolution coalesces actual times so that racing writers of the
/// same leg converge. Live snapshots are append-only.
///
/// Reads that take an [`AutoClose`] force-close silent open legs in the same
/// transaction as the read, so a closure is recorded at most once.
pub trait LegStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Static metadata ───────────────────────────────────────────────────

  /// Static metadata for a callsign. Returns `None` if never recorded.
  fn get_static<'a>(
    &'a self,
    callsign: &'a str,
  ) -> impl Future<Output = Result<Option<StaticRecord>, Self::Error>> + Send + 'a;

  /// Insert or refine the static record for `record.callsign`; concrete
  /// stored values are never replaced by absent ones. Returns the stored
  /// record.
  fn upsert_static(
    &self,
    record: StaticRecord,
  ) -> impl Future<Output = Result<StaticRecord, Self::Error>> + Send + '_;

  // ── Dynamic records ───────────────────────────────────────────────────

  /// The latest leg (by flight date, then scheduled departure) flown under
  /// `callsign` by `tail_id`.
  fn latest_leg<'a>(
    &'a self,
    callsign: &'a str,
    tail_id: &'a str,
    close: AutoClose,
  ) -> impl Future<Output = Result<Option<LegRead>, Self::Error>> + Send + 'a;

  /// Look a leg up by its unique key, without side effects.
  fn get_leg<'a>(
    &'a self,
    unique_key: &'a str,
  ) -> impl Future<Output = Result<Option<DynamicRecord>, Self::Error>> + Send + 'a;

  /// Every stored leg, optionally auto-closing silent ones first.
  fn list_legs(
    &self,
    close: Option<AutoClose>,
  ) -> impl Future<Output = Result<LegListing, Self::Error>> + Send + '_;

  /// Insert, or update on unique-key conflict, and return the stored row.
  fn upsert_leg(
    &self,
    record: DynamicRecord,
  ) -> impl Future<Output = Result<DynamicRecord, Self::Error>> + Send + '_;

  /// Force-close every silent open leg.
  fn close_stale(
    &self,
    close: AutoClose,
  ) -> impl Future<Output = Result<Vec<AutoClosure>, Self::Error>> + Send + '_;

  /// Every auto-closure recorded so far, oldest first.
  fn closures(&self) -> impl Future<Output = Result<Vec<AutoClosure>, Self::Error>> + Send + '_;

  // ── Live snapshots ────────────────────────────────────────────────────

  fn append_snapshot(
    &self,
    snapshot: LiveSnapshot,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Snapshots stamped with `unique_key`, oldest first.
  fn snapshots_for<'a>(
    &'a self,
    unique_key: &'a str,
  ) -> impl Future<Output = Result<Vec<LiveSnapshot>, Self::Error>> + Send + 'a;
}
