//! Error type for `contrail-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] contrail_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// The upsert returned no row; the conflict clause never filters, so this
  /// means the row vanished between write and read-back.
  #[error("leg not stored: {0}")]
  LegNotStored(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
