//! Error types for `contrail-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("observation has no callsign")]
  MissingCallsign,

  #[error("observation for {0} has no tail id")]
  MissingTailId(String),

  #[error("observation for {0} has no flight date")]
  MissingFlightDate(String),

  #[error("observation for {0} has no scheduled departure time")]
  MissingScheduledDeparture(String),

  /// A component contains the key separator or is blank after trimming.
  #[error("invalid identity component {0:?}")]
  InvalidIdentityComponent(String),

  /// An `unknown` status reached a step that only accepts lifecycle states.
  #[error("status of {0} is unknown")]
  UnknownStatus(String),

  #[error("unknown status label: {0:?}")]
  UnknownStatusLabel(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
