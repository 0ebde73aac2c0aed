//! Error type for `refeitorio-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] refeitorio_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A column held a value outside its enum's discriminants.
  #[error("unknown {column} value: {value:?}")]
  UnknownDiscriminant { column: &'static str, value: String },

  #[error("worker not found: {0}")]
  WorkerNotFound(uuid::Uuid),

  #[error("registration not found: {0}")]
  RegistrationNotFound(uuid::Uuid),

  /// The identity handle is already bound to another worker.
  #[error("identity handle {0} is already assigned to another worker")]
  HandleTaken(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
