//! Error types for `refeitorio-core`.

use chrono::NaiveTime;
use thiserror::Error;
use uuid::Uuid;

use crate::meal::MealCategory;

#[derive(Debug, Error)]
pub enum Error {
  #[error("confidence threshold {0} is outside [0, 1]")]
  InvalidThreshold(f64),

  #[error("meal window for {category} is empty or inverted ({start}..{end})")]
  EmptyWindow {
    category: MealCategory,
    start:    NaiveTime,
    end:      NaiveTime,
  },

  #[error("meal windows for {first} and {second} overlap")]
  OverlappingWindows {
    first:  MealCategory,
    second: MealCategory,
  },

  #[error("worker not found: {0}")]
  WorkerNotFound(Uuid),

  #[error("registration not found: {0}")]
  RegistrationNotFound(Uuid),

  #[error("registration {0} is not flagged as a duplicate")]
  NotDuplicate(Uuid),

  #[error("registration {0} already has a justification")]
  AlreadyJustified(Uuid),

  #[error("justification reason must not be blank")]
  BlankReason,

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Box an arbitrary backend error.
  pub fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
