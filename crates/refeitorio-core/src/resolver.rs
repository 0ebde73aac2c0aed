//! Identity resolution: gateway candidates → local worker.
//!
//! Resolution is split into two pure steps around the store lookup so the
//! decision rules can be tested without a backend:
//!
//! 1. [`select_candidate`] applies the confidence threshold.
//! 2. [`admit`] validates the local worker found for the chosen handle.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{
  Error, Result,
  gateway::Candidate,
  worker::{ExternalIdentityHandle, Worker},
};

// ─── Threshold ───────────────────────────────────────────────────────────────

/// Minimum candidate confidence accepted as a recognition. Always in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct ConfidenceThreshold(f64);

impl ConfidenceThreshold {
  pub const DEFAULT: Self = Self(0.7);

  pub fn new(value: f64) -> Result<Self> {
    if (0.0..=1.0).contains(&value) {
      Ok(Self(value))
    } else {
      Err(Error::InvalidThreshold(value))
    }
  }

  pub fn value(self) -> f64 { self.0 }

  pub fn accepts(self, confidence: f64) -> bool { confidence >= self.0 }
}

impl Default for ConfidenceThreshold {
  fn default() -> Self { Self::DEFAULT }
}

impl TryFrom<f64> for ConfidenceThreshold {
  type Error = Error;

  fn try_from(value: f64) -> Result<Self> { Self::new(value) }
}

impl From<ConfidenceThreshold> for f64 {
  fn from(t: ConfidenceThreshold) -> Self { t.0 }
}

// ─── Failures ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolutionFailure {
  /// No candidate reached the threshold.
  #[error("no candidate reached the confidence threshold (best: {best_confidence:?})")]
  NotRecognized { best_confidence: Option<f64> },

  /// The gallery knows an identity the local store does not.
  #[error("gallery identity {identity} has no local worker")]
  DataInconsistency { identity: ExternalIdentityHandle },

  #[error("worker {worker_id} is inactive")]
  Inactive { worker_id: Uuid, worker_name: String },
}

// ─── Steps ───────────────────────────────────────────────────────────────────

/// Pick the highest-confidence candidate, provided it meets `threshold`.
pub fn select_candidate(
  candidates: &[Candidate],
  threshold: ConfidenceThreshold,
) -> Result<&Candidate, ResolutionFailure> {
  let best = candidates
    .iter()
    .filter(|c| !c.confidence.is_nan())
    .max_by(|a, b| a.confidence.total_cmp(&b.confidence));

  match best {
    Some(c) if threshold.accepts(c.confidence) => Ok(c),
    Some(c) => Err(ResolutionFailure::NotRecognized { best_confidence: Some(c.confidence) }),
    None => Err(ResolutionFailure::NotRecognized { best_confidence: None }),
  }
}

/// Validate the local worker found for `identity`.
///
/// A missing worker is a store/gallery drift and is logged at error level; it
/// is never reported as a plain recognition miss.
pub fn admit(
  identity: &ExternalIdentityHandle,
  local: Option<Worker>,
) -> Result<Worker, ResolutionFailure> {
  let Some(worker) = local else {
    tracing::error!(
      %identity,
      "gallery returned an identity with no local worker; re-enrollment reconciliation required"
    );
    return Err(ResolutionFailure::DataInconsistency { identity: identity.clone() });
  };

  if !worker.active {
    return Err(ResolutionFailure::Inactive {
      worker_id:   worker.worker_id,
      worker_name: worker.name,
    });
  }

  Ok(worker)
}
