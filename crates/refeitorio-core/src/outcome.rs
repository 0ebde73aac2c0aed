//! Registration outcomes as data.
//!
//! Every way a capture can end is a variant here with a stable machine code
//! and a distinct end-user message. Nothing escapes the orchestrator as an
//! unstructured error.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::{
  ledger::{RegistrationEvent, TimestampSource},
  meal::MealCategory,
  resolver::ResolutionFailure,
  worker::ExternalIdentityHandle,
};

// ─── Stages ──────────────────────────────────────────────────────────────────

/// States of the registration pipeline, in order. A capture advances one
/// stage per step and leaves through a [`RegistrationFailure`] at any arrow.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
  Received,
  Detected,
  Identified,
  Resolved,
  Classified,
  Entitled,
  Recorded,
}

/// Who can fix a failure, and how.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureClass {
  /// Bad or missing photo; re-submit.
  Input,
  /// Face not matched; re-submit with better lighting or angle.
  Recognition,
  /// Gallery and local store disagree; an operator must reconcile.
  Consistency,
  /// Expected business refusal.
  Policy,
  /// Gateway or store trouble; retry later.
  Infrastructure,
}

// ─── Input ───────────────────────────────────────────────────────────────────

/// One inbound "register by photo" request.
#[derive(Debug, Clone)]
pub struct Capture {
  pub image:       Vec<u8>,
  /// Device clock reading, if the capture client sent one.
  pub captured_at: Option<DateTime<Utc>>,
}

impl Capture {
  pub fn new(image: impl Into<Vec<u8>>) -> Self {
    Self { image: image.into(), captured_at: None }
  }

  pub fn at(mut self, captured_at: DateTime<Utc>) -> Self {
    self.captured_at = Some(captured_at);
    self
  }
}

// ─── Success ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistrationSuccess {
  pub registration_id:  Uuid,
  pub worker_id:        Uuid,
  pub worker_name:      String,
  pub meal_category:    MealCategory,
  pub is_duplicate:     bool,
  pub timestamp_source: TimestampSource,
  pub captured_at:      DateTime<Utc>,
}

impl RegistrationSuccess {
  pub fn message(&self) -> String {
    if self.is_duplicate {
      format!(
        "{} registered for {} (already used today; flagged for review).",
        self.meal_category.label(),
        self.worker_name
      )
    } else {
      format!("{} registered for {}.", self.meal_category.label(), self.worker_name)
    }
  }
}

impl From<RegistrationEvent> for RegistrationSuccess {
  fn from(e: RegistrationEvent) -> Self {
    Self {
      registration_id:  e.registration_id,
      worker_id:        e.worker_id,
      worker_name:      e.worker_name,
      meal_category:    e.meal_category,
      is_duplicate:     e.is_duplicate_of_day,
      timestamp_source: e.timestamp_source,
      captured_at:      e.captured_at,
    }
  }
}

// ─── Failure ─────────────────────────────────────────────────────────────────

/// Terminal failure of a registration. The `Display` impl is the operator-
/// facing description used in logs; [`message`](Self::message) is what the
/// person at the camera sees.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistrationFailure {
  #[error("empty image payload")]
  EmptyImage,

  /// `size` is unknown when the upload was cut off at the transport limit.
  #[error("image exceeds the {limit} byte limit")]
  ImageTooLarge { size: Option<usize>, limit: usize },

  #[error("capture timestamp rejected: {reason}")]
  InvalidTimestamp { reason: String },

  #[error("no face detected in probe image")]
  NoFaceDetected,

  #[error("face not recognized (best confidence: {best_confidence:?})")]
  NotRecognized { best_confidence: Option<f64> },

  #[error("gallery identity {identity} has no local worker")]
  DataInconsistency { identity: ExternalIdentityHandle },

  #[error("worker {worker_id} ({worker_name}) is inactive")]
  AccessDenied { worker_id: Uuid, worker_name: String },

  #[error("worker {worker_id} ({worker_name}) is not entitled to {meal_category}")]
  EntitlementDenied {
    worker_id:     Uuid,
    worker_name:   String,
    meal_category: MealCategory,
  },

  #[error("identification gateway unavailable during {stage}: {reason}")]
  GatewayUnavailable { stage: Stage, reason: String },

  #[error("store failure during {stage}: {reason}")]
  PersistenceFailure { stage: Stage, reason: String },
}

impl RegistrationFailure {
  /// Stable machine-readable code.
  pub fn code(&self) -> &'static str {
    match self {
      Self::EmptyImage => "empty_image",
      Self::ImageTooLarge { .. } => "image_too_large",
      Self::InvalidTimestamp { .. } => "invalid_timestamp",
      Self::NoFaceDetected => "no_face_detected",
      Self::NotRecognized { .. } => "not_recognized",
      Self::DataInconsistency { .. } => "data_inconsistency",
      Self::AccessDenied { .. } => "access_denied",
      Self::EntitlementDenied { .. } => "entitlement_denied",
      Self::GatewayUnavailable { .. } => "gateway_unavailable",
      Self::PersistenceFailure { .. } => "persistence_failure",
    }
  }

  pub fn class(&self) -> FailureClass {
    match self {
      Self::EmptyImage
      | Self::ImageTooLarge { .. }
      | Self::InvalidTimestamp { .. }
      | Self::NoFaceDetected => FailureClass::Input,
      Self::NotRecognized { .. } => FailureClass::Recognition,
      Self::DataInconsistency { .. } => FailureClass::Consistency,
      Self::AccessDenied { .. } | Self::EntitlementDenied { .. } => FailureClass::Policy,
      Self::GatewayUnavailable { .. } | Self::PersistenceFailure { .. } => {
        FailureClass::Infrastructure
      }
    }
  }

  /// Whether the capture client may simply submit again.
  pub fn retryable(&self) -> bool {
    matches!(
      self.class(),
      FailureClass::Input | FailureClass::Recognition | FailureClass::Infrastructure
    )
  }

  /// End-user message. Distinct for every variant.
  pub fn message(&self) -> String {
    match self {
      Self::EmptyImage => "No photo was received. Please take the photo again.".to_owned(),
      Self::ImageTooLarge { .. } => {
        "The photo is too large. Please take the photo again.".to_owned()
      }
      Self::InvalidTimestamp { .. } => {
        "The device clock sent an unreadable capture time. Please try again.".to_owned()
      }
      Self::NoFaceDetected => {
        "No face was detected. Look at the camera and try again.".to_owned()
      }
      Self::NotRecognized { .. } => {
        "Face not recognized. Adjust the lighting or angle and try again.".to_owned()
      }
      Self::DataInconsistency { .. } => {
        "Your enrollment needs attention and the meal was not recorded. Please contact an administrator.".to_owned()
      }
      Self::AccessDenied { worker_name, .. } => {
        format!("Access denied: {worker_name} is not active. Please contact HR.")
      }
      Self::EntitlementDenied { worker_name, meal_category, .. } => format!(
        "{worker_name} is not entitled to {} at this time. Please contact HR.",
        meal_category.label().to_lowercase()
      ),
      Self::GatewayUnavailable { .. } => {
        "The identification service is unavailable. Please try again shortly.".to_owned()
      }
      Self::PersistenceFailure { .. } => {
        "The meal could not be recorded. Please try again shortly.".to_owned()
      }
    }
  }
}

impl From<ResolutionFailure> for RegistrationFailure {
  fn from(f: ResolutionFailure) -> Self {
    match f {
      ResolutionFailure::NotRecognized { best_confidence } => {
        Self::NotRecognized { best_confidence }
      }
      ResolutionFailure::DataInconsistency { identity } => {
        Self::DataInconsistency { identity }
      }
      ResolutionFailure::Inactive { worker_id, worker_name } => {
        Self::AccessDenied { worker_id, worker_name }
      }
    }
  }
}

pub type RegistrationOutcome = Result<RegistrationSuccess, RegistrationFailure>;

#[cfg(test)]
mod tests {
  use super::*;

  fn all_failures() -> Vec<RegistrationFailure> {
    let worker_id = Uuid::new_v4();
    vec![
      RegistrationFailure::EmptyImage,
      RegistrationFailure::ImageTooLarge { size: Some(10), limit: 5 },
      RegistrationFailure::InvalidTimestamp { reason: "bad".into() },
      RegistrationFailure::NoFaceDetected,
      RegistrationFailure::NotRecognized { best_confidence: Some(0.4) },
      RegistrationFailure::DataInconsistency { identity: "x".into() },
      RegistrationFailure::AccessDenied { worker_id, worker_name: "C".into() },
      RegistrationFailure::EntitlementDenied {
        worker_id,
        worker_name: "C".into(),
        meal_category: MealCategory::Breakfast,
      },
      RegistrationFailure::GatewayUnavailable {
        stage:  Stage::Detected,
        reason: "timeout".into(),
      },
      RegistrationFailure::PersistenceFailure {
        stage:  Stage::Recorded,
        reason: "disk".into(),
      },
    ]
  }

  #[test]
  fn codes_and_messages_are_distinct() {
    let failures = all_failures();
    let codes: std::collections::HashSet<_> = failures.iter().map(|f| f.code()).collect();
    let messages: std::collections::HashSet<_> =
      failures.iter().map(|f| f.message()).collect();
    assert_eq!(codes.len(), failures.len());
    assert_eq!(messages.len(), failures.len());
  }

  #[test]
  fn not_recognized_and_entitlement_denied_differ_in_class() {
    let failures = all_failures();
    let not_recognized = failures.iter().find(|f| f.code() == "not_recognized").unwrap();
    let denied = failures.iter().find(|f| f.code() == "entitlement_denied").unwrap();
    assert_eq!(not_recognized.class(), FailureClass::Recognition);
    assert_eq!(denied.class(), FailureClass::Policy);
    assert!(not_recognized.retryable());
    assert!(!denied.retryable());
  }

  #[test]
  fn stages_are_ordered() {
    assert!(Stage::Received < Stage::Detected);
    assert!(Stage::Entitled < Stage::Recorded);
    assert_eq!(Stage::Classified.to_string(), "classified");
  }
}
