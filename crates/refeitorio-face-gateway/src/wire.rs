//! JSON shapes exchanged with the face service.

use refeitorio_core::gateway::{Candidate, TrainingStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedFace {
  pub face_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyRequest<'a> {
  pub face_ids:                       [&'a str; 1],
  pub person_group_id:                &'a str,
  pub max_num_of_candidates_returned: u8,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyResult {
  #[serde(default)]
  pub candidates: Vec<IdentifyCandidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyCandidate {
  pub person_id:  String,
  pub confidence: f64,
}

impl From<IdentifyCandidate> for Candidate {
  fn from(c: IdentifyCandidate) -> Self { Candidate::new(c.person_id, c.confidence) }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroup<'a> {
  pub name:              &'a str,
  pub recognition_model: &'a str,
}

#[derive(Debug, Serialize)]
pub struct CreatePerson<'a> {
  pub name: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedPerson {
  pub person_id: String,
}

#[derive(Debug, Deserialize)]
pub struct TrainingState {
  pub status: String,
}

impl TrainingState {
  /// Unknown status strings are treated as still running.
  pub fn into_status(self) -> TrainingStatus {
    match self.status.to_ascii_lowercase().as_str() {
      "notstarted" => TrainingStatus::NotStarted,
      "succeeded" => TrainingStatus::Succeeded,
      "failed" => TrainingStatus::Failed,
      _ => TrainingStatus::Running,
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct ErrorEnvelope {
  pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
  #[serde(default)]
  pub code:    Option<String>,
  #[serde(default)]
  pub message: Option<String>,
}

/// Best-effort human message from an error response body.
pub fn error_message(body: &str) -> String {
  match serde_json::from_str::<ErrorEnvelope>(body) {
    Ok(ErrorEnvelope { error: ErrorBody { code, message } }) => match (code, message) {
      (Some(code), Some(message)) => format!("{code}: {message}"),
      (None, Some(message)) => message,
      (Some(code), None) => code,
      (None, None) => body.to_owned(),
    },
    Err(_) => body.to_owned(),
  }
}
