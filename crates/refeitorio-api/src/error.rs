//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Registration outcomes are not errors and never pass through here; see
//! [`crate::registrations`].

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use refeitorio_core::{enrollment::EnrollmentError, gateway::GatewayError};
use serde_json::json;
use thiserror::Error;

/// An error returned by a non-registration API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("conflict: {0}")]
  Conflict(String),

  /// The identification service refused the input (e.g. no face in photo).
  #[error("unprocessable: {0}")]
  Unprocessable(String),

  #[error("identification service unavailable: {0}")]
  Unavailable(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::Unprocessable(m) => (StatusCode::UNPROCESSABLE_ENTITY, m.clone()),
      ApiError::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m.clone()),
      ApiError::Store(e) => {
        tracing::error!("store error: {e}");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}

impl From<refeitorio_core::Error> for ApiError {
  fn from(e: refeitorio_core::Error) -> Self {
    use refeitorio_core::Error as E;
    match e {
      E::WorkerNotFound(_) | E::RegistrationNotFound(_) => ApiError::NotFound(e.to_string()),
      E::NotDuplicate(_) | E::AlreadyJustified(_) => ApiError::Conflict(e.to_string()),
      E::BlankReason
      | E::InvalidThreshold(_)
      | E::EmptyWindow { .. }
      | E::OverlappingWindows { .. } => ApiError::BadRequest(e.to_string()),
      E::Store(inner) => ApiError::Store(inner),
    }
  }
}

impl From<EnrollmentError> for ApiError {
  fn from(e: EnrollmentError) -> Self {
    match e {
      EnrollmentError::EmptyImage => ApiError::BadRequest(e.to_string()),
      EnrollmentError::WorkerNotFound(_) => ApiError::NotFound(e.to_string()),
      EnrollmentError::Gateway(GatewayError::Rejected { status, message })
        if (400..500).contains(&status) =>
      {
        ApiError::Unprocessable(message)
      }
      EnrollmentError::Gateway(g) => ApiError::Unavailable(g.to_string()),
      EnrollmentError::Store(inner) => ApiError::Store(inner),
    }
  }
}
