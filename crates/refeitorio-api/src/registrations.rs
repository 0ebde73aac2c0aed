//! Handlers for `/registrations` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/registrations` | Raw image body; optional `?captured_at=<RFC 3339>` |
//! | `GET`  | `/registrations` | Optional `date`, `worker_id`, `meal_category`, `duplicates_only`, `limit`, `offset` |
//! | `GET`  | `/registrations/{id}` | 404 if not found |
//! | `POST` | `/registrations/{id}/justification` | Body: `{"reason":"...","responsible":"..."}` |

use axum::{
  Json,
  extract::{
    Path, Query, State,
    rejection::{BytesRejection, QueryRejection},
  },
  http::StatusCode,
  response::{IntoResponse, Response},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use refeitorio_core::{
  gateway::IdentificationGateway,
  ledger::{
    NewJustification, RegistrationEvent, RegistrationQuery, TimestampSource,
    justify_registration,
  },
  meal::MealCategory,
  outcome::{Capture, RegistrationFailure, RegistrationSuccess},
  store::MealStore,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AppState, error::ApiError};

// ─── Register ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RegisterParams {
  /// Capture instant from the device clock.
  pub captured_at: Option<DateTime<Utc>>,
}

/// Body of every `POST /registrations` response.
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RegisterResponse {
  Success {
    registration_id:  Uuid,
    worker_id:        Uuid,
    worker_name:      String,
    meal_category:    MealCategory,
    is_duplicate:     bool,
    timestamp_source: TimestampSource,
    captured_at:      DateTime<Utc>,
    message:          String,
  },
  Failure {
    code:      &'static str,
    message:   String,
    retryable: bool,
  },
}

impl From<&RegistrationSuccess> for RegisterResponse {
  fn from(s: &RegistrationSuccess) -> Self {
    Self::Success {
      registration_id:  s.registration_id,
      worker_id:        s.worker_id,
      worker_name:      s.worker_name.clone(),
      meal_category:    s.meal_category,
      is_duplicate:     s.is_duplicate,
      timestamp_source: s.timestamp_source,
      captured_at:      s.captured_at,
      message:          s.message(),
    }
  }
}

impl From<&RegistrationFailure> for RegisterResponse {
  fn from(f: &RegistrationFailure) -> Self {
    Self::Failure {
      code:      f.code(),
      message:   f.message(),
      retryable: f.retryable(),
    }
  }
}

/// HTTP status for a failed registration.
pub fn failure_status(f: &RegistrationFailure) -> StatusCode {
  match f {
    RegistrationFailure::EmptyImage
    | RegistrationFailure::InvalidTimestamp { .. } => StatusCode::BAD_REQUEST,
    RegistrationFailure::ImageTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
    RegistrationFailure::NoFaceDetected => StatusCode::UNPROCESSABLE_ENTITY,
    RegistrationFailure::NotRecognized { .. } => StatusCode::NOT_FOUND,
    RegistrationFailure::DataInconsistency { .. } => StatusCode::CONFLICT,
    RegistrationFailure::AccessDenied { .. }
    | RegistrationFailure::EntitlementDenied { .. } => StatusCode::FORBIDDEN,
    RegistrationFailure::GatewayUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
    RegistrationFailure::PersistenceFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
  }
}

fn refused(failure: &RegistrationFailure) -> Response {
  tracing::info!(code = failure.code(), "registration refused: {failure}");
  (failure_status(failure), Json(RegisterResponse::from(failure))).into_response()
}

/// `POST /registrations[?captured_at=<RFC 3339>]`: body is the probe image.
///
/// Malformed query strings and bodies over the transport limit are answered
/// with the same failure envelope as pipeline refusals.
pub async fn register<S, G>(
  State(state): State<AppState<S, G>>,
  params: Result<Query<RegisterParams>, QueryRejection>,
  body: Result<Bytes, BytesRejection>,
) -> Response
where
  S: MealStore + 'static,
  G: IdentificationGateway + 'static,
{
  let Query(params) = match params {
    Ok(params) => params,
    Err(rejection) => {
      return refused(&RegistrationFailure::InvalidTimestamp {
        reason: rejection.body_text(),
      });
    }
  };

  let body = match body {
    Ok(body) => body,
    Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
      return refused(&RegistrationFailure::ImageTooLarge {
        size:  None,
        limit: state.registrar.config().max_image_bytes,
      });
    }
    Err(rejection) => {
      tracing::debug!("failed to read registration body: {}", rejection.body_text());
      return refused(&RegistrationFailure::EmptyImage);
    }
  };

  let mut capture = Capture::new(body.to_vec());
  if let Some(at) = params.captured_at {
    capture = capture.at(at);
  }

  match state.registrar.register(capture).await {
    Ok(success) => {
      (StatusCode::CREATED, Json(RegisterResponse::from(&success))).into_response()
    }
    Err(failure) => {
      (failure_status(&failure), Json(RegisterResponse::from(&failure))).into_response()
    }
  }
}

// ─── List ────────────────────────────────────────────────────────────────────

/// `GET /registrations[?date=YYYY-MM-DD][&worker_id=..][&duplicates_only=true]`
pub async fn list<S, G>(
  State(state): State<AppState<S, G>>,
  Query(query): Query<RegistrationQuery>,
) -> Result<Json<Vec<RegistrationEvent>>, ApiError>
where
  S: MealStore + 'static,
  G: IdentificationGateway + 'static,
{
  let events = state
    .store
    .list_registrations(&query)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(events))
}

// ─── Get one ─────────────────────────────────────────────────────────────────

/// `GET /registrations/{id}`
pub async fn get_one<S, G>(
  State(state): State<AppState<S, G>>,
  Path(id): Path<Uuid>,
) -> Result<Json<RegistrationEvent>, ApiError>
where
  S: MealStore + 'static,
  G: IdentificationGateway + 'static,
{
  let event = state
    .store
    .get_registration(id)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?
    .ok_or_else(|| ApiError::NotFound(format!("registration {id} not found")))?;
  Ok(Json(event))
}

// ─── Justify ─────────────────────────────────────────────────────────────────

/// `POST /registrations/{id}/justification` returns 201 + the justification.
pub async fn justify<S, G>(
  State(state): State<AppState<S, G>>,
  Path(id): Path<Uuid>,
  Json(body): Json<NewJustification>,
) -> Result<impl IntoResponse, ApiError>
where
  S: MealStore + 'static,
  G: IdentificationGateway + 'static,
{
  let justification = justify_registration(state.store.as_ref(), id, body).await?;
  Ok((StatusCode::CREATED, Json(justification)))
}
