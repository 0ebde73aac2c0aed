//! Handlers for `/workers` endpoints.
//!
//! | Method  | Path | Notes |
//! |---------|------|-------|
//! | `POST`  | `/workers` | Body: [`NewWorker`]; returns 201 + the worker |
//! | `GET`   | `/workers/{id}` | 404 if not found |
//! | `PATCH` | `/workers/{id}` | Body: [`WorkerPatch`]; `{"active":false}` deactivates |
//! | `GET`   | `/workers/{id}/usage` | `?meal_category=..[&date=..]` |
//! | `PUT`   | `/workers/{id}/photo` | Raw image body; enrolls and schedules training |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use bytes::Bytes;
use chrono::NaiveDate;
use refeitorio_core::{
  enrollment::Enrollment,
  gateway::IdentificationGateway,
  meal::MealCategory,
  store::MealStore,
  worker::{NewWorker, Worker, WorkerPatch},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AppState, error::ApiError};

fn require_text(field: &str, value: &str) -> Result<(), ApiError> {
  if value.trim().is_empty() {
    Err(ApiError::BadRequest(format!("{field} must not be blank")))
  } else {
    Ok(())
  }
}

// ─── Create ──────────────────────────────────────────────────────────────────

/// `POST /workers`
pub async fn create<S, G>(
  State(state): State<AppState<S, G>>,
  Json(body): Json<NewWorker>,
) -> Result<impl IntoResponse, ApiError>
where
  S: MealStore + 'static,
  G: IdentificationGateway + 'static,
{
  require_text("name", &body.name)?;
  require_text("badge", &body.badge)?;

  let worker = state
    .store
    .add_worker(body)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  tracing::info!(worker_id = %worker.worker_id, name = %worker.name, "worker created");
  Ok((StatusCode::CREATED, Json(worker)))
}

// ─── Get one ─────────────────────────────────────────────────────────────────

/// `GET /workers/{id}`
pub async fn get_one<S, G>(
  State(state): State<AppState<S, G>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Worker>, ApiError>
where
  S: MealStore + 'static,
  G: IdentificationGateway + 'static,
{
  let worker = state
    .store
    .get_worker(id)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?
    .ok_or_else(|| ApiError::NotFound(format!("worker {id} not found")))?;
  Ok(Json(worker))
}

// ─── Update ──────────────────────────────────────────────────────────────────

/// `PATCH /workers/{id}`
pub async fn update<S, G>(
  State(state): State<AppState<S, G>>,
  Path(id): Path<Uuid>,
  Json(patch): Json<WorkerPatch>,
) -> Result<Json<Worker>, ApiError>
where
  S: MealStore + 'static,
  G: IdentificationGateway + 'static,
{
  if let Some(name) = &patch.name {
    require_text("name", name)?;
  }
  if let Some(badge) = &patch.badge {
    require_text("badge", badge)?;
  }
  let deactivating = patch.active == Some(false);

  let worker = state
    .store
    .update_worker(id, patch)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?
    .ok_or_else(|| ApiError::NotFound(format!("worker {id} not found")))?;

  if deactivating {
    tracing::info!(worker_id = %id, name = %worker.name, "worker deactivated");
  }
  Ok(Json(worker))
}

// ─── Usage ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct UsageParams {
  pub meal_category: MealCategory,
  /// Local calendar day; defaults to today in the canonical zone.
  pub date:          Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct Usage {
  pub worker_id:     Uuid,
  pub date:          NaiveDate,
  pub meal_category: MealCategory,
  pub used:          bool,
}

/// `GET /workers/{id}/usage?meal_category=lunch[&date=YYYY-MM-DD]`
pub async fn usage<S, G>(
  State(state): State<AppState<S, G>>,
  Path(id): Path<Uuid>,
  Query(params): Query<UsageParams>,
) -> Result<Json<Usage>, ApiError>
where
  S: MealStore + 'static,
  G: IdentificationGateway + 'static,
{
  let date = params
    .date
    .unwrap_or_else(|| state.registrar.classifier().today());
  let used = state
    .store
    .has_registration_on(id, params.meal_category, date)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(Usage { worker_id: id, date, meal_category: params.meal_category, used }))
}

// ─── Enroll ──────────────────────────────────────────────────────────────────

/// `PUT /workers/{id}/photo`: body is the enrollment photo.
pub async fn enroll<S, G>(
  State(state): State<AppState<S, G>>,
  Path(id): Path<Uuid>,
  body: Bytes,
) -> Result<Json<Enrollment>, ApiError>
where
  S: MealStore + 'static,
  G: IdentificationGateway + 'static,
{
  let enrollment = state.enroller.enroll(id, &body).await?;
  Ok(Json(enrollment))
}
