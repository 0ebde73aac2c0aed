//! Handlers for `/gallery/training`.
//!
//! Training always runs in the background; `POST` only requests a cycle.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use refeitorio_core::{
  gateway::IdentificationGateway, store::MealStore, training::TrainingSnapshot,
};
use serde_json::json;

use crate::AppState;

/// `POST /gallery/training`: 202 with `{"training":"started"|"queued"}`.
pub async fn trigger<S, G>(State(state): State<AppState<S, G>>) -> impl IntoResponse
where
  S: MealStore + 'static,
  G: IdentificationGateway + 'static,
{
  let (outcome, _) = state.trainer.trigger();
  (StatusCode::ACCEPTED, Json(json!({ "training": outcome })))
}

/// `GET /gallery/training`
pub async fn status<S, G>(State(state): State<AppState<S, G>>) -> Json<TrainingSnapshot>
where
  S: MealStore + 'static,
  G: IdentificationGateway + 'static,
{
  Json(state.trainer.status())
}
