//! Operator reports: pending duplicate alerts and the daily summary.

use axum::{
  Json,
  extract::{Query, State},
};
use chrono::NaiveDate;
use refeitorio_core::{
  gateway::IdentificationGateway,
  ledger::{DailySummary, RegistrationEvent},
  store::MealStore,
};
use serde::Deserialize;

use crate::{AppState, error::ApiError};

/// `GET /alerts`: duplicate registrations still lacking a justification.
pub async fn alerts<S, G>(
  State(state): State<AppState<S, G>>,
) -> Result<Json<Vec<RegistrationEvent>>, ApiError>
where
  S: MealStore + 'static,
  G: IdentificationGateway + 'static,
{
  let pending = state
    .store
    .pending_alerts()
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(pending))
}

#[derive(Debug, Deserialize)]
pub struct SummaryParams {
  /// Local calendar day; defaults to today in the canonical zone.
  pub date: Option<NaiveDate>,
}

/// `GET /summary[?date=YYYY-MM-DD]`
pub async fn summary<S, G>(
  State(state): State<AppState<S, G>>,
  Query(params): Query<SummaryParams>,
) -> Result<Json<DailySummary>, ApiError>
where
  S: MealStore + 'static,
  G: IdentificationGateway + 'static,
{
  let date = params
    .date
    .unwrap_or_else(|| state.registrar.classifier().today());
  let summary = state
    .store
    .daily_summary(date)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(summary))
}
