//! Registration events, duplicate justifications and ledger read models.
//!
//! Registration events are immutable. Worker, department and function names
//! are copied into each event so it stays historically accurate after the
//! worker is renamed or moved.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use uuid::Uuid;

use crate::{
  Error, Result,
  meal::{Classification, MealCategory},
  store::MealStore,
  worker::Worker,
};

// ─── Timestamp provenance ────────────────────────────────────────────────────

/// Where the capture instant of a registration came from.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::EnumString,
  strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TimestampSource {
  /// Supplied by the capture device.
  Device,
  /// The device sent no timestamp; server time was substituted.
  Server,
}

// ─── Registration ────────────────────────────────────────────────────────────

/// Input to [`MealStore::append_registration`]. The store decides
/// `is_duplicate_of_day` and assigns `recorded_at`.
#[derive(Debug, Clone)]
pub struct NewRegistration {
  pub worker_id:        Uuid,
  pub captured_at:      DateTime<Utc>,
  pub timestamp_source: TimestampSource,
  pub local_date:       NaiveDate,
  pub meal_category:    MealCategory,
  pub worker_name:      String,
  pub badge:            String,
  pub department_name:  Option<String>,
  pub function_name:    Option<String>,
  pub value_cents:      i64,
  pub capture_sha256:   Option<String>,
}

impl NewRegistration {
  /// Snapshot `worker` for a classified capture.
  pub fn snapshot(
    worker: &Worker,
    classification: &Classification,
    captured_at: DateTime<Utc>,
    timestamp_source: TimestampSource,
  ) -> Self {
    Self {
      worker_id: worker.worker_id,
      captured_at,
      timestamp_source,
      local_date: classification.local_date,
      meal_category: classification.category,
      worker_name: worker.name.clone(),
      badge: worker.badge.clone(),
      department_name: worker.department.clone(),
      function_name: worker.job_function.clone(),
      value_cents: 0,
      capture_sha256: None,
    }
  }

  pub fn with_value(mut self, value_cents: i64) -> Self {
    self.value_cents = value_cents;
    self
  }

  /// Record the SHA-256 of the probe image for later audit.
  pub fn with_capture(mut self, image: &[u8]) -> Self {
    self.capture_sha256 = Some(hex::encode(Sha256::digest(image)));
    self
  }
}

/// A recorded benefit usage. Never updated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationEvent {
  pub registration_id:     Uuid,
  pub worker_id:           Uuid,
  pub captured_at:         DateTime<Utc>,
  pub timestamp_source:    TimestampSource,
  pub local_date:          NaiveDate,
  pub meal_category:       MealCategory,
  /// A same-day, same-category event for this worker already existed.
  pub is_duplicate_of_day: bool,
  pub worker_name:         String,
  pub badge:               String,
  pub department_name:     Option<String>,
  pub function_name:       Option<String>,
  pub value_cents:         i64,
  pub capture_sha256:      Option<String>,
  pub recorded_at:         DateTime<Utc>,
}

/// Parameters for [`MealStore::list_registrations`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistrationQuery {
  pub date:            Option<NaiveDate>,
  pub worker_id:       Option<Uuid>,
  pub meal_category:   Option<MealCategory>,
  #[serde(default)]
  pub duplicates_only: bool,
  pub limit:           Option<usize>,
  pub offset:          Option<usize>,
}

// ─── Justification ───────────────────────────────────────────────────────────

/// Operator explanation attached to a duplicate-flagged registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Justification {
  pub justification_id: Uuid,
  pub registration_id:  Uuid,
  pub reason:           String,
  pub responsible:      Option<String>,
  pub recorded_at:      DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewJustification {
  pub reason:      String,
  #[serde(default)]
  pub responsible: Option<String>,
}

/// Attach a justification to a duplicate registration.
///
/// Only duplicate-flagged registrations can be justified, and only once.
pub async fn justify_registration<S>(
  store: &S,
  registration_id: Uuid,
  input: NewJustification,
) -> Result<Justification>
where
  S: MealStore,
{
  if input.reason.trim().is_empty() {
    return Err(Error::BlankReason);
  }

  let event = store
    .get_registration(registration_id)
    .await
    .map_err(Error::store)?
    .ok_or(Error::RegistrationNotFound(registration_id))?;

  if !event.is_duplicate_of_day {
    return Err(Error::NotDuplicate(registration_id));
  }

  if store
    .get_justification(registration_id)
    .await
    .map_err(Error::store)?
    .is_some()
  {
    return Err(Error::AlreadyJustified(registration_id));
  }

  // A concurrent justification may land between the check above and here.
  let justification = store
    .record_justification(registration_id, input)
    .await
    .map_err(Error::store)?
    .ok_or(Error::AlreadyJustified(registration_id))?;

  tracing::info!(
    %registration_id,
    worker = %event.worker_name,
    "duplicate registration justified"
  );
  Ok(justification)
}

// ─── Summary ─────────────────────────────────────────────────────────────────

/// Per-day counters for the operator dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
  pub date:           NaiveDate,
  pub active_workers: u64,
  pub registrations:  u64,
  pub duplicates:     u64,
  /// Duplicate registrations on any day still lacking a justification.
  pub pending_alerts: u64,
  pub by_category:    BTreeMap<MealCategory, u64>,
}
