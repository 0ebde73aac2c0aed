//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Instants are stored as fixed-width RFC 3339 UTC strings so that they sort
//! lexicographically. Local dates are `YYYY-MM-DD`. Entitlements are compact
//! JSON. UUIDs are hyphenated lowercase strings.

use std::str::FromStr as _;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use refeitorio_core::{
  ledger::{Justification, RegistrationEvent, TimestampSource},
  meal::MealCategory,
  worker::{Entitlements, ExternalIdentityHandle, Worker},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── Time ────────────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Enums ───────────────────────────────────────────────────────────────────

pub fn encode_category(c: MealCategory) -> &'static str { c.into() }

pub fn decode_category(s: &str) -> Result<MealCategory> {
  MealCategory::from_str(s).map_err(|_| Error::UnknownDiscriminant {
    column: "meal_category",
    value:  s.to_owned(),
  })
}

pub fn encode_timestamp_source(t: TimestampSource) -> &'static str { t.into() }

pub fn decode_timestamp_source(s: &str) -> Result<TimestampSource> {
  TimestampSource::from_str(s).map_err(|_| Error::UnknownDiscriminant {
    column: "timestamp_source",
    value:  s.to_owned(),
  })
}

// ─── Entitlements ────────────────────────────────────────────────────────────

pub fn encode_entitlements(e: &Entitlements) -> Result<String> {
  Ok(serde_json::to_string(e)?)
}

pub fn decode_entitlements(s: &str) -> Result<Entitlements> {
  Ok(serde_json::from_str(s)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub const WORKER_COLUMNS: &str = "worker_id, name, badge, department, job_function, \
   active, entitlements, identity_handle, created_at, updated_at";

/// Raw values read directly from a `workers` row.
pub struct RawWorker {
  pub worker_id:       String,
  pub name:            String,
  pub badge:           String,
  pub department:      Option<String>,
  pub job_function:    Option<String>,
  pub active:          bool,
  pub entitlements:    String,
  pub identity_handle: Option<String>,
  pub created_at:      String,
  pub updated_at:      String,
}

impl RawWorker {
  /// Map a row selected with [`WORKER_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      worker_id:       row.get(0)?,
      name:            row.get(1)?,
      badge:           row.get(2)?,
      department:      row.get(3)?,
      job_function:    row.get(4)?,
      active:          row.get(5)?,
      entitlements:    row.get(6)?,
      identity_handle: row.get(7)?,
      created_at:      row.get(8)?,
      updated_at:      row.get(9)?,
    })
  }

  pub fn encode(w: &Worker) -> Result<Self> {
    Ok(Self {
      worker_id:       encode_uuid(w.worker_id),
      name:            w.name.clone(),
      badge:           w.badge.clone(),
      department:      w.department.clone(),
      job_function:    w.job_function.clone(),
      active:          w.active,
      entitlements:    encode_entitlements(&w.entitlements)?,
      identity_handle: w.identity_handle.as_ref().map(|h| h.0.clone()),
      created_at:      encode_dt(w.created_at),
      updated_at:      encode_dt(w.updated_at),
    })
  }

  pub fn into_worker(self) -> Result<Worker> {
    Ok(Worker {
      worker_id:       decode_uuid(&self.worker_id)?,
      name:            self.name,
      badge:           self.badge,
      department:      self.department,
      job_function:    self.job_function,
      active:          self.active,
      entitlements:    decode_entitlements(&self.entitlements)?,
      identity_handle: self.identity_handle.map(ExternalIdentityHandle),
      created_at:      decode_dt(&self.created_at)?,
      updated_at:      decode_dt(&self.updated_at)?,
    })
  }
}

/// Registration columns, qualified for queries that alias the table as `r`.
pub const REGISTRATION_COLUMNS: &str = "r.registration_id, r.worker_id, r.captured_at, \
   r.timestamp_source, r.local_date, r.meal_category, r.is_duplicate, r.worker_name, \
   r.badge, r.department_name, r.function_name, r.value_cents, r.capture_sha256, \
   r.recorded_at";

/// Raw values read directly from a `registrations` row.
pub struct RawRegistration {
  pub registration_id:  String,
  pub worker_id:        String,
  pub captured_at:      String,
  pub timestamp_source: String,
  pub local_date:       String,
  pub meal_category:    String,
  pub is_duplicate:     bool,
  pub worker_name:      String,
  pub badge:            String,
  pub department_name:  Option<String>,
  pub function_name:    Option<String>,
  pub value_cents:      i64,
  pub capture_sha256:   Option<String>,
  pub recorded_at:      String,
}

impl RawRegistration {
  /// Map a row selected with [`REGISTRATION_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      registration_id:  row.get(0)?,
      worker_id:        row.get(1)?,
      captured_at:      row.get(2)?,
      timestamp_source: row.get(3)?,
      local_date:       row.get(4)?,
      meal_category:    row.get(5)?,
      is_duplicate:     row.get(6)?,
      worker_name:      row.get(7)?,
      badge:            row.get(8)?,
      department_name:  row.get(9)?,
      function_name:    row.get(10)?,
      value_cents:      row.get(11)?,
      capture_sha256:   row.get(12)?,
      recorded_at:      row.get(13)?,
    })
  }

  pub fn encode(e: &RegistrationEvent) -> Self {
    Self {
      registration_id:  encode_uuid(e.registration_id),
      worker_id:        encode_uuid(e.worker_id),
      captured_at:      encode_dt(e.captured_at),
      timestamp_source: encode_timestamp_source(e.timestamp_source).to_owned(),
      local_date:       encode_date(e.local_date),
      meal_category:    encode_category(e.meal_category).to_owned(),
      is_duplicate:     e.is_duplicate_of_day,
      worker_name:      e.worker_name.clone(),
      badge:            e.badge.clone(),
      department_name:  e.department_name.clone(),
      function_name:    e.function_name.clone(),
      value_cents:      e.value_cents,
      capture_sha256:   e.capture_sha256.clone(),
      recorded_at:      encode_dt(e.recorded_at),
    }
  }

  pub fn into_event(self) -> Result<RegistrationEvent> {
    Ok(RegistrationEvent {
      registration_id:     decode_uuid(&self.registration_id)?,
      worker_id:           decode_uuid(&self.worker_id)?,
      captured_at:         decode_dt(&self.captured_at)?,
      timestamp_source:    decode_timestamp_source(&self.timestamp_source)?,
      local_date:          decode_date(&self.local_date)?,
      meal_category:       decode_category(&self.meal_category)?,
      is_duplicate_of_day: self.is_duplicate,
      worker_name:         self.worker_name,
      badge:               self.badge,
      department_name:     self.department_name,
      function_name:       self.function_name,
      value_cents:         self.value_cents,
      capture_sha256:      self.capture_sha256,
      recorded_at:         decode_dt(&self.recorded_at)?,
    })
  }
}

/// Raw values read directly from a `justifications` row.
pub struct RawJustification {
  pub justification_id: String,
  pub registration_id:  String,
  pub reason:           String,
  pub responsible:      Option<String>,
  pub recorded_at:      String,
}

impl RawJustification {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      justification_id: row.get(0)?,
      registration_id:  row.get(1)?,
      reason:           row.get(2)?,
      responsible:      row.get(3)?,
      recorded_at:      row.get(4)?,
    })
  }

  pub fn into_justification(self) -> Result<Justification> {
    Ok(Justification {
      justification_id: decode_uuid(&self.justification_id)?,
      registration_id:  decode_uuid(&self.registration_id)?,
      reason:           self.reason,
      responsible:      self.responsible,
      recorded_at:      decode_dt(&self.recorded_at)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use strum::IntoEnumIterator as _;

  use super::*;

  #[test]
  fn category_column_matches_json_name() {
    for c in MealCategory::iter() {
      let json = serde_json::to_value(c).unwrap();
      assert_eq!(json.as_str(), Some(encode_category(c)));
      assert_eq!(decode_category(encode_category(c)).unwrap(), c);
    }
    assert!(matches!(
      decode_category("brunch"),
      Err(Error::UnknownDiscriminant { column: "meal_category", .. })
    ));
  }

  #[test]
  fn timestamp_source_column_matches_json_name() {
    for t in [TimestampSource::Device, TimestampSource::Server] {
      let json = serde_json::to_value(t).unwrap();
      assert_eq!(json.as_str(), Some(encode_timestamp_source(t)));
      assert_eq!(decode_timestamp_source(encode_timestamp_source(t)).unwrap(), t);
    }
  }
}
