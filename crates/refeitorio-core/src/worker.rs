//! Worker records, meal entitlements and gallery identity handles.
//!
//! Workers are never hard-deleted; deactivation flips `active`. The identity
//! handle is issued by the identification gateway at enrollment time and is
//! replaced (never edited) whenever the enrollment photo changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::meal::MealCategory;

// ─── Identity handle ─────────────────────────────────────────────────────────

/// Opaque reference to an enrolled identity inside the gateway's gallery.
/// Owned by exactly one [`Worker`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalIdentityHandle(pub String);

impl ExternalIdentityHandle {
  pub fn as_str(&self) -> &str { &self.0 }
}

impl std::fmt::Display for ExternalIdentityHandle {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&str> for ExternalIdentityHandle {
  fn from(s: &str) -> Self { Self(s.to_owned()) }
}

// ─── Entitlements ────────────────────────────────────────────────────────────

/// Per-meal-category permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Entitlements {
  pub breakfast:  bool,
  pub lunch:      bool,
  pub dinner:     bool,
  pub late_snack: bool,
}

impl Entitlements {
  pub fn all() -> Self {
    Self { breakfast: true, lunch: true, dinner: true, late_snack: true }
  }

  /// Entitled to exactly one category.
  pub fn only(category: MealCategory) -> Self {
    let mut e = Self::default();
    e.set(category, true);
    e
  }

  pub fn allows(&self, category: MealCategory) -> bool {
    match category {
      MealCategory::Breakfast => self.breakfast,
      MealCategory::Lunch => self.lunch,
      MealCategory::Dinner => self.dinner,
      MealCategory::LateSnack => self.late_snack,
    }
  }

  pub fn set(&mut self, category: MealCategory, allowed: bool) {
    match category {
      MealCategory::Breakfast => self.breakfast = allowed,
      MealCategory::Lunch => self.lunch = allowed,
      MealCategory::Dinner => self.dinner = allowed,
      MealCategory::LateSnack => self.late_snack = allowed,
    }
  }
}

// ─── Worker ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
  pub worker_id:       Uuid,
  pub name:            String,
  /// Time-card number printed on the worker's badge.
  pub badge:           String,
  pub department:      Option<String>,
  pub job_function:    Option<String>,
  pub active:          bool,
  pub entitlements:    Entitlements,
  /// `None` until the worker has been enrolled in the gallery.
  pub identity_handle: Option<ExternalIdentityHandle>,
  pub created_at:      DateTime<Utc>,
  pub updated_at:      DateTime<Utc>,
}

/// Input to [`crate::store::MealStore::add_worker`]. New workers start active
/// and unenrolled.
#[derive(Debug, Clone, Deserialize)]
pub struct NewWorker {
  pub name:         String,
  pub badge:        String,
  #[serde(default)]
  pub department:   Option<String>,
  #[serde(default)]
  pub job_function: Option<String>,
  #[serde(default)]
  pub entitlements: Entitlements,
}

impl NewWorker {
  pub fn new(name: impl Into<String>, badge: impl Into<String>) -> Self {
    Self {
      name:         name.into(),
      badge:        badge.into(),
      department:   None,
      job_function: None,
      entitlements: Entitlements::default(),
    }
  }
}

/// Absent stays `None`; an explicit `null` becomes `Some(None)`.
fn nullable<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
  D: Deserializer<'de>,
  T: Deserialize<'de>,
{
  Option::<T>::deserialize(de).map(Some)
}

/// A partial update; `None` fields are left untouched. `department` and
/// `job_function` are cleared by `Some(None)` (JSON `null`). The identity
/// handle is not patchable here; it only changes through enrollment.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkerPatch {
  pub name:         Option<String>,
  pub badge:        Option<String>,
  #[serde(default, deserialize_with = "nullable")]
  pub department:   Option<Option<String>>,
  #[serde(default, deserialize_with = "nullable")]
  pub job_function: Option<Option<String>>,
  pub active:       Option<bool>,
  pub entitlements: Option<Entitlements>,
}

impl WorkerPatch {
  pub fn deactivate() -> Self { Self { active: Some(false), ..Self::default() } }

  pub fn apply(self, worker: &mut Worker) {
    if let Some(name) = self.name {
      worker.name = name;
    }
    if let Some(badge) = self.badge {
      worker.badge = badge;
    }
    if let Some(department) = self.department {
      worker.department = department;
    }
    if let Some(job_function) = self.job_function {
      worker.job_function = job_function;
    }
    if let Some(active) = self.active {
      worker.active = active;
    }
    if let Some(entitlements) = self.entitlements {
      worker.entitlements = entitlements;
    }
  }
}
