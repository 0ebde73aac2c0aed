//! The `MealStore` trait.
//!
//! The trait is implemented by storage backends (e.g.
//! `refeitorio-store-sqlite`). The registration pipeline and the HTTP layer
//! depend on this abstraction, not on any concrete backend.

use std::future::Future;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::{
  ledger::{
    DailySummary, Justification, NewJustification, NewRegistration,
    RegistrationEvent, RegistrationQuery,
  },
  meal::MealCategory,
  worker::{ExternalIdentityHandle, NewWorker, Worker, WorkerPatch},
};

/// Abstraction over the identity/entitlement store and the usage ledger.
///
/// Registration events are append-only. Appending never fails because an
/// event is a duplicate; duplication is recorded as a flag on the event.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait MealStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Workers ─────────────────────────────────────────────────────────────

  /// Persist a new, active, unenrolled worker.
  fn add_worker(
    &self,
    input: NewWorker,
  ) -> impl Future<Output = Result<Worker, Self::Error>> + Send + '_;

  fn get_worker(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Worker>, Self::Error>> + Send + '_;

  /// Look up the worker owning a gallery identity. Returns `None` when no
  /// local worker maps to `handle`.
  fn find_worker_by_handle<'a>(
    &'a self,
    handle: &'a ExternalIdentityHandle,
  ) -> impl Future<Output = Result<Option<Worker>, Self::Error>> + Send + 'a;

  /// Apply a partial update. Returns `None` if the worker does not exist.
  fn update_worker(
    &self,
    id: Uuid,
    patch: WorkerPatch,
  ) -> impl Future<Output = Result<Option<Worker>, Self::Error>> + Send + '_;

  /// Replace the worker's identity handle, returning the previous one.
  ///
  /// Returns an error if the worker does not exist or the handle is already
  /// owned by another worker.
  fn replace_identity_handle(
    &self,
    id: Uuid,
    handle: ExternalIdentityHandle,
  ) -> impl Future<Output = Result<Option<ExternalIdentityHandle>, Self::Error>>
  + Send
  + '_;

  // ── Ledger: append-only writes ─────────────────────────────────────────

  /// Record a registration, flagging it as a duplicate when the worker
  /// already has an event for the same category on the same local date.
  fn append_registration(
    &self,
    input: NewRegistration,
  ) -> impl Future<Output = Result<RegistrationEvent, Self::Error>> + Send + '_;

  /// Attach a justification. Returns `None` when the registration already
  /// has one; at most one justification per registration is ever stored.
  fn record_justification(
    &self,
    registration_id: Uuid,
    input: NewJustification,
  ) -> impl Future<Output = Result<Option<Justification>, Self::Error>> + Send + '_;

  // ── Reads ───────────────────────────────────────────────────────────────

  /// Whether any event exists for `(worker, category, local date)`.
  fn has_registration_on(
    &self,
    worker_id: Uuid,
    category: MealCategory,
    date: NaiveDate,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  fn get_registration(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<RegistrationEvent>, Self::Error>> + Send + '_;

  fn list_registrations<'a>(
    &'a self,
    query: &'a RegistrationQuery,
  ) -> impl Future<Output = Result<Vec<RegistrationEvent>, Self::Error>> + Send + 'a;

  fn get_justification(
    &self,
    registration_id: Uuid,
  ) -> impl Future<Output = Result<Option<Justification>, Self::Error>> + Send + '_;

  /// Duplicate-flagged registrations without a justification, newest first.
  fn pending_alerts(
    &self,
  ) -> impl Future<Output = Result<Vec<RegistrationEvent>, Self::Error>> + Send + '_;

  fn daily_summary(
    &self,
    date: NaiveDate,
  ) -> impl Future<Output = Result<DailySummary, Self::Error>> + Send + '_;
}
