//! Integration tests for `SqliteStore`, mostly against an in-memory database.

use chrono::{NaiveDate, NaiveTime, TimeZone as _, Utc};
use refeitorio_core::{
  Error as CoreError,
  ledger::{
    NewJustification, NewRegistration, RegistrationQuery, TimestampSource,
    justify_registration,
  },
  meal::{Classification, MealCategory},
  store::MealStore,
  worker::{Entitlements, ExternalIdentityHandle, NewWorker, Worker, WorkerPatch},
};
use uuid::Uuid;

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

async fn worker(s: &SqliteStore, name: &str) -> Worker {
  let mut input = NewWorker::new(name, format!("B-{name}"));
  input.department = Some("Kitchen".into());
  input.job_function = Some("Cook".into());
  input.entitlements = Entitlements::all();
  s.add_worker(input).await.unwrap()
}

fn date(d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(2024, 3, d).unwrap() }

fn registration(w: &Worker, category: MealCategory, day: u32) -> NewRegistration {
  let classification = Classification {
    category,
    local_date: date(day),
    local_time: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
  };
  let captured_at = Utc.with_ymd_and_hms(2024, 3, day, 15, 0, 0).unwrap();
  NewRegistration::snapshot(w, &classification, captured_at, TimestampSource::Device)
}

fn reason(text: &str) -> NewJustification {
  NewJustification { reason: text.into(), responsible: Some("supervisor".into()) }
}

// ─── Workers ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn add_and_get_worker() {
  let s = store().await;
  let w = worker(&s, "Ana").await;
  assert!(w.active);
  assert!(w.identity_handle.is_none());

  let fetched = s.get_worker(w.worker_id).await.unwrap().unwrap();
  assert_eq!(fetched.name, "Ana");
  assert_eq!(fetched.department.as_deref(), Some("Kitchen"));
  assert_eq!(fetched.entitlements, Entitlements::all());
}

#[tokio::test]
async fn get_worker_missing_returns_none() {
  let s = store().await;
  assert!(s.get_worker(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn update_worker_applies_patch() {
  let s = store().await;
  let w = worker(&s, "Ana").await;

  let patch = WorkerPatch {
    name: Some("Ana Maria".into()),
    entitlements: Some(Entitlements::only(MealCategory::Lunch)),
    ..WorkerPatch::default()
  };
  let updated = s.update_worker(w.worker_id, patch).await.unwrap().unwrap();
  assert_eq!(updated.name, "Ana Maria");
  assert!(updated.updated_at >= w.updated_at);

  let fetched = s.get_worker(w.worker_id).await.unwrap().unwrap();
  assert_eq!(fetched.name, "Ana Maria");
  assert!(fetched.entitlements.allows(MealCategory::Lunch));
  assert!(!fetched.entitlements.allows(MealCategory::Dinner));
  assert_eq!(fetched.badge, w.badge);
}

#[tokio::test]
async fn update_worker_clears_optional_fields() {
  let s = store().await;
  let w = worker(&s, "Ana").await;

  let patch = WorkerPatch { department: Some(None), ..WorkerPatch::default() };
  s.update_worker(w.worker_id, patch).await.unwrap().unwrap();

  let fetched = s.get_worker(w.worker_id).await.unwrap().unwrap();
  assert_eq!(fetched.department, None);
  assert_eq!(fetched.job_function.as_deref(), Some("Cook"));
}

#[tokio::test]
async fn concurrent_patches_keep_both_changes() {
  let s = store().await;
  let w = worker(&s, "Ana").await;

  let rename = WorkerPatch { name: Some("Ana Maria".into()), ..WorkerPatch::default() };
  let (a, b) = tokio::join!(
    s.update_worker(w.worker_id, rename),
    s.update_worker(w.worker_id, WorkerPatch::deactivate()),
  );
  a.unwrap().unwrap();
  b.unwrap().unwrap();

  let fetched = s.get_worker(w.worker_id).await.unwrap().unwrap();
  assert_eq!(fetched.name, "Ana Maria");
  assert!(!fetched.active);
}

#[tokio::test]
async fn update_missing_worker_returns_none() {
  let s = store().await;
  let result = s.update_worker(Uuid::new_v4(), WorkerPatch::deactivate()).await.unwrap();
  assert!(result.is_none());
}

#[tokio::test]
async fn identity_handle_lookup_and_rotation() {
  let s = store().await;
  let w = worker(&s, "Ana").await;

  let first = ExternalIdentityHandle::from("person-1");
  let previous = s.replace_identity_handle(w.worker_id, first.clone()).await.unwrap();
  assert!(previous.is_none());

  let found = s.find_worker_by_handle(&first).await.unwrap().unwrap();
  assert_eq!(found.worker_id, w.worker_id);

  let second = ExternalIdentityHandle::from("person-2");
  let previous = s.replace_identity_handle(w.worker_id, second.clone()).await.unwrap();
  assert_eq!(previous, Some(first.clone()));

  assert!(s.find_worker_by_handle(&first).await.unwrap().is_none());
  assert!(s.find_worker_by_handle(&second).await.unwrap().is_some());
}

#[tokio::test]
async fn identity_handle_is_unique_across_workers() {
  let s = store().await;
  let ana = worker(&s, "Ana").await;
  let bruno = worker(&s, "Bruno").await;

  let handle = ExternalIdentityHandle::from("person-1");
  s.replace_identity_handle(ana.worker_id, handle.clone()).await.unwrap();

  let err = s.replace_identity_handle(bruno.worker_id, handle.clone()).await.unwrap_err();
  assert!(matches!(err, crate::Error::HandleTaken(ref h) if h == "person-1"));

  let owner = s.find_worker_by_handle(&handle).await.unwrap().unwrap();
  assert_eq!(owner.worker_id, ana.worker_id);
}

#[tokio::test]
async fn replace_handle_for_missing_worker_errors() {
  let s = store().await;
  let err = s
    .replace_identity_handle(Uuid::new_v4(), "person-9".into())
    .await
    .unwrap_err();
  assert!(matches!(err, crate::Error::WorkerNotFound(_)));
}

// ─── Ledger ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn first_registration_of_day_is_not_duplicate() {
  let s = store().await;
  let w = worker(&s, "Ana").await;

  let event = s
    .append_registration(registration(&w, MealCategory::Lunch, 4).with_value(1700))
    .await
    .unwrap();
  assert!(!event.is_duplicate_of_day);
  assert_eq!(event.value_cents, 1700);

  let fetched = s.get_registration(event.registration_id).await.unwrap().unwrap();
  assert_eq!(fetched, event);
}

#[tokio::test]
async fn second_same_day_same_category_is_flagged_but_written() {
  let s = store().await;
  let w = worker(&s, "Ana").await;

  let first = s.append_registration(registration(&w, MealCategory::Lunch, 4)).await.unwrap();
  let second = s.append_registration(registration(&w, MealCategory::Lunch, 4)).await.unwrap();
  let third = s.append_registration(registration(&w, MealCategory::Lunch, 4)).await.unwrap();

  assert!(!first.is_duplicate_of_day);
  assert!(second.is_duplicate_of_day);
  assert!(third.is_duplicate_of_day);

  let all = s
    .list_registrations(&RegistrationQuery { date: Some(date(4)), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(all.len(), 3);
}

#[tokio::test]
async fn other_category_or_day_is_not_duplicate() {
  let s = store().await;
  let w = worker(&s, "Ana").await;

  s.append_registration(registration(&w, MealCategory::Lunch, 4)).await.unwrap();
  let dinner = s.append_registration(registration(&w, MealCategory::Dinner, 4)).await.unwrap();
  let next_day = s.append_registration(registration(&w, MealCategory::Lunch, 5)).await.unwrap();

  assert!(!dinner.is_duplicate_of_day);
  assert!(!next_day.is_duplicate_of_day);
}

#[tokio::test]
async fn duplicate_detection_is_per_worker() {
  let s = store().await;
  let ana = worker(&s, "Ana").await;
  let bruno = worker(&s, "Bruno").await;

  s.append_registration(registration(&ana, MealCategory::Lunch, 4)).await.unwrap();
  let other = s.append_registration(registration(&bruno, MealCategory::Lunch, 4)).await.unwrap();
  assert!(!other.is_duplicate_of_day);
}

#[tokio::test]
async fn concurrent_first_inserts_flag_exactly_one_duplicate() {
  let s = store().await;
  let w = worker(&s, "Ana").await;

  let (a, b) = tokio::join!(
    s.append_registration(registration(&w, MealCategory::Lunch, 4)),
    s.append_registration(registration(&w, MealCategory::Lunch, 4)),
  );
  let flags = [a.unwrap().is_duplicate_of_day, b.unwrap().is_duplicate_of_day];
  assert_eq!(flags.iter().filter(|d| **d).count(), 1);
}

#[tokio::test]
async fn two_connections_to_one_file_record_every_capture() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("ledger.db");
  let a = SqliteStore::open(&path).await.unwrap();
  let b = SqliteStore::open(&path).await.unwrap();
  let w = worker(&a, "Ana").await;

  for day in 1..=20 {
    let (first, second) = tokio::join!(
      a.append_registration(registration(&w, MealCategory::Lunch, day)),
      b.append_registration(registration(&w, MealCategory::Lunch, day)),
    );
    let flags = [first.unwrap().is_duplicate_of_day, second.unwrap().is_duplicate_of_day];
    assert_eq!(flags.iter().filter(|d| **d).count(), 1, "day {day}");
  }

  let all = a
    .list_registrations(&RegistrationQuery { limit: Some(100), ..RegistrationQuery::default() })
    .await
    .unwrap();
  assert_eq!(all.len(), 40);
}

#[tokio::test]
async fn has_registration_on_reflects_ledger() {
  let s = store().await;
  let w = worker(&s, "Ana").await;

  assert!(!s.has_registration_on(w.worker_id, MealCategory::Lunch, date(4)).await.unwrap());
  s.append_registration(registration(&w, MealCategory::Lunch, 4)).await.unwrap();
  assert!(s.has_registration_on(w.worker_id, MealCategory::Lunch, date(4)).await.unwrap());
  assert!(!s.has_registration_on(w.worker_id, MealCategory::Dinner, date(4)).await.unwrap());
  assert!(!s.has_registration_on(w.worker_id, MealCategory::Lunch, date(5)).await.unwrap());
}

#[tokio::test]
async fn snapshot_survives_worker_rename() {
  let s = store().await;
  let w = worker(&s, "Ana").await;
  let event = s.append_registration(registration(&w, MealCategory::Lunch, 4)).await.unwrap();

  s.update_worker(
    w.worker_id,
    WorkerPatch { name: Some("Ana Maria".into()), ..WorkerPatch::default() },
  )
  .await
  .unwrap();

  let fetched = s.get_registration(event.registration_id).await.unwrap().unwrap();
  assert_eq!(fetched.worker_name, "Ana");
  assert_eq!(fetched.department_name.as_deref(), Some("Kitchen"));
}

#[tokio::test]
async fn list_registrations_filters() {
  let s = store().await;
  let ana = worker(&s, "Ana").await;
  let bruno = worker(&s, "Bruno").await;

  s.append_registration(registration(&ana, MealCategory::Lunch, 4)).await.unwrap();
  s.append_registration(registration(&ana, MealCategory::Lunch, 4)).await.unwrap();
  s.append_registration(registration(&ana, MealCategory::Dinner, 4)).await.unwrap();
  s.append_registration(registration(&bruno, MealCategory::Lunch, 4)).await.unwrap();
  s.append_registration(registration(&bruno, MealCategory::Lunch, 5)).await.unwrap();

  let by_worker = s
    .list_registrations(&RegistrationQuery {
      worker_id: Some(ana.worker_id),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(by_worker.len(), 3);

  let lunches_on_4th = s
    .list_registrations(&RegistrationQuery {
      date: Some(date(4)),
      meal_category: Some(MealCategory::Lunch),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(lunches_on_4th.len(), 3);

  let duplicates = s
    .list_registrations(&RegistrationQuery { duplicates_only: true, ..Default::default() })
    .await
    .unwrap();
  assert_eq!(duplicates.len(), 1);
  assert_eq!(duplicates[0].worker_id, ana.worker_id);

  let page = s
    .list_registrations(&RegistrationQuery { limit: Some(2), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(page.len(), 2);
}

// ─── Justifications and alerts ───────────────────────────────────────────────

#[tokio::test]
async fn justification_clears_pending_alert() {
  let s = store().await;
  let w = worker(&s, "Ana").await;
  s.append_registration(registration(&w, MealCategory::Lunch, 4)).await.unwrap();
  let dup = s.append_registration(registration(&w, MealCategory::Lunch, 4)).await.unwrap();

  let alerts = s.pending_alerts().await.unwrap();
  assert_eq!(alerts.len(), 1);
  assert_eq!(alerts[0].registration_id, dup.registration_id);

  let j = justify_registration(&s, dup.registration_id, reason("visitor meal"))
    .await
    .unwrap();
  assert_eq!(j.registration_id, dup.registration_id);

  assert!(s.pending_alerts().await.unwrap().is_empty());
  let stored = s.get_justification(dup.registration_id).await.unwrap().unwrap();
  assert_eq!(stored.reason, "visitor meal");
}

#[tokio::test]
async fn only_duplicates_can_be_justified() {
  let s = store().await;
  let w = worker(&s, "Ana").await;
  let first = s.append_registration(registration(&w, MealCategory::Lunch, 4)).await.unwrap();

  let err = justify_registration(&s, first.registration_id, reason("why"))
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::NotDuplicate(_)));
}

#[tokio::test]
async fn justification_is_recorded_at_most_once() {
  let s = store().await;
  let w = worker(&s, "Ana").await;
  s.append_registration(registration(&w, MealCategory::Lunch, 4)).await.unwrap();
  let dup = s.append_registration(registration(&w, MealCategory::Lunch, 4)).await.unwrap();

  justify_registration(&s, dup.registration_id, reason("first")).await.unwrap();
  let err = justify_registration(&s, dup.registration_id, reason("second"))
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::AlreadyJustified(_)));

  let raw = s.record_justification(dup.registration_id, reason("third")).await.unwrap();
  assert!(raw.is_none());
}

#[tokio::test]
async fn concurrent_justifications_store_one_and_conflict_the_other() {
  let s = store().await;
  let w = worker(&s, "Ana").await;
  s.append_registration(registration(&w, MealCategory::Lunch, 4)).await.unwrap();
  let dup = s.append_registration(registration(&w, MealCategory::Lunch, 4)).await.unwrap();

  let (a, b) = tokio::join!(
    justify_registration(&s, dup.registration_id, reason("first")),
    justify_registration(&s, dup.registration_id, reason("second")),
  );
  let results = [a, b];
  assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
  assert!(
    results
      .iter()
      .any(|r| matches!(r, Err(CoreError::AlreadyJustified(id)) if *id == dup.registration_id))
  );
}

#[tokio::test]
async fn justification_rejects_blank_reason_and_unknown_registration() {
  let s = store().await;

  let err = justify_registration(&s, Uuid::new_v4(), reason("   ")).await.unwrap_err();
  assert!(matches!(err, CoreError::BlankReason));

  let err = justify_registration(&s, Uuid::new_v4(), reason("x")).await.unwrap_err();
  assert!(matches!(err, CoreError::RegistrationNotFound(_)));
}

// ─── Summary ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn daily_summary_counts() {
  let s = store().await;
  let ana = worker(&s, "Ana").await;
  let bruno = worker(&s, "Bruno").await;
  let carla = worker(&s, "Carla").await;
  s.update_worker(carla.worker_id, WorkerPatch::deactivate()).await.unwrap();

  s.append_registration(registration(&ana, MealCategory::Lunch, 4)).await.unwrap();
  s.append_registration(registration(&ana, MealCategory::Lunch, 4)).await.unwrap();
  s.append_registration(registration(&bruno, MealCategory::Dinner, 4)).await.unwrap();
  s.append_registration(registration(&bruno, MealCategory::Lunch, 5)).await.unwrap();

  let summary = s.daily_summary(date(4)).await.unwrap();
  assert_eq!(summary.active_workers, 2);
  assert_eq!(summary.registrations, 3);
  assert_eq!(summary.duplicates, 1);
  assert_eq!(summary.pending_alerts, 1);
  assert_eq!(summary.by_category[&MealCategory::Lunch], 2);
  assert_eq!(summary.by_category[&MealCategory::Dinner], 1);
  assert_eq!(summary.by_category[&MealCategory::Breakfast], 0);
}
