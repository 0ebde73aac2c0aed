//! [`SqliteStore`]: the SQLite implementation of [`MealStore`].

use std::{collections::BTreeMap, path::Path, time::Duration};

use chrono::{NaiveDate, Utc};
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use strum::IntoEnumIterator as _;
use uuid::Uuid;

use refeitorio_core::{
  ledger::{
    DailySummary, Justification, NewJustification, NewRegistration,
    RegistrationEvent, RegistrationQuery,
  },
  meal::MealCategory,
  store::MealStore,
  worker::{ExternalIdentityHandle, NewWorker, Worker, WorkerPatch},
};

use crate::{
  Error, Result,
  encode::{
    REGISTRATION_COLUMNS, RawJustification, RawRegistration, RawWorker,
    WORKER_COLUMNS, decode_category, encode_category, encode_date, encode_dt,
    encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// How long a writer waits for another connection's lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
  matches!(
    e,
    rusqlite::Error::SqliteFailure(f, _) if f.code == rusqlite::ErrorCode::ConstraintViolation
  )
}

fn insert_registration(
  conn: &rusqlite::Connection,
  raw: &RawRegistration,
  is_duplicate: bool,
) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT INTO registrations (
       registration_id, worker_id, captured_at, timestamp_source, local_date,
       meal_category, is_duplicate, worker_name, badge, department_name,
       function_name, value_cents, capture_sha256, recorded_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
    rusqlite::params![
      raw.registration_id,
      raw.worker_id,
      raw.captured_at,
      raw.timestamp_source,
      raw.local_date,
      raw.meal_category,
      is_duplicate,
      raw.worker_name,
      raw.badge,
      raw.department_name,
      raw.function_name,
      raw.value_cents,
      raw.capture_sha256,
      raw.recorded_at,
    ],
  )?;
  Ok(())
}

/// Outcome of the handle-replacement transaction.
enum HandleSwap {
  Missing,
  Taken,
  Replaced(Option<String>),
}

/// Outcome of the justification insert.
enum JustifyInsert {
  Missing,
  Duplicate,
  Inserted,
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// The worker store and usage ledger backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.configure().await?;
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn configure(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn query_registrations(
    &self,
    sql: String,
    params: Vec<Option<String>>,
  ) -> Result<Vec<RegistrationEvent>> {
    let raws: Vec<RawRegistration> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params.iter()), RawRegistration::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRegistration::into_event).collect()
  }
}

// ─── MealStore impl ──────────────────────────────────────────────────────────

impl MealStore for SqliteStore {
  type Error = Error;

  // ── Workers ───────────────────────────────────────────────────────────────

  async fn add_worker(&self, input: NewWorker) -> Result<Worker> {
    let now = Utc::now();
    let worker = Worker {
      worker_id:       Uuid::new_v4(),
      name:            input.name,
      badge:           input.badge,
      department:      input.department,
      job_function:    input.job_function,
      active:          true,
      entitlements:    input.entitlements,
      identity_handle: None,
      created_at:      now,
      updated_at:      now,
    };

    let raw = RawWorker::encode(&worker)?;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO workers (
             worker_id, name, badge, department, job_function,
             active, entitlements, identity_handle, created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
          rusqlite::params![
            raw.worker_id,
            raw.name,
            raw.badge,
            raw.department,
            raw.job_function,
            raw.active,
            raw.entitlements,
            raw.identity_handle,
            raw.created_at,
            raw.updated_at,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(worker)
  }

  async fn get_worker(&self, id: Uuid) -> Result<Option<Worker>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawWorker> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {WORKER_COLUMNS} FROM workers WHERE worker_id = ?1"),
            rusqlite::params![id_str],
            RawWorker::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawWorker::into_worker).transpose()
  }

  async fn find_worker_by_handle(
    &self,
    handle: &ExternalIdentityHandle,
  ) -> Result<Option<Worker>> {
    let handle_str = handle.0.clone();

    let raw: Option<RawWorker> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {WORKER_COLUMNS} FROM workers WHERE identity_handle = ?1"),
            rusqlite::params![handle_str],
            RawWorker::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawWorker::into_worker).transpose()
  }

  async fn update_worker(&self, id: Uuid, patch: WorkerPatch) -> Result<Option<Worker>> {
    let id_str = encode_uuid(id);

    let updated: Option<Result<Worker>> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let raw = tx
          .query_row(
            &format!("SELECT {WORKER_COLUMNS} FROM workers WHERE worker_id = ?1"),
            rusqlite::params![id_str],
            RawWorker::from_row,
          )
          .optional()?;
        let Some(raw) = raw else {
          return Ok(None);
        };

        let mut worker = match raw.into_worker() {
          Ok(worker) => worker,
          Err(e) => return Ok(Some(Err(e))),
        };
        patch.apply(&mut worker);
        worker.updated_at = Utc::now();

        let raw = match RawWorker::encode(&worker) {
          Ok(raw) => raw,
          Err(e) => return Ok(Some(Err(e))),
        };
        tx.execute(
          "UPDATE workers
             SET name = ?2, badge = ?3, department = ?4, job_function = ?5,
                 active = ?6, entitlements = ?7, updated_at = ?8
           WHERE worker_id = ?1",
          rusqlite::params![
            raw.worker_id,
            raw.name,
            raw.badge,
            raw.department,
            raw.job_function,
            raw.active,
            raw.entitlements,
            raw.updated_at,
          ],
        )?;

        tx.commit()?;
        Ok(Some(Ok(worker)))
      })
      .await?;

    updated.transpose()
  }

  async fn replace_identity_handle(
    &self,
    id: Uuid,
    handle: ExternalIdentityHandle,
  ) -> Result<Option<ExternalIdentityHandle>> {
    let id_str = encode_uuid(id);
    let handle_str = handle.0.clone();
    let at_str = encode_dt(Utc::now());

    let swap = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let previous: Option<Option<String>> = tx
          .query_row(
            "SELECT identity_handle FROM workers WHERE worker_id = ?1",
            rusqlite::params![id_str],
            |r| r.get(0),
          )
          .optional()?;

        let Some(previous) = previous else {
          return Ok(HandleSwap::Missing);
        };

        let updated = tx.execute(
          "UPDATE workers SET identity_handle = ?2, updated_at = ?3 WHERE worker_id = ?1",
          rusqlite::params![id_str, handle_str, at_str],
        );
        match updated {
          Ok(_) => {}
          Err(e) if is_constraint_violation(&e) => return Ok(HandleSwap::Taken),
          Err(e) => return Err(e.into()),
        }

        tx.commit()?;
        Ok(HandleSwap::Replaced(previous))
      })
      .await?;

    match swap {
      HandleSwap::Missing => Err(Error::WorkerNotFound(id)),
      HandleSwap::Taken => Err(Error::HandleTaken(handle.0)),
      HandleSwap::Replaced(previous) => Ok(previous.map(ExternalIdentityHandle)),
    }
  }

  // ── Ledger: append-only writes ───────────────────────────────────────────

  async fn append_registration(&self, input: NewRegistration) -> Result<RegistrationEvent> {
    let mut event = RegistrationEvent {
      registration_id:     Uuid::new_v4(),
      worker_id:           input.worker_id,
      captured_at:         input.captured_at,
      timestamp_source:    input.timestamp_source,
      local_date:          input.local_date,
      meal_category:       input.meal_category,
      is_duplicate_of_day: false,
      worker_name:         input.worker_name,
      badge:               input.badge,
      department_name:     input.department_name,
      function_name:       input.function_name,
      value_cents:         input.value_cents,
      capture_sha256:      input.capture_sha256,
      recorded_at:         Utc::now(),
    };

    let raw = RawRegistration::encode(&event);

    let is_duplicate = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut is_duplicate: bool = tx.query_row(
          "SELECT EXISTS (
             SELECT 1 FROM registrations
              WHERE worker_id = ?1 AND meal_category = ?2 AND local_date = ?3
           )",
          rusqlite::params![raw.worker_id, raw.meal_category, raw.local_date],
          |r| r.get(0),
        )?;

        // Writers are serialised by the immediate transaction, so this only
        // fires if a first-of-day row slipped in outside it.
        match insert_registration(&tx, &raw, is_duplicate) {
          Ok(()) => {}
          Err(e) if !is_duplicate && is_constraint_violation(&e) => {
            tracing::debug!(
              registration_id = %raw.registration_id,
              "lost first-of-day race; recording as duplicate"
            );
            is_duplicate = true;
            insert_registration(&tx, &raw, true)?;
          }
          Err(e) => return Err(e.into()),
        }

        tx.commit()?;
        Ok(is_duplicate)
      })
      .await?;

    event.is_duplicate_of_day = is_duplicate;
    Ok(event)
  }

  async fn record_justification(
    &self,
    registration_id: Uuid,
    input: NewJustification,
  ) -> Result<Option<Justification>> {
    let justification = Justification {
      justification_id: Uuid::new_v4(),
      registration_id,
      reason: input.reason,
      responsible: input.responsible,
      recorded_at: Utc::now(),
    };

    let just_id_str = encode_uuid(justification.justification_id);
    let reg_id_str = encode_uuid(registration_id);
    let reason = justification.reason.clone();
    let responsible = justification.responsible.clone();
    let at_str = encode_dt(justification.recorded_at);

    let outcome = self
      .conn
      .call(move |conn| {
        let exists: bool = conn.query_row(
          "SELECT EXISTS (SELECT 1 FROM registrations WHERE registration_id = ?1)",
          rusqlite::params![reg_id_str],
          |r| r.get(0),
        )?;
        if !exists {
          return Ok(JustifyInsert::Missing);
        }

        let inserted = conn.execute(
          "INSERT INTO justifications (
             justification_id, registration_id, reason, responsible, recorded_at
           ) VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![just_id_str, reg_id_str, reason, responsible, at_str],
        );
        match inserted {
          Ok(_) => Ok(JustifyInsert::Inserted),
          Err(e) if is_constraint_violation(&e) => Ok(JustifyInsert::Duplicate),
          Err(e) => Err(e.into()),
        }
      })
      .await?;

    match outcome {
      JustifyInsert::Missing => Err(Error::RegistrationNotFound(registration_id)),
      JustifyInsert::Duplicate => Ok(None),
      JustifyInsert::Inserted => Ok(Some(justification)),
    }
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn has_registration_on(
    &self,
    worker_id: Uuid,
    category: MealCategory,
    date: NaiveDate,
  ) -> Result<bool> {
    let worker_str = encode_uuid(worker_id);
    let category_str = encode_category(category);
    let date_str = encode_date(date);

    let exists = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT EXISTS (
             SELECT 1 FROM registrations
              WHERE worker_id = ?1 AND meal_category = ?2 AND local_date = ?3
           )",
          rusqlite::params![worker_str, category_str, date_str],
          |r| r.get::<_, bool>(0),
        )?)
      })
      .await?;

    Ok(exists)
  }

  async fn get_registration(&self, id: Uuid) -> Result<Option<RegistrationEvent>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawRegistration> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT {REGISTRATION_COLUMNS} FROM registrations r
                WHERE r.registration_id = ?1"
            ),
            rusqlite::params![id_str],
            RawRegistration::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawRegistration::into_event).transpose()
  }

  async fn list_registrations(
    &self,
    query: &RegistrationQuery,
  ) -> Result<Vec<RegistrationEvent>> {
    let limit_val = query.limit.unwrap_or(100);
    let offset_val = query.offset.unwrap_or(0);

    let sql = format!(
      "SELECT {REGISTRATION_COLUMNS} FROM registrations r
        WHERE (?1 IS NULL OR r.local_date = ?1)
          AND (?2 IS NULL OR r.worker_id = ?2)
          AND (?3 IS NULL OR r.meal_category = ?3)
          AND (?4 IS NULL OR r.is_duplicate = 1)
        ORDER BY r.captured_at DESC, r.recorded_at DESC
        LIMIT {limit_val} OFFSET {offset_val}"
    );

    let params = vec![
      query.date.map(encode_date),
      query.worker_id.map(encode_uuid),
      query.meal_category.map(|c| encode_category(c).to_owned()),
      query.duplicates_only.then(|| "1".to_owned()),
    ];

    self.query_registrations(sql, params).await
  }

  async fn get_justification(&self, registration_id: Uuid) -> Result<Option<Justification>> {
    let id_str = encode_uuid(registration_id);

    let raw: Option<RawJustification> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT justification_id, registration_id, reason, responsible, recorded_at
               FROM justifications WHERE registration_id = ?1",
            rusqlite::params![id_str],
            RawJustification::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawJustification::into_justification).transpose()
  }

  async fn pending_alerts(&self) -> Result<Vec<RegistrationEvent>> {
    let sql = format!(
      "SELECT {REGISTRATION_COLUMNS} FROM registrations r
         LEFT JOIN justifications j ON j.registration_id = r.registration_id
        WHERE r.is_duplicate = 1 AND j.justification_id IS NULL
        ORDER BY r.captured_at DESC"
    );

    self.query_registrations(sql, Vec::new()).await
  }

  async fn daily_summary(&self, date: NaiveDate) -> Result<DailySummary> {
    let date_str = encode_date(date);

    let (active_workers, duplicates, pending_alerts, per_category) = self
      .conn
      .call(move |conn| {
        let active: i64 = conn.query_row(
          "SELECT COUNT(*) FROM workers WHERE active = 1",
          [],
          |r| r.get(0),
        )?;

        let duplicates: i64 = conn.query_row(
          "SELECT COUNT(*) FROM registrations WHERE local_date = ?1 AND is_duplicate = 1",
          rusqlite::params![date_str],
          |r| r.get(0),
        )?;

        let pending: i64 = conn.query_row(
          "SELECT COUNT(*) FROM registrations r
             LEFT JOIN justifications j ON j.registration_id = r.registration_id
            WHERE r.is_duplicate = 1 AND j.justification_id IS NULL",
          [],
          |r| r.get(0),
        )?;

        let mut stmt = conn.prepare(
          "SELECT meal_category, COUNT(*) FROM registrations
            WHERE local_date = ?1 GROUP BY meal_category",
        )?;
        let per_category = stmt
          .query_map(rusqlite::params![date_str], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok((active, duplicates, pending, per_category))
      })
      .await?;

    let mut by_category: BTreeMap<MealCategory, u64> =
      MealCategory::iter().map(|c| (c, 0)).collect();
    for (category, count) in per_category {
      by_category.insert(decode_category(&category)?, count.unsigned_abs());
    }

    Ok(DailySummary {
      date,
      active_workers: active_workers.unsigned_abs(),
      registrations: by_category.values().sum(),
      duplicates: duplicates.unsigned_abs(),
      pending_alerts: pending_alerts.unsigned_abs(),
      by_category,
    })
  }
}
