//! SQL schema for the Refeitório SQLite store.
//!
//! Executed once at connection startup; `PRAGMA user_version` records the
//! schema revision for future migrations.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Workers are never deleted; deactivation clears `active`.
CREATE TABLE IF NOT EXISTS workers (
    worker_id       TEXT PRIMARY KEY,
    name            TEXT NOT NULL,
    badge           TEXT NOT NULL,
    department      TEXT,
    job_function    TEXT,
    active          INTEGER NOT NULL DEFAULT 1,
    entitlements    TEXT NOT NULL,   -- JSON object of four booleans
    identity_handle TEXT UNIQUE,     -- NULL until enrolled
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

-- Registrations are strictly append-only.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS registrations (
    registration_id  TEXT PRIMARY KEY,
    worker_id        TEXT NOT NULL REFERENCES workers(worker_id),
    captured_at      TEXT NOT NULL,   -- RFC 3339 UTC, fixed width
    timestamp_source TEXT NOT NULL,   -- 'device' | 'server'
    local_date       TEXT NOT NULL,   -- YYYY-MM-DD in the canonical zone
    meal_category    TEXT NOT NULL,   -- snake_case MealCategory
    is_duplicate     INTEGER NOT NULL DEFAULT 0,
    worker_name      TEXT NOT NULL,
    badge            TEXT NOT NULL,
    department_name  TEXT,
    function_name    TEXT,
    value_cents      INTEGER NOT NULL DEFAULT 0,
    capture_sha256   TEXT,
    recorded_at      TEXT NOT NULL
);

-- At most one first-of-day registration per worker, category and day.
CREATE UNIQUE INDEX IF NOT EXISTS registrations_first_of_day_idx
    ON registrations(worker_id, meal_category, local_date)
    WHERE is_duplicate = 0;

CREATE INDEX IF NOT EXISTS registrations_date_idx     ON registrations(local_date);
CREATE INDEX IF NOT EXISTS registrations_worker_idx   ON registrations(worker_id);
CREATE INDEX IF NOT EXISTS registrations_captured_idx ON registrations(captured_at);

CREATE TABLE IF NOT EXISTS justifications (
    justification_id TEXT PRIMARY KEY,
    registration_id  TEXT NOT NULL REFERENCES registrations(registration_id),
    reason           TEXT NOT NULL,
    responsible      TEXT,
    recorded_at      TEXT NOT NULL,
    UNIQUE (registration_id)
);

PRAGMA user_version = 1;
";
