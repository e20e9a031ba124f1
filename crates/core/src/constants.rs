//! Constants used throughout the clinic core crate.
//!
//! Table names, defaults and wire formats live here so the store, the policy
//! seeding and the lifecycle engine agree on them.

use std::time::Duration;

/// Default SQLite database file when no explicit path is configured.
pub const DEFAULT_DATABASE_PATH: &str = "clinic.db";

/// Default bound on any single store interaction, including lock waits.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Specialization recorded for a doctor profile created without one.
pub const PENDING_SPECIALIZATION: &str = "Pending...";

/// Fallback minute-precision booking format, as sent by `datetime-local` inputs.
/// The primary format is RFC 3339.
pub const BOOKING_DATE_FALLBACK: &str = "%Y-%m-%dT%H:%M";

/// Schema for every persisted entity.
///
/// Statements are idempotent so the migration can run on every open.
/// Every entity table except `policy_rules` carries a `deleted_at` soft-delete marker.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    email       TEXT NOT NULL UNIQUE,
    subject     TEXT NOT NULL DEFAULT '',
    name        TEXT NOT NULL DEFAULT '',
    picture     TEXT NOT NULL DEFAULT '',
    role        TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    deleted_at  TEXT
);
CREATE UNIQUE INDEX IF NOT EXISTS users_subject_unique ON users(subject) WHERE subject <> '';

CREATE TABLE IF NOT EXISTS departments (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    deleted_at  TEXT
);

CREATE TABLE IF NOT EXISTS doctors (
    id             INTEGER PRIMARY KEY REFERENCES users(id),
    department_id  INTEGER REFERENCES departments(id),
    specialization TEXT NOT NULL DEFAULT '',
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL,
    deleted_at     TEXT
);

CREATE TABLE IF NOT EXISTS patients (
    id            INTEGER PRIMARY KEY REFERENCES users(id),
    date_of_birth TEXT,
    gender        TEXT NOT NULL DEFAULT '',
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    deleted_at    TEXT
);

CREATE TABLE IF NOT EXISTS appointments (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    patient_id       INTEGER NOT NULL REFERENCES patients(id),
    doctor_id        INTEGER NOT NULL REFERENCES doctors(id),
    appointment_date TEXT NOT NULL,
    status           TEXT NOT NULL,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL,
    deleted_at       TEXT
);
CREATE UNIQUE INDEX IF NOT EXISTS appointments_doctor_slot
    ON appointments(doctor_id, appointment_date)
    WHERE deleted_at IS NULL AND status <> 'Cancelled';

CREATE TABLE IF NOT EXISTS consultations (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    appointment_id INTEGER NOT NULL UNIQUE REFERENCES appointments(id),
    diagnosis      TEXT NOT NULL DEFAULT '',
    notes          TEXT NOT NULL DEFAULT '',
    date           TEXT NOT NULL,
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL,
    deleted_at     TEXT
);

CREATE TABLE IF NOT EXISTS prescriptions (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    consultation_id INTEGER NOT NULL REFERENCES consultations(id),
    medication      TEXT NOT NULL,
    dosage          TEXT NOT NULL DEFAULT '',
    status          TEXT NOT NULL,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL,
    deleted_at      TEXT
);

CREATE TABLE IF NOT EXISTS policy_rules (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    role     TEXT NOT NULL,
    resource TEXT NOT NULL,
    action   TEXT NOT NULL,
    UNIQUE (role, resource, action)
);
"#;
