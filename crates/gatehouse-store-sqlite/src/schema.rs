//! SQL schema for the Gatehouse SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Access events are strictly append-only; the triggers below refuse any
-- UPDATE or DELETE. Timestamps are fixed-width RFC 3339 (microseconds, Z)
-- so text order is time order.
CREATE TABLE IF NOT EXISTS access_events (
    sequence      INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id      TEXT NOT NULL UNIQUE,
    person_type   TEXT NOT NULL,   -- 'employee' | 'visitor' | 'vehicle'
    person_id     TEXT NOT NULL,
    person_name   TEXT NOT NULL,   -- plate for vehicles
    person_cpf    TEXT,
    driver_id     TEXT,            -- vehicles only
    direction     TEXT NOT NULL,   -- 'entry' | 'exit'
    access_method TEXT NOT NULL,
    location      TEXT NOT NULL,
    timestamp     TEXT NOT NULL,
    verified_by   TEXT,
    notes         TEXT
);

CREATE TRIGGER IF NOT EXISTS access_events_no_update
BEFORE UPDATE ON access_events
BEGIN
    SELECT RAISE(ABORT, 'access_events is append-only');
END;

CREATE TRIGGER IF NOT EXISTS access_events_no_delete
BEFORE DELETE ON access_events
BEGIN
    SELECT RAISE(ABORT, 'access_events is append-only');
END;

CREATE INDEX IF NOT EXISTS access_events_person_idx
    ON access_events(person_type, person_id, sequence);
CREATE INDEX IF NOT EXISTS access_events_timestamp_idx
    ON access_events(timestamp);

CREATE TABLE IF NOT EXISTS visitors (
    visitor_id   TEXT PRIMARY KEY,
    name         TEXT NOT NULL,
    cpf          TEXT NOT NULL UNIQUE,
    photo        TEXT,
    total_visits INTEGER NOT NULL DEFAULT 0,
    last_visit   TEXT,
    is_active    INTEGER NOT NULL DEFAULT 1,
    created_at   TEXT NOT NULL
);

-- One row per vehicle; `version` is the compare-and-swap token.
CREATE TABLE IF NOT EXISTS vehicle_movements (
    vehicle_id       TEXT PRIMARY KEY,
    driver_id        TEXT NOT NULL,
    checklist_id     TEXT,
    checklist_status TEXT NOT NULL DEFAULT 'none',
    status           TEXT NOT NULL DEFAULT 'available',
    destination      TEXT,
    origin_base      TEXT,
    exit_time        TEXT,
    return_time      TEXT,
    checklist_date   TEXT,
    version          INTEGER NOT NULL,
    updated_at       TEXT NOT NULL,
    CHECK (status = 'available' OR checklist_status != 'pending')
);

CREATE INDEX IF NOT EXISTS vehicle_movements_status_idx
    ON vehicle_movements(status, checklist_status);

-- Local copy of the identity directory; read-only to the gate.
CREATE TABLE IF NOT EXISTS employees (
    employee_id TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    cpf         TEXT,
    is_active   INTEGER NOT NULL DEFAULT 1
);

CREATE INDEX IF NOT EXISTS employees_cpf_idx ON employees(cpf);

CREATE TABLE IF NOT EXISTS vehicles (
    vehicle_id TEXT PRIMARY KEY,
    plate      TEXT NOT NULL UNIQUE,
    model      TEXT
);

CREATE TABLE IF NOT EXISTS drivers (
    driver_id TEXT PRIMARY KEY,
    name      TEXT NOT NULL,
    cpf       TEXT
);

PRAGMA user_version = 1;
";
