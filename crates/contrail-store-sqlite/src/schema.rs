//! SQL schema for the Contrail SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS static_flights (
    callsign            TEXT PRIMARY KEY,
    airline             TEXT,
    origin_code         TEXT,
    destination_code    TEXT,
    origin_airport      TEXT,
    destination_airport TEXT,
    origin_city         TEXT,
    destination_city    TEXT,
    commercial          INTEGER          -- 0 | 1 | NULL while unknown
);

-- One row per leg. Rows are upserted, never deleted.
CREATE TABLE IF NOT EXISTS legs (
    unique_key          TEXT PRIMARY KEY,
    callsign            TEXT NOT NULL,
    tail_id             TEXT NOT NULL,
    flight_date         TEXT NOT NULL,   -- YYYY-MM-DD
    scheduled_departure TEXT NOT NULL,   -- HH:MM
    scheduled_arrival   TEXT,            -- RFC 3339 UTC
    actual_departure    TEXT,
    actual_arrival      TEXT,
    status              TEXT NOT NULL,   -- 'departing' | 'en route' | 'arrived'
    last_update         TEXT NOT NULL,
    UNIQUE (callsign, tail_id, flight_date, scheduled_departure),
    CHECK  (status != 'unknown')
);

-- Forced, time-driven closures. At most one per leg.
CREATE TABLE IF NOT EXISTS closures (
    closure_id      INTEGER PRIMARY KEY AUTOINCREMENT,
    unique_key      TEXT NOT NULL REFERENCES legs(unique_key),
    previous_status TEXT NOT NULL,
    silent_since    TEXT NOT NULL,
    closed_at       TEXT NOT NULL,
    UNIQUE (unique_key)
);

-- Live snapshots are strictly append-only.
CREATE TABLE IF NOT EXISTS live_snapshots (
    snapshot_id   TEXT PRIMARY KEY,
    request_id    TEXT NOT NULL,
    unique_key    TEXT NOT NULL,
    observed_at   TEXT NOT NULL,
    longitude     REAL NOT NULL,
    latitude      REAL NOT NULL,
    baro_altitude REAL,
    geo_altitude  REAL,
    on_ground     INTEGER NOT NULL,
    velocity      REAL,
    vertical_rate REAL,
    weather       TEXT NOT NULL DEFAULT '{}'   -- JSON-encoded Weather
);

CREATE INDEX IF NOT EXISTS legs_service_idx
    ON legs(callsign, tail_id, flight_date, scheduled_departure);
CREATE INDEX IF NOT EXISTS legs_open_idx      ON legs(status, last_update);
CREATE INDEX IF NOT EXISTS snapshots_leg_idx  ON live_snapshots(unique_key, observed_at);

PRAGMA user_version = 1;
";
