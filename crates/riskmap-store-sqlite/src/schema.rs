//! SQL schema for the riskmap SQLite store.
//!
//! [`PRAGMAS`] run on every connection. [`SCHEMA`] runs only while the
//! file's `PRAGMA user_version` is below [`SCHEMA_VERSION`]; a file written by
//! a newer schema is refused.

/// The version [`SCHEMA`] leaves in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 1;

/// Per-connection settings.
pub const PRAGMAS: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
";

/// Version 1 DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "

-- One row per monitored jurisdiction. The derived label columns are NULL
-- until the first reclassification and are only written together.
CREATE TABLE IF NOT EXISTS countries (
    name            TEXT PRIMARY KEY,
    score           INTEGER CHECK (score IS NULL OR score BETWEEN 0 AND 100),
    risk_level      TEXT,
    vigilance_level TEXT,
    list_color      TEXT,
    tier            TEXT,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

-- A missing row means the flag has never been set.
CREATE TABLE IF NOT EXISTS country_flags (
    country TEXT NOT NULL REFERENCES countries(name),
    flag    TEXT NOT NULL,
    value   TEXT NOT NULL CHECK (value IN ('YES', 'NO')),
    PRIMARY KEY (country, flag)
);

-- Strictly append-only.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS changes (
    change_id   TEXT PRIMARY KEY,
    run_id      TEXT NOT NULL,
    country     TEXT NOT NULL,
    field       TEXT NOT NULL,
    old_value   TEXT,
    new_value   TEXT,
    recorded_at TEXT NOT NULL   -- ISO 8601 UTC
);

CREATE INDEX IF NOT EXISTS changes_country_idx  ON changes(country);
CREATE INDEX IF NOT EXISTS changes_run_idx      ON changes(run_id);
CREATE INDEX IF NOT EXISTS changes_recorded_idx ON changes(recorded_at);

PRAGMA user_version = 1;
";
