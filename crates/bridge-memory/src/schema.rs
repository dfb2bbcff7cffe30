//! SQL DDL for the memory database.
//! WAL mode enabled at connection time.

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Table definitions. Rules live in their own table so appends are a single
/// idempotent `INSERT OR IGNORE`.
pub const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS memory_records (
    key TEXT PRIMARY KEY,
    summary TEXT NOT NULL DEFAULT '',
    user_name TEXT,
    updated_at TEXT
);

CREATE TABLE IF NOT EXISTS memory_rules (
    key TEXT NOT NULL,
    rule TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (key, rule)
);
";

/// Connection pragmas.
pub const PRAGMAS: &str = r"
PRAGMA journal_mode = WAL;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;
";
