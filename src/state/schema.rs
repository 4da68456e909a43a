//! Database schema definitions and migrations.

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 2;

/// Full DDL for the auto-run state database.
pub const CREATE_SCHEMA: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);

-- Key-value store (the `autoRun` key holds the persisted scheduler state)
CREATE TABLE IF NOT EXISTS kv (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Append-only audit trail of scheduler transitions
CREATE TABLE IF NOT EXISTS autorun_log (
    id         TEXT PRIMARY KEY,
    message    TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- User-facing notifications (skip / start failure)
CREATE TABLE IF NOT EXISTS notifications (
    id         TEXT PRIMARY KEY,
    title      TEXT NOT NULL,
    body       TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_autorun_log_created ON autorun_log(created_at);
CREATE INDEX IF NOT EXISTS idx_notifications_created ON notifications(created_at);
"#;

/// Migration from version 1 to version 2.
pub const MIGRATE_V1_TO_V2: &str = r#"
CREATE TABLE IF NOT EXISTS notifications (
    id         TEXT PRIMARY KEY,
    title      TEXT NOT NULL,
    body       TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE INDEX IF NOT EXISTS idx_notifications_created ON notifications(created_at);
"#;
