//! SQLite database wrapper with WAL mode and migration support.

use crate::state::schema;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::info;

/// A stored audit-log line.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub id: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// A stored user notification.
#[derive(Debug, Clone)]
pub struct NotificationEntry {
    pub id: String,
    pub title: String,
    pub body: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The auto-run state database.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database at the given path and run migrations.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).context("Failed to open SQLite database")?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let mut db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let mut db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Run schema creation and migrations.
    fn migrate(&mut self) -> Result<()> {
        let version = self.schema_version();

        if version == 0 {
            info!("Creating database schema v{}", schema::SCHEMA_VERSION);
            self.conn
                .execute_batch(schema::CREATE_SCHEMA)
                .context("Failed to create schema")?;
            self.conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                params![schema::SCHEMA_VERSION],
            )?;
        } else {
            if version < 2 {
                info!("Migrating database v1 -> v2");
                self.conn.execute_batch(schema::MIGRATE_V1_TO_V2)?;
            }
            if version < schema::SCHEMA_VERSION {
                self.conn.execute(
                    "UPDATE schema_version SET version = ?1",
                    params![schema::SCHEMA_VERSION],
                )?;
            }
        }

        Ok(())
    }

    /// Get the current schema version (0 if uninitialized).
    fn schema_version(&self) -> u32 {
        self.conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .unwrap_or(0)
    }

    // -----------------------------------------------------------------------
    // Key-value store
    // -----------------------------------------------------------------------

    /// Get a value from the KV store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Set a value in the KV store (upsert).
    pub fn kv_set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = ?2",
            params![key, value],
        )?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Audit log
    // -----------------------------------------------------------------------

    /// Append a line to the audit log.
    pub fn append_log(&self, message: &str, at: DateTime<Utc>) -> Result<()> {
        let id = ulid::Ulid::new().to_string();
        self.conn.execute(
            "INSERT INTO autorun_log (id, message, created_at) VALUES (?1, ?2, ?3)",
            params![id, message, at.to_rfc3339()],
        )?;
        Ok(())
    }

    /// Most recent audit lines, oldest first.
    pub fn recent_log(&self, limit: u32) -> Result<Vec<LogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, message, created_at FROM
               (SELECT rowid AS seq, id, message, created_at FROM autorun_log
                ORDER BY rowid DESC LIMIT ?1)
             ORDER BY seq",
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            Ok(LogEntry {
                id: row.get(0)?,
                message: row.get(1)?,
                created_at: parse_timestamp(row.get::<_, String>(2)?),
            })
        })?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    // -----------------------------------------------------------------------
    // Notifications
    // -----------------------------------------------------------------------

    /// Record a notification shown to the user.
    pub fn save_notification(&self, title: &str, body: Option<&str>) -> Result<()> {
        let id = ulid::Ulid::new().to_string();
        self.conn.execute(
            "INSERT INTO notifications (id, title, body, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id, title, body, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// All notifications, oldest first.
    pub fn notifications(&self) -> Result<Vec<NotificationEntry>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, title, body, created_at FROM notifications ORDER BY rowid")?;
        let rows = stmt.query_map([], |row| {
            Ok(NotificationEntry {
                id: row.get(0)?,
                title: row.get(1)?,
                body: row.get(2)?,
                created_at: parse_timestamp(row.get::<_, String>(3)?),
            })
        })?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }
}

fn parse_timestamp(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
