//! Append-only audit log of scheduler transitions.
//!
//! Every rotation start/stop/cooldown/retry/failure and every user toggle is
//! recorded with an `autorun:` prefix so the trail can be filtered from other
//! application logs.
//!
//! DB writes are offloaded via `spawn_blocking` so sqlite I/O does not
//! block the async runtime.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::state::Database;

/// Prefix prepended to every audit line.
pub const LOG_PREFIX: &str = "autorun:";

/// Sink for timestamped audit messages.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Record one message. Failures are swallowed by the sink.
    async fn log(&self, message: &str);
}

/// Audit log persisted in the `autorun_log` table.
pub struct AuditLog {
    db: Arc<Mutex<Database>>,
}

impl AuditLog {
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }

    /// Persist a line via spawn_blocking to avoid blocking the async runtime.
    async fn persist(&self, line: String) -> Result<()> {
        let db = self.db.clone();
        let at = Utc::now();
        tokio::task::spawn_blocking(move || {
            let db = db.blocking_lock();
            db.append_log(&line, at)
        })
        .await??;
        Ok(())
    }
}

#[async_trait]
impl AuditSink for AuditLog {
    async fn log(&self, message: &str) {
        let line = format!("{LOG_PREFIX} {message}");
        info!("{}", line);
        if let Err(e) = self.persist(line).await {
            warn!("Failed to persist audit line: {e}");
        }
    }
}
