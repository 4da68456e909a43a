//! User-facing notification and audit sinks.

pub mod audit;

pub use audit::{AuditLog, AuditSink, LOG_PREFIX};

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

use crate::state::Database;

/// Fire-and-forget notification sink.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, title: &str, body: Option<&str>);
}

/// Notifier that records to the `notifications` table and the log.
pub struct DbNotifier {
    db: Arc<Mutex<Database>>,
}

impl DbNotifier {
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Notifier for DbNotifier {
    async fn notify(&self, title: &str, body: Option<&str>) {
        warn!("{} {}", title, body.unwrap_or_default());

        let db = self.db.clone();
        let title = title.to_string();
        let body = body.map(str::to_string);
        let result = tokio::task::spawn_blocking(move || {
            db.blocking_lock().save_notification(&title, body.as_deref())
        })
        .await;

        match result {
            Ok(Err(e)) => warn!("Failed to persist notification: {e}"),
            Err(e) => warn!("Notification task failed: {e}"),
            Ok(Ok(())) => {}
        }
    }
}

/// Title and body for an agent skipped during a scan.
pub fn skipped_message(agent_name: &str) -> String {
    format!("Agent {agent_name} was skipped")
}

/// Title and body for an agent whose start retries were exhausted.
pub fn start_failed_message(agent_name: &str) -> (String, &'static str) {
    (format!("Failed to start {agent_name}"), "Moving to next agent.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_db_notifier_persists() {
        let db = Arc::new(Mutex::new(Database::open_memory().unwrap()));
        let notifier = DbNotifier::new(db.clone());

        let (title, body) = start_failed_message("Optimus");
        notifier.notify(&title, Some(body)).await;

        let saved = db.lock().await.notifications().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].title, "Failed to start Optimus");
        assert_eq!(saved[0].body.as_deref(), Some("Moving to next agent."));
    }
}
