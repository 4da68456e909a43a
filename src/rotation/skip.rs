//! Deduplicated skip notifications.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::notify::{skipped_message, AuditSink, Notifier};
use crate::types::{reason, AgentType};

/// Notifies once per (agent, reason); a changed reason notifies again.
///
/// Reasons caused by data still loading are audited but never shown to the user.
pub struct SkipNotifier {
    notifier: Arc<dyn Notifier>,
    audit: Arc<dyn AuditSink>,
    last_reason: Mutex<HashMap<AgentType, String>>,
}

impl SkipNotifier {
    pub fn new(notifier: Arc<dyn Notifier>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            notifier,
            audit,
            last_reason: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` when a notification was emitted.
    pub async fn notify_skip_once(
        &self,
        agent_type: &AgentType,
        display_name: &str,
        reason: Option<&str>,
    ) -> bool {
        let Some(reason) = reason else {
            return false;
        };

        {
            let mut last = self
                .last_reason
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if last.get(agent_type).map(String::as_str) == Some(reason) {
                return false;
            }
            last.insert(agent_type.clone(), reason.to_string());
        }

        self.audit.log(&format!("skip {agent_type}: {reason}")).await;
        if reason::is_transient(reason) {
            return false;
        }
        self.notifier
            .notify(&skipped_message(display_name), Some(reason))
            .await;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{RecordingAudit, RecordingNotifier};

    fn skip_notifier() -> (SkipNotifier, Arc<RecordingNotifier>, Arc<RecordingAudit>) {
        let notifier = Arc::new(RecordingNotifier::default());
        let audit = Arc::new(RecordingAudit::default());
        (
            SkipNotifier::new(notifier.clone(), audit.clone()),
            notifier,
            audit,
        )
    }

    #[tokio::test]
    async fn test_repeated_reason_notifies_once() {
        let (skips, notifier, _) = skip_notifier();
        let trader = AgentType::from("trader");

        assert!(skips.notify_skip_once(&trader, "Trader", Some("Evicted")).await);
        assert!(!skips.notify_skip_once(&trader, "Trader", Some("Evicted")).await);
        assert!(!skips.notify_skip_once(&trader, "Trader", Some("Evicted")).await);

        assert_eq!(
            notifier.sent(),
            vec![("Agent Trader was skipped".to_string(), Some("Evicted".to_string()))]
        );
    }

    #[tokio::test]
    async fn test_changed_reason_notifies_again() {
        let (skips, notifier, _) = skip_notifier();
        let trader = AgentType::from("trader");

        skips.notify_skip_once(&trader, "Trader", Some("Evicted")).await;
        skips.notify_skip_once(&trader, "Trader", Some("Low balance")).await;
        skips.notify_skip_once(&trader, "Trader", Some("Low balance")).await;

        let bodies: Vec<_> = notifier.sent().into_iter().map(|(_, b)| b).collect();
        assert_eq!(bodies, vec![Some("Evicted".to_string()), Some("Low balance".to_string())]);
    }

    #[tokio::test]
    async fn test_missing_or_transient_reason_not_shown() {
        let (skips, notifier, audit) = skip_notifier();
        let trader = AgentType::from("trader");

        assert!(!skips.notify_skip_once(&trader, "Trader", None).await);
        assert!(!skips.notify_skip_once(&trader, "Trader", Some("Safe data loading")).await);

        assert!(notifier.sent().is_empty());
        assert_eq!(audit.lines(), vec!["skip trader: Safe data loading"]);
    }

    #[tokio::test]
    async fn test_dedup_is_per_agent() {
        let (skips, notifier, _) = skip_notifier();

        skips.notify_skip_once(&"a".into(), "A", Some("Evicted")).await;
        skips.notify_skip_once(&"b".into(), "B", Some("Evicted")).await;

        assert_eq!(notifier.sent().len(), 2);
    }
}
