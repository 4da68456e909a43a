//! User commands and the read-only status surface.

use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;

use crate::notify::AuditSink;
use crate::state::membership;
use crate::state::AutoRunStore;
use crate::types::{AgentType, IncludedAgent};

/// Exposed scheduler state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoRunStatus {
    pub enabled: bool,
    /// Rotation order, restricted to configured agents.
    pub included_agents: Vec<IncludedAgent>,
    /// Configured agents outside the rotation set.
    pub excluded_agents: Vec<AgentType>,
    pub current_agent: Option<AgentType>,
}

/// Store mutations triggered by the user, each recorded in the audit log.
#[derive(Clone)]
pub struct Commands {
    store: AutoRunStore,
    audit: Arc<dyn AuditSink>,
}

impl Commands {
    pub fn new(store: AutoRunStore, audit: Arc<dyn AuditSink>) -> Self {
        Self { store, audit }
    }

    pub async fn set_enabled(&self, enabled: bool) -> Result<()> {
        self.store.set_enabled(enabled).await?;
        self.audit.log(&format!("enabled set to {enabled}")).await;
        Ok(())
    }

    pub async fn include_agent(&self, agent_type: &AgentType, configured: &[AgentType]) -> Result<bool> {
        let changed = self.store.include_agent(agent_type, configured).await?;
        if changed {
            self.audit.log(&format!("included {agent_type}")).await;
        }
        Ok(changed)
    }

    pub async fn exclude_agent(&self, agent_type: &AgentType) -> Result<bool> {
        let changed = self.store.exclude_agent(agent_type).await?;
        if changed {
            self.audit.log(&format!("excluded {agent_type}")).await;
        }
        Ok(changed)
    }

    pub async fn status(&self, configured: &[AgentType]) -> Result<AutoRunStatus> {
        let state = self.store.load().await?;
        let included_agents = membership::ordered_included(&state.included_agents, configured);
        let excluded_agents = membership::excluded(&included_agents, configured);
        Ok(AutoRunStatus {
            enabled: state.enabled,
            included_agents,
            excluded_agents,
            current_agent: state.current_agent,
        })
    }
}
