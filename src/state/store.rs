//! Persistent store interface and the auto-run state glue built on it.
//!
//! SQLite access is offloaded via `spawn_blocking` so store I/O does not
//! block the async runtime.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::state::membership;
use crate::state::Database;
use crate::types::{AgentType, AutoRunState, IncludedAgent};

/// Key holding the serialized [`AutoRunState`].
pub const AUTO_RUN_KEY: &str = "autoRun";

/// Key-value persistence consumed by the scheduler.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// [`StateStore`] backed by the SQLite `kv` table.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Mutex<Database>>,
}

impl SqliteStore {
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl StateStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let db = self.db.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || db.blocking_lock().kv_get(&key)).await?
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let db = self.db.clone();
        let key = key.to_string();
        let value = value.to_string();
        tokio::task::spawn_blocking(move || db.blocking_lock().kv_set(&key, &value)).await?
    }
}

/// Read-modify-write access to the persisted [`AutoRunState`].
#[derive(Clone)]
pub struct AutoRunStore {
    store: Arc<dyn StateStore>,
}

impl AutoRunStore {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// Current persisted state (defaults when never written).
    pub async fn load(&self) -> Result<AutoRunState> {
        match self.store.get(AUTO_RUN_KEY).await? {
            Some(raw) => serde_json::from_str(&raw).context("Failed to parse persisted autoRun state"),
            None => Ok(AutoRunState::default()),
        }
    }

    async fn save(&self, state: &AutoRunState) -> Result<()> {
        let raw = serde_json::to_string(state).context("Failed to serialize autoRun state")?;
        self.store.set(AUTO_RUN_KEY, &raw).await
    }

    /// Apply `f` to the latest persisted state; writes only when `f` reports a change.
    pub async fn update<F>(&self, f: F) -> Result<(AutoRunState, bool)>
    where
        F: FnOnce(&mut AutoRunState) -> bool,
    {
        let mut state = self.load().await?;
        let changed = f(&mut state);
        if changed {
            self.save(&state).await?;
        }
        Ok((state, changed))
    }

    /// Register the configured agents; never-seen types are appended to the rotation set.
    ///
    /// The first call on a fresh store seeds the set in discovery order.
    pub async fn sync_discovered(&self, configured: &[AgentType]) -> Result<Vec<AgentType>> {
        let mut appended = Vec::new();
        self.update(|state| {
            let known: HashSet<AgentType> = state
                .known_agents
                .iter()
                .chain(state.included_agents.iter().map(|i| &i.agent_type))
                .cloned()
                .collect();

            let mut seen = HashSet::new();
            appended = configured
                .iter()
                .filter(|a| !known.contains(*a) && seen.insert((*a).clone()))
                .cloned()
                .collect();

            let untracked: Vec<AgentType> = configured
                .iter()
                .filter(|a| !state.known_agents.contains(*a))
                .cloned()
                .collect();
            if untracked.is_empty() && appended.is_empty() {
                return false;
            }

            state.included_agents = membership::append_agents(&state.included_agents, &appended);
            for agent in untracked {
                if !state.known_agents.contains(&agent) {
                    state.known_agents.push(agent);
                }
            }
            true
        })
        .await?;
        Ok(appended)
    }

    pub async fn set_enabled(&self, enabled: bool) -> Result<bool> {
        let (_, changed) = self
            .update(|state| {
                let changed = state.enabled != enabled;
                state.enabled = enabled;
                changed
            })
            .await?;
        Ok(changed)
    }

    /// Append `agent_type` at the end of the rotation set.
    ///
    /// No-op for unconfigured or already-included agents.
    pub async fn include_agent(&self, agent_type: &AgentType, configured: &[AgentType]) -> Result<bool> {
        if !configured.contains(agent_type) {
            return Ok(false);
        }
        let (_, changed) = self
            .update(|state| {
                if state.included_agents.iter().any(|i| &i.agent_type == agent_type) {
                    return false;
                }
                state.included_agents =
                    membership::append_agents(&state.included_agents, std::slice::from_ref(agent_type));
                if !state.known_agents.contains(agent_type) {
                    state.known_agents.push(agent_type.clone());
                }
                true
            })
            .await?;
        Ok(changed)
    }

    /// Remove `agent_type` from the rotation set; no-op when not included.
    pub async fn exclude_agent(&self, agent_type: &AgentType) -> Result<bool> {
        let (_, changed) = self
            .update(|state| {
                let before = state.included_agents.len();
                state.included_agents = membership::remove_agent(&state.included_agents, agent_type);
                state.included_agents.len() != before
            })
            .await?;
        Ok(changed)
    }

    pub async fn set_current_agent(&self, agent_type: Option<&AgentType>) -> Result<bool> {
        let (_, changed) = self
            .update(|state| {
                if state.current_agent.as_ref() == agent_type {
                    return false;
                }
                state.current_agent = agent_type.cloned();
                true
            })
            .await?;
        Ok(changed)
    }
}
