//! Configuration schema for autorun.toml.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::types::AgentType;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoRunConfig {
    /// Base URL of the local deployment middleware.
    pub middleware_url: String,

    /// Control-panel endpoint serving the cached eligibility signals.
    pub signals_url: String,

    /// Geo-eligibility lookup endpoint; empty disables the lookup (treated as unrestricted).
    pub geo_eligibility_url: String,

    /// Path to SQLite database.
    pub db_path: String,

    /// Log level (debug, info, warn, error).
    pub log_level: String,

    /// Seconds between daemon refresh ticks.
    pub refresh_interval_secs: u64,

    /// JSON-RPC endpoints keyed by middleware chain name (custody owner lookups).
    pub rpc_urls: BTreeMap<String, String>,

    /// Lifecycle timings.
    pub timing: TimingConfig,

    /// Catalog of agent kinds this installation knows how to run.
    pub agents: Vec<AgentConfig>,
}

impl Default for AutoRunConfig {
    fn default() -> Self {
        Self {
            middleware_url: "http://localhost:8000".into(),
            signals_url: "http://localhost:8000/api/v2/autorun/signals".into(),
            geo_eligibility_url: String::new(),
            db_path: "~/.autorun/state.db".into(),
            log_level: "info".into(),
            refresh_interval_secs: 5,
            rpc_urls: BTreeMap::new(),
            timing: TimingConfig::default(),
            agents: Vec::new(),
        }
    }
}

impl AutoRunConfig {
    /// Resolve a path that may contain `~` to an absolute path.
    pub fn resolve_path(&self, path: &str) -> String {
        shellexpand::tilde(path).into_owned()
    }

    /// Resolved database path.
    pub fn resolved_db_path(&self) -> String {
        self.resolve_path(&self.db_path)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }

    /// Catalog entry for an agent type.
    pub fn agent(&self, agent_type: &AgentType) -> Option<&AgentConfig> {
        self.agents.iter().find(|a| &a.agent_type == agent_type)
    }
}

/// Polling, cooldown and retry timings for the lifecycle driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Deployment status poll interval.
    pub poll_interval_secs: u64,
    /// Upper bound on waiting for Deployed / Stopped.
    pub status_timeout_secs: u64,
    /// Wait between stopping one agent and starting the next.
    pub cooldown_secs: u64,
    /// Delay applied after each failed start attempt; its length is the attempt count.
    pub retry_backoff_secs: Vec<u64>,
    /// After a stop times out, the same agent is not stopped again for this long.
    pub stop_retry_backoff_secs: u64,
    /// After a rotation ends with nothing started, triggers wait this long.
    pub rescan_delay_secs: u64,
    /// How long `run` waits for an in-flight rotation on shutdown.
    pub shutdown_grace_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            status_timeout_secs: 120,
            cooldown_secs: 30,
            retry_backoff_secs: vec![15, 30, 60],
            stop_retry_backoff_secs: 600,
            rescan_delay_secs: 600,
            shutdown_grace_secs: 300,
        }
    }
}

impl TimingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn status_timeout(&self) -> Duration {
        Duration::from_secs(self.status_timeout_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn stop_retry_backoff(&self) -> Duration {
        Duration::from_secs(self.stop_retry_backoff_secs)
    }

    pub fn rescan_delay(&self) -> Duration {
        Duration::from_secs(self.rescan_delay_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn backoff(&self) -> impl Iterator<Item = Duration> + '_ {
        self.retry_backoff_secs.iter().map(|s| Duration::from_secs(*s))
    }
}

/// One agent kind in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub agent_type: AgentType,
    pub display_name: String,
    /// Public id the middleware reports for services of this kind.
    pub service_public_id: String,
    /// Middleware chain name the service is homed on.
    pub home_chain: String,
    pub default_staking_program_id: String,
    pub under_construction: bool,
    pub enabled: bool,
    pub geo_restricted: bool,
    /// Environment variables that must be set before the agent can start.
    pub required_env: Vec<String>,
    /// Template fields the deployed service must match before start.
    pub template: Option<toml::Table>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            agent_type: AgentType::new(""),
            display_name: String::new(),
            service_public_id: String::new(),
            home_chain: String::new(),
            default_staking_program_id: String::new(),
            under_construction: false,
            enabled: true,
            geo_restricted: false,
            required_env: Vec::new(),
            template: None,
        }
    }
}
