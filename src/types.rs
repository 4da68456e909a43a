//! Shared types used across the auto-run scheduler.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::config::AgentConfig;
use crate::error::AutoRunError;

// ---------------------------------------------------------------------------
// Agent identity
// ---------------------------------------------------------------------------

/// Identifier of a configured agent kind (one per chain/service combination).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentType(String);

impl AgentType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentType {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Persisted auto-run state
// ---------------------------------------------------------------------------

/// Membership and rank of one agent in the rotation set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncludedAgent {
    pub agent_type: AgentType,
    pub order: i64,
}

/// The durable auto-run state, stored under the `autoRun` key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AutoRunState {
    pub enabled: bool,
    pub included_agents: Vec<IncludedAgent>,
    pub current_agent: Option<AgentType>,
    /// Agent types ever discovered; keeps discovery from re-appending exclusions.
    pub known_agents: Vec<AgentType>,
}

// ---------------------------------------------------------------------------
// Eligibility
// ---------------------------------------------------------------------------

/// Per-agent verdict produced by the eligibility evaluator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Eligibility {
    pub can_run: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_eligible_for_rewards: Option<bool>,
}

impl Eligibility {
    pub fn runnable(is_eligible_for_rewards: Option<bool>) -> Self {
        Self {
            can_run: true,
            reason: None,
            is_eligible_for_rewards,
        }
    }

    pub fn blocked(reason: impl Into<String>, is_eligible_for_rewards: Option<bool>) -> Self {
        Self {
            can_run: false,
            reason: Some(reason.into()),
            is_eligible_for_rewards,
        }
    }

    /// Runnable and has not already earned this epoch's rewards.
    pub fn is_rotation_target(&self) -> bool {
        self.can_run && self.is_eligible_for_rewards != Some(true)
    }
}

pub type EligibilityMap = BTreeMap<AgentType, Eligibility>;

/// Blocking reasons surfaced by the evaluator and custody resolver.
pub mod reason {
    pub const UNDER_CONSTRUCTION: &str = "Under construction";
    pub const REGION_RESTRICTED: &str = "Region restricted";
    pub const EVICTED: &str = "Evicted";
    pub const NO_AVAILABLE_SLOTS: &str = "No available slots";
    pub const BACKUP_SIGNER_REQUIRED: &str = "Backup signer required";
    pub const MULTIPLE_BACKUP_SIGNERS: &str = "Multiple backup signers detected";
    pub const SAFE_DATA_LOADING: &str = "Safe data loading";
    pub const UPDATE_REQUIRED: &str = "Update required";
    pub const REQUIREMENTS_LOADING: &str = "Requirements loading";
    pub const LOW_BALANCE: &str = "Low balance";

    /// Reasons caused by data still loading; they clear on a later refresh.
    pub fn is_transient(reason: &str) -> bool {
        matches!(reason, SAFE_DATA_LOADING | REQUIREMENTS_LOADING)
    }
}

// ---------------------------------------------------------------------------
// Deployment status
// ---------------------------------------------------------------------------

/// Deployment state reported by the middleware (integer-coded on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DeploymentStatus {
    Created,
    Built,
    Deploying,
    Deployed,
    Stopping,
    Stopped,
    Deleted,
}

impl TryFrom<u8> for DeploymentStatus {
    type Error = AutoRunError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Ok(match code {
            0 => Self::Created,
            1 => Self::Built,
            2 => Self::Deploying,
            3 => Self::Deployed,
            4 => Self::Stopping,
            5 => Self::Stopped,
            6 => Self::Deleted,
            other => return Err(AutoRunError::UnknownDeploymentStatus(other)),
        })
    }
}

impl From<DeploymentStatus> for u8 {
    fn from(status: DeploymentStatus) -> Self {
        match status {
            DeploymentStatus::Created => 0,
            DeploymentStatus::Built => 1,
            DeploymentStatus::Deploying => 2,
            DeploymentStatus::Deployed => 3,
            DeploymentStatus::Stopping => 4,
            DeploymentStatus::Stopped => 5,
            DeploymentStatus::Deleted => 6,
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Built => write!(f, "built"),
            Self::Deploying => write!(f, "deploying"),
            Self::Deployed => write!(f, "deployed"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

impl DeploymentStatus {
    /// Whether the service counts as the running agent. A service still
    /// stopping holds the slot until it reaches a stopped state.
    pub fn is_running(self) -> bool {
        matches!(self, Self::Deployed | Self::Deploying | Self::Stopping)
    }

    /// Not deployed and not in transition; nothing left to stop.
    pub fn is_stopped(self) -> bool {
        matches!(self, Self::Stopped | Self::Built | Self::Created | Self::Deleted)
    }
}

// ---------------------------------------------------------------------------
// Staking
// ---------------------------------------------------------------------------

/// Staking state of a service in its staking program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StakingState {
    Unstaked,
    Staked,
    Evicted,
}

// ---------------------------------------------------------------------------
// Agent metadata
// ---------------------------------------------------------------------------

/// Operational context for one configured agent, rebuilt from the deployment list.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentMeta {
    pub agent_type: AgentType,
    pub config: AgentConfig,
    /// Middleware service config id.
    pub service_id: String,
    /// Middleware chain name the service runs on.
    pub chain_id: String,
    pub staking_program_id: String,
    pub multisig: Option<String>,
    pub token_id: Option<u64>,
    /// Environment variables currently set on the service.
    pub env: BTreeMap<String, String>,
    /// Current service template fields (for reconciliation).
    pub template: serde_json::Map<String, serde_json::Value>,
}

impl AgentMeta {
    pub fn display_name(&self) -> &str {
        if self.config.display_name.is_empty() {
            self.agent_type.as_str()
        } else {
            &self.config.display_name
        }
    }
}
