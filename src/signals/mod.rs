//! Eligibility inputs gathered from independently refreshed sources.
//!
//! A [`SignalSnapshot`] is immutable once captured; eligibility is always
//! recomputed from a whole snapshot, never from partially updated fields.

pub mod source;

pub use source::{HttpSignalSource, SignalSource};

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::custody::CustodySnapshot;
use crate::types::{AgentType, StakingState};

/// Staking rewards status for the current epoch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardsStatus {
    pub is_eligible_for_rewards: Option<bool>,
}

/// Staking state of one service in its program.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakingDetails {
    pub service_staking_state: StakingState,
    /// Unix seconds at which the current staking period began.
    pub service_staking_start_time: Option<i64>,
}

/// Capacity and rules of a staking contract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractDetails {
    pub service_ids: Option<Vec<u64>>,
    pub max_num_services: Option<u64>,
    /// Seconds a service must stay staked before it may re-stake after eviction.
    pub minimum_staking_duration: Option<i64>,
}

/// Per-agent signals; `None` fields have not loaded yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AgentSignals {
    pub rewards: Option<RewardsStatus>,
    pub staking: Option<StakingDetails>,
    pub contract: Option<ContractDetails>,
}

/// Funding/refill sufficiency across services.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FundingSignals {
    /// Balance and refill requirements are still being computed.
    pub loading: bool,
    /// Service config ids whose funding requirements are met.
    pub allowed_services: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeoStatus {
    Allowed,
    Restricted,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GeoEntry {
    pub status: GeoStatus,
}

/// Geo-eligibility lookup response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GeoEligibility {
    #[serde(default)]
    pub eligibility: BTreeMap<String, GeoEntry>,
}

impl GeoEligibility {
    pub fn is_allowed(&self, agent_type: &AgentType) -> bool {
        self.eligibility
            .get(agent_type.as_str())
            .is_some_and(|e| e.status == GeoStatus::Allowed)
    }
}

/// Everything the evaluator needs, captured at one instant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalSnapshot {
    pub agents: BTreeMap<AgentType, AgentSignals>,
    /// `None` until the geo lookup has answered.
    pub geo: Option<GeoEligibility>,
    /// `None` until funding requirements have been reported.
    pub funding: Option<FundingSignals>,
    /// `None` until custody wallets have loaded.
    pub custody: Option<CustodySnapshot>,
    /// Unix seconds at capture time.
    pub now: i64,
}

impl SignalSnapshot {
    pub fn agent(&self, agent_type: &AgentType) -> Option<&AgentSignals> {
        self.agents.get(agent_type)
    }
}
