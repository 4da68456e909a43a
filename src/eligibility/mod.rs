//! Eligibility evaluation.
//!
//! Checks run in a fixed priority order; the first failing check supplies the
//! reason and later checks are not consulted. The rewards flag is reported
//! whatever the verdict.

pub mod staking;

pub use staking::{staking_status, StakingStatus};

use crate::custody::{self, CustodySnapshot};
use crate::signals::SignalSnapshot;
use crate::types::{reason, AgentMeta, AgentType, Eligibility, EligibilityMap};

/// Configured agents and their verdicts, recomputed together from one snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EligibilityView {
    pub agents: Vec<AgentMeta>,
    pub eligibility: EligibilityMap,
    pub custody: Option<CustodySnapshot>,
}

impl EligibilityView {
    pub fn compute(agents: Vec<AgentMeta>, snapshot: &SignalSnapshot) -> Self {
        let eligibility = evaluate_all(&agents, snapshot);
        Self {
            agents,
            eligibility,
            custody: snapshot.custody.clone(),
        }
    }

    pub fn meta(&self, agent_type: &AgentType) -> Option<&AgentMeta> {
        self.agents.iter().find(|m| &m.agent_type == agent_type)
    }

    pub fn get(&self, agent_type: &AgentType) -> Option<&Eligibility> {
        self.eligibility.get(agent_type)
    }

    pub fn agent_types(&self) -> Vec<AgentType> {
        self.agents.iter().map(|m| m.agent_type.clone()).collect()
    }

    pub fn display_name(&self, agent_type: &AgentType) -> String {
        self.meta(agent_type)
            .map_or_else(|| agent_type.to_string(), |m| m.display_name().to_string())
    }
}

/// Evaluate one agent against a signal snapshot.
pub fn evaluate(meta: &AgentMeta, snapshot: &SignalSnapshot) -> Eligibility {
    let signals = snapshot.agent(&meta.agent_type);
    let rewards = signals
        .and_then(|s| s.rewards.as_ref())
        .and_then(|r| r.is_eligible_for_rewards);

    match blocking_reason(meta, snapshot) {
        Some(reason) => Eligibility::blocked(reason, rewards),
        None => Eligibility::runnable(rewards),
    }
}

fn blocking_reason(meta: &AgentMeta, snapshot: &SignalSnapshot) -> Option<&'static str> {
    let config = &meta.config;

    if config.under_construction {
        return Some(reason::UNDER_CONSTRUCTION);
    }

    // Unloaded geo data does not restrict.
    if config.geo_restricted {
        if let Some(geo) = &snapshot.geo {
            if !geo.is_allowed(&meta.agent_type) {
                return Some(reason::REGION_RESTRICTED);
            }
        }
    }

    let signals = snapshot.agent(&meta.agent_type);
    let status = staking_status(
        signals.and_then(|s| s.staking.as_ref()),
        signals.and_then(|s| s.contract.as_ref()),
        snapshot.now,
    );
    if status.is_evicted && !status.is_eligible_for_staking {
        return Some(reason::EVICTED);
    }
    if status.has_free_slot == Some(false) && !status.is_staked {
        return Some(reason::NO_AVAILABLE_SLOTS);
    }

    if let Some(reason) = custody::resolve(&meta.chain_id, snapshot.custody.as_ref()).reason() {
        return Some(reason);
    }

    let missing_env = config
        .required_env
        .iter()
        .any(|key| meta.env.get(key).map_or(true, |v| v.is_empty()));
    if missing_env {
        return Some(reason::UPDATE_REQUIRED);
    }

    match &snapshot.funding {
        None => Some(reason::REQUIREMENTS_LOADING),
        Some(funding) if funding.allowed_services.contains(&meta.service_id) => None,
        Some(funding) if funding.loading => Some(reason::REQUIREMENTS_LOADING),
        Some(_) => Some(reason::LOW_BALANCE),
    }
}

/// Recompute the whole eligibility map from one snapshot.
pub fn evaluate_all(metas: &[AgentMeta], snapshot: &SignalSnapshot) -> EligibilityMap {
    metas
        .iter()
        .map(|meta| (meta.agent_type.clone(), evaluate(meta, snapshot)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentConfig;
    use crate::custody::{CustodySnapshot, CustodyWallet};
    use crate::signals::{
        AgentSignals, ContractDetails, FundingSignals, GeoEligibility, GeoEntry, GeoStatus,
        RewardsStatus, StakingDetails,
    };
    use crate::types::{AgentType, StakingState};
    use std::collections::BTreeMap;

    const NOW: i64 = 1_700_100_000;

    fn meta(name: &str) -> AgentMeta {
        AgentMeta {
            agent_type: name.into(),
            config: AgentConfig {
                agent_type: name.into(),
                home_chain: "gnosis".into(),
                ..AgentConfig::default()
            },
            service_id: format!("sc-{name}"),
            chain_id: "gnosis".into(),
            staking_program_id: "pearl_beta".into(),
            multisig: None,
            token_id: None,
            env: BTreeMap::new(),
            template: serde_json::Map::new(),
        }
    }

    /// A snapshot in which `name` passes every check.
    fn healthy(name: &str) -> SignalSnapshot {
        let mut agents = BTreeMap::new();
        agents.insert(
            AgentType::from(name),
            AgentSignals {
                rewards: Some(RewardsStatus {
                    is_eligible_for_rewards: Some(false),
                }),
                staking: Some(StakingDetails {
                    service_staking_state: StakingState::Staked,
                    service_staking_start_time: Some(NOW - 100),
                }),
                contract: Some(ContractDetails {
                    service_ids: Some(vec![1]),
                    max_num_services: Some(5),
                    minimum_staking_duration: Some(3600),
                }),
            },
        );
        SignalSnapshot {
            agents,
            geo: None,
            funding: Some(FundingSignals {
                loading: false,
                allowed_services: [format!("sc-{name}")].into(),
            }),
            custody: Some(CustodySnapshot {
                primary_signer: Some("0xprimary".into()),
                wallets: vec![CustodyWallet {
                    address: "0xsafe".into(),
                    chain_id: "gnosis".into(),
                    owners: vec!["0xprimary".into()],
                }],
            }),
            now: NOW,
        }
    }

    fn agent_signals<'a>(snap: &'a mut SignalSnapshot, name: &str) -> &'a mut AgentSignals {
        snap.agents.get_mut(&AgentType::from(name)).unwrap()
    }

    #[test]
    fn test_healthy_agent_is_runnable() {
        let e = evaluate(&meta("trader"), &healthy("trader"));
        assert!(e.can_run);
        assert_eq!(e.reason, None);
        assert_eq!(e.is_eligible_for_rewards, Some(false));
    }

    #[test]
    fn test_under_construction_wins_over_everything() {
        let mut m = meta("trader");
        m.config.under_construction = true;
        let mut snap = healthy("trader");
        snap.funding = None;
        snap.custody = None;
        assert_eq!(evaluate(&m, &snap).reason.as_deref(), Some("Under construction"));
    }

    #[test]
    fn test_geo_restriction_fails_open_when_unloaded() {
        let mut m = meta("trader");
        m.config.geo_restricted = true;
        let mut snap = healthy("trader");
        assert!(evaluate(&m, &snap).can_run);

        snap.geo = Some(GeoEligibility {
            eligibility: [(
                "trader".to_string(),
                GeoEntry {
                    status: GeoStatus::Restricted,
                },
            )]
            .into(),
        });
        assert_eq!(evaluate(&m, &snap).reason.as_deref(), Some("Region restricted"));

        snap.geo = Some(GeoEligibility::default());
        assert_eq!(evaluate(&m, &snap).reason.as_deref(), Some("Region restricted"));
    }

    #[test]
    fn test_eviction_precedes_slots() {
        let mut snap = healthy("trader");
        let signals = agent_signals(&mut snap, "trader");
        signals.staking = Some(StakingDetails {
            service_staking_state: StakingState::Evicted,
            service_staking_start_time: Some(NOW - 10),
        });
        signals.contract.as_mut().unwrap().service_ids = Some(vec![1, 2, 3, 4, 5]);
        assert_eq!(evaluate(&meta("trader"), &snap).reason.as_deref(), Some("Evicted"));
    }

    #[test]
    fn test_full_contract_blocks_only_unstaked_agents() {
        let mut snap = healthy("trader");
        agent_signals(&mut snap, "trader")
            .contract
            .as_mut()
            .unwrap()
            .service_ids = Some(vec![1, 2, 3, 4, 5]);
        assert!(evaluate(&meta("trader"), &snap).can_run);

        agent_signals(&mut snap, "trader").staking = Some(StakingDetails {
            service_staking_state: StakingState::Unstaked,
            service_staking_start_time: None,
        });
        assert_eq!(
            evaluate(&meta("trader"), &snap).reason.as_deref(),
            Some("No available slots")
        );
    }

    #[test]
    fn test_custody_reason_passes_through() {
        let mut m = meta("trader");
        m.chain_id = "base".into();
        let snap = healthy("trader");
        assert_eq!(
            evaluate(&m, &snap).reason.as_deref(),
            Some("Backup signer required")
        );

        let mut unloaded = healthy("trader");
        unloaded.custody = None;
        assert_eq!(
            evaluate(&meta("trader"), &unloaded).reason.as_deref(),
            Some("Safe data loading")
        );
    }

    #[test]
    fn test_missing_required_env_needs_update() {
        let mut m = meta("memeooorr");
        m.config.required_env = vec!["TWEEPY_BEARER_TOKEN".into()];
        let snap = healthy("memeooorr");
        assert_eq!(evaluate(&m, &snap).reason.as_deref(), Some("Update required"));

        m.env.insert("TWEEPY_BEARER_TOKEN".into(), String::new());
        assert_eq!(evaluate(&m, &snap).reason.as_deref(), Some("Update required"));

        m.env.insert("TWEEPY_BEARER_TOKEN".into(), "token".into());
        assert!(evaluate(&m, &snap).can_run);
    }

    #[test]
    fn test_funding_loading_versus_low_balance() {
        let mut snap = healthy("trader");
        snap.funding = Some(FundingSignals {
            loading: true,
            allowed_services: Default::default(),
        });
        assert_eq!(
            evaluate(&meta("trader"), &snap).reason.as_deref(),
            Some("Requirements loading")
        );

        snap.funding = Some(FundingSignals::default());
        assert_eq!(evaluate(&meta("trader"), &snap).reason.as_deref(), Some("Low balance"));

        snap.funding = None;
        assert_eq!(
            evaluate(&meta("trader"), &snap).reason.as_deref(),
            Some("Requirements loading")
        );
    }

    #[test]
    fn test_rewards_flag_carried_when_blocked() {
        let mut snap = healthy("trader");
        agent_signals(&mut snap, "trader").rewards = Some(RewardsStatus {
            is_eligible_for_rewards: Some(true),
        });
        snap.funding = Some(FundingSignals::default());

        let e = evaluate(&meta("trader"), &snap);
        assert!(!e.can_run);
        assert_eq!(e.is_eligible_for_rewards, Some(true));
    }

    #[test]
    fn test_evaluate_all_covers_every_agent() {
        let metas = vec![meta("trader"), meta("optimus")];
        let map = evaluate_all(&metas, &healthy("trader"));
        assert_eq!(map.len(), 2);
        assert!(map[&AgentType::from("trader")].can_run);
        // optimus has no funding allowance in this snapshot
        assert_eq!(map[&AgentType::from("optimus")].reason.as_deref(), Some("Low balance"));
    }
}
