//! Staking status derivation.

use crate::signals::{ContractDetails, StakingDetails};
use crate::types::StakingState;

/// Staking facts relevant to whether an agent may (re)start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StakingStatus {
    pub is_evicted: bool,
    pub is_staked: bool,
    /// Not evicted, or evicted but staked for at least the minimum duration.
    pub is_eligible_for_staking: bool,
    /// `None` while contract capacity is unknown.
    pub has_free_slot: Option<bool>,
}

pub fn staking_status(
    staking: Option<&StakingDetails>,
    contract: Option<&ContractDetails>,
    now: i64,
) -> StakingStatus {
    let state = staking.map(|s| s.service_staking_state);
    let is_evicted = state == Some(StakingState::Evicted);
    let is_staked = state == Some(StakingState::Staked);

    let start_time = staking.and_then(|s| s.service_staking_start_time);
    let min_duration = contract.and_then(|c| c.minimum_staking_duration);
    let staked_for_minimum = match (start_time, min_duration) {
        (Some(start), Some(min)) => now - start >= min,
        _ => false,
    };

    let has_free_slot = contract.and_then(|c| match (&c.service_ids, c.max_num_services) {
        (Some(ids), Some(max)) => Some((ids.len() as u64) < max),
        _ => None,
    });

    StakingStatus {
        is_evicted,
        is_staked,
        is_eligible_for_staking: !is_evicted || staked_for_minimum,
        has_free_slot,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_100_000;

    fn staking(state: StakingState, start: Option<i64>) -> StakingDetails {
        StakingDetails {
            service_staking_state: state,
            service_staking_start_time: start,
        }
    }

    fn contract(ids: usize, max: u64, min_duration: i64) -> ContractDetails {
        ContractDetails {
            service_ids: Some((0..ids as u64).collect()),
            max_num_services: Some(max),
            minimum_staking_duration: Some(min_duration),
        }
    }

    #[test]
    fn test_evicted_until_minimum_duration_elapsed() {
        let c = contract(1, 10, 3600);

        let recent = staking(StakingState::Evicted, Some(NOW - 60));
        let status = staking_status(Some(&recent), Some(&c), NOW);
        assert!(status.is_evicted);
        assert!(!status.is_eligible_for_staking);

        let old = staking(StakingState::Evicted, Some(NOW - 3600));
        assert!(staking_status(Some(&old), Some(&c), NOW).is_eligible_for_staking);
    }

    #[test]
    fn test_evicted_without_start_time_is_not_eligible() {
        let s = staking(StakingState::Evicted, None);
        assert!(!staking_status(Some(&s), Some(&contract(0, 1, 0)), NOW).is_eligible_for_staking);
    }

    #[test]
    fn test_slot_availability() {
        let s = staking(StakingState::Unstaked, None);
        assert_eq!(staking_status(Some(&s), Some(&contract(2, 2, 0)), NOW).has_free_slot, Some(false));
        assert_eq!(staking_status(Some(&s), Some(&contract(1, 2, 0)), NOW).has_free_slot, Some(true));
        assert_eq!(staking_status(Some(&s), None, NOW).has_free_slot, None);
    }

    #[test]
    fn test_missing_data_is_permissive() {
        let status = staking_status(None, None, NOW);
        assert!(!status.is_evicted);
        assert!(!status.is_staked);
        assert!(status.is_eligible_for_staking);
        assert_eq!(status.has_free_slot, None);
    }
}
