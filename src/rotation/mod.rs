//! Rotation policy: which included agent runs next.

pub mod skip;

pub use skip::SkipNotifier;

use crate::types::{AgentType, EligibilityMap};

/// Result of one circular scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub next: Option<AgentType>,
    /// Blocked candidates passed over during the scan, with their reasons.
    pub skipped: Vec<(AgentType, String)>,
}

/// Scan `ordered` circularly, starting after `current`, for the next agent that
/// is runnable and has not yet earned this epoch's rewards.
///
/// `current` is never returned. Agents without an eligibility entry are treated
/// as not runnable and are skipped without a reason.
pub fn find_next_eligible_agent(
    current: Option<&AgentType>,
    ordered: &[AgentType],
    eligibility: &EligibilityMap,
) -> Selection {
    let mut selection = Selection::default();
    if ordered.is_empty() {
        return selection;
    }

    let len = ordered.len();
    let start = current
        .and_then(|c| ordered.iter().position(|a| a == c))
        .map_or(0, |i| i + 1);

    for offset in 0..len {
        let candidate = &ordered[(start + offset) % len];
        if Some(candidate) == current {
            continue;
        }
        let Some(verdict) = eligibility.get(candidate) else {
            continue;
        };
        if !verdict.can_run {
            if let Some(reason) = &verdict.reason {
                selection.skipped.push((candidate.clone(), reason.clone()));
            }
            continue;
        }
        if !verdict.is_rotation_target() {
            continue;
        }
        selection.next = Some(candidate.clone());
        break;
    }

    selection
}
