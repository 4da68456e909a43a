//! Ordering and membership rules for the rotation set.

use std::collections::HashSet;

use crate::types::{AgentType, IncludedAgent};

/// Drop duplicate agent types (lowest order wins) and sort by order.
pub fn normalize_included(included: &[IncludedAgent]) -> Vec<IncludedAgent> {
    let mut sorted = included.to_vec();
    // Stable sort keeps the first stored entry when orders tie.
    sorted.sort_by_key(|item| item.order);

    let mut seen = HashSet::new();
    sorted.retain(|item| seen.insert(item.agent_type.clone()));
    sorted
}

/// Included agents restricted to the configured set, in rotation order.
pub fn ordered_included(included: &[IncludedAgent], configured: &[AgentType]) -> Vec<IncludedAgent> {
    let allowed: HashSet<&AgentType> = configured.iter().collect();
    normalize_included(included)
        .into_iter()
        .filter(|item| allowed.contains(&item.agent_type))
        .collect()
}

/// Configured agents that are not part of the rotation set, in discovery order.
pub fn excluded(included: &[IncludedAgent], configured: &[AgentType]) -> Vec<AgentType> {
    let included: HashSet<&AgentType> = included.iter().map(|i| &i.agent_type).collect();
    configured
        .iter()
        .filter(|agent| !included.contains(agent))
        .cloned()
        .collect()
}

/// Append agents after the current maximum order, preserving their given order.
pub fn append_agents(existing: &[IncludedAgent], new_agents: &[AgentType]) -> Vec<IncludedAgent> {
    let max_order = existing.iter().map(|item| item.order).max().unwrap_or(-1);
    let mut result = existing.to_vec();
    result.extend(new_agents.iter().enumerate().map(|(i, agent_type)| IncludedAgent {
        agent_type: agent_type.clone(),
        order: max_order + i as i64 + 1,
    }));
    result
}

/// Remove an agent from the rotation set.
pub fn remove_agent(existing: &[IncludedAgent], agent_type: &AgentType) -> Vec<IncludedAgent> {
    existing
        .iter()
        .filter(|item| &item.agent_type != agent_type)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inc(agent: &str, order: i64) -> IncludedAgent {
        IncludedAgent {
            agent_type: agent.into(),
            order,
        }
    }

    fn types(items: &[IncludedAgent]) -> Vec<&str> {
        items.iter().map(|i| i.agent_type.as_str()).collect()
    }

    #[test]
    fn test_normalize_dedupes_and_sorts() {
        let stored = vec![inc("a", 7), inc("b", 5), inc("a", 0)];
        let normalized = normalize_included(&stored);
        assert_eq!(normalized, vec![inc("a", 0), inc("b", 5)]);
    }

    #[test]
    fn test_ordered_included_hides_unconfigured() {
        let stored = vec![inc("c", 2), inc("gone", 1), inc("a", 0)];
        let configured: Vec<AgentType> = vec!["a".into(), "c".into()];
        assert_eq!(types(&ordered_included(&stored, &configured)), vec!["a", "c"]);
    }

    #[test]
    fn test_append_continues_after_sparse_max() {
        let existing = vec![inc("a", 0), inc("b", 2)];
        let appended = append_agents(&existing, &["c".into(), "d".into()]);
        assert_eq!(appended[2], inc("c", 3));
        assert_eq!(appended[3], inc("d", 4));
    }

    #[test]
    fn test_append_to_empty_starts_at_zero() {
        let appended = append_agents(&[], &["a".into(), "b".into()]);
        assert_eq!(appended, vec![inc("a", 0), inc("b", 1)]);
    }

    #[test]
    fn test_excluded_is_configured_minus_included() {
        let configured: Vec<AgentType> = vec!["a".into(), "b".into(), "c".into()];
        let included = vec![inc("c", 0), inc("a", 1)];
        assert_eq!(excluded(&included, &configured), vec![AgentType::from("b")]);
    }

    #[test]
    fn test_exclude_then_include_appends_at_end() {
        let existing = vec![inc("a", 0), inc("b", 1), inc("c", 2)];
        let without_b = remove_agent(&existing, &"b".into());
        let readded = append_agents(&without_b, &["b".into()]);

        let ordered = normalize_included(&readded);
        assert_eq!(types(&ordered), vec!["a", "c", "b"]);
        assert!(ordered[2].order > 2);
    }
}
