//! Traversal policies and tier escalation.
//!
//! A policy fixes which defensibility tiers the planner may walk and
//! whether it may widen that set when nothing is found. Every widening
//! step lands in an audit trail that travels with the plan.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use model::DefensibilityTier;

/// Predefined traversal policies.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TraversalPolicy {
    /// Production: STRICT only, no escalation, structural fallback allowed.
    Strict,
    /// STRICT first, escalating to EXTENDED when empty.
    Exploratory,
    /// STRICT + EXTENDED from the start, no escalation.
    Balanced,
    /// Every tier, no structural fallback. Debug and admin use.
    Unrestricted,
}

/// Tier filtering configuration derived from a policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TierFilterConfig {
    pub allowed_tiers: BTreeSet<DefensibilityTier>,
    pub enable_escalation: bool,
    pub escalation_order: Vec<DefensibilityTier>,
    pub max_escalation_steps: usize,
    pub fallback_to_anchored: bool,
}

impl Default for TierFilterConfig {
    fn default() -> Self {
        Self::from_policy(TraversalPolicy::Strict)
    }
}

impl TierFilterConfig {
    pub fn from_policy(policy: TraversalPolicy) -> Self {
        use DefensibilityTier::*;
        match policy {
            TraversalPolicy::Strict => Self {
                allowed_tiers: BTreeSet::from([Strict]),
                enable_escalation: false,
                escalation_order: vec![Strict, Extended],
                max_escalation_steps: 2,
                fallback_to_anchored: true,
            },
            TraversalPolicy::Exploratory => Self {
                allowed_tiers: BTreeSet::from([Strict]),
                enable_escalation: true,
                escalation_order: vec![Strict, Extended],
                max_escalation_steps: 2,
                fallback_to_anchored: true,
            },
            TraversalPolicy::Balanced => Self {
                allowed_tiers: BTreeSet::from([Strict, Extended]),
                enable_escalation: false,
                escalation_order: vec![Strict, Extended],
                max_escalation_steps: 2,
                fallback_to_anchored: true,
            },
            TraversalPolicy::Unrestricted => Self {
                allowed_tiers: BTreeSet::from([Strict, Extended, Experimental]),
                enable_escalation: false,
                escalation_order: vec![Strict, Extended, Experimental],
                max_escalation_steps: 2,
                fallback_to_anchored: false,
            },
        }
    }

    /// Whether another escalation step should be attempted.
    pub fn should_escalate(&self, results_count: usize, current_step: usize) -> bool {
        self.enable_escalation && results_count == 0 && current_step < self.max_escalation_steps
    }

    /// Next tier to add, in escalation order.
    pub fn next_escalation_tier(
        &self,
        current: &BTreeSet<DefensibilityTier>,
    ) -> Option<DefensibilityTier> {
        self.escalation_order
            .iter()
            .copied()
            .find(|tier| !current.contains(tier))
    }
}

/// Audit trail of the escalation loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EscalationState {
    pub current_tiers: BTreeSet<DefensibilityTier>,
    pub escalation_steps: usize,
    pub escalation_path: Vec<String>,
    pub found_results: bool,
    pub final_mode: Option<String>,
}

impl EscalationState {
    pub fn new(config: &TierFilterConfig) -> Self {
        Self {
            current_tiers: config.allowed_tiers.clone(),
            escalation_steps: 0,
            escalation_path: Vec::new(),
            found_results: false,
            final_mode: None,
        }
    }

    pub fn add_escalation(&mut self, tier: DefensibilityTier) {
        self.current_tiers.insert(tier);
        self.escalation_steps += 1;
        self.escalation_path
            .push(format!("escalate_to_{}", tier.label()));
    }

    /// Structural fallback applies once escalation is exhausted empty.
    pub fn should_fallback_to_anchored(&self, config: &TierFilterConfig) -> bool {
        if !config.fallback_to_anchored || self.found_results {
            return false;
        }
        !config.enable_escalation || self.escalation_steps >= config.max_escalation_steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::DefensibilityTier::*;

    #[test]
    fn policies_fix_tier_sets() {
        assert_eq!(
            TierFilterConfig::from_policy(TraversalPolicy::Strict).allowed_tiers,
            BTreeSet::from([Strict])
        );
        assert_eq!(
            TierFilterConfig::from_policy(TraversalPolicy::Balanced).allowed_tiers,
            BTreeSet::from([Strict, Extended])
        );
        assert!(!TierFilterConfig::from_policy(TraversalPolicy::Unrestricted).fallback_to_anchored);
    }

    #[test]
    fn escalation_only_when_enabled_and_empty() {
        let strict = TierFilterConfig::from_policy(TraversalPolicy::Strict);
        assert!(!strict.should_escalate(0, 0));

        let exploratory = TierFilterConfig::from_policy(TraversalPolicy::Exploratory);
        assert!(exploratory.should_escalate(0, 0));
        assert!(!exploratory.should_escalate(3, 0));
        assert!(!exploratory.should_escalate(0, 2));
    }

    #[test]
    fn escalation_adds_next_tier_and_audits() {
        let config = TierFilterConfig::from_policy(TraversalPolicy::Exploratory);
        let mut state = EscalationState::new(&config);
        let next = config.next_escalation_tier(&state.current_tiers).unwrap();
        assert_eq!(next, Extended);
        state.add_escalation(next);
        assert_eq!(state.escalation_steps, 1);
        assert_eq!(state.escalation_path, vec!["escalate_to_EXTENDED"]);
        assert!(config.next_escalation_tier(&state.current_tiers).is_none());
    }
}
