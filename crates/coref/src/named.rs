//! Named↔named gating: the anti-false-positive filter.
//!
//! Engines happily merge "SAP S/4HANA" with "SAP HANA". This gate
//! measures surface similarity and splits confident mismatches; the
//! uncertain middle band goes to the LLM arbiter.

use serde::{Deserialize, Serialize};

use crate::config::CorefConfig;
use crate::similarity::{jaro_winkler, surface_tokens, token_jaccard};

/// Gate verdict for one named pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NamedGateDecision {
    Accept,
    Reject,
    Review,
}

/// Verdict plus the measurements that produced it.
#[derive(Debug, Clone)]
pub struct NamedGateResult {
    pub decision: NamedGateDecision,
    pub jaro_winkler: f64,
    pub token_jaccard: f64,
    pub reason: String,
}

/// Threshold-based policy over Jaro-Winkler and token Jaccard, with a
/// variant-marker guard for digit-bearing product names.
#[derive(Debug, Clone)]
pub struct NamedGatePolicy {
    jaro_reject: f64,
    jaro_accept: f64,
    jaccard_accept: f64,
}

impl NamedGatePolicy {
    pub fn new(cfg: &CorefConfig) -> Self {
        Self {
            jaro_reject: cfg.named_jaro_reject,
            jaro_accept: cfg.named_jaro_accept,
            jaccard_accept: cfg.named_jaccard_accept,
        }
    }

    pub fn evaluate(&self, surface_a: &str, surface_b: &str) -> NamedGateResult {
        let a = surface_a.to_lowercase();
        let b = surface_b.to_lowercase();
        let jw = jaro_winkler(&a, &b);
        let jaccard = token_jaccard(&a, &b);

        if jw >= self.jaro_accept || jaccard >= self.jaccard_accept {
            return NamedGateResult {
                decision: NamedGateDecision::Accept,
                jaro_winkler: jw,
                token_jaccard: jaccard,
                reason: format!("jw={jw:.2} jaccard={jaccard:.2} above accept thresholds"),
            };
        }
        if jw < self.jaro_reject {
            return NamedGateResult {
                decision: NamedGateDecision::Reject,
                jaro_winkler: jw,
                token_jaccard: jaccard,
                reason: format!("jw={jw:.2} below reject threshold"),
            };
        }
        if variant_marker_mismatch(&a, &b) {
            // "s/4hana" vs "hana": shared head, diverging versioned tail.
            // Product variants are distinct entities.
            return NamedGateResult {
                decision: NamedGateDecision::Reject,
                jaro_winkler: jw,
                token_jaccard: jaccard,
                reason: "variant marker mismatch".into(),
            };
        }

        NamedGateResult {
            decision: NamedGateDecision::Review,
            jaro_winkler: jw,
            token_jaccard: jaccard,
            reason: format!("jw={jw:.2} jaccard={jaccard:.2} in review band"),
        }
    }
}

/// True when the two surfaces carry different digit-bearing tokens and
/// neither token set contains the other.
fn variant_marker_mismatch(a: &str, b: &str) -> bool {
    let ta = surface_tokens(a);
    let tb = surface_tokens(b);
    if ta.is_subset(&tb) || tb.is_subset(&ta) {
        return false;
    }
    let versioned_a: Vec<&String> = ta
        .difference(&tb)
        .filter(|t| t.chars().any(|c| c.is_ascii_digit()))
        .collect();
    let versioned_b: Vec<&String> = tb
        .difference(&ta)
        .filter(|t| t.chars().any(|c| c.is_ascii_digit()))
        .collect();
    !versioned_a.is_empty() || !versioned_b.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> NamedGatePolicy {
        NamedGatePolicy::new(&CorefConfig::default())
    }

    #[test]
    fn identical_surfaces_accept() {
        let result = policy().evaluate("Atlas Gateway", "atlas gateway");
        assert_eq!(result.decision, NamedGateDecision::Accept);
    }

    #[test]
    fn token_overlap_accepts_reordered_names() {
        let result = policy().evaluate("Gateway Atlas", "Atlas Gateway");
        assert_eq!(result.decision, NamedGateDecision::Accept);
        assert!(result.token_jaccard >= 0.8);
    }

    #[test]
    fn unrelated_surfaces_reject() {
        let result = policy().evaluate("Atlas Gateway", "Zephyr Queue");
        assert_eq!(result.decision, NamedGateDecision::Reject);
    }

    #[test]
    fn product_variants_reject_via_marker_guard() {
        let result = policy().evaluate("SAP S/4HANA", "SAP HANA");
        assert_eq!(result.decision, NamedGateDecision::Reject);
        assert_eq!(result.reason, "variant marker mismatch");
    }

    #[test]
    fn ambiguous_pairs_go_to_review() {
        let result = policy().evaluate("Atlas Gateway", "Atlas Gateway Service");
        // Jaccard 2/3, below 0.8; jw in the middle band; no digits.
        assert_eq!(result.decision, NamedGateDecision::Review);
    }
}
