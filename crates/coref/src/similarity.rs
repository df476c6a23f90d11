//! Surface-similarity measures used by named↔named gating.
//!
//! Character-level similarity comes from `strsim`; the token-level
//! Jaccard overlap is ours because it works on the gate's notion of a
//! token (lowercase alphanumeric runs), not on whitespace words.

use std::collections::HashSet;

/// Jaro-Winkler similarity over lowercase surfaces.
pub fn jaro_winkler(a: &str, b: &str) -> f64 {
    strsim::jaro_winkler(a, b)
}

/// Lowercase alphanumeric tokens of a surface.
pub fn surface_tokens(surface: &str) -> HashSet<String> {
    surface
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

/// Jaccard overlap of the token sets of two surfaces.
pub fn token_jaccard(a: &str, b: &str) -> f64 {
    let ta = surface_tokens(a);
    let tb = surface_tokens(b);
    if ta.is_empty() && tb.is_empty() {
        return 1.0;
    }
    let intersection = ta.intersection(&tb).count() as f64;
    let union = ta.union(&tb).count() as f64;
    intersection / union
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_strings_score_one() {
        assert!((jaro_winkler("martha", "martha") - 1.0).abs() < 1e-9);
        assert!((token_jaccard("SAP HANA", "sap hana") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn classic_jaro_winkler_values() {
        // Known reference pair.
        let jw = jaro_winkler("martha", "marhta");
        assert!((jw - 0.9611).abs() < 0.001, "got {jw}");
        assert!(jaro_winkler("abc", "xyz") < 0.01);
    }

    #[test]
    fn jaccard_counts_shared_tokens() {
        let j = token_jaccard("SAP S/4HANA Cloud", "SAP Cloud");
        // tokens {sap, s, 4hana, cloud} vs {sap, cloud} → 2/4
        assert!((j - 0.5).abs() < 1e-9, "got {j}");
    }
}
