//! Construction-time validators.
//!
//! Explicit functions, called where records are built. Nothing here is
//! conditioned on runtime reflection; a record that fails validation is
//! rejected at the boundary with a [`ModelError`].

use crate::error::ModelError;

/// Registry type names are UPPERCASE ASCII with underscores, 2..=64 chars.
pub fn validate_entity_type_name(name: &str) -> Result<(), ModelError> {
    if name.len() < 2 || name.len() > 64 {
        return Err(ModelError::InvalidTypeName(format!(
            "length {} outside 2..=64",
            name.len()
        )));
    }
    let ok = name
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_');
    if !ok || !name.starts_with(|c: char| c.is_ascii_uppercase()) {
        return Err(ModelError::InvalidTypeName(format!(
            "'{name}' must be UPPERCASE ascii with underscores"
        )));
    }
    Ok(())
}

/// A span must be non-empty, ordered, and lie inside the text.
pub fn validate_span(text: &str, start: usize, end: usize) -> Result<(), ModelError> {
    if start >= end {
        return Err(ModelError::InvalidSpan(format!("{start}..{end} is empty")));
    }
    if end > text.len() || text.get(start..end).is_none() {
        return Err(ModelError::InvalidSpan(format!(
            "{start}..{end} outside text of {} bytes",
            text.len()
        )));
    }
    Ok(())
}

/// Confidences are probabilities.
pub fn validate_confidence(confidence: f64) -> Result<(), ModelError> {
    if !(0.0..=1.0).contains(&confidence) || confidence.is_nan() {
        return Err(ModelError::InvalidConfidence(format!("{confidence}")));
    }
    Ok(())
}

/// Identifiers never carry path separators or control characters; this is
/// the guard against traversal in `source_doc` style fields.
pub fn validate_plain_id(id: &str) -> Result<(), ModelError> {
    if id.is_empty() {
        return Err(ModelError::InvalidId("empty".into()));
    }
    if id.contains(['/', '\\', '\0']) || id.contains("..") || id.chars().any(char::is_control) {
        return Err(ModelError::InvalidId(format!("'{id}' contains path or control chars")));
    }
    Ok(())
}

/// Evidence-preserving check: the anchored substring must contain the
/// claim text verbatim (claims may be a sub-span of the evidence).
pub fn validate_evidence_contains(evidence: &str, claim: &str) -> Result<(), ModelError> {
    if !evidence.contains(claim) {
        let preview: String = claim.chars().take(60).collect();
        return Err(ModelError::EvidenceMismatch(format!(
            "claim '{preview}' not found in evidence"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names_must_be_uppercase() {
        assert!(validate_entity_type_name("PRODUCT").is_ok());
        assert!(validate_entity_type_name("SERVICE_AREA").is_ok());
        assert!(validate_entity_type_name("Product").is_err());
        assert!(validate_entity_type_name("P").is_err());
        assert!(validate_entity_type_name("_LEADING").is_err());
    }

    #[test]
    fn spans_checked_against_text() {
        assert!(validate_span("hello world", 0, 5).is_ok());
        assert!(validate_span("hello", 3, 3).is_err());
        assert!(validate_span("hello", 2, 99).is_err());
    }

    #[test]
    fn ids_reject_traversal() {
        assert!(validate_plain_id("doc_000001").is_ok());
        assert!(validate_plain_id("../etc/passwd").is_err());
        assert!(validate_plain_id("a/b").is_err());
    }

    #[test]
    fn evidence_must_contain_claim() {
        assert!(validate_evidence_contains("TLS 1.2 is required", "TLS 1.2").is_ok());
        assert!(validate_evidence_contains("TLS 1.2 is required", "encryption").is_err());
    }
}
