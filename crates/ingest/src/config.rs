//! Pass 0 configuration.

use serde::{Deserialize, Serialize};

/// Knobs of the structural pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pass0Config {
    /// Minimum unit length for non-structural items.
    pub min_unit_chars: usize,
    /// Target size of one retrieval chunk.
    pub chunk_target_chars: usize,
    /// Fallback tenant when metadata omits one.
    pub default_tenant_id: String,
    /// Fallback language when neither metadata nor parser provide one.
    pub default_language: String,
}

impl Default for Pass0Config {
    fn default() -> Self {
        Self {
            min_unit_chars: 30,
            chunk_target_chars: 1200,
            default_tenant_id: "default".into(),
            default_language: "en".into(),
        }
    }
}
