//! Registry row and snapshot shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a type name.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntityTypeStatus {
    Pending,
    Approved,
    Rejected,
}

/// One registry row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityType {
    pub type_name: String,
    pub tenant_id: String,
    pub status: EntityTypeStatus,
    /// How many extracted entities carry this type.
    pub entity_count: u32,
    pub description: Option<String>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl EntityType {
    pub fn pending(tenant_id: &str, type_name: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
            tenant_id: tenant_id.to_string(),
            status: EntityTypeStatus::Pending,
            entity_count: 1,
            description: None,
            approved_by: None,
            approved_at: None,
            created_at: Utc::now(),
        }
    }
}

/// Dry-run result of a normalization merge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MergePreview {
    pub target_name: String,
    pub source_names: Vec<String>,
    pub merged_entity_count: u32,
}

/// Undo snapshot of an executed merge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MergeSnapshot {
    pub snapshot_id: String,
    pub target_name: String,
    pub merged_entity_count: u32,
    pub removed_rows: Vec<EntityType>,
    pub created_at: DateTime<Utc>,
}
