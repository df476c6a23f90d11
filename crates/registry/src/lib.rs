//! Entity-type registry.
//!
//! Concept typing is governed, not open-world: new type names enter as
//! `pending` when first sighted and only an admin approval makes them
//! part of the working ontology. The registry also owns normalization
//! merges (fold duplicate type names into a canonical one) with a
//! snapshot-based undo window, and YAML import/export for review
//! outside the system.

mod ontology;
mod types;

pub use ontology::propose_entity_types;
pub use types::{EntityType, EntityTypeStatus, MergePreview, MergeSnapshot};

use chrono::{Duration, Utc};
use indexmap::IndexMap;
use std::sync::RwLock;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use model::validate::validate_entity_type_name;

/// Errors surfaced to the admin interface.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RegistryError {
    #[error("entity type already exists: {0}")]
    Conflict(String),
    #[error("entity type not found: {0}")]
    NotFound(String),
    #[error("invalid entity type: {0}")]
    Validation(String),
    #[error("snapshot not found or expired: {0}")]
    SnapshotUnavailable(String),
    #[error("yaml error: {0}")]
    Yaml(String),
}

/// How long a normalization snapshot stays undoable.
const UNDO_WINDOW_HOURS: i64 = 24;

/// In-process registry, tenant-scoped by construction.
pub struct EntityTypeRegistry {
    tenant_id: String,
    rows: RwLock<IndexMap<String, EntityType>>,
    snapshots: RwLock<Vec<MergeSnapshot>>,
}

impl EntityTypeRegistry {
    pub fn new(tenant_id: &str) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            rows: RwLock::new(IndexMap::new()),
            snapshots: RwLock::new(Vec::new()),
        }
    }

    /// Record a sighting of a type name during extraction. Unknown names
    /// auto-register as pending; known names bump their entity count.
    pub fn register_sighting(&self, type_name: &str) -> Result<EntityTypeStatus, RegistryError> {
        validate_entity_type_name(type_name)
            .map_err(|e| RegistryError::Validation(e.to_string()))?;
        let mut rows = self.rows.write().unwrap_or_else(|p| p.into_inner());
        match rows.get_mut(type_name) {
            Some(row) => {
                row.entity_count += 1;
                Ok(row.status)
            }
            None => {
                rows.insert(
                    type_name.to_string(),
                    EntityType::pending(&self.tenant_id, type_name),
                );
                info!(type_name, "entity_type_auto_registered");
                Ok(EntityTypeStatus::Pending)
            }
        }
    }

    /// Explicit admin creation; duplicates are a conflict.
    pub fn create(&self, type_name: &str, description: Option<&str>) -> Result<(), RegistryError> {
        validate_entity_type_name(type_name)
            .map_err(|e| RegistryError::Validation(e.to_string()))?;
        let mut rows = self.rows.write().unwrap_or_else(|p| p.into_inner());
        if rows.contains_key(type_name) {
            return Err(RegistryError::Conflict(type_name.to_string()));
        }
        let mut row = EntityType::pending(&self.tenant_id, type_name);
        row.description = description.map(String::from);
        rows.insert(type_name.to_string(), row);
        Ok(())
    }

    pub fn get(&self, type_name: &str) -> Result<EntityType, RegistryError> {
        self.rows
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(type_name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(type_name.to_string()))
    }

    /// List rows, optionally filtered by status, in insertion order.
    pub fn list(&self, status: Option<EntityTypeStatus>) -> Vec<EntityType> {
        self.rows
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .values()
            .filter(|row| status.map(|s| row.status == s).unwrap_or(true))
            .cloned()
            .collect()
    }

    pub fn approve(&self, type_name: &str, admin: &str) -> Result<(), RegistryError> {
        self.transition(type_name, admin, EntityTypeStatus::Approved)
    }

    pub fn reject(&self, type_name: &str, admin: &str) -> Result<(), RegistryError> {
        self.transition(type_name, admin, EntityTypeStatus::Rejected)
    }

    fn transition(
        &self,
        type_name: &str,
        admin: &str,
        status: EntityTypeStatus,
    ) -> Result<(), RegistryError> {
        let mut rows = self.rows.write().unwrap_or_else(|p| p.into_inner());
        let row = rows
            .get_mut(type_name)
            .ok_or_else(|| RegistryError::NotFound(type_name.to_string()))?;
        row.status = status;
        row.approved_by = Some(admin.to_string());
        row.approved_at = Some(Utc::now());
        info!(type_name, admin, ?status, "entity_type_transition");
        Ok(())
    }

    /// Export every row as YAML for offline review.
    pub fn export_yaml(&self) -> Result<String, RegistryError> {
        let rows: Vec<EntityType> = self.list(None);
        serde_yaml::to_string(&rows).map_err(|e| RegistryError::Yaml(e.to_string()))
    }

    /// Import rows from YAML. Existing names keep their local status;
    /// new names are inserted as exported.
    pub fn import_yaml(&self, yaml: &str) -> Result<usize, RegistryError> {
        let imported: Vec<EntityType> =
            serde_yaml::from_str(yaml).map_err(|e| RegistryError::Yaml(e.to_string()))?;
        let mut rows = self.rows.write().unwrap_or_else(|p| p.into_inner());
        let mut added = 0usize;
        for row in imported {
            validate_entity_type_name(&row.type_name)
                .map_err(|e| RegistryError::Validation(e.to_string()))?;
            if !rows.contains_key(&row.type_name) {
                rows.insert(row.type_name.clone(), row);
                added += 1;
            }
        }
        Ok(added)
    }

    /// What a merge would do, without touching anything.
    pub fn preview_merge(
        &self,
        source_names: &[String],
        target_name: &str,
    ) -> Result<MergePreview, RegistryError> {
        let rows = self.rows.read().unwrap_or_else(|p| p.into_inner());
        if !rows.contains_key(target_name) {
            return Err(RegistryError::NotFound(target_name.to_string()));
        }
        let mut merged_entity_count = 0u32;
        let mut missing = Vec::new();
        for name in source_names {
            match rows.get(name) {
                Some(row) => merged_entity_count += row.entity_count,
                None => missing.push(name.clone()),
            }
        }
        if let Some(name) = missing.first() {
            return Err(RegistryError::NotFound(name.clone()));
        }
        Ok(MergePreview {
            target_name: target_name.to_string(),
            source_names: source_names.to_vec(),
            merged_entity_count,
        })
    }

    /// Execute a normalization merge: fold the sources' counts into the
    /// target and delete the sources. A snapshot of the prior state is
    /// kept for [`UNDO_WINDOW_HOURS`].
    pub fn execute_merge(
        &self,
        source_names: &[String],
        target_name: &str,
    ) -> Result<String, RegistryError> {
        // Preview validates existence before any mutation.
        let preview = self.preview_merge(source_names, target_name)?;

        let mut rows = self.rows.write().unwrap_or_else(|p| p.into_inner());
        let mut removed = Vec::new();
        for name in source_names {
            if let Some(row) = rows.shift_remove(name) {
                removed.push(row);
            }
        }
        if let Some(target) = rows.get_mut(target_name) {
            target.entity_count += preview.merged_entity_count;
        }

        let snapshot_id = Uuid::new_v4().to_string();
        let snapshot = MergeSnapshot {
            snapshot_id: snapshot_id.clone(),
            target_name: target_name.to_string(),
            merged_entity_count: preview.merged_entity_count,
            removed_rows: removed,
            created_at: Utc::now(),
        };
        self.snapshots
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .push(snapshot);
        info!(target_name, snapshot_id = %snapshot_id, "normalization_merge_executed");
        Ok(snapshot_id)
    }

    /// Undo a merge while its snapshot is still within the window.
    pub fn undo_merge(&self, snapshot_id: &str) -> Result<(), RegistryError> {
        let mut snapshots = self.snapshots.write().unwrap_or_else(|p| p.into_inner());
        let position = snapshots
            .iter()
            .position(|s| s.snapshot_id == snapshot_id)
            .ok_or_else(|| RegistryError::SnapshotUnavailable(snapshot_id.to_string()))?;
        let snapshot = &snapshots[position];
        if Utc::now() - snapshot.created_at > Duration::hours(UNDO_WINDOW_HOURS) {
            return Err(RegistryError::SnapshotUnavailable(snapshot_id.to_string()));
        }
        let snapshot = snapshots.remove(position);

        let mut rows = self.rows.write().unwrap_or_else(|p| p.into_inner());
        if let Some(target) = rows.get_mut(&snapshot.target_name) {
            target.entity_count = target
                .entity_count
                .saturating_sub(snapshot.merged_entity_count);
        }
        for row in snapshot.removed_rows {
            rows.insert(row.type_name.clone(), row);
        }
        info!(snapshot_id, "normalization_merge_undone");
        Ok(())
    }

    /// Drop snapshots past the undo window.
    pub fn expire_snapshots(&self) -> usize {
        let mut snapshots = self.snapshots.write().unwrap_or_else(|p| p.into_inner());
        let before = snapshots.len();
        let cutoff = Utc::now() - Duration::hours(UNDO_WINDOW_HOURS);
        snapshots.retain(|s| s.created_at > cutoff);
        before - snapshots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sightings_auto_register_as_pending() {
        let registry = EntityTypeRegistry::new("t1");
        assert_eq!(
            registry.register_sighting("PRODUCT").unwrap(),
            EntityTypeStatus::Pending
        );
        registry.register_sighting("PRODUCT").unwrap();
        let row = registry.get("PRODUCT").unwrap();
        assert_eq!(row.entity_count, 2);
    }

    #[test]
    fn lowercase_names_are_rejected_at_the_boundary() {
        let registry = EntityTypeRegistry::new("t1");
        assert!(matches!(
            registry.register_sighting("Product"),
            Err(RegistryError::Validation(_))
        ));
    }

    #[test]
    fn duplicate_create_conflicts_and_unknown_approve_is_not_found() {
        let registry = EntityTypeRegistry::new("t1");
        registry.create("PRODUCT", None).unwrap();
        assert!(matches!(
            registry.create("PRODUCT", None),
            Err(RegistryError::Conflict(_))
        ));
        assert!(matches!(
            registry.approve("MISSING", "admin"),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn approval_workflow_stamps_admin() {
        let registry = EntityTypeRegistry::new("t1");
        registry.create("PRODUCT", Some("commercial products")).unwrap();
        registry.approve("PRODUCT", "alex").unwrap();
        let row = registry.get("PRODUCT").unwrap();
        assert_eq!(row.status, EntityTypeStatus::Approved);
        assert_eq!(row.approved_by.as_deref(), Some("alex"));
        assert!(row.approved_at.is_some());

        let approved = registry.list(Some(EntityTypeStatus::Approved));
        assert_eq!(approved.len(), 1);
    }

    #[test]
    fn yaml_round_trip_preserves_rows() {
        let registry = EntityTypeRegistry::new("t1");
        registry.create("PRODUCT", None).unwrap();
        registry.create("SERVICE_AREA", None).unwrap();
        registry.approve("PRODUCT", "alex").unwrap();

        let yaml = registry.export_yaml().unwrap();
        let restored = EntityTypeRegistry::new("t1");
        assert_eq!(restored.import_yaml(&yaml).unwrap(), 2);
        assert_eq!(
            restored.get("PRODUCT").unwrap().status,
            EntityTypeStatus::Approved
        );
    }

    #[test]
    fn merge_folds_counts_and_undo_restores() {
        let registry = EntityTypeRegistry::new("t1");
        registry.create("PRODUCT", None).unwrap();
        for _ in 0..3 {
            registry.register_sighting("PRODUCTS").unwrap();
        }

        let preview = registry
            .preview_merge(&["PRODUCTS".to_string()], "PRODUCT")
            .unwrap();
        assert_eq!(preview.merged_entity_count, 3);

        let snapshot_id = registry
            .execute_merge(&["PRODUCTS".to_string()], "PRODUCT")
            .unwrap();
        assert!(registry.get("PRODUCTS").is_err());
        assert_eq!(registry.get("PRODUCT").unwrap().entity_count, 3);

        registry.undo_merge(&snapshot_id).unwrap();
        assert_eq!(registry.get("PRODUCTS").unwrap().entity_count, 3);
        assert_eq!(registry.get("PRODUCT").unwrap().entity_count, 0);
        assert!(matches!(
            registry.undo_merge(&snapshot_id),
            Err(RegistryError::SnapshotUnavailable(_))
        ));
    }

    #[test]
    fn merge_preview_requires_existing_rows() {
        let registry = EntityTypeRegistry::new("t1");
        registry.create("PRODUCT", None).unwrap();
        assert!(matches!(
            registry.preview_merge(&["MISSING".to_string()], "PRODUCT"),
            Err(RegistryError::NotFound(_))
        ));
        assert!(matches!(
            registry.preview_merge(&[], "MISSING"),
            Err(RegistryError::NotFound(_))
        ));
    }
}
