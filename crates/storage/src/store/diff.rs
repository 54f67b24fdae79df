#![forbid(unsafe_code)]

use super::snapshots::materialize_tx;
use super::*;
use gw_core::cancel::CancelToken;
use gw_core::graph::{
    Entity, EntityChange, RelationshipChange, ValidationIssue, VersionDiff, VersionValidation,
};

impl SqliteStore {
    /// Compares the materialized views of two versions by logical key. Row ids and
    /// timestamps are ignored; an entity counts as changed when its type, name or data
    /// differ. Tombstoned edges count as absent.
    pub fn diff_versions(
        &mut self,
        from_version_id: &str,
        to_version_id: &str,
        cancel: &CancelToken,
    ) -> Result<VersionDiff, StoreError> {
        let max_depth = self.config.max_chain_depth();
        let tx = begin_read(&mut self.conn)?;
        self.snapshots.sync_epoch(content_epoch_tx(&tx)?);
        let from = materialize_tx(&tx, &mut self.snapshots, from_version_id, max_depth, cancel)?;
        let to = materialize_tx(&tx, &mut self.snapshots, to_version_id, max_depth, cancel)?;
        tx.commit()?;

        let mut diff = VersionDiff::default();
        for (logical_id, after) in &to.entities {
            match from.entity(logical_id) {
                None => diff.added_entities.push(after.clone()),
                Some(before) if !same_entity_state(before, after) => {
                    diff.changed_entities.push(EntityChange {
                        before: before.clone(),
                        after: after.clone(),
                    });
                }
                Some(_) => {}
            }
        }
        for (logical_id, before) in &from.entities {
            if to.entity(logical_id).is_none() {
                diff.removed_entities.push(before.clone());
            }
        }

        for after in to.active_relationships() {
            match from.active_relationship(&after.key()) {
                None => diff.added_relationships.push(after.clone()),
                Some(before) if before.properties != after.properties => {
                    diff.changed_relationships.push(RelationshipChange {
                        before: before.clone(),
                        after: after.clone(),
                    });
                }
                Some(_) => {}
            }
        }
        for before in from.active_relationships() {
            if to.active_relationship(&before.key()).is_none() {
                diff.removed_relationships.push(before.clone());
            }
        }

        tracing::debug!(
            from_version_id,
            to_version_id,
            added = diff.added_entities.len(),
            changed = diff.changed_entities.len(),
            removed = diff.removed_entities.len(),
            "diffed versions"
        );
        Ok(diff)
    }

    /// Reports active edges whose endpoints do not resolve in the version's view.
    pub fn validate_version(&mut self, version_id: &str) -> Result<VersionValidation, StoreError> {
        let snapshot = self.read_snapshot(version_id, &CancelToken::default())?;

        let mut issues = Vec::new();
        let mut relationships = 0;
        for relationship in snapshot.active_relationships() {
            relationships += 1;
            let missing = [&relationship.from_entity_id, &relationship.to_entity_id]
                .into_iter()
                .filter(|endpoint| snapshot.entity(endpoint.as_str()).is_none())
                .cloned()
                .collect::<Vec<_>>();
            if missing.is_empty() {
                continue;
            }
            issues.push(ValidationIssue {
                code: "EDGE_ENDPOINT_MISSING",
                message: format!("unresolved endpoint(s): {}", missing.join(", ")),
                relationship_id: relationship.id.clone(),
                key: relationship.key().to_string(),
            });
        }

        if !issues.is_empty() {
            tracing::warn!(version_id, issues = issues.len(), "version has dangling edges");
        }
        Ok(VersionValidation {
            ok: issues.is_empty(),
            entities: snapshot.entities.len(),
            relationships,
            issues,
        })
    }
}

fn same_entity_state(before: &Entity, after: &Entity) -> bool {
    before.entity_type == after.entity_type && before.name == after.name && before.data == after.data
}
