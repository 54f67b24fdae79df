#![forbid(unsafe_code)]

use super::snapshots::{Snapshot, materialize_tx};
use super::*;
use gw_core::cancel::CancelToken;
use gw_core::graph::{Entity, Neighbor, NeighborDirection, Relationship};
use std::sync::Arc;

impl SqliteStore {
    /// Effective entities of a version: for each logical id, the row nearest the version
    /// along its parent chain. Sorted by logical id.
    pub fn list_entities(&mut self, request: ListEntitiesRequest) -> Result<Vec<Entity>, StoreError> {
        let snapshot = self.read_snapshot(&request.version_id, &request.cancel)?;
        let entities = snapshot
            .entities
            .values()
            .filter(|entity| {
                request
                    .entity_type
                    .is_none_or(|entity_type| entity.entity_type == entity_type)
            })
            .cloned()
            .collect::<Vec<_>>();
        tracing::debug!(
            version_id = %request.version_id,
            entity_type = ?request.entity_type,
            count = entities.len(),
            "listed entities"
        );
        Ok(entities)
    }

    /// Neighbors of the entity stored in row `entity_id`, seen from that row's version.
    pub fn get_neighbors(
        &mut self,
        entity_id: &str,
        relationship_type: Option<&str>,
    ) -> Result<Vec<Neighbor>, StoreError> {
        let row = self.get_entity(entity_id)?;
        let mut request = NeighborsRequest::new(row.version_id, row.logical_id);
        if let Some(relationship_type) = relationship_type {
            request = request.relationship_type(relationship_type);
        }
        self.get_neighbors_in_version(request)
    }

    /// Active edges touching `logical_id` in the version's view, each paired with the
    /// current row of the other endpoint. Edges whose other endpoint does not resolve
    /// are skipped; `validate_version` reports them.
    pub fn get_neighbors_in_version(&mut self, request: NeighborsRequest) -> Result<Vec<Neighbor>, StoreError> {
        let logical_id = canonicalize_logical_id(&request.logical_id)?;
        let relationship_type = request
            .relationship_type
            .as_deref()
            .map(canonicalize_relationship_type)
            .transpose()?;

        let snapshot = self.read_snapshot(&request.version_id, &request.cancel)?;
        if snapshot.entity(&logical_id).is_none() {
            return Err(StoreError::UnknownLogicalId {
                logical_id,
                scope: format!("version {}", request.version_id),
            });
        }

        let outgoing = request.direction != NeighborDirection::Incoming;
        let incoming = request.direction != NeighborDirection::Outgoing;
        let mut neighbors = Vec::new();
        for relationship in snapshot.active_relationships() {
            if relationship_type
                .as_deref()
                .is_some_and(|wanted| wanted != relationship.relationship_type)
            {
                continue;
            }
            let (direction, other) = if outgoing && relationship.from_entity_id == logical_id {
                (NeighborDirection::Outgoing, &relationship.to_entity_id)
            } else if incoming && relationship.to_entity_id == logical_id {
                (NeighborDirection::Incoming, &relationship.from_entity_id)
            } else {
                continue;
            };
            let Some(entity) = snapshot.entity(other) else {
                continue;
            };
            neighbors.push(Neighbor {
                direction,
                relationship: relationship.clone(),
                entity: entity.clone(),
            });
        }

        tracing::debug!(
            version_id = %request.version_id,
            logical_id = %logical_id,
            count = neighbors.len(),
            "listed neighbors"
        );
        Ok(neighbors)
    }

    /// One stored row, by row id.
    pub fn get_entity(&mut self, entity_id: &str) -> Result<Entity, StoreError> {
        let tx = begin_read(&mut self.conn)?;
        let entity = entity_get_tx(&tx, entity_id)?;
        tx.commit()?;
        entity.ok_or_else(|| StoreError::UnknownEntity(entity_id.to_string()))
    }

    /// Rows written directly in `version_id`, in write order. Ancestors are not merged.
    pub fn list_version_entities(&mut self, version_id: &str) -> Result<Vec<Entity>, StoreError> {
        let tx = begin_read(&mut self.conn)?;
        ensure_version_tx(&tx, version_id)?;
        let entities = version_entities_tx(&tx, version_id)?;
        tx.commit()?;
        Ok(entities)
    }

    /// Relationship rows written directly in `version_id`, tombstones included.
    pub fn list_version_relationships(&mut self, version_id: &str) -> Result<Vec<Relationship>, StoreError> {
        let tx = begin_read(&mut self.conn)?;
        ensure_version_tx(&tx, version_id)?;
        let relationships = version_relationships_tx(&tx, version_id)?;
        tx.commit()?;
        Ok(relationships)
    }

    /// Materialized view of a version inside one read transaction, so the epoch check
    /// and the folded rows come from the same database snapshot.
    pub(in crate::store) fn read_snapshot(
        &mut self,
        version_id: &str,
        cancel: &CancelToken,
    ) -> Result<Arc<Snapshot>, StoreError> {
        let max_depth = self.config.max_chain_depth();
        let tx = begin_read(&mut self.conn)?;
        self.snapshots.sync_epoch(content_epoch_tx(&tx)?);
        let snapshot = materialize_tx(&tx, &mut self.snapshots, version_id, max_depth, cancel)?;
        tx.commit()?;
        Ok(snapshot)
    }
}
