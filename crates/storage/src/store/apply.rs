#![forbid(unsafe_code)]

use super::snapshots::{Snapshot, materialize_tx};
use super::versions::insert_version_tx;
use super::*;
use gw_core::cancel::CancelToken;
use gw_core::graph::{
    ApplyRequest, ApplyResult, DataMap, Delta, DeltaOperation, EdgeKey, Entity, EntityType,
    GraphVersion, LOGICAL_ID_KEY, Relationship, RelationshipOperation,
};
use gw_core::naming::display_name;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Descriptions list at most this many deltas before summarizing the rest.
const DESCRIPTION_DELTA_LIMIT: usize = 8;

/// A delta whose strings have all been parsed; nothing here touches storage.
struct PlannedDelta<'a> {
    operation: DeltaOperation,
    entity_type: Option<EntityType>,
    logical_id: Option<String>,
    fields: &'a DataMap,
    relationships: Vec<PlannedRelationship<'a>>,
}

struct PlannedRelationship<'a> {
    operation: RelationshipOperation,
    /// `None` means the owning delta's entity.
    from: Option<String>,
    to: String,
    relationship_type: String,
    properties: &'a DataMap,
}

impl SqliteStore {
    /// Applies a batch of deltas on top of `parent_version_id` as one new child version.
    ///
    /// The batch is all-or-nothing: every delta is parsed before the transaction opens,
    /// and any failure inside it rolls back the version row together with every entity
    /// and relationship row. The working set is never moved.
    pub fn apply(&mut self, request: ApplyRequest) -> Result<ApplyResult, StoreError> {
        let parent_version_id = request.parent_version_id.clone();
        let result = self.apply_batch(request);
        if let Err(err) = &result {
            tracing::warn!(
                parent_version_id = %parent_version_id,
                code = err.code(),
                error = %err,
                "delta batch rejected"
            );
        }
        result
    }

    fn apply_batch(&mut self, request: ApplyRequest) -> Result<ApplyResult, StoreError> {
        if request.deltas.is_empty() {
            return Err(StoreError::InvalidInput("deltas must not be empty"));
        }
        let parent_version_id = canonicalize_id("parent_version_id", &request.parent_version_id)?;
        let planned = request
            .deltas
            .iter()
            .enumerate()
            .map(|(index, delta)| plan_delta(index, delta))
            .collect::<Result<Vec<_>, _>>()?;

        let now_ms = now_ms();
        let max_depth = self.config.max_chain_depth();
        let tx = begin_write(&mut self.conn)?;
        let parent = ensure_version_tx(&tx, &parent_version_id)?;
        self.snapshots.sync_epoch(content_epoch_tx(&tx)?);
        let base = materialize_tx(
            &tx,
            &mut self.snapshots,
            &parent.id,
            max_depth,
            &CancelToken::default(),
        )?;

        let version = GraphVersion {
            id: new_row_id(),
            project_id: parent.project_id.clone(),
            parent_version_id: Some(parent.id.clone()),
            name: match request.version_name.as_deref() {
                Some(name) => non_empty_text("version_name", name)?,
                None => format!("apply {} delta(s) onto {}", planned.len(), parent.name),
            },
            description: match request.version_description.as_deref() {
                Some(description) => description.trim().to_string(),
                None => describe_batch(&planned),
            },
            is_working_set: false,
            created_at_ms: now_ms,
        };
        insert_version_tx(&tx, &version)?;

        let mut batch = BatchView::new(&base);
        let mut owners = Vec::with_capacity(planned.len());
        for delta in &planned {
            let entity = batch.entity_row(delta, &version.id, now_ms)?;
            insert_entity_tx(&tx, &entity)?;
            owners.push(entity.logical_id.clone());
            batch.push_entity(entity);
        }

        // Relationships go second so an edge may point at an entity created later in
        // the same batch.
        for (delta, owner) in planned.iter().zip(&owners) {
            for planned_rel in &delta.relationships {
                let relationship = batch.relationship_row(owner, planned_rel, &version.id, now_ms)?;
                insert_relationship_tx(&tx, &relationship)?;
                batch.push_relationship(relationship);
            }
        }

        tx.commit()?;

        let result = ApplyResult {
            version_id: version.id.clone(),
            applied: planned.len(),
            entities_written: batch.entity_rows.len(),
            relationships_written: batch.relationship_rows.len(),
        };
        let snapshot = base.extend(&version.id, batch.entity_rows, batch.relationship_rows);
        self.snapshots.insert(Arc::new(snapshot));

        tracing::info!(
            project_id = %version.project_id,
            parent_version_id = %parent.id,
            version_id = %result.version_id,
            applied = result.applied,
            entities_written = result.entities_written,
            relationships_written = result.relationships_written,
            "delta batch applied"
        );
        Ok(result)
    }
}

fn plan_delta(index: usize, delta: &Delta) -> Result<PlannedDelta<'_>, StoreError> {
    let operation = DeltaOperation::parse(&delta.operation).ok_or_else(|| {
        StoreError::invalid_field(
            "operation",
            format!("delta {index}: unknown operation {:?}", delta.operation),
        )
    })?;

    let entity_type = delta
        .entity_type
        .as_deref()
        .filter(|raw| !raw.trim().is_empty())
        .map(|raw| {
            EntityType::parse(raw).ok_or_else(|| {
                StoreError::invalid_field(
                    "entity_type",
                    format!("delta {index}: unknown entity_type {raw:?}"),
                )
            })
        })
        .transpose()?;

    let explicit_id = delta
        .entity_id
        .as_deref()
        .filter(|raw| !raw.trim().is_empty())
        .map(canonicalize_logical_id)
        .transpose()?;
    let field_id = match delta.fields.get(LOGICAL_ID_KEY) {
        None => None,
        Some(serde_json::Value::String(raw)) => Some(canonicalize_logical_id(raw)?),
        Some(_) => {
            return Err(StoreError::invalid_field(
                "fields.logical_id",
                format!("delta {index}: fields.logical_id must be a string"),
            ));
        }
    };
    let logical_id = match (explicit_id, field_id) {
        (Some(explicit), Some(field)) if explicit != field => {
            return Err(StoreError::invalid_field(
                "fields.logical_id",
                format!("delta {index}: fields.logical_id {field} does not match entity_id {explicit}"),
            ));
        }
        (explicit, field) => explicit.or(field),
    };

    match operation {
        DeltaOperation::Create if entity_type.is_none() => {
            return Err(StoreError::invalid_field(
                "entity_type",
                format!("delta {index}: create requires entity_type"),
            ));
        }
        DeltaOperation::Update if logical_id.is_none() => {
            return Err(StoreError::invalid_field(
                "entity_id",
                format!("delta {index}: update requires entity_id"),
            ));
        }
        _ => {}
    }

    let relationships = delta
        .relationships
        .iter()
        .enumerate()
        .map(|(rel_index, rel)| {
            let operation = RelationshipOperation::parse(&rel.operation).ok_or_else(|| {
                StoreError::invalid_field(
                    "relationships.operation",
                    format!(
                        "delta {index} relationship {rel_index}: unknown operation {:?}",
                        rel.operation
                    ),
                )
            })?;
            let from = if rel.from_entity_id.trim().is_empty() {
                None
            } else {
                Some(canonicalize_logical_id(&rel.from_entity_id)?)
            };
            Ok(PlannedRelationship {
                operation,
                from,
                to: canonicalize_logical_id(&rel.to_entity_id)?,
                relationship_type: canonicalize_relationship_type(&rel.relationship_type)?,
                properties: &rel.properties,
            })
        })
        .collect::<Result<Vec<_>, StoreError>>()?;

    Ok(PlannedDelta {
        operation,
        entity_type,
        logical_id,
        fields: &delta.fields,
        relationships,
    })
}

fn describe_batch(planned: &[PlannedDelta<'_>]) -> String {
    let mut parts = planned
        .iter()
        .take(DESCRIPTION_DELTA_LIMIT)
        .map(|delta| {
            let target = delta.logical_id.as_deref().unwrap_or("<generated>");
            match delta.entity_type {
                Some(entity_type) => format!("{} {entity_type} {target}", delta.operation.as_str()),
                None => format!("{} {target}", delta.operation.as_str()),
            }
        })
        .collect::<Vec<_>>();
    if planned.len() > DESCRIPTION_DELTA_LIMIT {
        parts.push(format!("and {} more", planned.len() - DESCRIPTION_DELTA_LIMIT));
    }
    parts.join("; ")
}

/// The parent's materialized view plus everything written so far in this batch.
struct BatchView<'a> {
    base: &'a Snapshot,
    entities: BTreeMap<String, usize>,
    relationships: BTreeMap<EdgeKey, usize>,
    entity_rows: Vec<Entity>,
    relationship_rows: Vec<Relationship>,
}

impl<'a> BatchView<'a> {
    fn new(base: &'a Snapshot) -> Self {
        Self {
            base,
            entities: BTreeMap::new(),
            relationships: BTreeMap::new(),
            entity_rows: Vec::new(),
            relationship_rows: Vec::new(),
        }
    }

    fn entity(&self, logical_id: &str) -> Option<&Entity> {
        match self.entities.get(logical_id) {
            Some(index) => self.entity_rows.get(*index),
            None => self.base.entity(logical_id),
        }
    }

    fn active_relationship(&self, key: &EdgeKey) -> Option<&Relationship> {
        let current = match self.relationships.get(key) {
            Some(index) => self.relationship_rows.get(*index),
            None => self.base.relationships.get(key),
        };
        current.filter(|rel| !rel.deleted)
    }

    fn push_entity(&mut self, entity: Entity) {
        self.entities
            .insert(entity.logical_id.clone(), self.entity_rows.len());
        self.entity_rows.push(entity);
    }

    fn push_relationship(&mut self, relationship: Relationship) {
        self.relationships
            .insert(relationship.key(), self.relationship_rows.len());
        self.relationship_rows.push(relationship);
    }

    fn entity_row(
        &self,
        delta: &PlannedDelta<'_>,
        version_id: &str,
        now_ms: i64,
    ) -> Result<Entity, StoreError> {
        let (logical_id, entity_type, mut data) = match delta.operation {
            DeltaOperation::Create => {
                let logical_id = delta.logical_id.clone().unwrap_or_else(new_row_id);
                if self.entity(&logical_id).is_some() {
                    return Err(StoreError::invalid_field(
                        "entity_id",
                        format!("{logical_id} already exists in this version; use update"),
                    ));
                }
                let entity_type = delta.entity_type.ok_or_else(|| {
                    StoreError::invalid_field("entity_type", "create requires entity_type")
                })?;
                (logical_id, entity_type, delta.fields.clone())
            }
            DeltaOperation::Update => {
                let logical_id = delta.logical_id.clone().ok_or_else(|| {
                    StoreError::invalid_field("entity_id", "update requires entity_id")
                })?;
                let current = self.entity(&logical_id).ok_or_else(|| StoreError::UnknownLogicalId {
                    logical_id: logical_id.clone(),
                    scope: format!("parent of version {version_id}"),
                })?;
                if let Some(requested) = delta.entity_type
                    && requested != current.entity_type
                {
                    return Err(StoreError::invalid_field(
                        "entity_type",
                        format!(
                            "{logical_id} is a {}, not a {requested}",
                            current.entity_type
                        ),
                    ));
                }
                let merged = overlay_fields(&current.data, delta.fields);
                (logical_id, current.entity_type, merged)
            }
        };

        data.insert(
            LOGICAL_ID_KEY.to_string(),
            serde_json::Value::String(logical_id.clone()),
        );
        Ok(Entity {
            id: new_row_id(),
            version_id: version_id.to_string(),
            name: display_name(&data, &logical_id),
            logical_id,
            entity_type,
            data,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        })
    }

    fn relationship_row(
        &self,
        owner: &str,
        planned: &PlannedRelationship<'_>,
        version_id: &str,
        now_ms: i64,
    ) -> Result<Relationship, StoreError> {
        let from = planned.from.as_deref().unwrap_or(owner);
        for endpoint in [from, planned.to.as_str()] {
            if self.entity(endpoint).is_none() {
                return Err(StoreError::UnknownLogicalId {
                    logical_id: endpoint.to_string(),
                    scope: format!("relationship endpoints of version {version_id}"),
                });
            }
        }

        let key = EdgeKey {
            from: from.to_string(),
            rel: planned.relationship_type.clone(),
            to: planned.to.clone(),
        };
        let existing = self.active_relationship(&key);
        let (properties, deleted) = match (planned.operation, existing) {
            (RelationshipOperation::Create, None) => (planned.properties.clone(), false),
            (RelationshipOperation::Create, Some(_)) => {
                return Err(StoreError::invalid_field(
                    "relationships.operation",
                    format!("relationship {key} already exists; use update"),
                ));
            }
            (RelationshipOperation::Update, Some(current)) => {
                (overlay_fields(&current.properties, planned.properties), false)
            }
            (RelationshipOperation::Delete, Some(current)) => (current.properties.clone(), true),
            (RelationshipOperation::Update | RelationshipOperation::Delete, None) => {
                return Err(StoreError::UnknownRelationship(key.to_string()));
            }
        };

        Ok(Relationship {
            id: new_row_id(),
            version_id: version_id.to_string(),
            from_entity_id: key.from,
            to_entity_id: key.to,
            relationship_type: key.rel,
            properties,
            deleted,
            created_at_ms: now_ms,
        })
    }
}
