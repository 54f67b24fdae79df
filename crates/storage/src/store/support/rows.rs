#![forbid(unsafe_code)]

use super::super::StoreError;
use super::json::{decode_map, encode_map};
use gw_core::graph::{Annotation, Entity, EntityType, GraphVersion, Project, Relationship};
use rusqlite::{OptionalExtension, Row, Transaction, params};

pub(in crate::store) const PROJECT_COLUMNS: &str =
    "id, name, theme, genre, description, created_at_ms";

pub(in crate::store) const VERSION_COLUMNS: &str = "v.id, v.project_id, v.parent_version_id, v.name, v.description, \
     (w.version_id IS NOT NULL), v.created_at_ms";

/// Join that derives `is_working_set` from the per-project pointer row.
pub(in crate::store) const VERSION_FROM: &str = "graph_versions v \
     LEFT JOIN working_sets w ON w.project_id = v.project_id AND w.version_id = v.id";

pub(in crate::store) const ENTITY_COLUMNS: &str =
    "id, version_id, logical_id, entity_type, name, data_json, created_at_ms, updated_at_ms";

pub(in crate::store) const RELATIONSHIP_COLUMNS: &str = "id, version_id, from_entity_id, to_entity_id, relationship_type, \
     properties_json, deleted, created_at_ms";

pub(in crate::store) const ANNOTATION_COLUMNS: &str = "id, entity_id, annotation_type, content, metadata_json, agent_name, \
     created_at_ms, updated_at_ms";

pub(in crate::store) fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        theme: row.get(2)?,
        genre: row.get(3)?,
        description: row.get(4)?,
        created_at_ms: row.get(5)?,
    })
}

pub(in crate::store) fn version_from_row(row: &Row<'_>) -> rusqlite::Result<GraphVersion> {
    Ok(GraphVersion {
        id: row.get(0)?,
        project_id: row.get(1)?,
        parent_version_id: row.get(2)?,
        name: row.get(3)?,
        description: row.get(4)?,
        is_working_set: row.get::<_, i64>(5)? != 0,
        created_at_ms: row.get(6)?,
    })
}

/// Raw entity columns; the payload is decoded outside the rusqlite closure so json
/// failures keep their own error variant.
pub(in crate::store) struct EntityRecord {
    id: String,
    version_id: String,
    logical_id: String,
    entity_type: String,
    name: String,
    data_json: String,
    created_at_ms: i64,
    updated_at_ms: i64,
}

impl EntityRecord {
    pub(in crate::store) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            version_id: row.get(1)?,
            logical_id: row.get(2)?,
            entity_type: row.get(3)?,
            name: row.get(4)?,
            data_json: row.get(5)?,
            created_at_ms: row.get(6)?,
            updated_at_ms: row.get(7)?,
        })
    }

    pub(in crate::store) fn into_entity(self) -> Result<Entity, StoreError> {
        let entity_type = EntityType::parse(&self.entity_type)
            .ok_or(StoreError::InvalidInput("stored entity_type is unknown"))?;
        Ok(Entity {
            id: self.id,
            version_id: self.version_id,
            logical_id: self.logical_id,
            entity_type,
            name: self.name,
            data: decode_map(&self.data_json)?,
            created_at_ms: self.created_at_ms,
            updated_at_ms: self.updated_at_ms,
        })
    }
}

pub(in crate::store) struct RelationshipRecord {
    id: String,
    version_id: String,
    from_entity_id: String,
    to_entity_id: String,
    relationship_type: String,
    properties_json: String,
    deleted: bool,
    created_at_ms: i64,
}

impl RelationshipRecord {
    pub(in crate::store) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            version_id: row.get(1)?,
            from_entity_id: row.get(2)?,
            to_entity_id: row.get(3)?,
            relationship_type: row.get(4)?,
            properties_json: row.get(5)?,
            deleted: row.get::<_, i64>(6)? != 0,
            created_at_ms: row.get(7)?,
        })
    }

    pub(in crate::store) fn into_relationship(self) -> Result<Relationship, StoreError> {
        Ok(Relationship {
            id: self.id,
            version_id: self.version_id,
            from_entity_id: self.from_entity_id,
            to_entity_id: self.to_entity_id,
            relationship_type: self.relationship_type,
            properties: decode_map(&self.properties_json)?,
            deleted: self.deleted,
            created_at_ms: self.created_at_ms,
        })
    }
}

pub(in crate::store) struct AnnotationRecord {
    id: String,
    entity_id: String,
    annotation_type: String,
    content: String,
    metadata_json: String,
    agent_name: Option<String>,
    created_at_ms: i64,
    updated_at_ms: i64,
}

impl AnnotationRecord {
    pub(in crate::store) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            entity_id: row.get(1)?,
            annotation_type: row.get(2)?,
            content: row.get(3)?,
            metadata_json: row.get(4)?,
            agent_name: row.get(5)?,
            created_at_ms: row.get(6)?,
            updated_at_ms: row.get(7)?,
        })
    }

    pub(in crate::store) fn into_annotation(self) -> Result<Annotation, StoreError> {
        Ok(Annotation {
            id: self.id,
            entity_id: self.entity_id,
            annotation_type: self.annotation_type,
            content: self.content,
            metadata: decode_map(&self.metadata_json)?,
            agent_name: self.agent_name,
            created_at_ms: self.created_at_ms,
            updated_at_ms: self.updated_at_ms,
        })
    }
}

pub(in crate::store) fn version_get_tx(
    tx: &Transaction<'_>,
    version_id: &str,
) -> Result<Option<GraphVersion>, StoreError> {
    Ok(tx
        .query_row(
            &format!("SELECT {VERSION_COLUMNS} FROM {VERSION_FROM} WHERE v.id=?1"),
            params![version_id],
            version_from_row,
        )
        .optional()?)
}

pub(in crate::store) fn ensure_version_tx(
    tx: &Transaction<'_>,
    version_id: &str,
) -> Result<GraphVersion, StoreError> {
    version_get_tx(tx, version_id)?.ok_or_else(|| StoreError::UnknownVersion(version_id.to_string()))
}

pub(in crate::store) fn project_exists_tx(
    tx: &Transaction<'_>,
    project_id: &str,
) -> Result<bool, StoreError> {
    Ok(tx
        .query_row(
            "SELECT 1 FROM projects WHERE id=?1",
            params![project_id],
            |row| row.get::<_, i64>(0),
        )
        .optional()?
        .is_some())
}

pub(in crate::store) fn ensure_project_tx(
    tx: &Transaction<'_>,
    project_id: &str,
) -> Result<(), StoreError> {
    if project_exists_tx(tx, project_id)? {
        Ok(())
    } else {
        Err(StoreError::UnknownProject(project_id.to_string()))
    }
}

pub(in crate::store) fn working_set_tx(
    tx: &Transaction<'_>,
    project_id: &str,
) -> Result<Option<GraphVersion>, StoreError> {
    Ok(tx
        .query_row(
            &format!(
                "SELECT {VERSION_COLUMNS} FROM working_sets p \
                 JOIN graph_versions v ON v.id = p.version_id \
                 LEFT JOIN working_sets w ON w.project_id = v.project_id AND w.version_id = v.id \
                 WHERE p.project_id=?1"
            ),
            params![project_id],
            version_from_row,
        )
        .optional()?)
}

pub(in crate::store) fn entity_get_tx(
    tx: &Transaction<'_>,
    entity_id: &str,
) -> Result<Option<Entity>, StoreError> {
    tx.query_row(
        &format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE id=?1"),
        params![entity_id],
        EntityRecord::from_row,
    )
    .optional()?
    .map(EntityRecord::into_entity)
    .transpose()
}

pub(in crate::store) fn version_entities_tx(
    tx: &Transaction<'_>,
    version_id: &str,
) -> Result<Vec<Entity>, StoreError> {
    let mut stmt = tx.prepare_cached(&format!(
        "SELECT {ENTITY_COLUMNS} FROM entities WHERE version_id=?1 ORDER BY seq ASC"
    ))?;
    let records = stmt
        .query_map(params![version_id], EntityRecord::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    records.into_iter().map(EntityRecord::into_entity).collect()
}

pub(in crate::store) fn version_relationships_tx(
    tx: &Transaction<'_>,
    version_id: &str,
) -> Result<Vec<Relationship>, StoreError> {
    let mut stmt = tx.prepare_cached(&format!(
        "SELECT {RELATIONSHIP_COLUMNS} FROM relationships WHERE version_id=?1 ORDER BY seq ASC"
    ))?;
    let records = stmt
        .query_map(params![version_id], RelationshipRecord::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    records
        .into_iter()
        .map(RelationshipRecord::into_relationship)
        .collect()
}

pub(in crate::store) fn insert_entity_tx(tx: &Transaction<'_>, entity: &Entity) -> Result<(), StoreError> {
    let data_json = encode_map(&entity.data)?;
    tx.execute(
        "INSERT INTO entities(id, version_id, logical_id, entity_type, name, data_json, created_at_ms, updated_at_ms) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            entity.id,
            entity.version_id,
            entity.logical_id,
            entity.entity_type.as_str(),
            entity.name,
            data_json,
            entity.created_at_ms,
            entity.updated_at_ms,
        ],
    )?;
    Ok(())
}

pub(in crate::store) fn insert_relationship_tx(
    tx: &Transaction<'_>,
    relationship: &Relationship,
) -> Result<(), StoreError> {
    let properties_json = encode_map(&relationship.properties)?;
    tx.execute(
        "INSERT INTO relationships(id, version_id, from_entity_id, to_entity_id, relationship_type, properties_json, deleted, created_at_ms) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            relationship.id,
            relationship.version_id,
            relationship.from_entity_id,
            relationship.to_entity_id,
            relationship.relationship_type,
            properties_json,
            if relationship.deleted { 1i64 } else { 0i64 },
            relationship.created_at_ms,
        ],
    )?;
    Ok(())
}
