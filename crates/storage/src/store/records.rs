#![forbid(unsafe_code)]

use super::snapshots::materialize_tx;
use super::*;
use gw_core::cancel::CancelToken;
use gw_core::graph::{Annotation, Relationship};
use rusqlite::{OptionalExtension, params};

impl SqliteStore {
    /// Inserts one relationship row straight into an existing version. Both endpoints
    /// must resolve in that version's view.
    pub fn create_relationship(
        &mut self,
        request: CreateRelationshipRequest,
    ) -> Result<Relationship, StoreError> {
        let from_entity_id = canonicalize_logical_id(&request.from_entity_id)?;
        let to_entity_id = canonicalize_logical_id(&request.to_entity_id)?;
        let relationship_type = canonicalize_relationship_type(&request.relationship_type)?;

        let now_ms = now_ms();
        let max_depth = self.config.max_chain_depth();
        let tx = begin_write(&mut self.conn)?;
        let version = ensure_version_tx(&tx, &request.version_id)?;
        let observed_epoch = content_epoch_tx(&tx)?;
        self.snapshots.sync_epoch(observed_epoch);
        let view = materialize_tx(
            &tx,
            &mut self.snapshots,
            &version.id,
            max_depth,
            &CancelToken::default(),
        )?;
        for endpoint in [&from_entity_id, &to_entity_id] {
            if view.entity(endpoint).is_none() {
                return Err(StoreError::UnknownLogicalId {
                    logical_id: endpoint.clone(),
                    scope: format!("version {}", version.id),
                });
            }
        }

        let relationship = Relationship {
            id: new_row_id(),
            version_id: version.id.clone(),
            from_entity_id,
            to_entity_id,
            relationship_type,
            properties: request.properties,
            deleted: false,
            created_at_ms: now_ms,
        };
        insert_relationship_tx(&tx, &relationship)?;
        let committed_epoch = bump_content_epoch_tx(&tx, now_ms)?;
        tx.commit()?;

        self.snapshots
            .after_in_place_write(&version.id, observed_epoch, committed_epoch);
        tracing::info!(
            version_id = %version.id,
            relationship_id = %relationship.id,
            key = %relationship.key(),
            "relationship created"
        );
        Ok(relationship)
    }

    pub fn get_relationship(&mut self, relationship_id: &str) -> Result<Relationship, StoreError> {
        let tx = begin_read(&mut self.conn)?;
        let record = tx
            .query_row(
                &format!("SELECT {RELATIONSHIP_COLUMNS} FROM relationships WHERE id=?1"),
                params![relationship_id],
                RelationshipRecord::from_row,
            )
            .optional()?;
        tx.commit()?;
        record
            .ok_or_else(|| StoreError::UnknownRelationship(relationship_id.to_string()))?
            .into_relationship()
    }

    /// Administrative removal of a stored row. Unlike a delete delta this rewrites
    /// history, so every cached view built on the row's version is dropped.
    pub fn delete_relationship(&mut self, relationship_id: &str) -> Result<(), StoreError> {
        let now_ms = now_ms();
        let tx = begin_write(&mut self.conn)?;
        let version_id = tx
            .query_row(
                "SELECT version_id FROM relationships WHERE id=?1",
                params![relationship_id],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .ok_or_else(|| StoreError::UnknownRelationship(relationship_id.to_string()))?;
        let observed_epoch = content_epoch_tx(&tx)?;
        tx.execute(
            "DELETE FROM relationships WHERE id=?1",
            params![relationship_id],
        )?;
        let committed_epoch = bump_content_epoch_tx(&tx, now_ms)?;
        tx.commit()?;

        self.snapshots
            .after_in_place_write(&version_id, observed_epoch, committed_epoch);
        tracing::info!(relationship_id, version_id = %version_id, "relationship row deleted");
        Ok(())
    }

    pub fn create_annotation(&mut self, request: CreateAnnotationRequest) -> Result<Annotation, StoreError> {
        let annotation_type = non_empty_text("annotation_type", &request.annotation_type)?;
        let agent_name = request
            .agent_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string);
        let metadata_json = encode_map(&request.metadata)?;

        let now_ms = now_ms();
        let tx = begin_write(&mut self.conn)?;
        if entity_get_tx(&tx, &request.entity_id)?.is_none() {
            return Err(StoreError::UnknownEntity(request.entity_id));
        }
        let annotation = Annotation {
            id: new_row_id(),
            entity_id: request.entity_id,
            annotation_type,
            content: request.content,
            metadata: request.metadata,
            agent_name,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        };
        tx.execute(
            "INSERT INTO annotations(id, entity_id, annotation_type, content, metadata_json, agent_name, created_at_ms, updated_at_ms) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                annotation.id,
                annotation.entity_id,
                annotation.annotation_type,
                annotation.content,
                metadata_json,
                annotation.agent_name,
                now_ms
            ],
        )?;
        tx.commit()?;
        tracing::info!(
            annotation_id = %annotation.id,
            entity_id = %annotation.entity_id,
            annotation_type = %annotation.annotation_type,
            "annotation created"
        );
        Ok(annotation)
    }

    pub fn get_annotation(&mut self, annotation_id: &str) -> Result<Annotation, StoreError> {
        let tx = begin_read(&mut self.conn)?;
        let annotation = annotation_get_tx(&tx, annotation_id)?;
        tx.commit()?;
        annotation.ok_or_else(|| StoreError::UnknownAnnotation(annotation_id.to_string()))
    }

    /// Annotations of one entity row, oldest first.
    pub fn list_annotations(&mut self, entity_id: &str) -> Result<Vec<Annotation>, StoreError> {
        let tx = begin_read(&mut self.conn)?;
        if entity_get_tx(&tx, entity_id)?.is_none() {
            return Err(StoreError::UnknownEntity(entity_id.to_string()));
        }
        let records = {
            let mut stmt = tx.prepare_cached(&format!(
                "SELECT {ANNOTATION_COLUMNS} FROM annotations \
                 WHERE entity_id=?1 ORDER BY created_at_ms ASC, rowid ASC"
            ))?;
            stmt.query_map(params![entity_id], AnnotationRecord::from_row)?
                .collect::<Result<Vec<_>, _>>()?
        };
        tx.commit()?;
        records
            .into_iter()
            .map(AnnotationRecord::into_annotation)
            .collect()
    }

    /// Annotations are mutable commentary, not graph state: they are edited in place.
    pub fn update_annotation(&mut self, request: UpdateAnnotationRequest) -> Result<Annotation, StoreError> {
        if request.content.is_none() && request.metadata.is_none() {
            return Err(StoreError::InvalidInput(
                "update_annotation needs content or metadata",
            ));
        }
        let metadata_json = request.metadata.as_ref().map(encode_map).transpose()?;

        let now_ms = now_ms();
        let tx = begin_write(&mut self.conn)?;
        let changed = tx.execute(
            "UPDATE annotations SET \
               content=COALESCE(?2, content), \
               metadata_json=COALESCE(?3, metadata_json), \
               updated_at_ms=?4 \
             WHERE id=?1",
            params![request.id, request.content, metadata_json, now_ms],
        )?;
        if changed == 0 {
            return Err(StoreError::UnknownAnnotation(request.id));
        }
        let annotation = annotation_get_tx(&tx, &request.id)?
            .ok_or_else(|| StoreError::UnknownAnnotation(request.id.clone()))?;
        tx.commit()?;
        tracing::info!(annotation_id = %annotation.id, "annotation updated");
        Ok(annotation)
    }

    pub fn delete_annotation(&mut self, annotation_id: &str) -> Result<(), StoreError> {
        let tx = begin_write(&mut self.conn)?;
        let changed = tx.execute("DELETE FROM annotations WHERE id=?1", params![annotation_id])?;
        if changed == 0 {
            return Err(StoreError::UnknownAnnotation(annotation_id.to_string()));
        }
        tx.commit()?;
        tracing::info!(annotation_id, "annotation deleted");
        Ok(())
    }

    /// Removes every annotation on one entity row; returns how many were removed.
    pub fn delete_annotations_for_entity(&mut self, entity_id: &str) -> Result<usize, StoreError> {
        let tx = begin_write(&mut self.conn)?;
        let removed = tx.execute("DELETE FROM annotations WHERE entity_id=?1", params![entity_id])?;
        tx.commit()?;
        tracing::info!(entity_id, removed, "annotations deleted for entity");
        Ok(removed)
    }
}

fn annotation_get_tx(
    tx: &rusqlite::Transaction<'_>,
    annotation_id: &str,
) -> Result<Option<Annotation>, StoreError> {
    tx.query_row(
        &format!("SELECT {ANNOTATION_COLUMNS} FROM annotations WHERE id=?1"),
        params![annotation_id],
        AnnotationRecord::from_row,
    )
    .optional()?
    .map(AnnotationRecord::into_annotation)
    .transpose()
}
