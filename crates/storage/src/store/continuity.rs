#![forbid(unsafe_code)]

use super::snapshots::materialize_tx;
use super::*;
use gw_core::cancel::CancelToken;
use gw_core::graph::{
    Entity, EntityRevision, EntityType, IMPORT_TIMESTAMP_KEY, IMPORTED_FROM_PROJECT_KEY,
    SharedEntitySummary,
};
use rusqlite::params;

impl SqliteStore {
    /// Copies the current state of `logical_id` from the source project's working set
    /// into `target_version_id`, keeping the logical id and stamping provenance.
    ///
    /// The row lands in an existing version, so cached views of that version and of its
    /// descendants are dropped after commit.
    pub fn import_entity(&mut self, request: ImportEntityRequest) -> Result<Entity, StoreError> {
        let logical_id = canonicalize_logical_id(&request.logical_id)?;
        let source_project_id = canonicalize_id("source_project_id", &request.source_project_id)?;

        let now_ms = now_ms();
        let max_depth = self.config.max_chain_depth();
        let tx = begin_write(&mut self.conn)?;
        let target = ensure_version_tx(&tx, &request.target_version_id)?;
        ensure_project_tx(&tx, &source_project_id)?;
        let working_set = working_set_tx(&tx, &source_project_id)?
            .ok_or_else(|| StoreError::NoWorkingSet(source_project_id.clone()))?;

        let observed_epoch = content_epoch_tx(&tx)?;
        self.snapshots.sync_epoch(observed_epoch);
        let source = materialize_tx(
            &tx,
            &mut self.snapshots,
            &working_set.id,
            max_depth,
            &CancelToken::default(),
        )?;
        let original = source
            .entity(&logical_id)
            .ok_or_else(|| StoreError::UnknownLogicalId {
                logical_id: logical_id.clone(),
                scope: format!("working set of project {source_project_id}"),
            })?;

        let mut data = original.data.clone();
        data.insert(
            IMPORTED_FROM_PROJECT_KEY.to_string(),
            serde_json::Value::String(source_project_id.clone()),
        );
        data.insert(IMPORT_TIMESTAMP_KEY.to_string(), now_ms.into());

        let entity = Entity {
            id: new_row_id(),
            version_id: target.id.clone(),
            logical_id,
            entity_type: original.entity_type,
            name: original.name.clone(),
            data,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        };
        insert_entity_tx(&tx, &entity)?;
        let committed_epoch = bump_content_epoch_tx(&tx, now_ms)?;
        tx.commit()?;

        self.snapshots
            .after_in_place_write(&target.id, observed_epoch, committed_epoch);
        tracing::info!(
            logical_id = %entity.logical_id,
            source_project_id = %source_project_id,
            source_version_id = %working_set.id,
            target_project_id = %target.project_id,
            target_version_id = %target.id,
            entity_id = %entity.id,
            "entity imported"
        );
        Ok(entity)
    }

    /// Every stored row of `logical_id` across all projects, oldest first. Rows written
    /// in the same millisecond keep insertion order.
    pub fn entity_history(&mut self, logical_id: &str) -> Result<Vec<EntityRevision>, StoreError> {
        let logical_id = canonicalize_logical_id(logical_id)?;
        let tx = begin_read(&mut self.conn)?;
        let records = {
            let mut stmt = tx.prepare_cached(
                "SELECT e.id, e.version_id, e.logical_id, e.entity_type, e.name, e.data_json, \
                        e.created_at_ms, e.updated_at_ms, v.project_id \
                 FROM entities e JOIN graph_versions v ON v.id = e.version_id \
                 WHERE e.logical_id=?1 \
                 ORDER BY e.created_at_ms ASC, e.seq ASC",
            )?;
            stmt.query_map(params![logical_id], |row| {
                Ok((EntityRecord::from_row(row)?, row.get::<_, String>(8)?))
            })?
            .collect::<Result<Vec<_>, _>>()?
        };
        tx.commit()?;

        let history = records
            .into_iter()
            .map(|(record, project_id)| {
                Ok(EntityRevision {
                    project_id,
                    entity: record.into_entity()?,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;
        tracing::debug!(logical_id = %logical_id, revisions = history.len(), "entity history");
        Ok(history)
    }

    /// Logical ids that have rows in more than one project. Name and type come from the
    /// most recent row; projects are listed in order of first appearance.
    pub fn list_shared_entities(&mut self) -> Result<Vec<SharedEntitySummary>, StoreError> {
        let tx = begin_read(&mut self.conn)?;
        let mut shared = Vec::new();
        {
            let mut groups = tx.prepare(
                "SELECT e.logical_id \
                 FROM entities e JOIN graph_versions v ON v.id = e.version_id \
                 GROUP BY e.logical_id \
                 HAVING COUNT(DISTINCT v.project_id) > 1 \
                 ORDER BY e.logical_id ASC",
            )?;
            let logical_ids = groups
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;

            let mut projects_stmt = tx.prepare_cached(
                "SELECT v.project_id \
                 FROM entities e JOIN graph_versions v ON v.id = e.version_id \
                 WHERE e.logical_id=?1 \
                 GROUP BY v.project_id \
                 ORDER BY MIN(e.seq) ASC",
            )?;
            let mut latest_stmt = tx.prepare_cached(
                "SELECT name, entity_type FROM entities \
                 WHERE logical_id=?1 \
                 ORDER BY created_at_ms DESC, seq DESC LIMIT 1",
            )?;

            for logical_id in logical_ids {
                let projects = projects_stmt
                    .query_map(params![logical_id], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                let (name, raw_type) = latest_stmt.query_row(params![logical_id], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?;
                let entity_type = EntityType::parse(&raw_type)
                    .ok_or(StoreError::InvalidInput("stored entity_type is unknown"))?;
                shared.push(SharedEntitySummary {
                    logical_id,
                    name,
                    entity_type,
                    project_count: projects.len(),
                    projects,
                });
            }
        }
        tx.commit()?;
        tracing::debug!(count = shared.len(), "listed shared entities");
        Ok(shared)
    }
}
