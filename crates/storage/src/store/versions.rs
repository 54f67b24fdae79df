#![forbid(unsafe_code)]

use super::*;
use gw_core::graph::GraphVersion;
use rusqlite::{Transaction, params};

impl SqliteStore {
    /// Creates a version row. Only a working-set request touches the pointer table, and
    /// it does so with a plain insert so a second working set fails on the primary key.
    pub fn create_version(&mut self, request: CreateVersionRequest) -> Result<GraphVersion, StoreError> {
        let project_id = canonicalize_id("project_id", &request.project_id)?;
        let name = non_empty_text("name", &request.name)?;
        let parent_version_id = request
            .parent_version_id
            .as_deref()
            .map(|id| canonicalize_id("parent_version_id", id))
            .transpose()?;

        let now_ms = now_ms();
        let tx = begin_write(&mut self.conn)?;
        ensure_project_tx(&tx, &project_id)?;

        if let Some(parent_id) = parent_version_id.as_deref() {
            let parent = ensure_version_tx(&tx, parent_id)?;
            if parent.project_id != project_id {
                return Err(StoreError::invalid_field(
                    "parent_version_id",
                    format!("parent version {parent_id} belongs to project {}", parent.project_id),
                ));
            }
        }

        let mut version = GraphVersion {
            id: new_row_id(),
            project_id,
            parent_version_id,
            name,
            description: request.description.trim().to_string(),
            is_working_set: false,
            created_at_ms: now_ms,
        };
        insert_version_tx(&tx, &version)?;

        if request.is_working_set {
            let inserted = tx.execute(
                "INSERT INTO working_sets(project_id, version_id, updated_at_ms) VALUES (?1, ?2, ?3)",
                params![version.project_id, version.id, now_ms],
            );
            match inserted {
                Ok(_) => version.is_working_set = true,
                Err(err) if is_constraint_violation(&err) => {
                    tracing::warn!(
                        project_id = %version.project_id,
                        "rejected second working-set version"
                    );
                    return Err(StoreError::WorkingSetConflict(version.project_id));
                }
                Err(err) => return Err(err.into()),
            }
        }

        tx.commit()?;
        tracing::info!(
            project_id = %version.project_id,
            version_id = %version.id,
            parent_version_id = ?version.parent_version_id,
            is_working_set = version.is_working_set,
            "version created"
        );
        Ok(version)
    }

    pub fn get_version(&mut self, version_id: &str) -> Result<GraphVersion, StoreError> {
        let tx = begin_read(&mut self.conn)?;
        let version = ensure_version_tx(&tx, version_id)?;
        tx.commit()?;
        Ok(version)
    }

    pub fn get_working_set(&mut self, project_id: &str) -> Result<GraphVersion, StoreError> {
        let tx = begin_read(&mut self.conn)?;
        ensure_project_tx(&tx, project_id)?;
        let version = working_set_tx(&tx, project_id)?;
        tx.commit()?;
        version.ok_or_else(|| StoreError::NoWorkingSet(project_id.to_string()))
    }

    /// Points the project's working set at `version_id`.
    ///
    /// The pointer moves with a single guarded upsert: the row is written only when the
    /// version belongs to the project, so there is never a moment with zero or two
    /// working sets. Repeating the call is a no-op.
    pub fn set_working_set(&mut self, project_id: &str, version_id: &str) -> Result<GraphVersion, StoreError> {
        let now_ms = now_ms();
        let tx = begin_write(&mut self.conn)?;
        let changed = tx.execute(
            "INSERT INTO working_sets(project_id, version_id, updated_at_ms) \
             SELECT ?1, ?2, ?3 \
             WHERE EXISTS(SELECT 1 FROM graph_versions WHERE id=?2 AND project_id=?1) \
             ON CONFLICT(project_id) DO UPDATE SET \
               version_id=excluded.version_id, updated_at_ms=excluded.updated_at_ms",
            params![project_id, version_id, now_ms],
        )?;

        if changed == 0 {
            ensure_project_tx(&tx, project_id)?;
            tracing::warn!(project_id, version_id, "working set target not in project");
            return Err(StoreError::UnknownVersion(version_id.to_string()));
        }

        let version = ensure_version_tx(&tx, version_id)?;
        tx.commit()?;
        tracing::info!(project_id, version_id, "working set moved");
        Ok(version)
    }

    /// Versions of one project, newest first.
    pub fn list_versions(&mut self, project_id: &str) -> Result<Vec<GraphVersion>, StoreError> {
        let tx = begin_read(&mut self.conn)?;
        ensure_project_tx(&tx, project_id)?;
        let versions = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {VERSION_COLUMNS} FROM {VERSION_FROM} \
                 WHERE v.project_id=?1 ORDER BY v.created_at_ms DESC, v.seq DESC"
            ))?;
            stmt.query_map(params![project_id], version_from_row)?
                .collect::<Result<Vec<_>, _>>()?
        };
        tx.commit()?;
        Ok(versions)
    }
}

pub(in crate::store) fn insert_version_tx(
    tx: &Transaction<'_>,
    version: &GraphVersion,
) -> Result<(), StoreError> {
    tx.execute(
        "INSERT INTO graph_versions(id, project_id, parent_version_id, name, description, created_at_ms) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            version.id,
            version.project_id,
            version.parent_version_id,
            version.name,
            version.description,
            version.created_at_ms
        ],
    )?;
    Ok(())
}
