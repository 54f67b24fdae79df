#![forbid(unsafe_code)]

use super::*;
use super::versions::insert_version_tx;
use gw_core::graph::{GraphVersion, Project};
use rusqlite::{OptionalExtension, Transaction, params};

impl SqliteStore {
    pub fn create_project(&mut self, request: CreateProjectRequest) -> Result<Project, StoreError> {
        let project = new_project(request)?;
        let tx = begin_write(&mut self.conn)?;
        insert_project_tx(&tx, &project)?;
        tx.commit()?;

        tracing::info!(project_id = %project.id, "project created");
        Ok(project)
    }

    /// Creates the project and its root working-set version in one transaction, so a
    /// project never exists without a working set.
    pub fn create_project_with_root(
        &mut self,
        request: CreateProjectRequest,
    ) -> Result<(Project, GraphVersion), StoreError> {
        let project = new_project(request)?;
        let root = GraphVersion {
            id: new_row_id(),
            project_id: project.id.clone(),
            parent_version_id: None,
            name: "root".to_string(),
            description: format!("initial state of {}", project.name),
            is_working_set: true,
            created_at_ms: project.created_at_ms,
        };

        let tx = begin_write(&mut self.conn)?;
        insert_project_tx(&tx, &project)?;
        insert_version_tx(&tx, &root)?;
        tx.execute(
            "INSERT INTO working_sets(project_id, version_id, updated_at_ms) VALUES (?1, ?2, ?3)",
            params![root.project_id, root.id, root.created_at_ms],
        )?;
        tx.commit()?;

        tracing::info!(project_id = %project.id, root_version_id = %root.id, "project initialised");
        Ok((project, root))
    }

    pub fn get_project(&mut self, project_id: &str) -> Result<Project, StoreError> {
        let tx = begin_read(&mut self.conn)?;
        let project = tx
            .query_row(
                &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id=?1"),
                params![project_id],
                project_from_row,
            )
            .optional()?;
        tx.commit()?;
        project.ok_or_else(|| StoreError::UnknownProject(project_id.to_string()))
    }

    /// All projects, oldest first.
    pub fn list_projects(&mut self) -> Result<Vec<Project>, StoreError> {
        let tx = begin_read(&mut self.conn)?;
        let projects = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {PROJECT_COLUMNS} FROM projects ORDER BY created_at_ms ASC, id ASC"
            ))?;
            stmt.query_map([], project_from_row)?
                .collect::<Result<Vec<_>, _>>()?
        };
        tx.commit()?;
        Ok(projects)
    }
}

fn new_project(request: CreateProjectRequest) -> Result<Project, StoreError> {
    let name = non_empty_text("name", &request.name)?;
    let id = match request.id.as_deref() {
        Some(id) => canonicalize_id("project_id", id)?,
        None => new_row_id(),
    };
    Ok(Project {
        id,
        name,
        theme: request.theme,
        genre: request.genre,
        description: request.description,
        created_at_ms: now_ms(),
    })
}

fn insert_project_tx(tx: &Transaction<'_>, project: &Project) -> Result<(), StoreError> {
    let inserted = tx.execute(
        "INSERT INTO projects(id, name, theme, genre, description, created_at_ms) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            project.id,
            project.name,
            project.theme,
            project.genre,
            project.description,
            project.created_at_ms
        ],
    );
    match inserted {
        Ok(_) => Ok(()),
        Err(err) if is_constraint_violation(&err) => {
            tracing::warn!(project_id = %project.id, "project id already taken");
            Err(StoreError::ProjectAlreadyExists(project.id.clone()))
        }
        Err(err) => Err(err.into()),
    }
}
