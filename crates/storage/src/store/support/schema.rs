#![forbid(unsafe_code)]

use super::super::StoreError;
use super::time::now_ms;
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::BTreeSet;

pub(in crate::store) const SCHEMA_VERSION: i64 = 1;

const REQUIRED_TABLES: &[&str] = &[
    "store_state",
    "projects",
    "graph_versions",
    "working_sets",
    "entities",
    "relationships",
    "annotations",
];

/// Refuses databases this store did not create (or created under another schema version).
pub(in crate::store) fn preflight_gate(conn: &Connection) -> Result<(), StoreError> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
    )?;
    let mut rows = stmt.query([])?;
    let mut tables = BTreeSet::new();
    while let Some(row) = rows.next()? {
        tables.insert(row.get::<_, String>(0)?);
    }

    if tables.is_empty() {
        return Ok(());
    }

    let required: BTreeSet<&str> = REQUIRED_TABLES.iter().copied().collect();

    if tables
        .iter()
        .any(|table| !required.contains(table.as_str()))
    {
        return Err(StoreError::InvalidInput(
            "RESET_REQUIRED: unsupported tables detected",
        ));
    }

    for table in required {
        if !tables.contains(table) {
            return Err(StoreError::InvalidInput(
                "RESET_REQUIRED: required table is missing",
            ));
        }
    }

    let version = conn
        .query_row(
            "SELECT schema_version FROM store_state WHERE singleton=1",
            [],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;

    match version {
        Some(v) if v == SCHEMA_VERSION => Ok(()),
        Some(_) => Err(StoreError::InvalidInput(
            "RESET_REQUIRED: schema version mismatch",
        )),
        None => Err(StoreError::InvalidInput(
            "RESET_REQUIRED: schema state row is missing",
        )),
    }
}

pub(in crate::store) fn install_schema(conn: &Connection) -> Result<(), StoreError> {
    let now_ms = now_ms();

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS store_state (
          singleton INTEGER PRIMARY KEY CHECK(singleton = 1),
          schema_version INTEGER NOT NULL,
          content_epoch INTEGER NOT NULL DEFAULT 0,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS projects (
          id TEXT PRIMARY KEY,
          name TEXT NOT NULL,
          theme TEXT,
          genre TEXT,
          description TEXT,
          created_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS graph_versions (
          seq INTEGER PRIMARY KEY AUTOINCREMENT,
          id TEXT NOT NULL UNIQUE,
          project_id TEXT NOT NULL,
          parent_version_id TEXT,
          name TEXT NOT NULL,
          description TEXT NOT NULL,
          created_at_ms INTEGER NOT NULL,
          UNIQUE(project_id, id),
          FOREIGN KEY(project_id) REFERENCES projects(id) ON DELETE CASCADE,
          FOREIGN KEY(project_id, parent_version_id)
            REFERENCES graph_versions(project_id, id)
            ON DELETE RESTRICT,
          CHECK(parent_version_id IS NULL OR parent_version_id <> id)
        );

        CREATE INDEX IF NOT EXISTS idx_graph_versions_project_created
          ON graph_versions(project_id, created_at_ms, seq);

        CREATE TABLE IF NOT EXISTS working_sets (
          project_id TEXT PRIMARY KEY,
          version_id TEXT NOT NULL,
          updated_at_ms INTEGER NOT NULL,
          FOREIGN KEY(project_id, version_id)
            REFERENCES graph_versions(project_id, id)
            ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS entities (
          seq INTEGER PRIMARY KEY AUTOINCREMENT,
          id TEXT NOT NULL UNIQUE,
          version_id TEXT NOT NULL,
          logical_id TEXT NOT NULL,
          entity_type TEXT NOT NULL,
          name TEXT NOT NULL,
          data_json TEXT NOT NULL,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL,
          FOREIGN KEY(version_id) REFERENCES graph_versions(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_entities_version_seq
          ON entities(version_id, seq);
        CREATE INDEX IF NOT EXISTS idx_entities_logical_created
          ON entities(logical_id, created_at_ms, seq);

        CREATE TABLE IF NOT EXISTS relationships (
          seq INTEGER PRIMARY KEY AUTOINCREMENT,
          id TEXT NOT NULL UNIQUE,
          version_id TEXT NOT NULL,
          from_entity_id TEXT NOT NULL,
          to_entity_id TEXT NOT NULL,
          relationship_type TEXT NOT NULL,
          properties_json TEXT NOT NULL,
          deleted INTEGER NOT NULL DEFAULT 0,
          created_at_ms INTEGER NOT NULL,
          FOREIGN KEY(version_id) REFERENCES graph_versions(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_relationships_version_seq
          ON relationships(version_id, seq);

        CREATE TABLE IF NOT EXISTS annotations (
          id TEXT PRIMARY KEY,
          entity_id TEXT NOT NULL,
          annotation_type TEXT NOT NULL,
          content TEXT NOT NULL,
          metadata_json TEXT NOT NULL,
          agent_name TEXT,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL,
          FOREIGN KEY(entity_id) REFERENCES entities(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_annotations_entity_created
          ON annotations(entity_id, created_at_ms);
        "#,
    )?;

    conn.execute(
        "INSERT INTO store_state(singleton, schema_version, content_epoch, created_at_ms, updated_at_ms) \
         VALUES (1, ?1, 0, ?2, ?2) \
         ON CONFLICT(singleton) DO UPDATE SET schema_version=excluded.schema_version, updated_at_ms=excluded.updated_at_ms",
        params![SCHEMA_VERSION, now_ms],
    )?;

    Ok(())
}
