#![forbid(unsafe_code)]

use super::entity_type::EntityType;
use serde::{Deserialize, Serialize};

/// Schemaless payload attached to entities, relationships and annotations.
pub type DataMap = serde_json::Map<String, serde_json::Value>;

pub const LOGICAL_ID_KEY: &str = "logical_id";
pub const IMPORTED_FROM_PROJECT_KEY: &str = "imported_from_project";
pub const IMPORT_TIMESTAMP_KEY: &str = "import_timestamp";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub theme: Option<String>,
    pub genre: Option<String>,
    pub description: Option<String>,
    pub created_at_ms: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphVersion {
    pub id: String,
    pub project_id: String,
    pub parent_version_id: Option<String>,
    pub name: String,
    pub description: String,
    pub is_working_set: bool,
    pub created_at_ms: i64,
}

/// One immutable historical state of a logical entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub version_id: String,
    pub logical_id: String,
    pub entity_type: EntityType,
    pub name: String,
    pub data: DataMap,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl Entity {
    pub fn field(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }
}

/// Edges reference endpoints by logical id so they keep pointing at the current row
/// of each endpoint as the graph evolves.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: String,
    pub version_id: String,
    pub from_entity_id: String,
    pub to_entity_id: String,
    pub relationship_type: String,
    pub properties: DataMap,
    pub deleted: bool,
    pub created_at_ms: i64,
}

impl Relationship {
    pub fn key(&self) -> EdgeKey {
        EdgeKey {
            from: self.from_entity_id.clone(),
            rel: self.relationship_type.clone(),
            to: self.to_entity_id.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeKey {
    pub from: String,
    pub rel: String,
    pub to: String,
}

impl std::fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}|{}|{}", self.from, self.rel, self.to)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: String,
    pub entity_id: String,
    pub annotation_type: String,
    pub content: String,
    pub metadata: DataMap,
    pub agent_name: Option<String>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeighborDirection {
    Outgoing,
    Incoming,
    #[default]
    Both,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub direction: NeighborDirection,
    pub relationship: Relationship,
    pub entity: Entity,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityRevision {
    pub project_id: String,
    pub entity: Entity,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SharedEntitySummary {
    pub logical_id: String,
    pub name: String,
    pub entity_type: EntityType,
    pub project_count: usize,
    pub projects: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApplyResult {
    pub version_id: String,
    pub applied: usize,
    pub entities_written: usize,
    pub relationships_written: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityChange {
    pub before: Entity,
    pub after: Entity,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelationshipChange {
    pub before: Relationship,
    pub after: Relationship,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionDiff {
    pub added_entities: Vec<Entity>,
    pub changed_entities: Vec<EntityChange>,
    pub removed_entities: Vec<Entity>,
    pub added_relationships: Vec<Relationship>,
    pub changed_relationships: Vec<RelationshipChange>,
    pub removed_relationships: Vec<Relationship>,
}

impl VersionDiff {
    pub fn is_empty(&self) -> bool {
        self.added_entities.is_empty()
            && self.changed_entities.is_empty()
            && self.removed_entities.is_empty()
            && self.added_relationships.is_empty()
            && self.changed_relationships.is_empty()
            && self.removed_relationships.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ValidationIssue {
    pub code: &'static str,
    pub message: String,
    pub relationship_id: String,
    pub key: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VersionValidation {
    pub ok: bool,
    pub entities: usize,
    pub relationships: usize,
    pub issues: Vec<ValidationIssue>,
}
