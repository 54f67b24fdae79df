#![forbid(unsafe_code)]

use super::entity_type::EntityType;
use super::types::DataMap;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeltaOperation {
    Create,
    Update,
}

impl DeltaOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelationshipOperation {
    Create,
    Update,
    Delete,
}

impl RelationshipOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// A batch submitted by a delta producer. Operations stay raw strings until the
/// applicator validates them, so an unknown value rejects the whole batch.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplyRequest {
    pub parent_version_id: String,
    #[serde(default)]
    pub version_name: Option<String>,
    #[serde(default)]
    pub version_description: Option<String>,
    pub deltas: Vec<Delta>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    pub operation: String,
    #[serde(default)]
    pub entity_type: Option<String>,
    /// Logical id of the entity the delta creates or continues.
    #[serde(default)]
    pub entity_id: Option<String>,
    #[serde(default)]
    pub fields: DataMap,
    #[serde(default)]
    pub relationships: Vec<RelationshipDelta>,
}

impl Delta {
    pub fn create(entity_type: EntityType, logical_id: impl Into<String>) -> Self {
        Self {
            operation: DeltaOperation::Create.as_str().to_string(),
            entity_type: Some(entity_type.as_str().to_string()),
            entity_id: Some(logical_id.into()),
            ..Self::default()
        }
    }

    pub fn update(logical_id: impl Into<String>) -> Self {
        Self {
            operation: DeltaOperation::Update.as_str().to_string(),
            entity_id: Some(logical_id.into()),
            ..Self::default()
        }
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn relationship(mut self, relationship: RelationshipDelta) -> Self {
        self.relationships.push(relationship);
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationshipDelta {
    pub operation: String,
    /// Empty means the owning delta's entity.
    #[serde(default)]
    pub from_entity_id: String,
    pub to_entity_id: String,
    pub relationship_type: String,
    #[serde(default)]
    pub properties: DataMap,
}

impl RelationshipDelta {
    pub fn create(relationship_type: impl Into<String>, to_entity_id: impl Into<String>) -> Self {
        Self {
            operation: RelationshipOperation::Create.as_str().to_string(),
            from_entity_id: String::new(),
            to_entity_id: to_entity_id.into(),
            relationship_type: relationship_type.into(),
            properties: DataMap::new(),
        }
    }

    pub fn delete(relationship_type: impl Into<String>, to_entity_id: impl Into<String>) -> Self {
        Self {
            operation: RelationshipOperation::Delete.as_str().to_string(),
            ..Self::create(relationship_type, to_entity_id)
        }
    }

    pub fn from(mut self, from_entity_id: impl Into<String>) -> Self {
        self.from_entity_id = from_entity_id.into();
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}
