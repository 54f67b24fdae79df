#![forbid(unsafe_code)]

use gw_core::cancel::CancelToken;
use gw_core::graph::{DataMap, EntityType, NeighborDirection};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CreateProjectRequest {
    /// Generated when absent.
    pub id: Option<String>,
    pub name: String,
    pub theme: Option<String>,
    pub genre: Option<String>,
    pub description: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CreateVersionRequest {
    pub project_id: String,
    pub parent_version_id: Option<String>,
    pub name: String,
    pub description: String,
    pub is_working_set: bool,
}

#[derive(Clone, Debug, Default)]
pub struct ListEntitiesRequest {
    pub version_id: String,
    pub entity_type: Option<EntityType>,
    pub cancel: CancelToken,
}

impl ListEntitiesRequest {
    pub fn new(version_id: impl Into<String>) -> Self {
        Self {
            version_id: version_id.into(),
            ..Self::default()
        }
    }

    pub fn of_type(mut self, entity_type: EntityType) -> Self {
        self.entity_type = Some(entity_type);
        self
    }
}

#[derive(Clone, Debug, Default)]
pub struct NeighborsRequest {
    pub version_id: String,
    pub logical_id: String,
    pub relationship_type: Option<String>,
    pub direction: NeighborDirection,
    pub cancel: CancelToken,
}

impl NeighborsRequest {
    pub fn new(version_id: impl Into<String>, logical_id: impl Into<String>) -> Self {
        Self {
            version_id: version_id.into(),
            logical_id: logical_id.into(),
            ..Self::default()
        }
    }

    pub fn relationship_type(mut self, relationship_type: impl Into<String>) -> Self {
        self.relationship_type = Some(relationship_type.into());
        self
    }

    pub fn direction(mut self, direction: NeighborDirection) -> Self {
        self.direction = direction;
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImportEntityRequest {
    pub target_version_id: String,
    pub source_project_id: String,
    pub logical_id: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CreateRelationshipRequest {
    pub version_id: String,
    pub from_entity_id: String,
    pub to_entity_id: String,
    pub relationship_type: String,
    pub properties: DataMap,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CreateAnnotationRequest {
    pub entity_id: String,
    pub annotation_type: String,
    pub content: String,
    pub metadata: DataMap,
    pub agent_name: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct UpdateAnnotationRequest {
    pub id: String,
    pub content: Option<String>,
    pub metadata: Option<DataMap>,
}
