#![forbid(unsafe_code)]

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("invalid input: {message}")]
    InvalidField { field: &'static str, message: String },
    #[error("unknown project: {0}")]
    UnknownProject(String),
    #[error("unknown version: {0}")]
    UnknownVersion(String),
    #[error("unknown entity: {0}")]
    UnknownEntity(String),
    #[error("unknown logical id {logical_id} in {scope}")]
    UnknownLogicalId { logical_id: String, scope: String },
    #[error("unknown relationship: {0}")]
    UnknownRelationship(String),
    #[error("unknown annotation: {0}")]
    UnknownAnnotation(String),
    #[error("project {0} has no working set")]
    NoWorkingSet(String),
    #[error("project {0} already has a working set")]
    WorkingSetConflict(String),
    #[error("project already exists: {0}")]
    ProjectAlreadyExists(String),
    #[error("version chain cycle at {0}")]
    VersionCycle(String),
    #[error("version chain deeper than {0}")]
    ChainDepthExceeded(usize),
    #[error("operation cancelled")]
    Cancelled,
}

impl StoreError {
    /// Stable machine-readable code, independent of the message text.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(message) if message.starts_with("RESET_REQUIRED") => "RESET_REQUIRED",
            Self::InvalidInput(_) | Self::InvalidField { .. } => "VALIDATION",
            Self::UnknownProject(_)
            | Self::UnknownVersion(_)
            | Self::UnknownEntity(_)
            | Self::UnknownLogicalId { .. }
            | Self::UnknownRelationship(_)
            | Self::UnknownAnnotation(_)
            | Self::NoWorkingSet(_) => "NOT_FOUND",
            Self::WorkingSetConflict(_) | Self::ProjectAlreadyExists(_) => "CONFLICT",
            Self::Cancelled => "CANCELLED",
            Self::Io(_)
            | Self::Sql(_)
            | Self::Json(_)
            | Self::VersionCycle(_)
            | Self::ChainDepthExceeded(_) => "STORAGE",
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.code() == "NOT_FOUND"
    }

    pub fn is_validation(&self) -> bool {
        self.code() == "VALIDATION"
    }

    pub fn is_conflict(&self) -> bool {
        self.code() == "CONFLICT"
    }

    pub(in crate::store) fn invalid_field(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            message: message.into(),
        }
    }
}
