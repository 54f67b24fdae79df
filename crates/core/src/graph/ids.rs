#![forbid(unsafe_code)]

/// Stable identity of a narrative element, shared by every row that records one
/// of its historical states.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogicalId(String);

impl LogicalId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn try_new(value: impl Into<String>) -> Result<Self, LogicalIdError> {
        let value = value.into();
        validate_logical_id(&value)?;
        Ok(Self(value.trim().to_string()))
    }
}

impl std::fmt::Display for LogicalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogicalIdError {
    Empty,
    TooLong,
    ContainsControl,
}

impl LogicalIdError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Empty => "logical_id must not be empty",
            Self::TooLong => "logical_id is too long",
            Self::ContainsControl => "logical_id contains control characters",
        }
    }
}

fn validate_logical_id(value: &str) -> Result<(), LogicalIdError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LogicalIdError::Empty);
    }
    if trimmed.len() > 256 {
        return Err(LogicalIdError::TooLong);
    }
    if trimmed.chars().any(|c| c.is_control()) {
        return Err(LogicalIdError::ContainsControl);
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelationshipType(String);

impl RelationshipType {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn try_new(value: impl Into<String>) -> Result<Self, RelationshipTypeError> {
        let value = value.into();
        validate_relationship_type(&value)?;
        Ok(Self(value.trim().to_string()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelationshipTypeError {
    Empty,
    TooLong,
    ContainsPipe,
    ContainsControl,
}

impl RelationshipTypeError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Empty => "relationship_type must not be empty",
            Self::TooLong => "relationship_type is too long",
            Self::ContainsPipe => "relationship_type must not contain '|'",
            Self::ContainsControl => "relationship_type contains control characters",
        }
    }
}

fn validate_relationship_type(value: &str) -> Result<(), RelationshipTypeError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(RelationshipTypeError::Empty);
    }
    if trimmed.len() > 128 {
        return Err(RelationshipTypeError::TooLong);
    }
    if trimmed.contains('|') {
        return Err(RelationshipTypeError::ContainsPipe);
    }
    if trimmed.chars().any(|c| c.is_control()) {
        return Err(RelationshipTypeError::ContainsControl);
    }
    Ok(())
}

/// Opaque row/project/version identifiers. They are never parsed, only bounded.
pub fn validate_opaque_id(value: &str) -> Result<(), OpaqueIdError> {
    if value.trim().is_empty() {
        return Err(OpaqueIdError::Empty);
    }
    if value.len() > 128 {
        return Err(OpaqueIdError::TooLong);
    }
    if value.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(OpaqueIdError::InvalidChar);
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OpaqueIdError {
    Empty,
    TooLong,
    InvalidChar,
}

impl OpaqueIdError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Empty => "id must not be empty",
            Self::TooLong => "id is too long",
            Self::InvalidChar => "id must not contain whitespace or control characters",
        }
    }
}
