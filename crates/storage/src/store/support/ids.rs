#![forbid(unsafe_code)]

use super::super::StoreError;
use gw_core::graph::{LogicalId, RelationshipType, validate_opaque_id};

pub(in crate::store) fn new_row_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub(in crate::store) fn canonicalize_id(field: &'static str, value: &str) -> Result<String, StoreError> {
    validate_opaque_id(value)
        .map_err(|err| StoreError::invalid_field(field, format!("{field}: {}", err.message())))?;
    Ok(value.to_string())
}

pub(in crate::store) fn canonicalize_logical_id(value: &str) -> Result<String, StoreError> {
    LogicalId::try_new(value)
        .map(LogicalId::into_string)
        .map_err(|err| StoreError::invalid_field("logical_id", err.message()))
}

pub(in crate::store) fn canonicalize_relationship_type(value: &str) -> Result<String, StoreError> {
    RelationshipType::try_new(value)
        .map(RelationshipType::into_string)
        .map_err(|err| StoreError::invalid_field("relationship_type", err.message()))
}

pub(in crate::store) fn non_empty_text(field: &'static str, value: &str) -> Result<String, StoreError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(StoreError::invalid_field(field, format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}
