use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::config::CONFIG;
use crate::database::store::sanitize_changes;
use crate::database::Document;
use crate::error::ApiError;
use crate::filter::Filter;
use crate::middleware::Actor;
use crate::schema::EntityKind;

/// Resolve the `:entity` path segment
pub fn entity_from_path(name: &str) -> Result<EntityKind, ApiError> {
    Ok(name.parse::<EntityKind>()?)
}

pub fn into_document(value: Value) -> Result<Document, ApiError> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        _ => Err(ApiError::bad_request("Request body must be a JSON object")),
    }
}

/// Parse an optional where-clause; absent or `null` matches everything
pub fn parse_where(entity: EntityKind, where_data: Option<&Value>) -> Result<Filter, ApiError> {
    let filter = Filter::from_json(where_data.unwrap_or(&Value::Null))?;
    if CONFIG.filter.debug_logging {
        tracing::debug!("Filter on {}: {:?}", entity, filter);
    }
    Ok(filter)
}

/// Non-empty `ids` list from a bulk request
pub fn require_ids(ids: Option<Vec<String>>) -> Result<Vec<String>, ApiError> {
    match ids {
        Some(ids) if !ids.is_empty() => Ok(ids),
        _ => Err(ApiError::bad_request("Insufficient request parameters! ids is required.")),
    }
}

/// Fields for a new record: caller data with system fields stripped, the
/// owner field defaulted to the actor, and `addedBy` stamped
pub fn prepare_create(entity: EntityKind, document: Document, actor: &Actor) -> Document {
    let mut prepared = sanitize_changes(&document);
    if let Some(owner) = entity.descriptor().owner_field {
        prepared.entry(owner).or_insert_with(|| actor.as_value());
    }
    if actor.user_id.is_some() {
        prepared.insert("addedBy".to_string(), actor.as_value());
    }
    prepared
}

/// Caller changes with `updatedBy` stamped
pub fn prepare_update(changes: Document, actor: &Actor) -> Document {
    let mut prepared = sanitize_changes(&changes);
    prepared.insert("updatedBy".to_string(), actor.as_value());
    prepared
}

/// Decode an optional JSON body: empty means `T::default()`, anything else
/// must parse
pub fn optional_body<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::invalid_json(format!("Failed to parse the request body as JSON: {}", e)))
}

/// Conventional soft-delete body
pub fn soft_delete_body(actor: &Actor) -> Document {
    let mut body = Map::new();
    body.insert("isDeleted".to_string(), Value::Bool(true));
    body.insert("updatedBy".to_string(), actor.as_value());
    body
}
