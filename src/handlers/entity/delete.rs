//! Removal endpoints. Every entity goes through the cascade resolver, so
//! removing a User or Role also handles the records that reference it.

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Extension, Path, State},
    Json,
};
use serde::Deserialize;

use crate::app::AppState;
use crate::cascade::{Operation, Report};
use crate::error::ApiError;
use crate::filter::Filter;
use crate::middleware::{Actor, ApiResponse, ApiResult};
use crate::schema::EntityKind;

use super::utils::{entity_from_path, optional_body, require_ids, soft_delete_body};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRequest {
    /// Report what would be removed without removing anything
    #[serde(default)]
    pub is_warning: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManyRequest {
    pub ids: Option<Vec<String>>,
    #[serde(default)]
    pub is_warning: bool,
}

async fn run_cascade(state: &AppState, entity: EntityKind, filter: Filter, operation: Operation) -> ApiResult<Report> {
    let report = state.cascade.run(entity, &filter, &operation).await?;
    if report.root_count() == 0 {
        return Err(ApiError::not_found("Record not found"));
    }
    Ok(ApiResponse::success(report))
}

/// PUT /:entity/softDelete/:id
pub async fn soft_delete(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, String)>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<Report> {
    let entity = entity_from_path(&entity)?;
    run_cascade(&state, entity, Filter::by_id(id), Operation::SoftDelete(soft_delete_body(&actor))).await
}

/// PUT /:entity/softDeleteMany
pub async fn soft_delete_many(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Extension(actor): Extension<Actor>,
    payload: Result<Json<ManyRequest>, JsonRejection>,
) -> ApiResult<Report> {
    let entity = entity_from_path(&entity)?;
    let Json(request) = payload?;
    let ids = require_ids(request.ids)?;
    run_cascade(&state, entity, Filter::by_ids(&ids), Operation::SoftDelete(soft_delete_body(&actor))).await
}

/// DELETE /:entity/delete/:id - `{"isWarning": true}` previews the cascade.
/// Only an empty body means a plain delete; an unreadable one is rejected.
pub async fn delete(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, String)>,
    body: Bytes,
) -> ApiResult<Report> {
    let entity = entity_from_path(&entity)?;
    let request: DeleteRequest = optional_body(&body)?;
    let operation = if request.is_warning { Operation::Count } else { Operation::Delete };
    run_cascade(&state, entity, Filter::by_id(id), operation).await
}

/// POST /:entity/deleteMany
pub async fn delete_many(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    payload: Result<Json<ManyRequest>, JsonRejection>,
) -> ApiResult<Report> {
    let entity = entity_from_path(&entity)?;
    let Json(request) = payload?;
    let ids = require_ids(request.ids)?;
    let operation = if request.is_warning { Operation::Count } else { Operation::Delete };
    run_cascade(&state, entity, Filter::by_ids(&ids), operation).await
}
