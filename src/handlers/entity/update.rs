use axum::{
    extract::{rejection::JsonRejection, Extension, Path, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::app::AppState;
use crate::database::Document;
use crate::error::ApiError;
use crate::filter::Filter;
use crate::middleware::{Actor, ApiResponse, ApiResult};

use super::utils::{entity_from_path, into_document, parse_where, prepare_update};

#[derive(Debug, Default, Deserialize)]
pub struct BulkUpdateRequest {
    pub filter: Option<Value>,
    pub data: Option<Value>,
}

/// PUT /:entity/update/:id - Merge the body into one record
pub async fn update(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, String)>,
    Extension(actor): Extension<Actor>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Document> {
    let entity = entity_from_path(&entity)?;
    let Json(body) = payload?;
    let changes = prepare_update(into_document(body)?, &actor);
    let filter = Filter::by_id(id);

    let mut session = state.store.transaction().await?;
    if session.update_many(entity, &filter, &changes).await? == 0 {
        return Err(ApiError::not_found("Record not found"));
    }
    let updated = session
        .find_one(entity, &filter)
        .await?
        .ok_or_else(|| ApiError::not_found("Record not found"))?;
    session.commit().await?;
    Ok(ApiResponse::success(updated))
}

/// PUT /:entity/partial-update/:id
///
/// Records are documents, so a partial update merges exactly like `update`.
pub async fn partial_update(
    state: State<AppState>,
    path: Path<(String, String)>,
    actor: Extension<Actor>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Document> {
    update(state, path, actor, payload).await
}

/// PUT /:entity/updateBulk - Merge `data` into every record matching `filter`
pub async fn update_bulk(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Extension(actor): Extension<Actor>,
    payload: Result<Json<BulkUpdateRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let entity = entity_from_path(&entity)?;
    let Json(request) = payload?;
    let filter = parse_where(entity, request.filter.as_ref())?;
    let changes = prepare_update(into_document(request.data.unwrap_or(Value::Null))?, &actor);

    let mut session = state.store.session().await?;
    let count = session.update_many(entity, &filter, &changes).await?;
    if count == 0 {
        return Err(ApiError::not_found("Record not found"));
    }
    Ok(ApiResponse::success(json!({ "count": count })))
}
