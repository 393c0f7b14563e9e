use axum::{
    extract::{rejection::JsonRejection, Extension, Path, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::app::AppState;
use crate::database::Document;
use crate::error::ApiError;
use crate::middleware::{Actor, ApiResponse, ApiResult};

use super::utils::{entity_from_path, into_document, prepare_create};

#[derive(Debug, Deserialize)]
pub struct BulkCreateRequest {
    pub data: Option<Vec<Value>>,
}

/// POST /:entity/create - Create one record
pub async fn create(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Extension(actor): Extension<Actor>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Document> {
    let entity = entity_from_path(&entity)?;
    let Json(body) = payload?;
    let document = prepare_create(entity, into_document(body)?, &actor);

    let mut session = state.store.session().await?;
    let created = session.create(entity, document).await?;
    Ok(ApiResponse::created(created))
}

/// POST /:entity/addBulk - Create many records atomically
pub async fn add_bulk(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Extension(actor): Extension<Actor>,
    payload: Result<Json<BulkCreateRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let entity = entity_from_path(&entity)?;
    let Json(request) = payload?;
    let data = match request.data {
        Some(data) if !data.is_empty() => data,
        _ => return Err(ApiError::required_field("data")),
    };

    let documents = data
        .into_iter()
        .map(|item| Ok(prepare_create(entity, into_document(item)?, &actor)))
        .collect::<Result<Vec<_>, ApiError>>()?;

    let mut session = state.store.transaction().await?;
    let created = session.create_many(entity, documents).await?;
    session.commit().await?;

    tracing::info!("Bulk created {} {} records", created.len(), entity);
    Ok(ApiResponse::success(json!({ "count": created.len() })))
}
