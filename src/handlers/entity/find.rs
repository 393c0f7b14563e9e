use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::app::AppState;
use crate::config::CONFIG;
use crate::database::Document;
use crate::error::ApiError;
use crate::filter::{Filter, FilterError, FilterOrder, FindOptions};
use crate::middleware::{ApiResponse, ApiResult};

use super::utils::{entity_from_path, parse_where};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRequest {
    pub query: Option<Value>,
    pub options: Option<ListOptions>,
    #[serde(default)]
    pub is_count_only: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListOptions {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub sort: Option<Value>,
    /// `"name email"`, `["name", "email"]` or `{ "name": 1 }`
    pub select: Option<Value>,
    /// `false` returns every match on one page
    pub pagination: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CountRequest {
    #[serde(rename = "where")]
    pub where_clause: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Paginator {
    pub item_count: u64,
    pub per_page: i64,
    pub page_count: u64,
    pub current_page: i64,
    pub sl_no: i64,
    pub has_prev_page: bool,
    pub has_next_page: bool,
    pub prev: Option<i64>,
    pub next: Option<i64>,
}

impl Paginator {
    pub fn new(item_count: u64, per_page: i64, current_page: i64) -> Self {
        let page_count = if per_page > 0 {
            (item_count.div_ceil(per_page as u64)).max(1)
        } else {
            1
        };
        let has_prev_page = current_page > 1;
        let has_next_page = (current_page as u64) < page_count;
        Self {
            item_count,
            per_page,
            page_count,
            current_page,
            sl_no: (current_page - 1).saturating_mul(per_page).saturating_add(1),
            has_prev_page,
            has_next_page,
            prev: has_prev_page.then(|| current_page - 1),
            next: has_next_page.then(|| current_page + 1),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Page {
    pub data: Vec<Document>,
    pub paginator: Paginator,
}

/// Page size requested by the caller, bounded by configuration
pub(crate) fn resolve_limit(requested: Option<i64>) -> Result<i64, FilterError> {
    let limit = requested.unwrap_or(CONFIG.filter.default_page_size);
    if limit < 1 {
        return Err(FilterError::InvalidLimit(format!("limit must be positive, got {}", limit)));
    }
    Ok(match CONFIG.filter.max_limit {
        Some(max) => limit.min(max),
        None => limit,
    })
}

/// Rows skipped before `page`; pages past the addressable range are rejected
pub(crate) fn page_offset(page: i64, per_page: i64) -> Result<i64, FilterError> {
    (page - 1)
        .checked_mul(per_page)
        .ok_or_else(|| FilterError::InvalidLimit(format!("page {} is out of range", page)))
}

fn parse_select(select: Option<&Value>) -> Result<Option<Vec<String>>, ApiError> {
    let columns: Vec<String> = match select {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) => s.split(|c: char| c == ',' || c.is_whitespace()).filter(|c| !c.is_empty()).map(String::from).collect(),
        Some(Value::Array(items)) => items.iter().filter_map(|v| v.as_str().map(String::from)).collect(),
        Some(Value::Object(obj)) => obj
            .iter()
            .filter(|(_, v)| v.as_i64() != Some(0) && v.as_bool() != Some(false))
            .map(|(k, _)| k.clone())
            .collect(),
        Some(other) => return Err(ApiError::bad_request(format!("Invalid select: {}", other))),
    };
    let mut columns: Vec<String> = columns
        .into_iter()
        .map(|c| if c == "_id" { crate::schema::ID_FIELD.to_string() } else { c })
        .collect();
    if !columns.is_empty() && !columns.iter().any(|c| c == crate::schema::ID_FIELD) {
        columns.insert(0, crate::schema::ID_FIELD.to_string());
    }
    Ok(Some(columns))
}

/// POST /:entity/list - Paginated query
pub async fn list(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    payload: Result<Json<ListRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let entity = entity_from_path(&entity)?;
    let Json(request) = payload?;
    let filter = parse_where(entity, request.query.as_ref())?;
    let mut session = state.store.session().await?;

    if request.is_count_only {
        let total_records = session.count(entity, &filter).await?;
        return Ok(ApiResponse::success(json!({ "totalRecords": total_records })));
    }

    let options = request.options.unwrap_or_default();
    let order = match &options.sort {
        Some(sort) => FilterOrder::validate_and_parse(sort)?,
        None => vec![],
    };
    let select = parse_select(options.select.as_ref())?;
    let item_count = session.count(entity, &filter).await?;

    let (find_options, per_page, page) = if options.pagination == Some(false) {
        (FindOptions { select, order, ..Default::default() }, item_count.max(1) as i64, 1)
    } else {
        let per_page = resolve_limit(options.limit)?;
        let page = options.page.unwrap_or(1).max(1);
        let find_options = FindOptions {
            select,
            order,
            limit: Some(per_page),
            offset: Some(page_offset(page, per_page)?),
        };
        (find_options, per_page, page)
    };

    let data = session.find(entity, &filter, &find_options).await?;
    if data.is_empty() {
        return Err(ApiError::not_found("Record not found"));
    }
    let page = Page { data, paginator: Paginator::new(item_count, per_page, page) };
    let page = serde_json::to_value(page).map_err(|e| {
        tracing::error!("Failed to serialize page: {}", e);
        ApiError::internal_server_error("Failed to format response")
    })?;
    Ok(ApiResponse::success(page))
}

/// POST /:entity/count - Count matching records
pub async fn count(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    payload: Result<Json<CountRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let entity = entity_from_path(&entity)?;
    let Json(request) = payload?;
    let filter = parse_where(entity, request.where_clause.as_ref())?;
    let mut session = state.store.session().await?;
    let count = session.count(entity, &filter).await?;
    Ok(ApiResponse::success(json!({ "count": count })))
}

/// GET /:entity/:id - Fetch one record
pub async fn get(State(state): State<AppState>, Path((entity, id)): Path<(String, String)>) -> ApiResult<Document> {
    let entity = entity_from_path(&entity)?;
    let mut session = state.store.session().await?;
    match session.find_one(entity, &Filter::by_id(id)).await? {
        Some(record) => Ok(ApiResponse::success(record)),
        None => Err(ApiError::not_found("Record not found")),
    }
}
