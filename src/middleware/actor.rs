use axum::{
    extract::Request,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde_json::Value;

use crate::error::ApiError;

/// Header carrying the acting user's id
pub const ACTOR_HEADER: &str = "x-user-id";

/// The user on whose behalf a request runs
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Option<String>,
}

impl Actor {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self { user_id: Some(user_id.into()) }
    }

    /// JSON value for `addedBy` / `updatedBy` fields
    pub fn as_value(&self) -> Value {
        match &self.user_id {
            Some(id) => Value::String(id.clone()),
            None => Value::Null,
        }
    }
}

/// Resolves the actor from request headers and injects it into extensions
pub async fn actor_middleware(headers: HeaderMap, mut request: Request, next: Next) -> Result<Response, impl IntoResponse> {
    let actor = extract_actor_from_headers(&headers).map_err(|msg| {
        let api_error = ApiError::bad_request(msg);
        (StatusCode::BAD_REQUEST, Json(api_error.to_json()))
    })?;

    if let Some(user_id) = &actor.user_id {
        tracing::debug!("Request on behalf of user {}", user_id);
    }
    request.extensions_mut().insert(actor);

    Ok::<_, (StatusCode, Json<Value>)>(next.run(request).await)
}

fn extract_actor_from_headers(headers: &HeaderMap) -> Result<Actor, String> {
    let Some(raw) = headers.get(ACTOR_HEADER) else {
        return Ok(Actor::default());
    };
    let user_id = raw.to_str().map_err(|_| "Invalid X-User-Id header format".to_string())?.trim();
    if user_id.is_empty() {
        return Err("Empty X-User-Id header".to_string());
    }
    Ok(Actor::new(user_id))
}
