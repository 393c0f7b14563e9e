use axum::{
    extract::{DefaultBodyLimit, State},
    http::{HeaderValue, StatusCode},
    middleware::from_fn,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::cascade::{CascadeOptions, CascadeResolver};
use crate::config::CONFIG;
use crate::database::Store;
use crate::handlers::entity;
use crate::middleware::actor_middleware;

/// Route prefixes, one per client platform
pub const PLATFORMS: [&str; 3] = ["/admin", "/client/api/v1", "/device/api/v1"];

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub cascade: CascadeResolver,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, options: CascadeOptions) -> Self {
        let cascade = CascadeResolver::new(store.clone(), options);
        Self { store, cascade }
    }

    /// State with cascade options taken from configuration
    pub fn from_config(store: Arc<dyn Store>) -> Self {
        Self::new(store, CascadeOptions::from_config())
    }
}

pub fn app(state: AppState) -> Router {
    let mut router = Router::new()
        // Public
        .route("/", get(root))
        .route("/health", get(health));

    for prefix in PLATFORMS {
        router = router.nest(prefix, entity::routes());
    }

    let mut router = router
        .layer(from_fn(actor_middleware))
        .layer(DefaultBodyLimit::max(CONFIG.api.max_request_size_bytes));

    if CONFIG.security.enable_cors {
        router = router.layer(cors_layer());
    }
    if CONFIG.api.enable_request_logging {
        router = router.layer(TraceLayer::new_for_http());
    }

    router.with_state(state)
}

fn cors_layer() -> CorsLayer {
    let origins = &CONFIG.security.cors_origins;
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();
    CorsLayer::new().allow_origin(allowed).allow_methods(Any).allow_headers(Any)
}

async fn root() -> Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    Json(json!({
        "success": true,
        "data": {
            "name": "Trip Tracker API",
            "version": version,
            "description": "Trip tracking REST API with cascading dependent-record resolution",
            "platforms": PLATFORMS,
            "entities": crate::schema::EntityKind::ALL.iter().map(|e| e.name()).collect::<Vec<_>>(),
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "entity": "<platform>/:entity/{create,addBulk,list,count,:id,update/:id,partial-update/:id,updateBulk,softDelete/:id,softDeleteMany,delete/:id,deleteMany}",
            }
        }
    }))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    match state.store.health_check().await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok"
                }
            })),
        ),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            let detail = if crate::is_production!() { "unavailable".to_string() } else { e.to_string() };
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "error": "database unavailable",
                    "data": {
                        "status": "degraded",
                        "timestamp": now,
                        "database_error": detail
                    }
                })),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_app() -> Router {
        app(AppState::new(Arc::new(MemoryStore::new()), CascadeOptions::default()))
    }

    #[tokio::test]
    async fn root_lists_platforms() -> anyhow::Result<()> {
        let res = test_app().oneshot(Request::get("/").body(Body::empty())?).await?;
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = serde_json::from_slice(&to_bytes(res.into_body(), usize::MAX).await?)?;
        assert_eq!(body["data"]["platforms"], json!(PLATFORMS));
        Ok(())
    }

    #[tokio::test]
    async fn entity_routes_need_a_platform_prefix() -> anyhow::Result<()> {
        let res = test_app().oneshot(Request::get("/trip/t1").body(Body::empty())?).await?;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        let res = test_app()
            .oneshot(Request::get("/device/api/v1/trip/t1").body(Body::empty())?)
            .await?;
        // Routed, but no such record
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let body: Value = serde_json::from_slice(&to_bytes(res.into_body(), usize::MAX).await?)?;
        assert_eq!(body["code"], "NOT_FOUND");
        Ok(())
    }
}
