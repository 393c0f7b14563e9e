// handlers/entity/mod.rs - Generic per-entity controllers
//
// One set of handlers serves every entity; the `:entity` path segment picks
// the collection and unknown names answer 404.

pub mod create;
pub mod delete;
pub mod find;
pub mod update;
pub mod utils;

use axum::{
    routing::{delete, get, post, put},
    Router,
};

use crate::app::AppState;

/// Routes for one platform prefix
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/:entity/create", post(create::create))
        .route("/:entity/addBulk", post(create::add_bulk))
        .route("/:entity/list", post(find::list))
        .route("/:entity/count", post(find::count))
        .route("/:entity/update/:id", put(update::update))
        .route("/:entity/partial-update/:id", put(update::partial_update))
        .route("/:entity/updateBulk", put(update::update_bulk))
        .route("/:entity/softDelete/:id", put(delete::soft_delete))
        .route("/:entity/softDeleteMany", put(delete::soft_delete_many))
        .route("/:entity/delete/:id", delete(delete::delete))
        .route("/:entity/deleteMany", post(delete::delete_many))
        .route("/:entity/:id", get(find::get))
}
