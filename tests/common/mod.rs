#![allow(dead_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;

use trip_tracker_api::app::{app, AppState};
use trip_tracker_api::cascade::{CascadeOptions, CascadeResolver};
use trip_tracker_api::database::{Document, MemoryStore};
use trip_tracker_api::schema::EntityKind;

pub fn doc(value: Value) -> Document {
    value.as_object().cloned().expect("fixture must be a JSON object")
}

pub fn docs(values: Vec<Value>) -> Vec<Document> {
    values.into_iter().map(doc).collect()
}

pub fn resolver(store: &MemoryStore, options: CascadeOptions) -> CascadeResolver {
    CascadeResolver::new(Arc::new(store.clone()), options)
}

/// Role `r1` with three route links and one user link, plus unrelated rows
pub async fn seed_role_graph(store: &MemoryStore) {
    store
        .seed(
            EntityKind::Role,
            docs(vec![
                serde_json::json!({ "id": "r1", "name": "Admin", "code": "ADMIN", "weight": 1 }),
                serde_json::json!({ "id": "r2", "name": "User", "code": "USER", "weight": 2 }),
            ]),
        )
        .await;
    store
        .seed(
            EntityKind::RouteRole,
            docs(vec![
                serde_json::json!({ "id": "rr1", "roleId": "r1", "routeId": "p1" }),
                serde_json::json!({ "id": "rr2", "roleId": "r1", "routeId": "p2" }),
                serde_json::json!({ "id": "rr3", "roleId": "r1", "routeId": "p3" }),
                serde_json::json!({ "id": "rr4", "roleId": "r2", "routeId": "p1" }),
            ]),
        )
        .await;
    store
        .seed(
            EntityKind::UserRole,
            docs(vec![
                serde_json::json!({ "id": "ur1", "roleId": "r1", "userId": "u1" }),
                serde_json::json!({ "id": "ur2", "roleId": "r2", "userId": "u2" }),
            ]),
        )
        .await;
}

/// Category tree: root -> child -> grandchild, plus an unrelated root
pub async fn seed_category_tree(store: &MemoryStore) {
    store
        .seed(
            EntityKind::Category,
            docs(vec![
                serde_json::json!({ "id": "c1", "name": "Travel" }),
                serde_json::json!({ "id": "c2", "name": "Flights", "parentCategoryId": "c1" }),
                serde_json::json!({ "id": "c3", "name": "Domestic", "parentCategoryId": "c2" }),
                serde_json::json!({ "id": "c4", "name": "Food" }),
            ]),
        )
        .await;
}

/// User `u1` referenced from several collections; `u2` is unrelated
pub async fn seed_user_graph(store: &MemoryStore) {
    store
        .seed(
            EntityKind::User,
            docs(vec![
                serde_json::json!({ "id": "u1", "username": "alice" }),
                serde_json::json!({ "id": "u2", "username": "bob" }),
                serde_json::json!({ "id": "u3", "username": "carol", "addedBy": "u1" }),
            ]),
        )
        .await;
    store
        .seed(
            EntityKind::Trip,
            docs(vec![
                serde_json::json!({ "id": "t1", "userId": "u1", "distance": 12.5, "addedBy": "u1" }),
                serde_json::json!({ "id": "t2", "userId": "u2", "distance": 3, "addedBy": "u2", "updatedBy": "u1" }),
                serde_json::json!({ "id": "t3", "userId": "u2", "distance": 8, "addedBy": "u2" }),
            ]),
        )
        .await;
    store
        .seed(
            EntityKind::Tripuser,
            docs(vec![serde_json::json!({ "id": "tu1", "user": "u1", "addedBy": "u2" })]),
        )
        .await;
    store
        .seed(
            EntityKind::UserTokens,
            docs(vec![
                serde_json::json!({ "id": "tk1", "userId": "u1", "token": "a" }),
                serde_json::json!({ "id": "tk2", "userId": "u1", "token": "b" }),
            ]),
        )
        .await;
    store
        .seed(
            EntityKind::UserRole,
            docs(vec![serde_json::json!({ "id": "ur9", "userId": "u1", "roleId": "r1" })]),
        )
        .await;
}

/// Project routes p1..p3; route links come from [`seed_role_graph`]
pub async fn seed_project_routes(store: &MemoryStore) {
    store
        .seed(
            EntityKind::ProjectRoute,
            docs(vec![
                serde_json::json!({ "id": "p1", "route_name": "trip.list", "method": "POST", "uri": "/trip/list" }),
                serde_json::json!({ "id": "p2", "route_name": "trip.create", "method": "POST", "uri": "/trip/create" }),
                serde_json::json!({ "id": "p3", "route_name": "trip.get", "method": "GET", "uri": "/trip/:id" }),
            ]),
        )
        .await;
}

/// Every fixture graph in one store, so each collection has rows
pub async fn seed_everything(store: &MemoryStore) {
    seed_role_graph(store).await;
    seed_project_routes(store).await;
    seed_category_tree(store).await;
    seed_user_graph(store).await;
    store
        .seed(
            EntityKind::Metadata,
            docs(vec![serde_json::json!({ "id": "m1", "key": "theme", "addedBy": "u1" })]),
        )
        .await;
    store
        .seed(EntityKind::Banner, docs(vec![serde_json::json!({ "id": "b1", "title": "Sale" })]))
        .await;
    store
        .seed(EntityKind::State, docs(vec![serde_json::json!({ "id": "s1", "name": "Goa" })]))
        .await;
}

/// Every committed record, collection by collection
pub async fn snapshot(store: &MemoryStore) -> Vec<(EntityKind, Vec<Document>)> {
    let mut tables = Vec::new();
    for kind in EntityKind::ALL {
        tables.push((kind, store.rows(kind).await));
    }
    tables
}

/// API served in-process over a memory store
pub struct TestServer {
    pub base_url: String,
    pub store: MemoryStore,
    pub client: reqwest::Client,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Bind a free port and serve the router on the current runtime
pub async fn spawn_server(options: CascadeOptions) -> Result<TestServer> {
    let store = MemoryStore::new();
    let port = portpicker::pick_unused_port().context("failed to pick free port")?;
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .with_context(|| format!("failed to bind port {}", port))?;

    let router = app(AppState::new(Arc::new(store.clone()), options));
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });

    Ok(TestServer {
        base_url: format!("http://127.0.0.1:{}", port),
        store,
        client: reqwest::Client::new(),
    })
}
