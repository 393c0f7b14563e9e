use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use trip_tracker_api::app::{app, AppState};
use trip_tracker_api::config::CONFIG;
use trip_tracker_api::database::{DatabaseManager, MemoryStore, PgStore, Store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, APP_ENV, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!("Starting Trip Tracker API in {:?} mode", CONFIG.environment);

    // TRIP_STORE=memory runs without Postgres, for local demos
    let store: Arc<dyn Store> = match std::env::var("TRIP_STORE").as_deref() {
        Ok("memory") => {
            tracing::warn!("Using in-memory store; data is lost on exit");
            Arc::new(MemoryStore::new())
        }
        _ => Arc::new(PgStore::from_env().await?),
    };

    let router = app(AppState::from_config(store));

    let bind_addr = format!("0.0.0.0:{}", CONFIG.api.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Trip Tracker API listening on http://{}", bind_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await?;

    DatabaseManager::close_all().await;
    Ok(())
}
