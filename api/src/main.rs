use std::sync::Arc;

use anyhow::Result;
use migration::{Migrator, MigratorTrait};
use shared::{get_db_connection, ApiConfig};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod error;
mod routes;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting signal API server...");

    let config = ApiConfig::from_env();
    let db = get_db_connection(&config.database_url).await?;
    Migrator::up(&db, None).await?;
    info!("Connected to database");

    let app = routes::router(routes::ApiState {
        db: Arc::new(db),
        max_page_size: config.max_page_size,
    })
    .layer(CorsLayer::permissive())
    .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!("API server listening on http://0.0.0.0:{}", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
