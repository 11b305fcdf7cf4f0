// Serves the read/track API over the crawler database.

use chain_crawler::{
    cache, config::Config, connection, create_router, state::AppState, AddressRegistry,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let db_pool = connection::establish_connection(&config.database_url).await?;
    info!("Database connection established");

    let registry = AddressRegistry::new(db_pool.clone(), cache::init_cache(&config));
    let addr = format!("{}:{}", config.server_host, config.server_port);
    let app_state = Arc::new(AppState {
        config,
        db_pool,
        registry,
    });

    let app = create_router(app_state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Starting server on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
