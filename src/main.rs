//! Overwatch server - command and approval authority for autonomous worker units

use axum::{routing::get, Router};
use clap::Parser;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use overwatch::authority::CommandCenter;
use overwatch::config::Config;
use overwatch::router::HttpRouter;
use overwatch::store::SqliteRecordStore;
use overwatch::{websocket, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "overwatch=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::parse();

    // Database connection
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;

    let store = SqliteRecordStore::new(pool);
    store.migrate().await?;

    let router = HttpRouter::new(config.router_url.clone(), config.router_timeout());
    let center = CommandCenter::new(Arc::new(store), Arc::new(router), config.center_settings());

    if !config.no_rehydrate {
        let restored = center.rehydrate().await?;
        tracing::info!("Restored {} pending approvals", restored);
    }

    let state = AppState::new(center);

    if let Some(every) = config.sweep_interval() {
        state.center.spawn_expiry_sweeper(every);
        tracing::info!("Approval expiry sweep every {:?}", every);
    }

    // Build router
    let app = Router::new()
        .route("/health", get(health))
        .route("/ws", get(websocket::handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn health() -> &'static str {
    "ok"
}
