mod attachment;
mod auth;
mod chat;
mod db;
mod error;
mod message;
mod middleware;
mod routes;
mod state;
mod user;
mod websocket;

#[cfg(test)]
mod testing;

use anyhow::Context;
use chat::{ChatRepository, ChatStore};
use db::{create_pool, run_migrations};
use message::{MessageRepository, MessageStore};
use routes::create_router;
use state::{AppState, Config};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use user::{UserDirectory, UserRepository};
use websocket::ConnectionManager;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,chat_server=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Arc::new(Config::from_env()?);

    // Sanitize URL for logging (hide password)
    let url_for_logging = config
        .database_url
        .split('@')
        .next()
        .map(|part| format!("{}@<hidden>", part))
        .unwrap_or_else(|| "<invalid format>".to_string());

    tracing::info!("Connecting to database at {}...", url_for_logging);
    let db = create_pool(&config.database_url)
        .await
        .with_context(|| format!("Failed to connect to database at {}", url_for_logging))?;

    // Run migrations
    tracing::info!("Running migrations...");
    run_migrations(&db).await.context("Failed to run migrations")?;

    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .with_context(|| format!("Failed to create upload dir {}", config.upload_dir.display()))?;

    // Create WebSocket connection manager
    let ws_connections = ConnectionManager::new();

    // Create repositories
    let chat_store: Arc<dyn ChatStore> = Arc::new(ChatRepository::new(db.clone()));
    let message_store: Arc<dyn MessageStore> = Arc::new(MessageRepository::new(db.clone()));
    let user_directory: Arc<dyn UserDirectory> = Arc::new(UserRepository::new(db.clone()));

    // Create application state
    let state = AppState::new(
        config.clone(),
        chat_store,
        message_store,
        user_directory,
        ws_connections.clone(),
    );

    // Create router
    let app = create_router(state);

    // Start server
    let addr = config.bind_addr();
    tracing::info!("Server starting on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(ws_connections))
        .await?;

    tracing::info!("Server stopped");

    Ok(())
}

/// Resolves on Ctrl-C after telling every live socket to close.
async fn shutdown_signal(ws_connections: ConnectionManager) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, closing live connections");
    ws_connections.shutdown();
}
