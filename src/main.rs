//! points-ledger server entry point.
//!
//! Loads configuration, selects the document store, and serves the REST
//! API until interrupted.

use std::time::Duration;

use anyhow::Context;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use points_ledger::api;
use points_ledger::app_state::AppState;
use points_ledger::config::{LedgerConfig, LogFormat};
use points_ledger::persistence::{Backend, MemoryStore, PostgresStore};
use points_ledger::service::LedgerService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = LedgerConfig::from_env()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    tracing::info!(addr = %config.listen_addr, "starting points-ledger");

    // Select persistence backend
    let store = if config.persistence_enabled {
        let store = PostgresStore::connect(&config)
            .await
            .context("connecting to PostgreSQL")?;
        tracing::info!("using PostgreSQL document store");
        Backend::Postgres(store)
    } else {
        tracing::warn!("PERSISTENCE_ENABLED is off, using the in-memory store");
        Backend::Memory(MemoryStore::new())
    };

    // Build service layer and application state
    let app_state = AppState::new(LedgerService::new(store, config.service_settings()));

    // Build router
    let app = Router::new().merge(api::build_router());
    #[cfg(feature = "swagger-ui")]
    let app = {
        use utoipa::OpenApi;
        app.merge(
            utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
                .url("/api-docs/openapi.json", api::doc::ApiDoc::openapi()),
        )
    };
    let app = app
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.request_timeout_secs,
        )))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
