//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the regulation REST API server on its own.
//!
//! ## Intended use
//! Useful for development and debugging. The workspace's main `regulacao-run` binary serves the
//! same router after its own startup checks.

use regulacao_core::{build_repository, CoreConfig, RequestLifecycleService, SystemClock};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the regulation REST API server
///
/// # Environment Variables
/// - `REGULACAO_REST_ADDR`: Server address (default: "0.0.0.0:3000")
/// - `REGULACAO_REPOSITORY`, `REGULACAO_DATA_DIR`, `REGULACAO_REPOSITORY_TIMEOUT_MS`,
///   `REGULACAO_LOCK_TIMEOUT_MS`, `REGULACAO_DATE_OFFSET_MINUTES`: core settings, see
///   [`CoreConfig::from_env`]
/// - `API_KEY`: when set, required in the `x-api-key` header
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - the storage configuration is invalid,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?)
                .add_directive("regulacao_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("REGULACAO_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    let cfg = CoreConfig::from_env()?;
    tracing::info!(
        backend = ?cfg.backend(),
        data_dir = %cfg.data_dir().display(),
        "storage configured"
    );

    let service = RequestLifecycleService::new(
        build_repository(&cfg),
        Arc::new(SystemClock),
        &cfg,
    );
    let state = api_rest::AppState::new(Arc::new(service), std::env::var("API_KEY").ok());
    let app = api_rest::router(state);

    tracing::info!("-- Starting Regulação REST API on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
