use regulacao_core::{
    build_repository, CoreConfig, RepositoryBackend, RequestLifecycleService, SystemClock,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the regulation service
///
/// Resolves configuration once, prepares storage and serves the REST API.
///
/// # Environment Variables
/// - `REGULACAO_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `REGULACAO_REPOSITORY`: `memory` (default) or `file`
/// - `REGULACAO_DATA_DIR`: root directory for the file repository
/// - `REGULACAO_REPOSITORY_TIMEOUT_MS`, `REGULACAO_LOCK_TIMEOUT_MS`: operation timeouts
/// - `REGULACAO_DATE_OFFSET_MINUTES`: offset for `dateFrom`/`dateTo` day bounds (default UTC)
/// - `API_KEY`: when set, required in the `x-api-key` header
///
/// # Returns
/// * `Ok(())` - If the server starts and runs successfully
/// * `Err(anyhow::Error)` - If configuration, storage preparation or serving fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("regulacao_run=info".parse()?)
                .add_directive("regulacao_core=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = CoreConfig::from_env()?;
    if cfg.backend() == RepositoryBackend::File {
        std::fs::create_dir_all(cfg.data_dir())?;
        tracing::info!("++ Using file repository at {}", cfg.data_dir().display());
    } else {
        tracing::warn!("Using in-memory repository; data is lost on shutdown");
    }

    let rest_addr =
        std::env::var("REGULACAO_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let api_key = std::env::var("API_KEY").ok();
    if api_key.is_none() {
        tracing::warn!("API_KEY not set; REST routes only require actor headers");
    }

    let service = RequestLifecycleService::new(build_repository(&cfg), Arc::new(SystemClock), &cfg);
    let app = api_rest::router(api_rest::AppState::new(Arc::new(service), api_key));

    tracing::info!("++ Starting Regulação REST on {}", rest_addr);
    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
