//! # API REST
//!
//! REST API for the referral regulation system.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON serialisation, CORS, API key, actor headers)
//!
//! Business rules live in `regulacao-core`; wire types live in `api-shared`.

#![warn(rust_2018_idioms)]

pub mod error;
pub mod extract;
mod handlers;


use api_shared::auth::API_KEY_HEADER;
use axum::{
    extract::{Request, State},
    middleware::{self, Next},
    response::Response,
    routing::{get, patch, post},
    Router,
};
use regulacao_core::RequestLifecycleService;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use error::ApiError;
pub use extract::{CurrentActor, HeaderIdentity};
pub use handlers::ApiDoc;

/// Application state shared by every handler.
#[derive(Clone)]
pub struct AppState {
    service: Arc<RequestLifecycleService>,
    api_key: Option<Arc<str>>,
}

impl AppState {
    /// `api_key`, when present, must be sent by clients in `x-api-key`.
    pub fn new(service: Arc<RequestLifecycleService>, api_key: Option<String>) -> Self {
        Self {
            service,
            api_key: api_key
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .map(Arc::from),
        }
    }

    pub fn service(&self) -> &RequestLifecycleService {
        &self.service
    }
}

/// Builds the full application router: API routes, Swagger UI and CORS.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/solicitacoes",
            get(handlers::list_requests).post(handlers::create_request),
        )
        .route("/solicitacoes/resumo", get(handlers::summary))
        .route(
            "/solicitacoes/:id",
            get(handlers::get_request)
                .put(handlers::update_request)
                .delete(handlers::delete_request),
        )
        .route("/solicitacoes/:id/historico", get(handlers::history))
        .route("/solicitacoes/:id/status", patch(handlers::change_status))
        .route("/solicitacoes/:id/prioridade", patch(handlers::reprioritize))
        .route("/solicitacoes/:id/eventos", post(handlers::add_note))
        .route("/solicitacoes/:id/atribuicao", post(handlers::assign_reviewer))
        .route("/ubs/solicitacoes", get(handlers::list_unit_requests))
        .route("/central/solicitacoes", get(handlers::list_central_requests))
        .route(
            "/central/solicitacoes/minhas",
            get(handlers::list_my_central_requests),
        )
        .route("/catalogo/tipos", get(handlers::catalog))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .merge(api)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(expected) = state.api_key.as_deref() {
        let provided = request
            .headers()
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok());
        api_shared::validate_api_key(expected, provided).map_err(|e| {
            tracing::warn!("Rejected request without valid API key: {}", e);
            ApiError::from(e)
        })?;
    }
    Ok(next.run(request).await)
}
