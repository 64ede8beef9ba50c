//! Mapping from core errors to HTTP responses.

use api_shared::{AuthError, ErrorRes};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use regulacao_core::RegulationError;

/// Error returned by every handler. Serialised as `{code, message}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthenticated", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl From<RegulationError> for ApiError {
    fn from(err: RegulationError) -> Self {
        use RegulationError::*;

        if err.is_repository() {
            tracing::error!("Repository error: {:?}", err);
            return Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "repository_error",
                "Internal error",
            );
        }

        let (status, code) = match &err {
            NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            PermissionDenied(_) => (StatusCode::FORBIDDEN, "permission_denied"),
            MissingJustification => (StatusCode::BAD_REQUEST, "missing_justification"),
            MissingReason => (StatusCode::BAD_REQUEST, "missing_reason"),
            Validation(_) => (StatusCode::BAD_REQUEST, "validation_failed"),
            InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
            InvalidState(_) => (StatusCode::BAD_REQUEST, "invalid_state"),
            InvalidTransition { .. } => (StatusCode::CONFLICT, "invalid_transition"),
            NotEditable(_) => (StatusCode::CONFLICT, "not_editable"),
            NotTerminal(_) => (StatusCode::CONFLICT, "not_terminal"),
            Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            Cancelled(_) => (StatusCode::SERVICE_UNAVAILABLE, "cancelled"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };
        Self::new(status, code, err.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self::unauthenticated(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorRes {
            code: self.code.to_string(),
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}
