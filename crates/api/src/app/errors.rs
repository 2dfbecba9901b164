use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use gatepass_core::DomainError;
use gatepass_infra::LifecycleError;

pub fn domain_status(err: &DomainError) -> StatusCode {
    match err {
        DomainError::Validation(_) | DomainError::InvalidPayload(_) | DomainError::InvalidState(_) => {
            StatusCode::BAD_REQUEST
        }
        DomainError::NotFound(_) => StatusCode::NOT_FOUND,
        DomainError::AlreadyCheckedIn | DomainError::Conflict(_) => StatusCode::CONFLICT,
        DomainError::Unauthorized | DomainError::Forbidden => StatusCode::FORBIDDEN,
    }
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    json_error(domain_status(&err), err.code(), err.to_string())
}

/// Business failures keep their message; store failures are logged and hidden.
pub fn lifecycle_error_to_response(err: LifecycleError) -> axum::response::Response {
    match err {
        LifecycleError::Domain(e) => domain_error_to_response(e),
        LifecycleError::PassState { error, pass } => (
            domain_status(&error),
            axum::Json(json!({
                "error": error.code(),
                "message": error.to_string(),
                "pass": pass,
            })),
        )
            .into_response(),
        LifecycleError::Store(e) => {
            tracing::error!(error = %e, "store failure");
            internal_error()
        }
        LifecycleError::Collaborator(e) => {
            tracing::error!(error = %e, "collaborator failure");
            internal_error()
        }
    }
}

fn internal_error() -> axum::response::Response {
    json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        "Internal server error",
    )
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
