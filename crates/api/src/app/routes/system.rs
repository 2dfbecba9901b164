use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};

use gatepass_auth::Principal;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(Extension(principal): Extension<Principal>) -> impl IntoResponse {
    Json(serde_json::json!({
        "id": principal.user_id.to_string(),
        "role": principal.role.as_str(),
    }))
}
