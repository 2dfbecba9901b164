use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use chrono::Utc;

use gatepass_auth::Principal;
use gatepass_core::PassId;
use gatepass_infra::{IssuePass, RevokePass, VerifyPass};
use gatepass_passes::PassDraft;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(issue_pass).get(list_passes))
        .route("/verify", post(verify_pass))
        .route("/:id", get(get_pass))
        .route("/:id/revoke", put(revoke_pass))
}

pub async fn issue_pass(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<Principal>,
    Json(draft): Json<PassDraft>,
) -> axum::response::Response {
    let cmd = IssuePass { actor, draft };
    match services.lifecycle.issue(cmd, Utc::now()).await {
        Ok(pass) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "message": "Pass issued successfully",
                "pass": pass,
            })),
        )
            .into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

pub async fn list_passes(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<Principal>,
    Query(query): Query<dto::PassQuery>,
) -> axum::response::Response {
    let (filter, page) = query.into_parts();
    match services.queries.passes(&actor, filter, page).await {
        Ok(page) => (StatusCode::OK, Json(dto::page_to_json(page))).into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

pub async fn get_pass(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<Principal>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: PassId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    match services.queries.pass(&actor, id).await {
        Ok(pass) => (StatusCode::OK, Json(pass)).into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

pub async fn revoke_pass(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<Principal>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let pass_id: PassId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    match services.lifecycle.revoke(RevokePass { actor, pass_id }).await {
        Ok(pass) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "message": "Pass revoked successfully",
                "pass": pass,
            })),
        )
            .into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

/// 400 responses carry the pass alongside the message.
pub async fn verify_pass(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<Principal>,
    Json(body): Json<dto::QrRequest>,
) -> axum::response::Response {
    let cmd = VerifyPass {
        actor,
        qr_data: body.qr_data,
    };
    match services.lifecycle.verify(cmd, Utc::now()).await {
        Ok(verified) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "message": "Pass verified successfully",
                "pass": verified.pass,
                "visitor": verified.visitor,
            })),
        )
            .into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}
