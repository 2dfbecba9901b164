use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Extension, Multipart, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use chrono::Utc;

use gatepass_auth::Principal;
use gatepass_core::VisitorId;
use gatepass_infra::DecideVisitor;
use gatepass_core::DomainError;
use gatepass_visitors::{NewVisitor, PhotoUpload, VisitorDecision};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_visitor).get(list_visitors))
        .route("/:id", get(get_visitor).put(update_visitor))
        .route(
            "/:id/photo",
            post(upload_photo).layer(DefaultBodyLimit::max(PhotoUpload::MAX_BYTES + 64 * 1024)),
        )
        .route("/:id/status", put(decide_visitor))
}

pub async fn register_visitor(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<Principal>,
    Json(body): Json<NewVisitor>,
) -> axum::response::Response {
    match services.directory.register_visitor(&actor, body, Utc::now()).await {
        Ok(visitor) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "message": "Visitor registered successfully",
                "visitor": visitor,
            })),
        )
            .into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

pub async fn list_visitors(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<Principal>,
    Query(query): Query<dto::VisitorQuery>,
) -> axum::response::Response {
    let (filter, page) = query.into_parts();
    match services.directory.list_visitors(&actor, filter, page).await {
        Ok(page) => (StatusCode::OK, Json(dto::page_to_json(page))).into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

pub async fn get_visitor(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<Principal>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: VisitorId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    match services.directory.visitor(&actor, id).await {
        Ok(visitor) => (StatusCode::OK, Json(visitor)).into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

pub async fn update_visitor(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<Principal>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateVisitorRequest>,
) -> axum::response::Response {
    let id: VisitorId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    let status: Option<VisitorDecision> = match body.status.as_deref().map(dto::parse_status).transpose() {
        Ok(v) => v,
        Err(res) => return res,
    };
    match services
        .directory
        .update_visitor(&actor, id, body.update, status, Utc::now())
        .await
    {
        Ok(visitor) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "message": "Visitor updated successfully",
                "visitor": visitor,
            })),
        )
            .into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

/// Approve or reject. Anything else is `Invalid status`.
pub async fn decide_visitor(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<Principal>,
    Path(id): Path<String>,
    Json(body): Json<dto::StatusRequest>,
) -> axum::response::Response {
    let visitor_id: VisitorId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    let decision: VisitorDecision = match dto::parse_status(&body.status) {
        Ok(v) => v,
        Err(res) => return res,
    };
    let cmd = DecideVisitor {
        actor,
        visitor_id,
        decision,
    };
    match services.lifecycle.decide(cmd, Utc::now()).await {
        Ok(visitor) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "message": format!("Visitor {} successfully", visitor.status),
                "visitor": visitor,
            })),
        )
            .into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

/// First `photo` field of the form; other fields are ignored.
async fn read_photo(multipart: &mut Multipart) -> Result<PhotoUpload, axum::response::Response> {
    let bad = |e: axum::extract::multipart::MultipartError| {
        errors::domain_error_to_response(DomainError::validation(e.body_text()))
    };
    while let Some(field) = multipart.next_field().await.map_err(bad)? {
        if field.name() != Some("photo") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("photo").to_string();
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.map_err(bad)?;
        return Ok(PhotoUpload {
            file_name,
            content_type,
            data: data.to_vec(),
        });
    }
    Err(errors::domain_error_to_response(DomainError::validation("No file uploaded")))
}

/// Multipart form with a `photo` image field.
pub async fn upload_photo(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<Principal>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> axum::response::Response {
    let id: VisitorId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    let upload = match read_photo(&mut multipart).await {
        Ok(v) => v,
        Err(res) => return res,
    };
    match services
        .directory
        .set_visitor_photo(&actor, id, upload, Utc::now())
        .await
    {
        Ok(visitor) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "message": "Photo uploaded successfully",
                "photoUrl": visitor.photo,
            })),
        )
            .into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}
