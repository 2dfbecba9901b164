use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;

use gatepass_auth::Principal;
use gatepass_core::UserId;
use gatepass_visitors::{NewUser, UserUpdate};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_user).get(list_users))
        .route("/:id", get(get_user).put(update_user).delete(delete_user))
}

pub async fn create_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<Principal>,
    Json(body): Json<NewUser>,
) -> axum::response::Response {
    match services.directory.create_user(&actor, body, Utc::now()).await {
        Ok(user) => (StatusCode::CREATED, Json(user)).into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

pub async fn list_users(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<Principal>,
    Query(query): Query<dto::UserQuery>,
) -> axum::response::Response {
    let (filter, page) = query.into_parts();
    match services.directory.list_users(&actor, filter, page).await {
        Ok(page) => (StatusCode::OK, Json(dto::page_to_json(page))).into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

pub async fn get_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<Principal>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: UserId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    match services.directory.user(&actor, id).await {
        Ok(user) => (StatusCode::OK, Json(user)).into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

pub async fn update_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<Principal>,
    Path(id): Path<String>,
    Json(body): Json<UserUpdate>,
) -> axum::response::Response {
    let id: UserId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    match services.directory.update_user(&actor, id, body).await {
        Ok(user) => (StatusCode::OK, Json(user)).into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

pub async fn delete_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<Principal>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: UserId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    match services.directory.delete_user(&actor, id).await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({ "message": "User deleted successfully" })),
        )
            .into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}
