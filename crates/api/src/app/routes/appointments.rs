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
use gatepass_core::AppointmentId;
use gatepass_visitors::{AppointmentStatus, AppointmentUpdate, NewAppointment};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(schedule_appointment).get(list_appointments))
        .route(
            "/:id",
            get(get_appointment)
                .put(update_appointment)
                .delete(delete_appointment),
        )
        .route("/:id/status", put(set_appointment_status))
}

pub async fn schedule_appointment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<Principal>,
    Json(body): Json<NewAppointment>,
) -> axum::response::Response {
    match services.directory.schedule_appointment(&actor, body, Utc::now()).await {
        Ok(appointment) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "message": "Appointment created successfully",
                "appointment": appointment,
            })),
        )
            .into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

pub async fn list_appointments(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<Principal>,
    Query(query): Query<dto::AppointmentQuery>,
) -> axum::response::Response {
    let (filter, page) = query.into_parts();
    match services.directory.list_appointments(&actor, filter, page).await {
        Ok(page) => (StatusCode::OK, Json(dto::page_to_json(page))).into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

pub async fn get_appointment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<Principal>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: AppointmentId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    match services.directory.appointment(&actor, id).await {
        Ok(appointment) => (StatusCode::OK, Json(appointment)).into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

pub async fn update_appointment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<Principal>,
    Path(id): Path<String>,
    Json(body): Json<AppointmentUpdate>,
) -> axum::response::Response {
    let id: AppointmentId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    match services
        .directory
        .update_appointment(&actor, id, body, Utc::now())
        .await
    {
        Ok(appointment) => (StatusCode::OK, Json(appointment)).into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

pub async fn set_appointment_status(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<Principal>,
    Path(id): Path<String>,
    Json(body): Json<dto::StatusRequest>,
) -> axum::response::Response {
    let id: AppointmentId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    let status: AppointmentStatus = match dto::parse_status(&body.status) {
        Ok(v) => v,
        Err(res) => return res,
    };
    match services
        .directory
        .set_appointment_status(&actor, id, status, Utc::now())
        .await
    {
        Ok(appointment) => (StatusCode::OK, Json(appointment)).into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

pub async fn delete_appointment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<Principal>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: AppointmentId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    match services.directory.delete_appointment(&actor, id).await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({ "message": "Appointment deleted successfully" })),
        )
            .into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}
