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
use gatepass_core::{CheckLogId, VisitorId};
use gatepass_infra::{CheckIn, CheckOut, LifecycleError, Scan, StatsPeriod};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_check_logs))
        .route("/checkin", post(check_in))
        .route("/checkout", post(check_out))
        .route("/stats", get(stats))
        .route("/visitor/:visitor_id", get(visitor_history))
        .route("/:id", get(get_check_log))
}

fn scan_response(result: Result<Scan, LifecycleError>, message: &'static str) -> axum::response::Response {
    match result {
        Ok(scan) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "message": message,
                "checkLog": scan.log,
                "visitor": scan.visitor,
            })),
        )
            .into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

pub async fn check_in(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<Principal>,
    Json(body): Json<dto::ScanRequest>,
) -> axum::response::Response {
    let cmd = CheckIn {
        actor,
        qr_data: body.qr_data,
        entry: body.entry,
    };
    scan_response(
        services.lifecycle.check_in(cmd, Utc::now()).await,
        "Check-in successful",
    )
}

pub async fn check_out(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<Principal>,
    Json(body): Json<dto::ScanRequest>,
) -> axum::response::Response {
    let cmd = CheckOut {
        actor,
        qr_data: body.qr_data,
        entry: body.entry,
    };
    scan_response(
        services.lifecycle.check_out(cmd, Utc::now()).await,
        "Check-out successful",
    )
}

pub async fn list_check_logs(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<Principal>,
    Query(query): Query<dto::CheckLogQuery>,
) -> axum::response::Response {
    let (filter, page) = query.into_parts();
    match services.queries.check_logs(&actor, filter, page).await {
        Ok(page) => (StatusCode::OK, Json(dto::page_to_json(page))).into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

pub async fn get_check_log(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<Principal>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: CheckLogId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    match services.queries.check_log(&actor, id).await {
        Ok(log) => (StatusCode::OK, Json(log)).into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

pub async fn visitor_history(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<Principal>,
    Path(visitor_id): Path<String>,
) -> axum::response::Response {
    let visitor_id: VisitorId = match dto::parse_id(&visitor_id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    match services.queries.visitor_history(&actor, visitor_id).await {
        Ok(logs) => (StatusCode::OK, Json(serde_json::json!({ "items": logs }))).into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

pub async fn stats(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<Principal>,
    Query(query): Query<dto::StatsQuery>,
) -> axum::response::Response {
    let period = StatsPeriod::parse_lenient(query.period.as_deref());
    match services.queries.stats(&actor, period, Utc::now()).await {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}
