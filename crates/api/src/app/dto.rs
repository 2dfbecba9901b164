use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gatepass_auth::Role;
use gatepass_core::{DomainError, UserId, VisitorId};
use gatepass_infra::Page;
use gatepass_infra::Pagination;
use gatepass_infra::store::{AppointmentFilter, CheckLogFilter, PassFilter, UserFilter, VisitorFilter};
use gatepass_passes::{CheckEntry, CheckType, PassStatus};
use gatepass_visitors::{AppointmentStatus, VisitorStatus, VisitorUpdate};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

/// Body of verify; a missing `qrData` reads as empty.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrRequest {
    #[serde(default)]
    pub qr_data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    #[serde(default)]
    pub qr_data: String,
    #[serde(flatten)]
    pub entry: CheckEntry,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateVisitorRequest {
    #[serde(flatten)]
    pub update: VisitorUpdate,
    pub status: Option<String>,
}

// -------------------------
// Query DTOs
// -------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitorQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<VisitorStatus>,
    pub host_id: Option<UserId>,
    pub search: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl VisitorQuery {
    pub fn into_parts(self) -> (VisitorFilter, Pagination) {
        let filter = VisitorFilter {
            status: self.status,
            host_id: self.host_id,
            search: non_empty(self.search),
            start: self.start_date,
            end: self.end_date,
        };
        (filter, Pagination::new(self.page, self.limit))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<PassStatus>,
    pub visitor_id: Option<VisitorId>,
    pub search: Option<String>,
}

impl PassQuery {
    pub fn into_parts(self) -> (PassFilter, Pagination) {
        let filter = PassFilter {
            status: self.status,
            visitor_id: self.visitor_id,
            search: non_empty(self.search),
            hosted_by: None,
        };
        (filter, Pagination::new(self.page, self.limit))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckLogQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub visitor_id: Option<VisitorId>,
    #[serde(rename = "type")]
    pub kind: Option<CheckType>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl CheckLogQuery {
    pub fn into_parts(self) -> (CheckLogFilter, Pagination) {
        let filter = CheckLogFilter {
            visitor_id: self.visitor_id,
            kind: self.kind,
            start: self.start_date,
            end: self.end_date,
            hosted_by: None,
        };
        (filter, Pagination::new(self.page, self.limit))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<AppointmentStatus>,
    pub visitor_id: Option<VisitorId>,
}

impl AppointmentQuery {
    pub fn into_parts(self) -> (AppointmentFilter, Pagination) {
        let filter = AppointmentFilter {
            status: self.status,
            visitor_id: self.visitor_id,
            participant: None,
        };
        (filter, Pagination::new(self.page, self.limit))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub role: Option<Role>,
    pub search: Option<String>,
}

impl UserQuery {
    pub fn into_parts(self) -> (UserFilter, Pagination) {
        let filter = UserFilter {
            role: self.role,
            search: non_empty(self.search),
        };
        (filter, Pagination::new(self.page, self.limit))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct StatsQuery {
    pub period: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

// -------------------------
// JSON mapping helpers
// -------------------------

/// `{items, totalPages, currentPage, total}`.
pub fn page_to_json<T: Serialize>(page: Page<T>) -> serde_json::Value {
    serde_json::json!({
        "totalPages": page.total_pages(),
        "currentPage": page.pagination.page,
        "total": page.total,
        "items": page.items,
    })
}

/// Parse a path id, answering 400 on malformed input.
pub fn parse_id<T>(raw: &str) -> Result<T, axum::response::Response>
where
    T: FromStr<Err = DomainError>,
{
    raw.parse().map_err(errors::domain_error_to_response)
}

/// Parse a status value whose `FromStr` reports a validation error.
pub fn parse_status<T>(raw: &str) -> Result<T, axum::response::Response>
where
    T: FromStr<Err = DomainError>,
{
    raw.trim().to_ascii_lowercase().parse().map_err(errors::domain_error_to_response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatepass_visitors::VisitorDecision;

    #[test]
    fn page_json_shape() {
        let page = Pagination::new(Some(2), Some(2)).slice(vec![1, 2, 3, 4, 5]);
        let v = page_to_json(page);
        assert_eq!(v["items"], serde_json::json!([3, 4]));
        assert_eq!(v["totalPages"], 3);
        assert_eq!(v["currentPage"], 2);
        assert_eq!(v["total"], 5);
    }

    #[test]
    fn scan_body_flattens_the_entry() {
        let body: ScanRequest = serde_json::from_value(serde_json::json!({
            "qrData": "{}",
            "location": "Lobby",
            "temperature": 36.6,
            "deviceInfo": "gate-2"
        }))
        .unwrap();
        assert_eq!(body.qr_data, "{}");
        assert_eq!(body.entry.location.as_deref(), Some("Lobby"));
        assert_eq!(body.entry.temperature, Some(36.6));
        assert_eq!(body.entry.device_info.as_deref(), Some("gate-2"));
    }

    #[test]
    fn missing_qr_data_is_empty() {
        let body: QrRequest = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(body.qr_data.is_empty());
    }

    #[test]
    fn only_decisions_parse_as_visitor_status() {
        assert!(parse_status::<VisitorDecision>("Approved").is_ok());
        let res = parse_status::<VisitorDecision>("checked_in").unwrap_err();
        assert_eq!(res.status(), axum::http::StatusCode::BAD_REQUEST);
    }
}
