//! Entity store boundary.
//!
//! Reads that do not feed a mutation go straight through [`EntityStore`]. Every
//! mutation of a visitor, its passes or its check logs goes through a
//! [`StoreTx`] opened with [`EntityStore::begin`], which holds the visitor's
//! lock until it is committed or dropped. Dropping without `commit` discards
//! all staged writes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use gatepass_auth::Role;
use gatepass_core::{AppointmentId, CheckLogId, PassId, UserId, VisitorId};
use gatepass_passes::{CheckLog, CheckType, Pass, PassStatus};
use gatepass_visitors::{Appointment, AppointmentStatus, User, Visitor, VisitorStatus};

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;

/// Store operation error.
///
/// Infrastructure failures only; business rules are `DomainError`s raised above
/// the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("duplicate key: {0}")]
    Duplicate(String),

    #[error("store lock poisoned")]
    Poisoned,

    #[error("database error in {operation}: {message}")]
    Backend {
        operation: &'static str,
        message: String,
    },

    #[error("failed to decode row: {0}")]
    Decode(String),
}

/// Page request. `page` is 1-based.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: 1, limit: 10 }
    }
}

impl Pagination {
    pub const MAX_LIMIT: u32 = 100;

    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        let d = Self::default();
        Self {
            page: page.filter(|p| *p > 0).unwrap_or(d.page),
            limit: limit.filter(|l| *l > 0).unwrap_or(d.limit).min(Self::MAX_LIMIT),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }

    /// Slice an already filtered and ordered collection.
    pub fn slice<T>(&self, items: Vec<T>) -> Page<T> {
        let total = items.len() as u64;
        let items = items
            .into_iter()
            .skip(self.offset() as usize)
            .take(self.limit as usize)
            .collect();
        Page {
            items,
            total,
            pagination: *self,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Matches across all pages.
    pub total: u64,
    pub pagination: Pagination,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> u64 {
        self.total.div_ceil(u64::from(self.pagination.limit.max(1)))
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            pagination: self.pagination,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisitorFilter {
    pub status: Option<VisitorStatus>,
    pub host_id: Option<UserId>,
    /// Case-insensitive match on name, email or company.
    pub search: Option<String>,
    /// Bounds on expected arrival.
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl VisitorFilter {
    pub fn matches(&self, v: &Visitor) -> bool {
        self.status.is_none_or(|s| v.status == s)
            && self.host_id.is_none_or(|h| v.host_id == h)
            && self.start.is_none_or(|s| v.expected_arrival >= s)
            && self.end.is_none_or(|e| v.expected_arrival <= e)
            && self.search.as_deref().is_none_or(|q| {
                let q = q.to_lowercase();
                v.name.to_lowercase().contains(&q)
                    || v.email.to_lowercase().contains(&q)
                    || v.company.as_deref().is_some_and(|c| c.to_lowercase().contains(&q))
            })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassFilter {
    pub status: Option<PassStatus>,
    pub visitor_id: Option<VisitorId>,
    /// Case-insensitive match on pass number.
    pub search: Option<String>,
    /// Only passes of visitors hosted by this user.
    pub hosted_by: Option<UserId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckLogFilter {
    pub visitor_id: Option<VisitorId>,
    pub kind: Option<CheckType>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    /// Only logs of visitors hosted by this user.
    pub hosted_by: Option<UserId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppointmentFilter {
    pub status: Option<AppointmentStatus>,
    pub visitor_id: Option<VisitorId>,
    /// Host or attendee.
    pub participant: Option<UserId>,
}

impl AppointmentFilter {
    pub fn matches(&self, a: &Appointment) -> bool {
        self.status.is_none_or(|s| a.status == s)
            && self.visitor_id.is_none_or(|v| a.visitor_id == v)
            && self.participant.is_none_or(|u| a.involves(u))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub search: Option<String>,
}

impl UserFilter {
    pub fn matches(&self, u: &User) -> bool {
        self.role.is_none_or(|r| u.role == r)
            && self.search.as_deref().is_none_or(|q| {
                let q = q.to_lowercase();
                u.name.to_lowercase().contains(&q) || u.email.to_lowercase().contains(&q)
            })
    }
}

/// Raw counters behind the check statistics endpoint.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckCounts {
    pub check_ins: u64,
    pub check_outs: u64,
    /// Visitors currently `checked_in` who arrived since the cutoff.
    pub currently_checked_in: u64,
}

/// Durable records for visitors, passes, check logs, appointments and users.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Open a transaction serialized on `visitor_id`.
    async fn begin(&self, visitor_id: VisitorId) -> Result<Box<dyn StoreTx>, StoreError>;

    async fn visitor(&self, id: VisitorId) -> Result<Option<Visitor>, StoreError>;
    async fn insert_visitor(&self, visitor: &Visitor) -> Result<(), StoreError>;
    async fn list_visitors(
        &self,
        filter: &VisitorFilter,
        page: Pagination,
    ) -> Result<Page<Visitor>, StoreError>;

    async fn pass(&self, id: PassId) -> Result<Option<Pass>, StoreError>;
    /// Attach a rendered badge. Not part of the pass lifecycle.
    async fn set_pass_pdf_url(&self, id: PassId, url: &str) -> Result<(), StoreError>;
    async fn list_passes(&self, filter: &PassFilter, page: Pagination) -> Result<Page<Pass>, StoreError>;

    async fn check_log(&self, id: CheckLogId) -> Result<Option<CheckLog>, StoreError>;
    async fn list_check_logs(
        &self,
        filter: &CheckLogFilter,
        page: Pagination,
    ) -> Result<Page<CheckLog>, StoreError>;
    /// Full history of a visitor, newest first.
    async fn visitor_history(&self, visitor_id: VisitorId) -> Result<Vec<CheckLog>, StoreError>;
    async fn check_counts(&self, since: DateTime<Utc>) -> Result<CheckCounts, StoreError>;

    async fn appointment(&self, id: AppointmentId) -> Result<Option<Appointment>, StoreError>;
    async fn insert_appointment(&self, appointment: &Appointment) -> Result<(), StoreError>;
    async fn update_appointment(&self, appointment: &Appointment) -> Result<(), StoreError>;
    async fn delete_appointment(&self, id: AppointmentId) -> Result<bool, StoreError>;
    async fn list_appointments(
        &self,
        filter: &AppointmentFilter,
        page: Pagination,
    ) -> Result<Page<Appointment>, StoreError>;

    async fn user(&self, id: UserId) -> Result<Option<User>, StoreError>;
    /// Fails with `Duplicate` when the email is taken.
    async fn insert_user(&self, user: &User) -> Result<(), StoreError>;
    async fn update_user(&self, user: &User) -> Result<(), StoreError>;
    async fn delete_user(&self, id: UserId) -> Result<bool, StoreError>;
    async fn list_users(&self, filter: &UserFilter, page: Pagination) -> Result<Page<User>, StoreError>;
}

/// A unit of work over one visitor's records.
#[async_trait]
pub trait StoreTx: Send {
    fn visitor_id(&self) -> VisitorId;

    async fn visitor(&mut self) -> Result<Option<Visitor>, StoreError>;
    async fn pass(&mut self, id: PassId) -> Result<Option<Pass>, StoreError>;
    /// The visitor's `active` or `expired` pass, if any.
    async fn blocking_pass(&mut self) -> Result<Option<Pass>, StoreError>;
    async fn pass_number_taken(&mut self, number: &str) -> Result<bool, StoreError>;
    /// Newest check-in for the visitor at or after `since`. Check-outs are ignored.
    async fn latest_check_in_since(
        &mut self,
        since: DateTime<Utc>,
    ) -> Result<Option<CheckLog>, StoreError>;

    async fn insert_pass(&mut self, pass: &Pass) -> Result<(), StoreError>;
    /// Persist `pass.status`. Other columns, `pdf_url` included, keep their committed value.
    async fn update_pass(&mut self, pass: &Pass) -> Result<(), StoreError>;
    async fn update_visitor(&mut self, visitor: &Visitor) -> Result<(), StoreError>;
    async fn append_check_log(&mut self, log: &CheckLog) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_defaults_and_clamps() {
        assert_eq!(Pagination::new(None, None), Pagination { page: 1, limit: 10 });
        assert_eq!(Pagination::new(Some(0), Some(0)), Pagination { page: 1, limit: 10 });
        assert_eq!(Pagination::new(Some(3), Some(500)).limit, Pagination::MAX_LIMIT);
    }

    #[test]
    fn slice_reports_totals() {
        let page = Pagination::new(Some(2), Some(3)).slice((1..=8).collect::<Vec<_>>());
        assert_eq!(page.items, vec![4, 5, 6]);
        assert_eq!(page.total, 8);
        assert_eq!(page.total_pages(), 3);

        let empty = Pagination::default().slice(Vec::<u8>::new());
        assert_eq!(empty.total_pages(), 0);
    }
}
