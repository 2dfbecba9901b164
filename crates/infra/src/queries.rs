//! Read side over passes and check logs.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use serde::Serialize;

use gatepass_auth::{Operation, Principal, ResourceScope, authorize};
use gatepass_core::{CheckLogId, DomainError, PassId, VisitorId};
use gatepass_passes::{CheckLog, Pass};

use crate::error::LifecycleError;
use crate::store::{CheckLogFilter, EntityStore, Page, Pagination, PassFilter};

/// Reporting window for check statistics.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatsPeriod {
    /// Since midnight UTC.
    #[default]
    Today,
    /// The trailing seven days.
    Week,
    /// Since the first of the month, UTC.
    Month,
}

impl StatsPeriod {
    /// Unknown or missing values fall back to `Today`.
    pub fn parse_lenient(value: Option<&str>) -> Self {
        match value {
            Some("week") => StatsPeriod::Week,
            Some("month") => StatsPeriod::Month,
            _ => StatsPeriod::Today,
        }
    }

    pub fn start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let midnight = |d: NaiveDate| Utc.from_utc_datetime(&d.and_time(chrono::NaiveTime::MIN));
        match self {
            StatsPeriod::Today => midnight(now.date_naive()),
            StatsPeriod::Week => now - Duration::days(7),
            StatsPeriod::Month => midnight(now.date_naive().with_day(1).unwrap_or(now.date_naive())),
        }
    }
}

/// Ratio of check-ins to check-outs, or `"N/A"` without check-outs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Ratio {
    Value(String),
    NotApplicable(&'static str),
}

impl Ratio {
    pub fn of(check_ins: u64, check_outs: u64) -> Self {
        if check_outs == 0 {
            return Ratio::NotApplicable("N/A");
        }
        Ratio::Value(format!("{:.2}", check_ins as f64 / check_outs as f64))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckStats {
    pub period: StatsPeriod,
    pub total_check_ins: u64,
    pub total_check_outs: u64,
    pub current_checked_in: u64,
    pub check_in_out_ratio: Ratio,
}

fn missing(entity: &'static str) -> LifecycleError {
    LifecycleError::Domain(DomainError::not_found(entity))
}

pub struct Queries {
    store: Arc<dyn EntityStore>,
}

impl Queries {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// Employees only see passes of visitors they host.
    pub async fn passes(
        &self,
        actor: &Principal,
        mut filter: PassFilter,
        page: Pagination,
    ) -> Result<Page<Pass>, LifecycleError> {
        authorize(actor, Operation::ListPasses, &ResourceScope::unscoped())?;
        if actor.is_host_scoped() {
            filter.hosted_by = Some(actor.user_id);
        }
        Ok(self.store.list_passes(&filter, page).await?)
    }

    pub async fn pass(&self, actor: &Principal, id: PassId) -> Result<Pass, LifecycleError> {
        let pass = self.store.pass(id).await?.ok_or_else(|| missing("Pass"))?;
        self.authorize_for_visitor(actor, Operation::ViewPass, pass.visitor_id)
            .await?;
        Ok(pass)
    }

    /// Employees only see logs of visitors they host.
    pub async fn check_logs(
        &self,
        actor: &Principal,
        mut filter: CheckLogFilter,
        page: Pagination,
    ) -> Result<Page<CheckLog>, LifecycleError> {
        authorize(actor, Operation::ListCheckLogs, &ResourceScope::unscoped())?;
        if actor.is_host_scoped() {
            filter.hosted_by = Some(actor.user_id);
        }
        Ok(self.store.list_check_logs(&filter, page).await?)
    }

    pub async fn check_log(&self, actor: &Principal, id: CheckLogId) -> Result<CheckLog, LifecycleError> {
        let log = self
            .store
            .check_log(id)
            .await?
            .ok_or_else(|| missing("Check log"))?;
        self.authorize_for_visitor(actor, Operation::ViewCheckLog, log.visitor_id)
            .await?;
        Ok(log)
    }

    /// Every log of one visitor, newest first.
    pub async fn visitor_history(
        &self,
        actor: &Principal,
        visitor_id: VisitorId,
    ) -> Result<Vec<CheckLog>, LifecycleError> {
        self.authorize_for_visitor(actor, Operation::ViewVisitorHistory, visitor_id)
            .await?;
        Ok(self.store.visitor_history(visitor_id).await?)
    }

    pub async fn stats(
        &self,
        actor: &Principal,
        period: StatsPeriod,
        now: DateTime<Utc>,
    ) -> Result<CheckStats, LifecycleError> {
        authorize(actor, Operation::ViewCheckStats, &ResourceScope::unscoped())?;
        let counts = self.store.check_counts(period.start(now)).await?;
        Ok(CheckStats {
            period,
            total_check_ins: counts.check_ins,
            total_check_outs: counts.check_outs,
            current_checked_in: counts.currently_checked_in,
            check_in_out_ratio: Ratio::of(counts.check_ins, counts.check_outs),
        })
    }

    /// Ownership gate through the visitor a record belongs to. Security and
    /// admin pass on role alone, without the visitor being loaded.
    async fn authorize_for_visitor(
        &self,
        actor: &Principal,
        operation: Operation,
        visitor_id: VisitorId,
    ) -> Result<(), LifecycleError> {
        if operation.rule().grants_role(actor.role) {
            return Ok(());
        }
        let visitor = self
            .store
            .visitor(visitor_id)
            .await?
            .ok_or(DomainError::Forbidden)?;
        authorize(actor, operation, &ResourceScope::hosted_by(visitor.host_id))?;
        Ok(())
    }
}
