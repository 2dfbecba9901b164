use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gatepass_core::{DomainError, DomainResult, Entity, UserId, VisitorId};

/// Visitor lifecycle.
///
/// ```text
/// pending ──approve──▶ approved ──check_in──▶ checked_in ──check_out──▶ checked_out
///    │                    ▲                                                 │
///    └──reject──▶ rejected┘ (re-decision)          check_in (next visit) ◀──┘
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitorStatus {
    Pending,
    Approved,
    Rejected,
    CheckedIn,
    CheckedOut,
}

impl VisitorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisitorStatus::Pending => "pending",
            VisitorStatus::Approved => "approved",
            VisitorStatus::Rejected => "rejected",
            VisitorStatus::CheckedIn => "checked_in",
            VisitorStatus::CheckedOut => "checked_out",
        }
    }
}

impl core::fmt::Display for VisitorStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VisitorStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(VisitorStatus::Pending),
            "approved" => Ok(VisitorStatus::Approved),
            "rejected" => Ok(VisitorStatus::Rejected),
            "checked_in" => Ok(VisitorStatus::CheckedIn),
            "checked_out" => Ok(VisitorStatus::CheckedOut),
            other => Err(DomainError::validation(format!("unknown visitor status '{other}'"))),
        }
    }
}

/// Host decision on a registration.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisitorDecision {
    Approved,
    Rejected,
}

impl FromStr for VisitorDecision {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approved" => Ok(VisitorDecision::Approved),
            "rejected" => Ok(VisitorDecision::Rejected),
            _ => Err(DomainError::validation("Invalid status")),
        }
    }
}

/// Registration input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewVisitor {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub company: Option<String>,
    pub purpose: String,
    pub host_id: UserId,
    pub expected_arrival: DateTime<Utc>,
    pub expected_departure: DateTime<Utc>,
    pub notes: Option<String>,
}

/// Partial update of registration details. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitorUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub purpose: Option<String>,
    pub expected_arrival: Option<DateTime<Utc>>,
    pub expected_departure: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

/// A registered visitor.
///
/// # Invariants
/// - `actual_arrival` is only written by [`Visitor::check_in`].
/// - `actual_departure` is only written by [`Visitor::check_out`].
/// - `checked_in` is only reachable from `approved` or `checked_out`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Visitor {
    pub id: VisitorId,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub company: Option<String>,
    pub purpose: String,
    pub host_id: UserId,
    pub photo: Option<String>,
    pub status: VisitorStatus,
    pub expected_arrival: DateTime<Utc>,
    pub expected_departure: DateTime<Utc>,
    pub actual_arrival: Option<DateTime<Utc>>,
    pub actual_departure: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Visitor {
    type Id = VisitorId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

fn required(field: &str, value: &str) -> DomainResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn window(arrival: DateTime<Utc>, departure: DateTime<Utc>) -> DomainResult<()> {
    if departure < arrival {
        return Err(DomainError::validation(
            "expectedDeparture must not precede expectedArrival",
        ));
    }
    Ok(())
}

impl Visitor {
    /// Register a new visitor in `pending`.
    pub fn register(input: NewVisitor, now: DateTime<Utc>) -> DomainResult<Self> {
        window(input.expected_arrival, input.expected_departure)?;
        Ok(Self {
            id: VisitorId::new(),
            name: required("name", &input.name)?,
            email: required("email", &input.email)?.to_lowercase(),
            phone: required("phone", &input.phone)?,
            company: non_empty(input.company),
            purpose: required("purpose", &input.purpose)?,
            host_id: input.host_id,
            photo: None,
            status: VisitorStatus::Pending,
            expected_arrival: input.expected_arrival,
            expected_departure: input.expected_departure,
            actual_arrival: None,
            actual_departure: None,
            notes: non_empty(input.notes),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn apply_update(&mut self, update: VisitorUpdate, now: DateTime<Utc>) -> DomainResult<()> {
        let arrival = update.expected_arrival.unwrap_or(self.expected_arrival);
        let departure = update.expected_departure.unwrap_or(self.expected_departure);
        window(arrival, departure)?;

        if let Some(name) = update.name {
            self.name = required("name", &name)?;
        }
        if let Some(email) = update.email {
            self.email = required("email", &email)?.to_lowercase();
        }
        if let Some(phone) = update.phone {
            self.phone = required("phone", &phone)?;
        }
        if let Some(purpose) = update.purpose {
            self.purpose = required("purpose", &purpose)?;
        }
        if update.company.is_some() {
            self.company = non_empty(update.company);
        }
        if update.notes.is_some() {
            self.notes = non_empty(update.notes);
        }
        self.expected_arrival = arrival;
        self.expected_departure = departure;
        self.updated_at = now;
        Ok(())
    }

    /// Point the visitor at a stored photo.
    pub fn set_photo(&mut self, url: impl Into<String>, now: DateTime<Utc>) {
        self.photo = Some(url.into());
        self.updated_at = now;
    }

    /// Approve or reject.
    ///
    /// A visitor who is on site cannot be re-decided; check them out first.
    pub fn decide(&mut self, decision: VisitorDecision, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status == VisitorStatus::CheckedIn {
            return Err(DomainError::invalid_state("Visitor is checked_in"));
        }
        self.status = match decision {
            VisitorDecision::Approved => VisitorStatus::Approved,
            VisitorDecision::Rejected => VisitorStatus::Rejected,
        };
        self.updated_at = now;
        Ok(())
    }

    pub fn is_approved(&self) -> bool {
        self.status == VisitorStatus::Approved
    }

    /// Transition into `checked_in`, stamping the arrival.
    pub fn check_in(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        match self.status {
            VisitorStatus::Approved | VisitorStatus::CheckedOut => {
                self.status = VisitorStatus::CheckedIn;
                self.actual_arrival = Some(now);
                self.updated_at = now;
                Ok(())
            }
            VisitorStatus::CheckedIn => Err(DomainError::AlreadyCheckedIn),
            VisitorStatus::Pending | VisitorStatus::Rejected => {
                Err(DomainError::invalid_state("Visitor is not approved"))
            }
        }
    }

    /// Transition into `checked_out`, stamping the departure.
    pub fn check_out(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status != VisitorStatus::CheckedIn {
            return Err(DomainError::invalid_state("Visitor is not checked in"));
        }
        self.status = VisitorStatus::CheckedOut;
        self.actual_departure = Some(now);
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    fn new_visitor() -> NewVisitor {
        NewVisitor {
            name: "  Ada Lovelace ".to_string(),
            email: "Ada@Example.COM".to_string(),
            phone: "+44 20 0000".to_string(),
            company: Some("".to_string()),
            purpose: "Design review".to_string(),
            host_id: UserId::new(),
            expected_arrival: t0(),
            expected_departure: t0() + Duration::hours(4),
            notes: None,
        }
    }

    #[test]
    fn register_normalizes_and_starts_pending() {
        let v = Visitor::register(new_visitor(), t0()).unwrap();
        assert_eq!(v.status, VisitorStatus::Pending);
        assert_eq!(v.name, "Ada Lovelace");
        assert_eq!(v.email, "ada@example.com");
        assert_eq!(v.company, None);
        assert!(v.actual_arrival.is_none());
    }

    #[test]
    fn register_rejects_missing_fields_and_inverted_window() {
        let mut input = new_visitor();
        input.purpose = "   ".to_string();
        assert!(matches!(
            Visitor::register(input, t0()),
            Err(DomainError::Validation(msg)) if msg == "purpose is required"
        ));

        let mut input = new_visitor();
        input.expected_departure = input.expected_arrival - Duration::minutes(1);
        assert!(Visitor::register(input, t0()).is_err());
    }

    #[test]
    fn full_visit_stamps_arrival_then_departure() {
        let mut v = Visitor::register(new_visitor(), t0()).unwrap();
        assert!(matches!(v.check_in(t0()), Err(DomainError::InvalidState(_))));

        v.decide(VisitorDecision::Approved, t0()).unwrap();
        let arrival = t0() + Duration::minutes(5);
        v.check_in(arrival).unwrap();
        assert_eq!(v.status, VisitorStatus::CheckedIn);
        assert_eq!(v.actual_arrival, Some(arrival));
        assert_eq!(v.actual_departure, None);

        assert_eq!(v.check_in(arrival), Err(DomainError::AlreadyCheckedIn));

        let departure = arrival + Duration::hours(2);
        v.check_out(departure).unwrap();
        assert_eq!(v.status, VisitorStatus::CheckedOut);
        assert_eq!(v.actual_arrival, Some(arrival));
        assert_eq!(v.actual_departure, Some(departure));

        let err = v.check_out(departure).unwrap_err();
        assert_eq!(err, DomainError::invalid_state("Visitor is not checked in"));
    }

    #[test]
    fn decision_is_blocked_while_on_site() {
        let mut v = Visitor::register(new_visitor(), t0()).unwrap();
        v.decide(VisitorDecision::Approved, t0()).unwrap();
        v.check_in(t0()).unwrap();
        assert!(v.decide(VisitorDecision::Rejected, t0()).is_err());
        assert_eq!(v.status, VisitorStatus::CheckedIn);
    }

    #[test]
    fn photo_replaces_the_previous_one() {
        let mut v = Visitor::register(new_visitor(), t0()).unwrap();
        v.set_photo("/uploads/a.png", t0() + Duration::minutes(1));
        v.set_photo("/uploads/b.png", t0() + Duration::minutes(2));
        assert_eq!(v.photo.as_deref(), Some("/uploads/b.png"));
        assert_eq!(v.updated_at, t0() + Duration::minutes(2));
        assert_eq!(v.status, VisitorStatus::Pending);
    }

    #[test]
    fn decision_parse_only_accepts_approved_or_rejected() {
        assert_eq!("approved".parse::<VisitorDecision>(), Ok(VisitorDecision::Approved));
        assert_eq!(
            "checked_in".parse::<VisitorDecision>(),
            Err(DomainError::validation("Invalid status"))
        );
    }

    #[derive(Debug, Clone)]
    enum Op {
        Approve,
        Reject,
        CheckIn,
        CheckOut,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Approve),
            Just(Op::Reject),
            Just(Op::CheckIn),
            Just(Op::CheckOut),
        ]
    }

    proptest! {
        #[test]
        fn timestamps_only_move_on_their_own_transition(ops in proptest::collection::vec(op(), 0..40)) {
            let mut v = Visitor::register(new_visitor(), t0()).unwrap();
            let mut now = t0();
            for op in ops {
                now += Duration::minutes(1);
                let before = v.clone();
                let result = match op {
                    Op::Approve => v.decide(VisitorDecision::Approved, now),
                    Op::Reject => v.decide(VisitorDecision::Rejected, now),
                    Op::CheckIn => v.check_in(now),
                    Op::CheckOut => v.check_out(now),
                };
                if result.is_err() {
                    prop_assert_eq!(&v, &before);
                    continue;
                }
                match op {
                    Op::CheckIn => {
                        prop_assert_eq!(v.status, VisitorStatus::CheckedIn);
                        prop_assert_eq!(v.actual_arrival, Some(now));
                        prop_assert_eq!(v.actual_departure, before.actual_departure);
                    }
                    Op::CheckOut => {
                        prop_assert_eq!(before.status, VisitorStatus::CheckedIn);
                        prop_assert_eq!(v.actual_departure, Some(now));
                        prop_assert_eq!(v.actual_arrival, before.actual_arrival);
                    }
                    Op::Approve | Op::Reject => {
                        prop_assert_eq!(v.actual_arrival, before.actual_arrival);
                        prop_assert_eq!(v.actual_departure, before.actual_departure);
                    }
                }
            }
        }
    }
}
