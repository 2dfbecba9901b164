//! Scan decisions.
//!
//! Pure functions over already-loaded state. The engines load the records inside
//! a per-visitor transaction, call these, then persist the mutated visitor and
//! the returned log together.

use chrono::{DateTime, Utc};

use gatepass_core::{DomainError, DomainResult, UserId};
use gatepass_visitors::Visitor;

use crate::{CheckEntry, CheckLog, CheckType, Pass};

/// Last verification step, after the pass itself has been screened.
pub fn ensure_visitor_approved(visitor: &Visitor) -> DomainResult<()> {
    if !visitor.is_approved() {
        return Err(DomainError::invalid_state("Visitor is not approved"));
    }
    Ok(())
}

/// Check a visitor in on `pass`.
///
/// `check_in_in_window` is the newest check-in for the visitor inside the
/// idempotency window. Its presence makes this a duplicate, whether or not the
/// visitor has checked out since.
pub fn admit(
    visitor: &mut Visitor,
    pass: &Pass,
    check_in_in_window: Option<&CheckLog>,
    checked_by: UserId,
    entry: CheckEntry,
    now: DateTime<Utc>,
) -> DomainResult<CheckLog> {
    entry.validate()?;
    if check_in_in_window.is_some_and(|log| log.kind == CheckType::CheckIn) {
        return Err(DomainError::AlreadyCheckedIn);
    }
    visitor.check_in(now)?;
    Ok(CheckLog::record(CheckType::CheckIn, visitor.id, pass.id, checked_by, entry, now))
}

/// Check a visitor out. The pass is not re-screened: it may have expired while
/// the visitor was on site.
pub fn release(
    visitor: &mut Visitor,
    pass: &Pass,
    checked_by: UserId,
    entry: CheckEntry,
    now: DateTime<Utc>,
) -> DomainResult<CheckLog> {
    visitor.check_out(now)?;
    Ok(CheckLog::record(CheckType::CheckOut, visitor.id, pass.id, checked_by, entry, now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use gatepass_visitors::{NewVisitor, VisitorDecision, VisitorStatus};

    use crate::{AccessLevel, PassDraft, PassNumber, QrSigner};

    fn approved(now: DateTime<Utc>) -> Visitor {
        let mut v = Visitor::register(
            NewVisitor {
                name: "Lin".to_string(),
                email: "lin@example.com".to_string(),
                phone: "1".to_string(),
                company: None,
                purpose: "Audit".to_string(),
                host_id: UserId::new(),
                expected_arrival: now,
                expected_departure: now + Duration::hours(2),
                notes: None,
            },
            now,
        )
        .unwrap();
        v.decide(VisitorDecision::Approved, now).unwrap();
        v
    }

    fn pass_for(v: &Visitor, now: DateTime<Utc>) -> Pass {
        Pass::issue(
            PassDraft {
                visitor_id: v.id,
                valid_from: now,
                valid_to: now + Duration::days(1),
                access_level: AccessLevel::Standard,
            },
            PassNumber::generate(now, &mut rand::rng()),
            UserId::new(),
            &QrSigner::new("k", true),
            now,
        )
        .unwrap()
    }

    #[test]
    fn admit_then_release_produces_paired_logs() {
        let now = Utc::now();
        let mut v = approved(now);
        let p = pass_for(&v, now);
        let guard = UserId::new();

        let log_in = admit(&mut v, &p, None, guard, CheckEntry::default(), now).unwrap();
        assert_eq!(log_in.kind, CheckType::CheckIn);
        assert_eq!(v.status, VisitorStatus::CheckedIn);

        let later = now + Duration::hours(1);
        let log_out = release(&mut v, &p, guard, CheckEntry::default(), later).unwrap();
        assert_eq!(log_out.kind, CheckType::CheckOut);
        assert_eq!(log_out.pass_id, p.id);
        assert_eq!(v.actual_departure, Some(later));
    }

    #[test]
    fn admit_is_rejected_after_a_check_in_in_the_window() {
        let now = Utc::now();
        let mut v = approved(now);
        let p = pass_for(&v, now);
        let prior = CheckLog::record(CheckType::CheckIn, v.id, p.id, UserId::new(), CheckEntry::default(), now);

        let before = v.clone();
        let err = admit(&mut v, &p, Some(&prior), UserId::new(), CheckEntry::default(), now).unwrap_err();
        assert_eq!(err, DomainError::AlreadyCheckedIn);
        assert_eq!(v, before);
    }

    #[test]
    fn check_out_does_not_reopen_the_window() {
        let now = Utc::now();
        let mut v = approved(now);
        let p = pass_for(&v, now);
        let first = admit(&mut v, &p, None, UserId::new(), CheckEntry::default(), now).unwrap();
        release(&mut v, &p, UserId::new(), CheckEntry::default(), now + Duration::minutes(30)).unwrap();

        let before = v.clone();
        let again = admit(&mut v, &p, Some(&first), UserId::new(), CheckEntry::default(), now + Duration::hours(1));
        assert_eq!(again, Err(DomainError::AlreadyCheckedIn));
        assert_eq!(v, before);
    }

    #[test]
    fn readmission_once_the_window_has_passed() {
        let now = Utc::now();
        let mut v = approved(now);
        let p = pass_for(&v, now);
        admit(&mut v, &p, None, UserId::new(), CheckEntry::default(), now).unwrap();
        release(&mut v, &p, UserId::new(), CheckEntry::default(), now + Duration::hours(1)).unwrap();

        let later = now + Duration::hours(25);
        let log = admit(&mut v, &p, None, UserId::new(), CheckEntry::default(), later).unwrap();
        assert_eq!(log.kind, CheckType::CheckIn);
        assert_eq!(v.status, VisitorStatus::CheckedIn);
        assert_eq!(v.actual_arrival, Some(later));
    }

    #[test]
    fn release_requires_checked_in() {
        let now = Utc::now();
        let mut v = approved(now);
        let p = pass_for(&v, now);
        assert_eq!(
            release(&mut v, &p, UserId::new(), CheckEntry::default(), now),
            Err(DomainError::invalid_state("Visitor is not checked in"))
        );
    }

    #[test]
    fn verification_requires_approved_visitor() {
        let now = Utc::now();
        let mut v = approved(now);
        assert!(ensure_visitor_approved(&v).is_ok());
        v.decide(VisitorDecision::Rejected, now).unwrap();
        assert_eq!(
            ensure_visitor_approved(&v),
            Err(DomainError::invalid_state("Visitor is not approved"))
        );
    }
}
