use thiserror::Error;

use gatepass_core::{DomainError, UserId};

use crate::{Operation, Ownership, Principal};

/// The ownership facts of a loaded resource, as seen by the policy.
///
/// Role-only operations are checked with [`ResourceScope::unscoped`] before any
/// load; ownership operations are checked after the resource is loaded, so a
/// `NotFound` can precede a `Forbidden` for the same request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceScope {
    pub host_id: Option<UserId>,
    pub attendees: Vec<UserId>,
    pub subject_user: Option<UserId>,
}

impl ResourceScope {
    pub fn unscoped() -> Self {
        Self::default()
    }

    pub fn hosted_by(host_id: UserId) -> Self {
        Self {
            host_id: Some(host_id),
            ..Self::default()
        }
    }

    pub fn with_attendees(mut self, attendees: impl IntoIterator<Item = UserId>) -> Self {
        self.attendees = attendees.into_iter().collect();
        self
    }

    pub fn user(user_id: UserId) -> Self {
        Self {
            subject_user: Some(user_id),
            ..Self::default()
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("role '{role}' may not perform {operation:?}")]
    MissingRole { operation: Operation, role: crate::Role },

    #[error("principal does not own the resource for {operation:?}")]
    NotOwner { operation: Operation },
}

impl From<AuthzError> for DomainError {
    fn from(value: AuthzError) -> Self {
        match value {
            AuthzError::MissingRole { .. } => DomainError::Unauthorized,
            AuthzError::NotOwner { .. } => DomainError::Forbidden,
        }
    }
}

/// Command-side authorization contract (checked at the engine boundary).
///
/// Implemented by engine commands so the guard cannot be forgotten.
pub trait OperationAuthorization {
    fn operation(&self) -> Operation;
    fn actor(&self) -> &Principal;
}

/// Evaluate the policy table for `principal` running `operation` on `scope`.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(
    principal: &Principal,
    operation: Operation,
    scope: &ResourceScope,
) -> Result<(), AuthzError> {
    let rule = operation.rule();
    if rule.grants_role(principal.role) {
        return Ok(());
    }

    if !rule.is_resource_scoped() {
        tracing::debug!(?operation, role = %principal.role, "denied by role");
        return Err(AuthzError::MissingRole {
            operation,
            role: principal.role,
        });
    }

    let me = principal.user_id;
    let is_employee_host = principal.is_host_scoped() && scope.host_id == Some(me);
    let owns = match rule.ownership {
        Ownership::None => false,
        Ownership::Host => is_employee_host,
        Ownership::HostOrAttendee => is_employee_host || scope.attendees.contains(&me),
        Ownership::SelfUser => scope.subject_user == Some(me),
    };

    if owns {
        Ok(())
    } else {
        tracing::debug!(?operation, user_id = %me, "denied by ownership");
        Err(AuthzError::NotOwner { operation })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Role;

    fn employee() -> Principal {
        Principal::new(UserId::new(), Role::Employee)
    }

    #[test]
    fn employee_cannot_issue_even_for_own_visitor() {
        let p = employee();
        let err = authorize(&p, Operation::IssuePass, &ResourceScope::hosted_by(p.user_id))
            .unwrap_err();
        assert!(matches!(err, AuthzError::MissingRole { .. }));
        assert_eq!(DomainError::from(err), DomainError::Unauthorized);
    }

    #[test]
    fn employee_host_may_view_own_visitor_only() {
        let p = employee();
        assert!(authorize(&p, Operation::ViewVisitor, &ResourceScope::hosted_by(p.user_id)).is_ok());

        let err = authorize(&p, Operation::ViewVisitor, &ResourceScope::hosted_by(UserId::new()))
            .unwrap_err();
        assert_eq!(DomainError::from(err), DomainError::Forbidden);
    }

    #[test]
    fn security_is_unrestricted_on_visitors_but_not_users() {
        let p = Principal::new(UserId::new(), Role::Security);
        let scope = ResourceScope::hosted_by(UserId::new());
        assert!(authorize(&p, Operation::ChangeVisitorStatus, &scope).is_ok());
        assert!(authorize(&p, Operation::ListUsers, &ResourceScope::unscoped()).is_err());
    }

    #[test]
    fn attendee_may_view_appointment_but_not_update_it() {
        let p = employee();
        let scope = ResourceScope::hosted_by(UserId::new()).with_attendees([p.user_id]);
        assert!(authorize(&p, Operation::ViewAppointment, &scope).is_ok());
        assert!(authorize(&p, Operation::ChangeAppointmentStatus, &scope).is_ok());
        assert!(authorize(&p, Operation::UpdateAppointment, &scope).is_err());
    }

    #[test]
    fn self_or_admin_for_user_resources() {
        let p = Principal::new(UserId::new(), Role::Security);
        assert!(authorize(&p, Operation::ViewUser, &ResourceScope::user(p.user_id)).is_ok());
        assert!(authorize(&p, Operation::ViewUser, &ResourceScope::user(UserId::new())).is_err());

        let admin = Principal::new(UserId::new(), Role::Admin);
        assert!(authorize(&admin, Operation::UpdateUser, &ResourceScope::user(UserId::new())).is_ok());
    }

    #[test]
    fn ownership_requires_employee_role() {
        // A security user is already granted by role on visitor ops, but on
        // appointment updates the host predicate only admits employees.
        let p = Principal::new(UserId::new(), Role::Security);
        let err = authorize(&p, Operation::UpdateAppointment, &ResourceScope::hosted_by(p.user_id))
            .unwrap_err();
        assert!(matches!(err, AuthzError::NotOwner { .. }));
    }
}
