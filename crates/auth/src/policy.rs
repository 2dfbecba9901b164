//! Declarative access-control policy.
//!
//! Every guarded operation maps to exactly one [`Rule`]: the roles that may run it
//! unconditionally, plus an optional ownership predicate that admits principals
//! outside those roles when they own the resource.

use serde::Serialize;

use crate::Role;

/// Operations guarded by the policy table.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    // Passes
    IssuePass,
    RevokePass,
    VerifyPass,
    ListPasses,
    ViewPass,

    // Check logs
    CheckIn,
    CheckOut,
    ViewCheckStats,
    ListCheckLogs,
    ViewCheckLog,
    ViewVisitorHistory,

    // Visitors
    RegisterVisitor,
    ListVisitors,
    ViewVisitor,
    UpdateVisitor,
    ChangeVisitorStatus,

    // Appointments
    ScheduleAppointment,
    ListAppointments,
    ViewAppointment,
    UpdateAppointment,
    DeleteAppointment,
    ChangeAppointmentStatus,

    // Users
    CreateUser,
    ListUsers,
    ViewUser,
    UpdateUser,
    DeleteUser,
}

/// Ownership predicate that can admit a principal outside the rule's roles.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Ownership {
    /// No ownership escape hatch: role membership only.
    None,
    /// `isOwnerHost`: an employee hosting the resource.
    Host,
    /// An employee hosting the resource, or listed among its attendees.
    HostOrAttendee,
    /// `isSelfOrAdmin`: the principal is the user resource itself.
    SelfUser,
}

/// A single policy table entry.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct Rule {
    pub roles: &'static [Role],
    pub ownership: Ownership,
}

const ANY: &[Role] = &Role::ALL;
const ADMIN: &[Role] = &[Role::Admin];
const SECURITY_OR_ADMIN: &[Role] = &[Role::Admin, Role::Security];

impl Operation {
    /// The policy table.
    pub const fn rule(self) -> Rule {
        use Operation::*;
        let (roles, ownership) = match self {
            IssuePass | RevokePass | VerifyPass => (SECURITY_OR_ADMIN, Ownership::None),
            ListPasses => (ANY, Ownership::None),
            ViewPass => (SECURITY_OR_ADMIN, Ownership::Host),

            CheckIn | CheckOut | ViewCheckStats => (SECURITY_OR_ADMIN, Ownership::None),
            ListCheckLogs => (ANY, Ownership::None),
            ViewCheckLog | ViewVisitorHistory => (SECURITY_OR_ADMIN, Ownership::Host),

            RegisterVisitor | ListVisitors => (ANY, Ownership::None),
            ViewVisitor | UpdateVisitor | ChangeVisitorStatus => {
                (SECURITY_OR_ADMIN, Ownership::Host)
            }

            ScheduleAppointment | UpdateAppointment | DeleteAppointment => (ADMIN, Ownership::Host),
            ListAppointments => (ANY, Ownership::None),
            ViewAppointment | ChangeAppointmentStatus => (ADMIN, Ownership::HostOrAttendee),

            CreateUser | ListUsers | DeleteUser => (ADMIN, Ownership::None),
            ViewUser | UpdateUser => (ADMIN, Ownership::SelfUser),
        };
        Rule { roles, ownership }
    }
}

impl Rule {
    pub fn grants_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Whether the decision depends on the loaded resource.
    pub fn is_resource_scoped(&self) -> bool {
        self.ownership != Ownership::None
    }
}
