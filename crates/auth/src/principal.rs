use serde::{Deserialize, Serialize};

use gatepass_core::UserId;

use crate::Role;

/// A fully resolved, authenticated identity for authorization decisions.
///
/// Construction is decoupled from storage and transport: the API derives it
/// from verified token claims, tests build it directly.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: UserId,
    pub role: Role,
}

impl Principal {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_security_or_admin(&self) -> bool {
        matches!(self.role, Role::Admin | Role::Security)
    }

    /// Whether results should be narrowed to resources this principal hosts.
    pub fn is_host_scoped(&self) -> bool {
        self.role == Role::Employee
    }
}
