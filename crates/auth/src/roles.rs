use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Staff role used for access control.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Unrestricted.
    Admin,
    /// Front desk / guards: issues, verifies and scans passes.
    Security,
    /// Hosts visitors; scoped to their own visitors and appointments.
    Employee,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Security, Role::Employee];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Security => "security",
            Role::Employee => "employee",
        }
    }

    /// Whether a visitor may name a user with this role as their host.
    pub fn can_host(&self) -> bool {
        matches!(self, Role::Admin | Role::Employee)
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "security" => Ok(Role::Security),
            "employee" => Ok(Role::Employee),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}
