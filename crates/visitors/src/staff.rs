use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gatepass_auth::Role;
use gatepass_core::{DomainError, DomainResult, Entity, UserId};

/// Staff directory record. Credentials live with the token issuer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub department: Option<String>,
    pub phone: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Entity for User {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    /// Caller-supplied id so directory entries can mirror the identity provider.
    pub id: Option<UserId>,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub department: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub department: Option<String>,
    pub phone: Option<String>,
    pub is_active: Option<bool>,
}

fn email(value: &str) -> DomainResult<String> {
    let e = value.trim().to_lowercase();
    if e.is_empty() || !e.contains('@') {
        return Err(DomainError::validation("a valid email is required"));
    }
    Ok(e)
}

impl User {
    pub fn provision(input: NewUser, now: DateTime<Utc>) -> DomainResult<Self> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("name is required"));
        }
        Ok(Self {
            id: input.id.unwrap_or_default(),
            name: name.to_string(),
            email: email(&input.email)?,
            role: input.role,
            department: input.department,
            phone: input.phone,
            is_active: true,
            created_at: now,
        })
    }

    /// Apply an update. Role and activation changes are admin-only.
    pub fn apply_update(&mut self, update: UserUpdate, by_admin: bool) -> DomainResult<()> {
        if !by_admin && (update.role.is_some() || update.is_active.is_some()) {
            return Err(DomainError::Unauthorized);
        }
        if let Some(name) = update.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(DomainError::validation("name is required"));
            }
            self.name = name.to_string();
        }
        if let Some(e) = update.email {
            self.email = email(&e)?;
        }
        if let Some(role) = update.role {
            self.role = role;
        }
        if update.department.is_some() {
            self.department = update.department;
        }
        if update.phone.is_some() {
            self.phone = update.phone;
        }
        if let Some(active) = update.is_active {
            self.is_active = active;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User::provision(
            NewUser {
                id: None,
                name: "Grace".to_string(),
                email: " Grace@Corp.io ".to_string(),
                role: Role::Employee,
                department: Some("R&D".to_string()),
                phone: None,
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn provision_normalizes_email_and_activates() {
        let u = user();
        assert_eq!(u.email, "grace@corp.io");
        assert!(u.is_active);
    }

    #[test]
    fn non_admin_cannot_change_own_role() {
        let mut u = user();
        let err = u
            .apply_update(
                UserUpdate {
                    role: Some(Role::Admin),
                    ..Default::default()
                },
                false,
            )
            .unwrap_err();
        assert_eq!(err, DomainError::Unauthorized);
        assert_eq!(u.role, Role::Employee);

        u.apply_update(
            UserUpdate {
                phone: Some("555".to_string()),
                ..Default::default()
            },
            false,
        )
        .unwrap();
        assert_eq!(u.phone.as_deref(), Some("555"));
    }

    #[test]
    fn admin_may_deactivate() {
        let mut u = user();
        u.apply_update(
            UserUpdate {
                is_active: Some(false),
                ..Default::default()
            },
            true,
        )
        .unwrap();
        assert!(!u.is_active);
    }
}
