use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gatepass_core::{DomainError, DomainResult, Entity, PassId, UserId, VisitorId};

use crate::{PassNumber, QrSigner};

/// Pass status.
///
/// `active` is the only usable state. `expired` is reached lazily when a read
/// observes `now > expires_at`; it still blocks issuance until revoked.
/// `revoked` is terminal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PassStatus {
    Active,
    Expired,
    Revoked,
}

impl PassStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PassStatus::Active => "active",
            PassStatus::Expired => "expired",
            PassStatus::Revoked => "revoked",
        }
    }

    /// Whether a pass in this state prevents a new pass for the same visitor.
    pub fn blocks_issuance(&self) -> bool {
        matches!(self, PassStatus::Active | PassStatus::Expired)
    }
}

impl core::fmt::Display for PassStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PassStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(PassStatus::Active),
            "expired" => Ok(PassStatus::Expired),
            "revoked" => Ok(PassStatus::Revoked),
            other => Err(DomainError::validation(format!("unknown pass status '{other}'"))),
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    #[default]
    Standard,
    Vip,
    Restricted,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::Standard => "standard",
            AccessLevel::Vip => "vip",
            AccessLevel::Restricted => "restricted",
        }
    }
}

impl FromStr for AccessLevel {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(AccessLevel::Standard),
            "vip" => Ok(AccessLevel::Vip),
            "restricted" => Ok(AccessLevel::Restricted),
            other => Err(DomainError::validation(format!("unknown access level '{other}'"))),
        }
    }
}

/// Issuance request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassDraft {
    pub visitor_id: VisitorId,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    #[serde(default)]
    pub access_level: AccessLevel,
}

/// An issued pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pass {
    pub id: PassId,
    pub visitor_id: VisitorId,
    pub pass_number: String,
    /// Encoded QR payload, rendered by clients into the badge image.
    pub qr_data: String,
    pub pdf_url: Option<String>,
    pub issued_by: UserId,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: PassStatus,
    pub access_level: AccessLevel,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
}

impl Entity for Pass {
    type Id = PassId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Outcome of screening a pass for use at `now`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Screen {
    Usable,
    /// Already out of `active`; carries the current state.
    NotActive(PassStatus),
    /// Active but past `expires_at`: the caller must persist the flip.
    JustExpired,
}

impl Screen {
    /// The error a failed screening surfaces, if any.
    pub fn error(&self) -> Option<DomainError> {
        match self {
            Screen::Usable => None,
            Screen::NotActive(status) => Some(DomainError::invalid_state(format!("Pass is {status}"))),
            Screen::JustExpired => Some(DomainError::invalid_state("Pass has expired")),
        }
    }
}

impl Pass {
    /// Mint a new `active` pass. Expiry is the end of the validity window.
    pub fn issue(
        draft: PassDraft,
        number: PassNumber,
        issued_by: UserId,
        signer: &QrSigner,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if draft.valid_to < draft.valid_from {
            return Err(DomainError::validation("validTo must not precede validFrom"));
        }
        let id = PassId::new();
        let payload = signer.seal(id, draft.visitor_id, number.as_str(), now, draft.valid_to);
        Ok(Self {
            id,
            visitor_id: draft.visitor_id,
            pass_number: number.into_string(),
            qr_data: signer.encode(&payload)?,
            pdf_url: None,
            issued_by,
            issued_at: now,
            expires_at: draft.valid_to,
            status: PassStatus::Active,
            access_level: draft.access_level,
            valid_from: draft.valid_from,
            valid_to: draft.valid_to,
        })
    }

    /// Status is checked before expiry, so a revoked pass never reports expiry.
    pub fn screen(&self, now: DateTime<Utc>) -> Screen {
        if self.status != PassStatus::Active {
            return Screen::NotActive(self.status);
        }
        if now > self.expires_at {
            return Screen::JustExpired;
        }
        Screen::Usable
    }

    /// Lazy expiry flip. Returns whether the status changed.
    pub fn expire(&mut self) -> bool {
        if self.status != PassStatus::Active {
            return false;
        }
        self.status = PassStatus::Expired;
        true
    }

    pub fn revoke(&mut self) -> DomainResult<()> {
        if self.status == PassStatus::Revoked {
            return Err(DomainError::invalid_state("Pass is already revoked"));
        }
        self.status = PassStatus::Revoked;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    fn pass(now: DateTime<Utc>, valid_to: DateTime<Utc>) -> Pass {
        let draft = PassDraft {
            visitor_id: VisitorId::new(),
            valid_from: now - Duration::hours(1),
            valid_to,
            access_level: AccessLevel::Vip,
        };
        let number = PassNumber::generate(now, &mut rand::rng());
        Pass::issue(draft, number, UserId::new(), &QrSigner::new("k", true), now).unwrap()
    }

    #[test]
    fn issue_binds_payload_to_the_pass() {
        let now = Utc::now();
        let p = pass(now, now + Duration::days(1));
        assert_eq!(p.status, PassStatus::Active);
        assert_eq!(p.expires_at, p.valid_to);
        let signer = QrSigner::new("k", true);
        assert_eq!(signer.open(&p.qr_data).unwrap(), p.id);
        assert!(p.qr_data.contains(&p.pass_number));
    }

    #[test]
    fn issue_accepts_window_already_in_the_past() {
        let now = Utc::now();
        let p = pass(now, now - Duration::seconds(1));
        assert_eq!(p.screen(now), Screen::JustExpired);
        assert_eq!(
            p.screen(now).error(),
            Some(DomainError::invalid_state("Pass has expired"))
        );
    }

    #[test]
    fn issue_rejects_inverted_window() {
        let now = Utc::now();
        let draft = PassDraft {
            visitor_id: VisitorId::new(),
            valid_from: now,
            valid_to: now - Duration::hours(1),
            access_level: AccessLevel::Standard,
        };
        let number = PassNumber::generate(now, &mut rand::rng());
        assert!(Pass::issue(draft, number, UserId::new(), &QrSigner::new("k", true), now).is_err());
    }

    #[test]
    fn revoked_screening_never_reports_expiry() {
        let now = Utc::now();
        let mut p = pass(now, now - Duration::days(3));
        p.revoke().unwrap();
        assert_eq!(p.screen(now), Screen::NotActive(PassStatus::Revoked));
        assert_eq!(
            p.screen(now).error(),
            Some(DomainError::invalid_state("Pass is revoked"))
        );
        assert_eq!(p.revoke(), Err(DomainError::invalid_state("Pass is already revoked")));
    }

    #[test]
    fn expired_pass_can_be_revoked_to_clear_issuance() {
        let now = Utc::now();
        let mut p = pass(now, now - Duration::seconds(1));
        assert!(p.expire());
        assert!(!p.expire());
        assert!(p.status.blocks_issuance());
        p.revoke().unwrap();
        assert!(!p.status.blocks_issuance());
    }

    proptest! {
        #[test]
        fn revoked_is_terminal(ops in proptest::collection::vec(any::<bool>(), 1..20)) {
            let now = Utc::now();
            let mut p = pass(now, now + Duration::days(1));
            let mut revoked = false;
            for expire in ops {
                if expire {
                    let changed = p.expire();
                    prop_assert!(!(changed && revoked));
                } else {
                    let ok = p.revoke().is_ok();
                    prop_assert_eq!(ok, !revoked);
                    revoked = true;
                }
                if revoked {
                    prop_assert_eq!(p.status, PassStatus::Revoked);
                }
            }
        }
    }
}
