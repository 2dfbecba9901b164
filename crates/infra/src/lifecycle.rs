//! Pass lifecycle and check-in/check-out engine.
//!
//! ```text
//! Command
//!   ↓
//! 1. Authorize (role gate, or ownership once the visitor is loaded)
//!   ↓
//! 2. Open a transaction on the visitor
//!   ↓
//! 3. Re-read the records and run the pure decision
//!   ↓
//! 4. Stage writes, commit
//!   ↓
//! 5. Log the transition, fire collaborators
//! ```
//!
//! Every method takes `now` explicitly so the engine never reads the clock.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use gatepass_auth::{Operation, OperationAuthorization, Principal, ResourceScope, authorize};
use gatepass_core::{DomainError, PassId, VisitorId};
use gatepass_passes::{
    CheckEntry, CheckLog, CheckWindow, Pass, PassDraft, PassNumber, QrSigner, Screen, admit,
    ensure_visitor_approved, release,
};
use gatepass_visitors::{Visitor, VisitorDecision};

use crate::error::LifecycleError;
use crate::external::{BadgeRenderer, LogNotifier, Notification, Notifier, UrlBadgeRenderer, dispatch, render_badge};
use crate::store::{EntityStore, StoreTx};

/// Pass numbers drawn before issuance gives up.
const NUMBER_ATTEMPTS: usize = 5;

#[derive(Debug, Clone)]
pub struct IssuePass {
    pub actor: Principal,
    pub draft: PassDraft,
}

#[derive(Debug, Clone)]
pub struct VerifyPass {
    pub actor: Principal,
    pub qr_data: String,
}

#[derive(Debug, Clone)]
pub struct CheckIn {
    pub actor: Principal,
    pub qr_data: String,
    pub entry: CheckEntry,
}

#[derive(Debug, Clone)]
pub struct CheckOut {
    pub actor: Principal,
    pub qr_data: String,
    pub entry: CheckEntry,
}

#[derive(Debug, Clone)]
pub struct RevokePass {
    pub actor: Principal,
    pub pass_id: PassId,
}

#[derive(Debug, Clone)]
pub struct DecideVisitor {
    pub actor: Principal,
    pub visitor_id: VisitorId,
    pub decision: VisitorDecision,
}

macro_rules! authorized_as {
    ($($cmd:ty => $op:expr),* $(,)?) => {
        $(
            impl OperationAuthorization for $cmd {
                fn operation(&self) -> Operation {
                    $op
                }

                fn actor(&self) -> &Principal {
                    &self.actor
                }
            }
        )*
    };
}

authorized_as! {
    IssuePass => Operation::IssuePass,
    VerifyPass => Operation::VerifyPass,
    CheckIn => Operation::CheckIn,
    CheckOut => Operation::CheckOut,
    RevokePass => Operation::RevokePass,
    DecideVisitor => Operation::ChangeVisitorStatus,
}

/// A pass that passed verification, with its visitor.
#[derive(Debug, Clone, PartialEq)]
pub struct Verified {
    pub pass: Pass,
    pub visitor: Visitor,
}

/// A committed check-in or check-out.
#[derive(Debug, Clone, PartialEq)]
pub struct Scan {
    pub log: CheckLog,
    pub visitor: Visitor,
}

/// Role gate for operations that carry no ownership escape hatch.
fn guard(cmd: &impl OperationAuthorization) -> Result<(), LifecycleError> {
    authorize(cmd.actor(), cmd.operation(), &ResourceScope::unscoped())?;
    Ok(())
}

fn missing(entity: &'static str) -> LifecycleError {
    LifecycleError::Domain(DomainError::not_found(entity))
}

pub struct Lifecycle {
    store: Arc<dyn EntityStore>,
    signer: QrSigner,
    window: CheckWindow,
    notifier: Arc<dyn Notifier>,
    badges: Arc<dyn BadgeRenderer>,
}

impl core::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Lifecycle")
            .field("signer", &self.signer)
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

impl Lifecycle {
    pub fn new(store: Arc<dyn EntityStore>, signer: QrSigner) -> Self {
        Self {
            store,
            signer,
            window: CheckWindow::default(),
            notifier: Arc::new(LogNotifier),
            badges: Arc::new(UrlBadgeRenderer::default()),
        }
    }

    pub fn with_window(mut self, window: CheckWindow) -> Self {
        self.window = window;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_badges(mut self, badges: Arc<dyn BadgeRenderer>) -> Self {
        self.badges = badges;
        self
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    /// Issue a pass to an approved visitor that holds no `active`/`expired` pass.
    pub async fn issue(&self, cmd: IssuePass, now: DateTime<Utc>) -> Result<Pass, LifecycleError> {
        guard(&cmd)?;
        let visitor_id = cmd.draft.visitor_id;
        let mut tx = self.store.begin(visitor_id).await?;

        let visitor = tx.visitor().await?.ok_or_else(|| missing("Visitor"))?;
        if !visitor.is_approved() {
            return Err(DomainError::invalid_state("Visitor must be approved before issuing pass").into());
        }
        if tx.blocking_pass().await?.is_some() {
            return Err(DomainError::invalid_state("Active pass already exists for this visitor").into());
        }

        let number = unused_number(&mut *tx, now).await?;
        let pass = Pass::issue(cmd.draft, number, cmd.actor.user_id, &self.signer, now)?;
        tx.insert_pass(&pass).await?;
        tx.commit().await?;

        info!(
            pass_id = %pass.id,
            visitor_id = %visitor_id,
            pass_number = %pass.pass_number,
            actor = %cmd.actor.user_id,
            "pass issued"
        );
        render_badge(&self.badges, &self.store, pass.clone());
        dispatch(
            &self.notifier,
            Notification::PassIssued {
                visitor_id,
                pass_id: pass.id,
                pass_number: pass.pass_number.clone(),
            },
        );
        Ok(pass)
    }

    /// Resolve scanned QR data to a usable pass and its approved visitor.
    ///
    /// Read-only except for the lazy `active -> expired` flip.
    pub async fn verify(&self, cmd: VerifyPass, now: DateTime<Utc>) -> Result<Verified, LifecycleError> {
        guard(&cmd)?;
        let pass_id = self.signer.open(&cmd.qr_data)?;
        let pass = self.store.pass(pass_id).await?.ok_or_else(|| missing("Pass"))?;

        let screen = pass.screen(now);
        if let Some(error) = screen.error() {
            let pass = match screen {
                Screen::JustExpired => self.persist_expiry(pass).await?,
                _ => pass,
            };
            warn!(pass_id = %pass.id, actor = %cmd.actor.user_id, %error, "verification rejected");
            return Err(LifecycleError::PassState {
                error,
                pass: Box::new(pass),
            });
        }

        let visitor = self
            .store
            .visitor(pass.visitor_id)
            .await?
            .ok_or_else(|| missing("Visitor"))?;
        if let Err(error) = ensure_visitor_approved(&visitor) {
            return Err(LifecycleError::PassState {
                error,
                pass: Box::new(pass),
            });
        }
        Ok(Verified { pass, visitor })
    }

    /// Admit the pass holder. Any earlier check-in inside the window, even one
    /// followed by a check-out, makes this `AlreadyCheckedIn` and changes nothing.
    pub async fn check_in(&self, cmd: CheckIn, now: DateTime<Utc>) -> Result<Scan, LifecycleError> {
        guard(&cmd)?;
        let pass_id = self.signer.open(&cmd.qr_data)?;
        let mut tx = self.begin_for_pass(pass_id).await?;

        let mut pass = tx.pass(pass_id).await?.ok_or_else(|| missing("Pass"))?;
        let screen = pass.screen(now);
        if let Some(error) = screen.error() {
            if screen == Screen::JustExpired && pass.expire() {
                tx.update_pass(&pass).await?;
                tx.commit().await?;
                info!(pass_id = %pass.id, "pass expired");
            }
            warn!(pass_id = %pass_id, actor = %cmd.actor.user_id, %error, "check-in rejected");
            return Err(error.into());
        }

        let mut visitor = tx.visitor().await?.ok_or_else(|| missing("Visitor"))?;
        let recent = tx.latest_check_in_since(self.window.since(now)).await?;
        let log = admit(&mut visitor, &pass, recent.as_ref(), cmd.actor.user_id, cmd.entry, now)
            .inspect_err(|error| {
                warn!(visitor_id = %visitor.id, pass_id = %pass_id, actor = %cmd.actor.user_id, %error, "check-in rejected");
            })?;

        tx.append_check_log(&log).await?;
        tx.update_visitor(&visitor).await?;
        tx.commit().await?;

        info!(
            visitor_id = %visitor.id,
            pass_id = %pass_id,
            check_log_id = %log.id,
            actor = %cmd.actor.user_id,
            "visitor checked in"
        );
        dispatch(
            &self.notifier,
            Notification::CheckedIn {
                visitor_id: visitor.id,
                host_id: visitor.host_id,
            },
        );
        Ok(Scan { log, visitor })
    }

    /// Let the pass holder out. The pass is not re-screened.
    pub async fn check_out(&self, cmd: CheckOut, now: DateTime<Utc>) -> Result<Scan, LifecycleError> {
        guard(&cmd)?;
        let pass_id = self.signer.open(&cmd.qr_data)?;
        let mut tx = self.begin_for_pass(pass_id).await?;

        let pass = tx.pass(pass_id).await?.ok_or_else(|| missing("Pass"))?;
        let mut visitor = tx.visitor().await?.ok_or_else(|| missing("Visitor"))?;
        let log = release(&mut visitor, &pass, cmd.actor.user_id, cmd.entry, now).inspect_err(|error| {
            warn!(visitor_id = %visitor.id, pass_id = %pass_id, actor = %cmd.actor.user_id, %error, "check-out rejected");
        })?;

        tx.append_check_log(&log).await?;
        tx.update_visitor(&visitor).await?;
        tx.commit().await?;

        info!(
            visitor_id = %visitor.id,
            pass_id = %pass_id,
            check_log_id = %log.id,
            actor = %cmd.actor.user_id,
            "visitor checked out"
        );
        dispatch(
            &self.notifier,
            Notification::CheckedOut {
                visitor_id: visitor.id,
                host_id: visitor.host_id,
            },
        );
        Ok(Scan { log, visitor })
    }

    /// Revoke an `active` or `expired` pass. Revoking clears the one-pass rule.
    pub async fn revoke(&self, cmd: RevokePass) -> Result<Pass, LifecycleError> {
        guard(&cmd)?;
        let mut tx = self.begin_for_pass(cmd.pass_id).await?;
        let mut pass = tx.pass(cmd.pass_id).await?.ok_or_else(|| missing("Pass"))?;
        pass.revoke()?;
        tx.update_pass(&pass).await?;
        tx.commit().await?;

        info!(pass_id = %pass.id, visitor_id = %pass.visitor_id, actor = %cmd.actor.user_id, "pass revoked");
        Ok(pass)
    }

    /// Approve or reject a visitor. Hosts may decide on their own visitors.
    pub async fn decide(&self, cmd: DecideVisitor, now: DateTime<Utc>) -> Result<Visitor, LifecycleError> {
        let loaded = self
            .store
            .visitor(cmd.visitor_id)
            .await?
            .ok_or_else(|| missing("Visitor"))?;
        authorize(&cmd.actor, cmd.operation(), &ResourceScope::hosted_by(loaded.host_id))?;

        let mut tx = self.store.begin(cmd.visitor_id).await?;
        let mut visitor = tx.visitor().await?.ok_or_else(|| missing("Visitor"))?;
        visitor.decide(cmd.decision, now)?;
        tx.update_visitor(&visitor).await?;
        tx.commit().await?;

        info!(visitor_id = %visitor.id, status = %visitor.status, actor = %cmd.actor.user_id, "visitor decided");
        dispatch(
            &self.notifier,
            Notification::VisitorDecided {
                visitor_id: visitor.id,
                status: visitor.status,
            },
        );
        Ok(visitor)
    }

    /// Open the owning visitor's transaction for a pass read outside it.
    async fn begin_for_pass(&self, pass_id: PassId) -> Result<Box<dyn StoreTx>, LifecycleError> {
        let visitor_id = self
            .store
            .pass(pass_id)
            .await?
            .ok_or_else(|| missing("Pass"))?
            .visitor_id;
        Ok(self.store.begin(visitor_id).await?)
    }

    /// Persist the lazy expiry flip and return the pass as stored.
    async fn persist_expiry(&self, pass: Pass) -> Result<Pass, LifecycleError> {
        let mut tx = self.store.begin(pass.visitor_id).await?;
        let Some(mut current) = tx.pass(pass.id).await? else {
            return Ok(pass);
        };
        if current.expire() {
            tx.update_pass(&current).await?;
            tx.commit().await?;
            info!(pass_id = %current.id, "pass expired");
        }
        Ok(current)
    }
}

async fn unused_number(tx: &mut dyn StoreTx, now: DateTime<Utc>) -> Result<PassNumber, LifecycleError> {
    for _ in 0..NUMBER_ATTEMPTS {
        let candidate = PassNumber::generate(now, &mut rand::rng());
        if !tx.pass_number_taken(candidate.as_str()).await? {
            return Ok(candidate);
        }
    }
    Err(DomainError::conflict("Could not allocate a unique pass number").into())
}
