//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// state-machine violations, conflicts, authorization). Infrastructure concerns
/// belong elsewhere.
///
/// The `Display` output of each variant is the message surfaced to API clients,
/// so the wording is part of the contract (e.g. `"Pass is revoked"`).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A request value failed validation (e.g. unknown enum value, missing field).
    #[error("{0}")]
    Validation(String),

    /// Scanned QR data could not be decoded or authenticated.
    #[error("{0}")]
    InvalidPayload(String),

    /// A business rule or state-machine transition was violated.
    ///
    /// The message carries the current state (e.g. `"Pass is expired"`).
    #[error("{0}")]
    InvalidState(String),

    /// A requested record does not exist. Carries the entity name.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// A check-in was attempted while the latest log in the window is a check-in.
    #[error("Visitor is already checked in")]
    AlreadyCheckedIn,

    /// A uniqueness or concurrency conflict.
    #[error("{0}")]
    Conflict(String),

    /// The actor's role does not grant the operation.
    #[error("Insufficient permissions")]
    Unauthorized,

    /// The actor is authenticated and holds a role, but not over this resource.
    #[error("Access denied")]
    Forbidden,
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_payload(msg: impl Into<String>) -> Self {
        Self::InvalidPayload(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(entity: &'static str) -> Self {
        Self::NotFound(entity)
    }

    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::Validation(_) => "validation_error",
            DomainError::InvalidPayload(_) => "invalid_payload",
            DomainError::InvalidState(_) => "invalid_state",
            DomainError::NotFound(_) => "not_found",
            DomainError::AlreadyCheckedIn => "already_checked_in",
            DomainError::Conflict(_) => "conflict",
            DomainError::Unauthorized => "unauthorized",
            DomainError::Forbidden => "forbidden",
        }
    }

    /// Whether this error belongs to the conflict family (409).
    pub fn is_conflict(&self) -> bool {
        matches!(self, DomainError::AlreadyCheckedIn | DomainError::Conflict(_))
    }
}
