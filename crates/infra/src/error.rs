use thiserror::Error;

use gatepass_auth::AuthzError;
use gatepass_core::DomainError;
use gatepass_passes::Pass;

use crate::external::CollaboratorError;
use crate::store::StoreError;

/// Failure of an engine or directory operation.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// A pass failed screening. Carries the pass as it stands after any lazy
    /// expiry was persisted.
    #[error("{error}")]
    PassState { error: DomainError, pass: Box<Pass> },

    #[error(transparent)]
    Store(StoreError),

    /// A collaborator the operation had to wait on failed.
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
}

impl LifecycleError {
    /// The business failure, if this is one.
    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            LifecycleError::Domain(e) | LifecycleError::PassState { error: e, .. } => Some(e),
            LifecycleError::Store(_) | LifecycleError::Collaborator(_) => None,
        }
    }

    pub fn pass(&self) -> Option<&Pass> {
        match self {
            LifecycleError::PassState { pass, .. } => Some(pass),
            _ => None,
        }
    }
}

impl From<StoreError> for LifecycleError {
    fn from(value: StoreError) -> Self {
        match value {
            // Lost a uniqueness race the engine's own checks did not see.
            StoreError::Duplicate(_) => {
                LifecycleError::Domain(DomainError::conflict("Resource already exists"))
            }
            other => LifecycleError::Store(other),
        }
    }
}

impl From<AuthzError> for LifecycleError {
    fn from(value: AuthzError) -> Self {
        LifecycleError::Domain(value.into())
    }
}
