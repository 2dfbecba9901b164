//! `gatepass-auth`: pure authentication/authorization boundary.
//!
//! This crate is intentionally decoupled from HTTP and storage. It consumes an
//! already-issued token, resolves it into a [`Principal`], and answers
//! "may this principal run this operation on this resource?" from a single
//! declarative policy table.

pub mod authorize;
pub mod claims;
pub mod policy;
pub mod principal;
pub mod roles;

pub use authorize::{AuthzError, OperationAuthorization, ResourceScope, authorize};
pub use claims::{Hs256JwtValidator, JwtClaims, JwtValidator, TokenValidationError, validate_claims};
pub use policy::{Operation, Ownership, Rule};
pub use principal::Principal;
pub use roles::Role;
