//! Passes domain module.
//!
//! Pass issuance primitives, the signed QR payload, the check log audit record
//! and the pure decisions behind scanning. Deterministic apart from the random
//! sources handed in by callers; no IO.

pub mod check_log;
pub mod decision;
pub mod number;
pub mod pass;
pub mod payload;

pub use check_log::{CheckEntry, CheckLog, CheckMethod, CheckType, CheckWindow};
pub use decision::{admit, ensure_visitor_approved, release};
pub use number::PassNumber;
pub use pass::{AccessLevel, Pass, PassDraft, PassStatus, Screen};
pub use payload::{QrPayload, QrSigner};
