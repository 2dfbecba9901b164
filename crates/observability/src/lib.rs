//! Tracing and logging setup shared by the binaries.

pub use crate::tracing::LogFormat;

/// Initialize process-wide logging in the given format (`json` or `pretty`).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init(format: &str) {
    tracing::init(LogFormat::parse(format));
}

/// Tracing configuration (filters, layers).
pub mod tracing;
