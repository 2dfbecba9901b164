//! Visitor photo uploads.

use gatepass_core::{DomainError, DomainResult};

/// An uploaded image as received, before it is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl PhotoUpload {
    pub const MAX_BYTES: usize = 5 * 1024 * 1024;

    pub fn validate(&self) -> DomainResult<()> {
        if self.data.is_empty() {
            return Err(DomainError::validation("No file uploaded"));
        }
        if !self
            .content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("image/"))
        {
            return Err(DomainError::validation("Only image files are allowed"));
        }
        if self.data.len() > Self::MAX_BYTES {
            return Err(DomainError::validation("File too large"));
        }
        Ok(())
    }

    /// Lowercased extension of the original name, if it is a plain alphanumeric one.
    pub fn extension(&self) -> Option<String> {
        let (_, ext) = self.file_name.rsplit_once('.')?;
        let ok = !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric());
        ok.then(|| ext.to_ascii_lowercase())
    }
}
