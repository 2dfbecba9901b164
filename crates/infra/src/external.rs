//! Outbound collaborators: notifications, badge rendering and photo storage.
//!
//! Notifications and badges run after the owning transaction has committed and
//! are never awaited by the request that triggered them. Failures are logged and
//! dropped. Photo storage is awaited, since the caller needs the URL back.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use gatepass_core::{PassId, UserId, VisitorId};
use gatepass_passes::Pass;
use gatepass_visitors::{PhotoUpload, VisitorStatus};

use crate::store::EntityStore;

#[derive(Debug, Error)]
#[error("{collaborator} failed: {message}")]
pub struct CollaboratorError {
    pub collaborator: &'static str,
    pub message: String,
}

/// Something worth telling a host or visitor about.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    VisitorRegistered {
        visitor_id: VisitorId,
        host_id: UserId,
    },
    VisitorDecided {
        visitor_id: VisitorId,
        status: VisitorStatus,
    },
    PassIssued {
        visitor_id: VisitorId,
        pass_id: PassId,
        pass_number: String,
    },
    CheckedIn {
        visitor_id: VisitorId,
        host_id: UserId,
    },
    CheckedOut {
        visitor_id: VisitorId,
        host_id: UserId,
    },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::VisitorRegistered { .. } => "visitor_registered",
            Notification::VisitorDecided { .. } => "visitor_decided",
            Notification::PassIssued { .. } => "pass_issued",
            Notification::CheckedIn { .. } => "checked_in",
            Notification::CheckedOut { .. } => "checked_out",
        }
    }
}

/// Email/SMS sender.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), CollaboratorError>;
}

/// Writes notifications to the log instead of delivering them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), CollaboratorError> {
        tracing::info!(kind = notification.kind(), ?notification, "notification");
        Ok(())
    }
}

/// Renders a printable badge for a pass and returns where it can be fetched.
#[async_trait]
pub trait BadgeRenderer: Send + Sync {
    async fn render(&self, pass: &Pass) -> Result<String, CollaboratorError>;
}

/// Resolves badges to `{base_url}/{pass_number}.pdf`; rendering itself lives elsewhere.
#[derive(Debug, Clone)]
pub struct UrlBadgeRenderer {
    base_url: String,
}

impl UrlBadgeRenderer {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

impl Default for UrlBadgeRenderer {
    fn default() -> Self {
        Self::new("/pdfs")
    }
}

#[async_trait]
impl BadgeRenderer for UrlBadgeRenderer {
    async fn render(&self, pass: &Pass) -> Result<String, CollaboratorError> {
        Ok(format!("{}/{}.pdf", self.base_url, pass.pass_number))
    }
}

/// Keeps visitor photos and returns the URL they are served under.
#[async_trait]
pub trait PhotoStore: Send + Sync {
    async fn save(&self, visitor_id: VisitorId, upload: &PhotoUpload) -> Result<String, CollaboratorError>;
}

/// Writes photos under a local directory, served as `{url_prefix}/{file}`.
#[derive(Debug, Clone)]
pub struct DiskPhotoStore {
    dir: PathBuf,
    url_prefix: String,
}

impl DiskPhotoStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            url_prefix: "/uploads".to_string(),
        }
    }

    fn file_name(visitor_id: VisitorId, upload: &PhotoUpload) -> String {
        let stamp = chrono::Utc::now().timestamp_millis();
        match upload.extension() {
            Some(ext) => format!("photo-{visitor_id}-{stamp}.{ext}"),
            None => format!("photo-{visitor_id}-{stamp}"),
        }
    }
}

#[async_trait]
impl PhotoStore for DiskPhotoStore {
    async fn save(&self, visitor_id: VisitorId, upload: &PhotoUpload) -> Result<String, CollaboratorError> {
        let failed = |e: std::io::Error| CollaboratorError {
            collaborator: "photo store",
            message: e.to_string(),
        };
        tokio::fs::create_dir_all(&self.dir).await.map_err(failed)?;
        let name = Self::file_name(visitor_id, upload);
        tokio::fs::write(self.dir.join(&name), &upload.data)
            .await
            .map_err(failed)?;
        Ok(format!("{}/{name}", self.url_prefix))
    }
}

/// Fire-and-forget notification.
pub fn dispatch(notifier: &Arc<dyn Notifier>, notification: Notification) {
    let notifier = Arc::clone(notifier);
    tokio::spawn(async move {
        if let Err(e) = notifier.notify(&notification).await {
            tracing::warn!(kind = notification.kind(), error = %e, "notification not delivered");
        }
    });
}

/// Fire-and-forget badge render; the URL is attached to the pass when it lands.
pub fn render_badge(renderer: &Arc<dyn BadgeRenderer>, store: &Arc<dyn EntityStore>, pass: Pass) {
    let renderer = Arc::clone(renderer);
    let store = Arc::clone(store);
    tokio::spawn(async move {
        let url = match renderer.render(&pass).await {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(pass_id = %pass.id, error = %e, "badge render failed");
                return;
            }
        };
        if let Err(e) = store.set_pass_pdf_url(pass.id, &url).await {
            tracing::warn!(pass_id = %pass.id, error = %e, "badge url not stored");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn badge_url_ignores_trailing_slash() {
        let r = UrlBadgeRenderer::new("https://cdn.example.com/badges/");
        assert_eq!(r.base_url, "https://cdn.example.com/badges");
    }

    #[tokio::test]
    async fn disk_photo_store_writes_the_bytes() {
        let dir = std::env::temp_dir().join(format!("gatepass-photos-{}", VisitorId::new()));
        let store = DiskPhotoStore::new(&dir);
        let visitor_id = VisitorId::new();
        let upload = PhotoUpload {
            file_name: "face.PNG".to_string(),
            content_type: Some("image/png".to_string()),
            data: vec![137, 80, 78, 71],
        };

        let url = store.save(visitor_id, &upload).await.unwrap();
        assert!(url.starts_with(&format!("/uploads/photo-{visitor_id}-")));
        assert!(url.ends_with(".png"));

        let name = url.rsplit('/').next().unwrap();
        assert_eq!(tokio::fs::read(dir.join(name)).await.unwrap(), upload.data);
        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[test]
    fn notification_kinds_are_stable() {
        let n = Notification::VisitorRegistered {
            visitor_id: VisitorId::new(),
            host_id: UserId::new(),
        };
        assert_eq!(n.kind(), "visitor_registered");
    }
}
