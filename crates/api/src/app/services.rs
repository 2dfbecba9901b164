//! Service wiring: store selection and the engines built on top of it.

use std::sync::Arc;

use gatepass_infra::{
    AppConfig, Directory, EntityStore, InMemoryStore, Lifecycle, PostgresStore, Queries,
    external::{DiskPhotoStore, LogNotifier, Notifier, UrlBadgeRenderer},
};
use gatepass_passes::{CheckWindow, QrSigner};

pub struct AppServices {
    pub lifecycle: Lifecycle,
    pub directory: Directory,
    pub queries: Queries,
}

impl AppServices {
    pub fn new(store: Arc<dyn EntityStore>, config: &AppConfig) -> Self {
        let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
        let signer = QrSigner::new(config.qr_signing_secret.as_bytes(), config.qr_signature_required);
        let lifecycle = Lifecycle::new(store.clone(), signer)
            .with_window(CheckWindow::hours(config.check_in_window_hours))
            .with_notifier(notifier.clone())
            .with_badges(Arc::new(UrlBadgeRenderer::new(config.pdf_base_url.clone())));

        Self {
            lifecycle,
            directory: Directory::new(store.clone(), notifier)
                .with_photos(Arc::new(DiskPhotoStore::new(&config.upload_dir))),
            queries: Queries::new(store),
        }
    }
}

/// Postgres when `DATABASE_URL` is set, otherwise a process-local store.
pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let store: Arc<dyn EntityStore> = match &config.database_url {
        Some(url) => {
            let store = PostgresStore::connect(url, config.database_max_connections).await?;
            store.ensure_schema().await?;
            tracing::info!("using postgres store");
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory store");
            Arc::new(InMemoryStore::new())
        }
    };
    Ok(AppServices::new(store, config))
}
