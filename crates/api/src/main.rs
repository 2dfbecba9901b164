use gatepass_infra::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Installed before config so its warnings are visible.
    gatepass_observability::init(&std::env::var("LOG_FORMAT").unwrap_or_default());

    let config = AppConfig::from_env()?;
    tracing::info!(?config, "starting gatepass-api");

    let app = gatepass_api::app::build_app(&config).await?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
