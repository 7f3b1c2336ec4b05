use std::sync::Arc;

use anyhow::Context;

use relay_api::app::{build_app, AppServices};
use relay_infra::RelayConfig;
use relay_observability::LogSettings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = RelayConfig::from_env().context("load configuration")?;

    relay_observability::init(&LogSettings {
        level: config.logging.level.clone(),
        json: config.logging.json,
    });
    if config.uses_dev_secret() {
        tracing::warn!("JWT_SECRET_KEY not set; using insecure dev default");
    }

    let services = Arc::new(AppServices::from_config(&config).await?);
    let app = build_app(services);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
