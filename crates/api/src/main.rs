use anyhow::Context;

use orgwarden_api::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("invalid configuration")?;
    orgwarden_observability::init(config.log_format);

    let bind_addr = config.bind_addr;
    let app = orgwarden_api::app::build_app(config)
        .await
        .context("failed to initialise services")?;

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
