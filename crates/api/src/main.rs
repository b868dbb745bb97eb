use anyhow::Context;

use loomledger_infra::config::LedgerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    loomledger_observability::init();

    let config = LedgerConfig::from_env().context("invalid configuration")?;
    let listen_addr = config.listen_addr.clone();

    let app = loomledger_api::app::build_app(config).await?;

    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("failed to bind {listen_addr}"))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app).await?;
    Ok(())
}
