use anyhow::Context;

use stockledger_infra::StockConfig;

const ADDR_VAR: &str = "STOCKLEDGER_ADDR";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    stockledger_observability::init();

    let config = StockConfig::from_env().context("invalid stock configuration")?;
    let addr = std::env::var(ADDR_VAR).unwrap_or_else(|_| "0.0.0.0:8080".to_string());

    let app = stockledger_api::app::build_app(config);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
