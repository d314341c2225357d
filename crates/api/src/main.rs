use anyhow::Context;

use borrowdesk_api::config::ApiConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    borrowdesk_observability::init();

    let config = ApiConfig::from_env()?;
    let app = borrowdesk_api::app::build_app(config.jwt_secret).await;

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
