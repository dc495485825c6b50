use postbox_api::{ApiContext, Config};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .json()
        .init();

    info!("starting postbox API service");

    let config = Config::from_env()?;
    let bind_addr = config.api_bind_addr.clone();

    let ctx = ApiContext::new(config).await?;
    let app = postbox_api::app(ctx);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
