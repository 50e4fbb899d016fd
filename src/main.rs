// src/main.rs
use anyhow::Result as AnyhowResult;
use cross_staking::api::{self, AppState};
use cross_staking::{config, devnet, utils};
use dotenvy::dotenv;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> AnyhowResult<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = config::from_env()?;
    let devnet = devnet::bootstrap(&config.genesis, utils::unix_now())?;
    let state = Arc::new(AppState::new(devnet, utils::unix_now));
    let app = api::router(state);

    let listener = TcpListener::bind(config.bind_addr).await?;
    info!(addr = %config.bind_addr, "dev node listening");
    axum::serve(listener, app).await?;

    Ok(())
}
