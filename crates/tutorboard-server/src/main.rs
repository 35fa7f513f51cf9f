use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tutorboard_server::{AppState, Config, app};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tutorboard_server=info,tower_http=info".into()),
        )
        .init();

    let config = Config::parse();
    let state = Arc::new(AppState::new(config.channel_capacity));

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    let addr = listener.local_addr()?;
    info!("Tutorboard relay server listening on {}", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    axum::serve(listener, app(state)).await?;
    Ok(())
}
