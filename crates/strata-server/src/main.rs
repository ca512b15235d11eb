use tracing::info;
use tracing_subscriber::EnvFilter;

mod auth;
mod config;
mod error;
mod routes;
mod state;

use config::ServerConfig;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("strata=info")),
        )
        .init();

    let config = ServerConfig::load()?;
    let addr = format!(
        "{}:{}",
        config.server.listen_address, config.server.http_port
    );

    let state = AppState::new(config);
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "strata server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
