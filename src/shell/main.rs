use std::sync::Arc;

use tracing_subscriber::{EnvFilter, fmt};

use congregation_events::shared::core::primitives::SystemClock;
use congregation_events::shell::config::AppConfig;
use congregation_events::shell::http::router;
use congregation_events::shell::state::{Adapters, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let config = AppConfig::from_env()?;
    let adapters = Adapters::default();
    let state = AppState::wire(&config, &adapters, Arc::new(SystemClock));
    let shutdown = state.shutdown.clone();

    let app = router(state);

    tracing::info!(addr = %config.bind_addr, "HTTP endpoint listening, GraphQL at /gql");
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
            shutdown.cancel();
        })
        .await?;
    Ok(())
}
