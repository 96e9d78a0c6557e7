mod handlers;
mod metrics;
mod routes;

use anyhow::Result;
use pyjudge_common::redis::RedisStore;
use pyjudge_common::Config;
use pyjudge_engine::{Coordinator, JudgeSettings};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Coordinator,
    pub trust_client_id_header: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("PyJudge API booting...");

    let config = Config::from_env()?;
    info!(
        python_bin = %config.python_bin,
        timeout_secs = config.run_tests_timeout_secs,
        max_parallel_tests = config.max_parallel_tests,
        "Configuration loaded"
    );

    let store = RedisStore::connect(&config.redis_url).await?;
    info!("Connected to Redis: {}", config.redis_url);

    let coordinator = Coordinator::new(JudgeSettings::from(&config), Arc::new(store))
        .with_completion_hook(Arc::new(metrics::observe_job));
    if config.trust_client_id_header {
        info!("Admission keyed on the x-client-id header");
    }
    let state = Arc::new(AppState {
        coordinator,
        trust_client_id_header: config.trust_client_id_header,
    });

    let app = routes::app(state);

    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr).await?;

    info!("HTTP server listening on {}", addr);
    info!("Ready to accept submissions");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
