//! AuthDemo binary entry point

use authdemo::{AppState, config, metrics};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application entry point
///
/// # Setup
/// 1. Load configuration from file and environment
/// 2. Initialize tracing/logging from `logging.*`
/// 3. Initialize metrics
/// 4. Initialize AppState
/// 5. Build Axum router
/// 6. Start background cleanup
/// 7. Start HTTP server
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration
    let mut config = config::AppConfig::load()?;

    // 2. Initialize tracing/logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.default_filter().into());

    if config.logging.is_json() {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }

    tracing::info!("Starting AuthDemo...");

    config.prepare()?;
    tracing::info!(
        domain = %config.server.domain,
        protocol = %config.server.protocol,
        github_configured = config.auth.github.is_configured(),
        "Configuration loaded"
    );

    // 3. Initialize metrics
    metrics::init_metrics();

    // 4. Initialize application state
    let state = AppState::new(config.clone()).await?;

    // 5. Build Axum router
    let app = authdemo::build_router(state.clone());

    // 6. Start background tasks
    spawn_cleanup_task(state);

    // 7. Start HTTP server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Demo page: {}{}", config.server.base_url(), authdemo::ui::DEMO_PATH);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Spawn background purge of expired sessions and OAuth state
fn spawn_cleanup_task(state: AppState) {
    let configured_interval_secs = state.config.auth.cleanup_interval_seconds;
    if configured_interval_secs == 0 {
        tracing::info!("auth.cleanup_interval_seconds=0; expired session cleanup disabled");
        return;
    }

    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(configured_interval_secs));

        loop {
            interval.tick().await;

            match state.auth.purge_expired().await {
                Ok((sessions, states)) => {
                    metrics::SESSIONS_PURGED_TOTAL.inc_by(sessions);
                    tracing::debug!(sessions, states, "Expired auth records purged");
                }
                Err(error) => tracing::error!(%error, "Expired auth record cleanup failed"),
            }
        }
    });

    tracing::info!("Cleanup task spawned");
}
