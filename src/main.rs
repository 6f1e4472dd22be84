use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};

use taiwatch::app;
use taiwatch::config::AppConfig;
use taiwatch::logging::{init_logging, LoggingConfig};
use taiwatch::services::job_scheduler_service::JobSchedulerService;
use taiwatch::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging FIRST
    init_logging(LoggingConfig::from_env()).map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;

    let config = AppConfig::from_env().context("invalid configuration")?;
    info!(
        "📊 Providers: quotes={:?} flows={:?} shares={:?}",
        config.quote_providers, config.flow_providers, config.share_providers
    );

    let state = AppState::build(config.clone()).await?;

    // Keep the scheduler alive for the lifetime of the server
    let mut scheduler = if config.job_scheduler_enabled {
        let mut scheduler = JobSchedulerService::new(
            state.job_context(),
            config.watchlist_refresh_cron.clone(),
            config.job_scheduler_test_mode,
        )
        .await?;
        scheduler.start().await?;
        Some(scheduler)
    } else {
        warn!("Job scheduler disabled");
        None
    };

    let app = app::create_app(state);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!("🚀 Taiwatch backend running at http://{}/", config.bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(scheduler) = scheduler.as_mut() {
        scheduler.stop().await?;
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
