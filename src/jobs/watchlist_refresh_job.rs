use crate::errors::AppError;
use crate::models::ProvenanceStatus;
use crate::services::job_scheduler_service::{JobContext, JobResult};
use tracing::{info, warn};

/// Main entry point for the watchlist refresh background job.
///
/// This job:
/// 1. Reads the watchlist from the configured store
/// 2. Drops each ticker's cached market data
/// 3. Rebuilds every snapshot so the next dashboard request is served from cache
///
/// Designed to run every few minutes during trading hours.
pub async fn refresh_watchlist_snapshots(ctx: JobContext) -> Result<JobResult, AppError> {
    info!("Starting watchlist refresh job");

    let entries = ctx.watchlist.list().await?;

    if entries.is_empty() {
        info!("No watchlist tickers to refresh");
        return Ok(JobResult {
            items_processed: 0,
            items_failed: 0,
        });
    }

    for entry in &entries {
        ctx.dashboard.refresh(&entry.ticker);
    }

    let response = ctx.dashboard.watchlist_snapshots(&entries).await;

    let mut processed = 0;
    let mut failed = 0;
    for snapshot in &response.snapshots {
        if snapshot.provenance.prices.status == ProvenanceStatus::Available {
            processed += 1;
        } else {
            warn!(
                "No prices for {}: {}",
                snapshot.ticker,
                snapshot.provenance.prices.detail.as_deref().unwrap_or("unknown")
            );
            failed += 1;
        }
    }

    info!(
        "Watchlist refresh complete: {} refreshed, {} without prices",
        processed, failed
    );

    Ok(JobResult {
        items_processed: processed,
        items_failed: failed,
    })
}
