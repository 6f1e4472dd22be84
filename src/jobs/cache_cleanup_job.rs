use crate::errors::AppError;
use crate::services::job_scheduler_service::{JobContext, JobResult};
use tracing::info;

/// Drop expired entries so idle tickers don't keep memory alive.
pub async fn cleanup_expired_caches(ctx: JobContext) -> Result<JobResult, AppError> {
    let before = ctx.market.cached_entries();
    ctx.market.cleanup_expired();
    let after = ctx.market.cached_entries();

    info!("Cache cleanup removed {} expired entries ({} remain)", before.saturating_sub(after), after);

    Ok(JobResult {
        items_processed: before.saturating_sub(after) as i32,
        items_failed: 0,
    })
}
