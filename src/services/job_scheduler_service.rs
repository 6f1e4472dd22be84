use crate::errors::AppError;
use crate::jobs::{cache_cleanup_job, watchlist_refresh_job};
use crate::services::dashboard_service::DashboardService;
use crate::services::market_data_service::MarketDataService;
use crate::services::watchlist_service::WatchlistService;
use tokio_cron_scheduler::{JobScheduler, Job};
use tracing::{info, error};
use chrono::Utc;
use std::sync::Arc;

/// Hourly cache sweep (format: sec min hour day month weekday)
const CACHE_CLEANUP_SCHEDULE: &str = "0 5 * * * *";

// Context passed to job functions
#[derive(Clone)]
pub struct JobContext {
    pub watchlist: Arc<WatchlistService>,
    pub dashboard: Arc<DashboardService>,
    pub market: Arc<MarketDataService>,
}

#[derive(Debug)]
pub struct JobResult {
    pub items_processed: i32,
    pub items_failed: i32,
}

#[derive(Debug, PartialEq)]
struct JobSchedule {
    cron: String,
    description: &'static str,
}

/// Refresh and cleanup crons (format: sec min hour day month weekday).
/// The default refresh cron is in UTC, 09:00-13:59 Taipei.
fn job_schedules(refresh_cron: &str, test_mode: bool) -> [JobSchedule; 2] {
    if test_mode {
        [
            JobSchedule { cron: "0 */1 * * * *".to_string(), description: "Every minute (TEST MODE)" },
            JobSchedule { cron: "0 */3 * * * *".to_string(), description: "Every 3 minutes (TEST MODE)" },
        ]
    } else {
        [
            JobSchedule { cron: refresh_cron.to_string(), description: "During trading hours" },
            JobSchedule { cron: CACHE_CLEANUP_SCHEDULE.to_string(), description: "Every hour at :05" },
        ]
    }
}

pub struct JobSchedulerService {
    scheduler: JobScheduler,
    context: JobContext,
    refresh_schedule: String,
    test_mode: bool,
}

impl JobSchedulerService {
    /// `test_mode` swaps both crons for minute-level ones.
    pub async fn new(
        context: JobContext,
        refresh_schedule: impl Into<String>,
        test_mode: bool,
    ) -> Result<Self, AppError> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create scheduler: {}", e)))?;

        Ok(Self {
            scheduler,
            context,
            refresh_schedule: refresh_schedule.into(),
            test_mode,
        })
    }

    /// Start all scheduled jobs
    pub async fn start(&mut self) -> Result<(), AppError> {
        info!("🚀 Starting job scheduler...");

        if self.test_mode {
            info!("⚠️  JOB SCHEDULER IN TEST MODE - Jobs will run every minute!");
        }

        let [refresh, cleanup] = job_schedules(&self.refresh_schedule, self.test_mode);

        self.schedule_job(
            &refresh.cron,
            "refresh_watchlist_snapshots",
            refresh.description,
            watchlist_refresh_job::refresh_watchlist_snapshots
        ).await?;

        self.schedule_job(
            &cleanup.cron,
            "cleanup_caches",
            cleanup.description,
            cache_cleanup_job::cleanup_expired_caches
        ).await?;

        // Start the scheduler
        self.scheduler.start()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to start scheduler: {}", e)))?;

        info!("✅ Job scheduler started successfully with 2 jobs");
        Ok(())
    }

    /// Stop the scheduler gracefully
    pub async fn stop(&mut self) -> Result<(), AppError> {
        info!("🛑 Stopping job scheduler...");
        self.scheduler.shutdown()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to stop scheduler: {}", e)))?;
        info!("✅ Job scheduler stopped");
        Ok(())
    }

    /// Helper to schedule a job with tracking
    async fn schedule_job<F, Fut>(
        &mut self,
        schedule: &str,
        job_name: &'static str,
        description: &str,
        job_fn: F,
    ) -> Result<(), AppError>
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<JobResult, AppError>> + Send + 'static,
    {
        let context = self.context.clone();
        let job_fn = Arc::new(job_fn);

        let job = Job::new_async(schedule, move |_uuid, _l| {
            let context = context.clone();
            let job_fn = job_fn.clone();
            Box::pin(async move {
                execute_job_with_tracking(job_name, context, job_fn).await;
            })
        })
        .map_err(|e| AppError::Config(format!("Failed to create job {} [cron: {}]: {}", job_name, schedule, e)))?;

        self.scheduler.add(job)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to add job {}: {}", job_name, e)))?;

        info!("📅 Scheduled: {} - {} [cron: {}]", job_name, description, schedule);
        Ok(())
    }
}

// Job tracking wrapper
async fn execute_job_with_tracking<F, Fut>(
    job_name: &str,
    context: JobContext,
    job_fn: Arc<F>,
) where
    F: Fn(JobContext) -> Fut,
    Fut: std::future::Future<Output = Result<JobResult, AppError>>,
{
    info!("🏃 Starting job: {}", job_name);
    let started_at = Utc::now();

    let result = job_fn(context).await;

    let duration_ms = (Utc::now() - started_at).num_milliseconds();

    match result {
        Ok(job_result) => {
            info!(
                "✅ Job completed: {} (processed: {}, failed: {}, duration: {}ms)",
                job_name, job_result.items_processed, job_result.items_failed, duration_ms
            );
        }
        Err(e) => {
            error!("❌ Job failed: {} - {} (duration: {}ms)", job_name, e, duration_ms);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_refresh_cron_is_used_outside_test_mode() {
        let [refresh, cleanup] = job_schedules("0 */5 1-5 * * Mon-Fri", false);
        assert_eq!(refresh.cron, "0 */5 1-5 * * Mon-Fri");
        assert_eq!(cleanup.cron, CACHE_CLEANUP_SCHEDULE);
    }

    #[test]
    fn test_mode_runs_every_few_minutes() {
        let [refresh, cleanup] = job_schedules("0 */5 1-5 * * Mon-Fri", true);
        assert_eq!(refresh.cron, "0 */1 * * * *");
        assert_eq!(cleanup.cron, "0 */3 * * * *");
    }
}
