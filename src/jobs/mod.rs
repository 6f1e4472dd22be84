//! Background Jobs Module
//!
//! Jobs scheduled by the job scheduler service. They run independently of
//! user requests and only touch shared caches and the watchlist store.
//!
//! # Available Jobs
//!
//! - `watchlist_refresh_job` - Re-fetches market data for every watchlist ticker during trading hours
//! - `cache_cleanup_job` - Sweeps expired cache entries
//!
//! Each job is idempotent and logs its own progress.

pub mod cache_cleanup_job;
pub mod watchlist_refresh_job;
