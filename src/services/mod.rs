pub mod dashboard_service;
pub mod indicators;
pub mod job_scheduler_service;
pub mod market_data_service;
pub mod metrics;
pub mod net_flow;
pub mod rate_limiter;
pub mod screening_service;
pub mod ttl_cache;
pub mod watchlist_service;
