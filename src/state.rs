use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::config::{AppConfig, WatchlistBackend};
use crate::external::google_sheets::{GoogleSheetsClient, ServiceAccountKey};
use crate::external::multi_provider::MultiProvider;
use crate::models::CategoryMap;
use crate::services::dashboard_service::DashboardService;
use crate::services::job_scheduler_service::JobContext;
use crate::services::market_data_service::{CacheTtls, MarketDataService};
use crate::services::screening_service::ScreeningService;
use crate::services::watchlist_service::WatchlistService;
use crate::store::{
    CsvWatchlistStore, MemoryWatchlistStore, PostgresWatchlistStore, SheetsWatchlistStore, WatchlistStore,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub market: Arc<MarketDataService>,
    pub dashboard: Arc<DashboardService>,
    pub watchlist: Arc<WatchlistService>,
    pub screening: Arc<ScreeningService>,
}

impl AppState {
    /// Wire services around an already-built provider chain and store.
    pub fn from_parts(
        config: AppConfig,
        provider: MultiProvider,
        store: Arc<dyn WatchlistStore>,
        categories: CategoryMap,
    ) -> Self {
        let market = Arc::new(MarketDataService::new(Arc::new(provider), CacheTtls::from_config(&config)));
        let dashboard = Arc::new(DashboardService::new(
            market.clone(),
            Arc::new(categories),
            config.kd_period,
            config.history_lookback_days,
        ));
        let watchlist = Arc::new(WatchlistService::new(store, market.clone()));
        let screening = Arc::new(ScreeningService::new(market.clone(), config.scan_max_candidates));

        Self {
            config: Arc::new(config),
            market,
            dashboard,
            watchlist,
            screening,
        }
    }

    /// Build every vendor client and the configured watchlist store.
    pub async fn build(config: AppConfig) -> anyhow::Result<Self> {
        let categories = CategoryMap::load(config.category_map_path.as_deref())?;
        let provider = MultiProvider::from_config(&config).context("failed to build HTTP clients")?;
        let store = build_store(&config).await?;

        info!("📋 Watchlist backend: {}", store.backend());
        Ok(Self::from_parts(config, provider, store, categories))
    }

    pub fn job_context(&self) -> JobContext {
        JobContext {
            watchlist: self.watchlist.clone(),
            dashboard: self.dashboard.clone(),
            market: self.market.clone(),
        }
    }
}

async fn build_store(config: &AppConfig) -> anyhow::Result<Arc<dyn WatchlistStore>> {
    let store: Arc<dyn WatchlistStore> = match config.watchlist_backend {
        WatchlistBackend::Memory => Arc::new(MemoryWatchlistStore::new()),
        WatchlistBackend::Csv => Arc::new(CsvWatchlistStore::new(config.watchlist_csv_path.clone())),
        WatchlistBackend::Sheets => {
            let key_path = config
                .google_credentials_path
                .as_deref()
                .context("GOOGLE_APPLICATION_CREDENTIALS is not set")?;
            let spreadsheet_id = config
                .sheets_spreadsheet_id
                .clone()
                .context("GOOGLE_SHEETS_SPREADSHEET_ID is not set")?;

            let key = ServiceAccountKey::from_file(key_path)?;
            let http = reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(config.http_timeout_secs))
                .build()?;
            let client = GoogleSheetsClient::new(http, key, spreadsheet_id)?;
            Arc::new(SheetsWatchlistStore::new(Arc::new(client), config.sheets_sheet_name.clone()))
        }
        WatchlistBackend::Postgres => {
            let database_url = config.database_url.as_deref().context("DATABASE_URL is not set")?;
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(database_url)
                .await
                .context("failed to connect to Postgres")?;
            let store = PostgresWatchlistStore::new(pool);
            store.migrate().await?;
            Arc::new(store)
        }
    };
    Ok(store)
}
