use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use tracing::info;

use crate::config::AppConfig;
use crate::external::multi_provider::MultiProvider;
use crate::external::sourced::Sourced;
use crate::models::{InstitutionalFlowRecord, MarketQuote, PriceBar, Valuation};
use crate::services::ttl_cache::TtlCache;
use crate::utils::taipei_today;

#[derive(Debug, Clone, Copy)]
pub struct CacheTtls {
    pub quotes: Duration,
    pub reference: Duration,
    pub failure: Duration,
}

impl CacheTtls {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            quotes: Duration::seconds(config.quote_cache_ttl_secs),
            reference: Duration::seconds(config.reference_cache_ttl_secs),
            failure: Duration::seconds(config.failure_cache_ttl_secs),
        }
    }
}

type MarketTable<T> = Sourced<Arc<Vec<T>>>;

/// Cached access to the provider chain.
///
/// Answers with data are kept for their configured TTL; unavailable and failed
/// answers are kept for the shorter failure TTL so a bad ticker is not
/// re-fetched on every request.
pub struct MarketDataService {
    provider: Arc<MultiProvider>,
    ttls: CacheTtls,
    bars: TtlCache<(String, u32), Sourced<Vec<PriceBar>>>,
    flows: TtlCache<(String, u32), Sourced<Vec<InstitutionalFlowRecord>>>,
    shares: TtlCache<String, Sourced<f64>>,
    quotes: TtlCache<(), MarketTable<MarketQuote>>,
    valuations: TtlCache<(), MarketTable<Valuation>>,
}

impl MarketDataService {
    pub fn new(provider: Arc<MultiProvider>, ttls: CacheTtls) -> Self {
        Self {
            provider,
            ttls,
            bars: TtlCache::new(ttls.quotes),
            flows: TtlCache::new(ttls.quotes),
            shares: TtlCache::new(ttls.reference),
            quotes: TtlCache::new(ttls.quotes),
            valuations: TtlCache::new(ttls.reference),
        }
    }

    async fn cached<K, T, Fut>(
        &self,
        cache: &TtlCache<K, Sourced<T>>,
        key: K,
        ttl: Duration,
        fetch: impl FnOnce() -> Fut,
    ) -> Sourced<T>
    where
        K: Eq + Hash + Clone,
        T: Clone,
        Fut: Future<Output = Sourced<T>>,
    {
        if let Some(hit) = cache.get(&key) {
            return hit;
        }

        let result = fetch().await;
        let ttl = if result.is_available() { ttl } else { self.ttls.failure };
        cache.insert_with_ttl(key, result.clone(), ttl);
        result
    }

    fn window(days: u32) -> (NaiveDate, NaiveDate) {
        let end = taipei_today();
        (end - Duration::days(i64::from(days)), end)
    }

    /// Daily bars covering the last `days` calendar days.
    pub async fn daily_bars(&self, ticker: &str, days: u32) -> Sourced<Vec<PriceBar>> {
        let (start, end) = Self::window(days);
        self.cached(&self.bars, (ticker.to_string(), days), self.ttls.quotes, || {
            self.provider.daily_bars(ticker, start, end)
        })
        .await
    }

    /// Institutional rows covering the last `days` calendar days.
    pub async fn institutional_flows(&self, ticker: &str, days: u32) -> Sourced<Vec<InstitutionalFlowRecord>> {
        let (start, end) = Self::window(days);
        self.cached(&self.flows, (ticker.to_string(), days), self.ttls.quotes, || {
            self.provider.institutional_flows(ticker, start, end)
        })
        .await
    }

    pub async fn shares_outstanding(&self, ticker: &str) -> Sourced<f64> {
        self.cached(&self.shares, ticker.to_string(), self.ttls.reference, || {
            self.provider.shares_outstanding(ticker)
        })
        .await
    }

    /// Whole-market end-of-day table.
    pub async fn market_quotes(&self) -> MarketTable<MarketQuote> {
        self.cached(&self.quotes, (), self.ttls.quotes, || async {
            self.provider.market_quotes().await.map(Arc::new)
        })
        .await
    }

    pub async fn valuations(&self) -> MarketTable<Valuation> {
        self.cached(&self.valuations, (), self.ttls.reference, || async {
            self.provider.valuations().await.map(Arc::new)
        })
        .await
    }

    /// Display name from the whole-market tables, if the exchange lists it.
    pub async fn lookup_name(&self, ticker: &str) -> Option<String> {
        let from_quotes = self.market_quotes().await.into_data().and_then(|quotes| {
            quotes
                .iter()
                .find(|q| q.ticker == ticker)
                .map(|q| q.name.clone())
        });
        if let Some(name) = from_quotes.filter(|n| !n.is_empty()) {
            return Some(name);
        }

        self.valuations()
            .await
            .into_data()
            .and_then(|rows| rows.iter().find(|v| v.ticker == ticker).map(|v| v.name.clone()))
            .filter(|n| !n.is_empty())
    }

    /// Forget everything cached for one ticker.
    pub fn invalidate_ticker(&self, ticker: &str) {
        self.bars.invalidate_where(|(t, _)| t == ticker);
        self.flows.invalidate_where(|(t, _)| t == ticker);
        self.shares.invalidate(&ticker.to_string());
        info!("Invalidated cached market data for {}", ticker);
    }

    pub fn clear_all(&self) {
        self.bars.clear();
        self.flows.clear();
        self.shares.clear();
        self.quotes.clear();
        self.valuations.clear();
        self.provider.clear_caches();
        info!("Cleared all market data caches");
    }

    pub fn cleanup_expired(&self) {
        self.bars.cleanup_expired();
        self.flows.cleanup_expired();
        self.shares.cleanup_expired();
        self.quotes.cleanup_expired();
        self.valuations.cleanup_expired();
    }

    pub fn cached_entries(&self) -> usize {
        self.bars.len() + self.flows.len() + self.shares.len() + self.quotes.len() + self.valuations.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::multi_provider::{ProviderChains, SharedProvider};
    use crate::external::provider::{DataSource, MarketDataProvider, ProviderError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        bars: usize,
        calls: AtomicUsize,
        clears: AtomicUsize,
    }

    #[async_trait]
    impl MarketDataProvider for Counting {
        fn source(&self) -> DataSource {
            DataSource::Yahoo
        }

        fn clear_caches(&self) {
            self.clears.fetch_add(1, Ordering::SeqCst);
        }

        async fn fetch_daily_bars(
            &self,
            _ticker: &str,
            start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<Vec<PriceBar>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok((0..self.bars)
                .map(|i| PriceBar::new(start + Duration::days(i as i64), 10.0, 11.0, 9.0, 10.0, 100.0))
                .collect())
        }
    }

    fn service(bars: usize, failure_ttl: Duration) -> (MarketDataService, Arc<Counting>) {
        let counting = Arc::new(Counting { bars, calls: AtomicUsize::new(0), clears: AtomicUsize::new(0) });
        let shared: SharedProvider = counting.clone();
        let provider = MultiProvider::new(ProviderChains { bars: vec![shared], ..Default::default() });
        let ttls = CacheTtls {
            quotes: Duration::minutes(10),
            reference: Duration::hours(1),
            failure: failure_ttl,
        };
        (MarketDataService::new(Arc::new(provider), ttls), counting)
    }

    #[tokio::test]
    async fn available_results_are_cached() {
        let (service, counting) = service(5, Duration::minutes(2));

        assert!(service.daily_bars("2330", 30).await.is_available());
        assert!(service.daily_bars("2330", 30).await.is_available());
        assert_eq!(counting.calls.load(Ordering::SeqCst), 1);

        // A different window is a different cache key
        service.daily_bars("2330", 60).await;
        assert_eq!(counting.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unavailable_results_use_failure_ttl() {
        let (service, counting) = service(0, Duration::zero());

        assert!(!service.daily_bars("9999", 30).await.is_available());
        assert!(!service.daily_bars("9999", 30).await.is_available());
        assert_eq!(counting.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalidate_ticker_forces_refetch() {
        let (service, counting) = service(5, Duration::minutes(2));

        service.daily_bars("2330", 30).await;
        service.daily_bars("2317", 30).await;
        service.invalidate_ticker("2330");
        service.daily_bars("2330", 30).await;
        service.daily_bars("2317", 30).await;

        assert_eq!(counting.calls.load(Ordering::SeqCst), 3);

        service.clear_all();
        assert_eq!(service.cached_entries(), 0);
    }

    #[tokio::test]
    async fn clear_all_reaches_provider_tables() {
        let (service, counting) = service(5, Duration::minutes(2));

        service.invalidate_ticker("2330");
        assert_eq!(counting.clears.load(Ordering::SeqCst), 0);

        service.clear_all();
        assert_eq!(counting.clears.load(Ordering::SeqCst), 1);
    }
}
