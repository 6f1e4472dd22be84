use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, NaiveDate};
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::external::finmind::FinMindProvider;
use crate::external::provider::{DataSource, MarketDataProvider, ProviderError};
use crate::external::sourced::{DataPresence, SourceAttempt, Sourced};
use crate::external::twse::TwseProvider;
use crate::external::yahoo::YahooFinanceProvider;
use crate::models::{InstitutionalFlowRecord, MarketQuote, PriceBar, Valuation};
use crate::services::rate_limiter::RateLimiter;

const USER_AGENT: &str = "Mozilla/5.0 (compatible; Taiwatch/0.1)";

pub type SharedProvider = Arc<dyn MarketDataProvider>;

/// Providers to try for each capability, highest priority first.
#[derive(Clone, Default)]
pub struct ProviderChains {
    pub bars: Vec<SharedProvider>,
    pub flows: Vec<SharedProvider>,
    pub shares: Vec<SharedProvider>,
    pub market: Vec<SharedProvider>,
}

/// MultiProvider resolves each request against an ordered provider chain.
///
/// Strategy:
/// 1. Ask providers in priority order
/// 2. An empty answer, an error or an unsupported capability moves on to the next one
/// 3. The first provider with data wins and is recorded as the source
/// 4. If nobody had data the attempts are kept for provenance
pub struct MultiProvider {
    chains: ProviderChains,
}

impl MultiProvider {
    pub fn new(chains: ProviderChains) -> Self {
        Self { chains }
    }

    /// Build every vendor client once and arrange them as configured.
    pub fn from_config(config: &AppConfig) -> reqwest::Result<Self> {
        let timeout = StdDuration::from_secs(config.http_timeout_secs);
        let limiter = || {
            Arc::new(
                RateLimiter::new(config.provider_max_concurrent, config.provider_requests_per_minute)
                    .with_jitter(StdDuration::from_millis(config.provider_jitter_ms)),
            )
        };

        let client = build_client(timeout, false)?;
        if config.twse_accept_invalid_certs {
            warn!("⚠️ TLS certificate verification disabled for TWSE endpoints");
        }
        let twse_client = build_client(timeout, config.twse_accept_invalid_certs)?;

        let yahoo: SharedProvider = Arc::new(YahooFinanceProvider::new(client.clone(), limiter()));
        let finmind: SharedProvider = Arc::new(FinMindProvider::new(
            client,
            config.finmind_api_token.clone(),
            limiter(),
        ));
        let twse: SharedProvider = Arc::new(TwseProvider::new(
            twse_client,
            limiter(),
            Duration::seconds(config.reference_cache_ttl_secs),
        ));

        let pick = |order: &[DataSource]| -> Vec<SharedProvider> {
            order
                .iter()
                .map(|source| match source {
                    DataSource::Yahoo => yahoo.clone(),
                    DataSource::FinMind => finmind.clone(),
                    DataSource::Twse => twse.clone(),
                })
                .collect()
        };

        let chains = ProviderChains {
            bars: pick(&config.quote_providers),
            flows: pick(&config.flow_providers),
            shares: pick(&config.share_providers),
            market: vec![twse.clone()],
        };

        info!(
            "📊 Provider chains: bars={:?} flows={:?} shares={:?}",
            config.quote_providers, config.flow_providers, config.share_providers
        );
        Ok(Self::new(chains))
    }

    pub async fn daily_bars(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> Sourced<Vec<PriceBar>> {
        let owned = ticker.to_string();
        first_available(&self.chains.bars, "daily bars", ticker, move |p| {
            let ticker = owned.clone();
            async move { p.fetch_daily_bars(&ticker, start, end).await }
        })
        .await
    }

    pub async fn institutional_flows(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Sourced<Vec<InstitutionalFlowRecord>> {
        let owned = ticker.to_string();
        first_available(&self.chains.flows, "institutional flows", ticker, move |p| {
            let ticker = owned.clone();
            async move { p.fetch_institutional_flows(&ticker, start, end).await }
        })
        .await
    }

    pub async fn shares_outstanding(&self, ticker: &str) -> Sourced<f64> {
        let owned = ticker.to_string();
        first_available(&self.chains.shares, "shares outstanding", ticker, move |p| {
            let ticker = owned.clone();
            async move { p.fetch_shares_outstanding(&ticker).await }
        })
        .await
    }

    pub async fn market_quotes(&self) -> Sourced<Vec<MarketQuote>> {
        first_available(&self.chains.market, "market quotes", "*", |p| async move {
            p.fetch_market_quotes().await
        })
        .await
    }

    pub async fn valuations(&self) -> Sourced<Vec<Valuation>> {
        first_available(&self.chains.market, "valuations", "*", |p| async move {
            p.fetch_valuations().await
        })
        .await
    }

    /// Ask every configured provider to drop its internal tables.
    pub fn clear_caches(&self) {
        let chains = &self.chains;
        for provider in chains.bars.iter().chain(&chains.flows).chain(&chains.shares).chain(&chains.market) {
            provider.clear_caches();
        }
    }
}

fn build_client(timeout: StdDuration, accept_invalid_certs: bool) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .danger_accept_invalid_certs(accept_invalid_certs)
        .build()
}

/// Walk `chain` in order and return the first answer that carries data.
pub async fn first_available<T, F, Fut>(
    chain: &[SharedProvider],
    capability: &str,
    ticker: &str,
    call: F,
) -> Sourced<T::Output>
where
    T: DataPresence,
    F: Fn(SharedProvider) -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempts = Vec::with_capacity(chain.len());

    for provider in chain {
        let source = provider.source();
        match call(provider.clone()).await {
            Ok(payload) => match payload.into_present() {
                Some(data) => {
                    info!("✓ {} for {} from {}", capability, ticker, source);
                    return Sourced::available(data, source);
                }
                None => {
                    debug!("{} had no {} for {}, trying next provider", source, capability, ticker);
                    attempts.push(SourceAttempt::empty(source));
                }
            },
            Err(ProviderError::Unsupported) => {
                attempts.push(SourceAttempt::from_error(source, &ProviderError::Unsupported));
            }
            Err(ProviderError::RateLimited) => {
                info!("⚠️ {} rate limited while fetching {} for {}", source, capability, ticker);
                attempts.push(SourceAttempt::from_error(source, &ProviderError::RateLimited));
            }
            Err(e) => {
                warn!("{} failed to fetch {} for {}: {}", source, capability, ticker, e);
                attempts.push(SourceAttempt::from_error(source, &e));
            }
        }
    }

    warn!("No provider had {} for {}", capability, ticker);
    Sourced::from_attempts(attempts)
}
