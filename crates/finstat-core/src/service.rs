//! Caller-facing facade combining the cache, the fetch orchestrator, and the
//! enhanced-report assembly.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cache::{CacheStore, FileCache};
use crate::config::Config;
use crate::enhance::{build_combined, CombinedReport};
use crate::error::{CacheError, ConfigError, FetchError};
use crate::fetcher::Fetcher;
use crate::gate::{AccessGate, GateStatus};
use crate::http_client::ReqwestHttpClient;
use crate::keypool::{CredentialPool, KeyRing, PoolId, PoolStatus};
use crate::quota::QuotaMatcher;
use crate::report::{ReportKind, StatementBundle, REPORT_SEQUENCE};
use crate::Ticker;

/// Fundamental-statement service: cached reads with upstream fallback.
pub struct FinancialService {
    fetcher: Fetcher,
    cache: Arc<dyn CacheStore>,
}

impl FinancialService {
    pub fn new(fetcher: Fetcher, cache: Arc<dyn CacheStore>) -> Self {
        Self { fetcher, cache }
    }

    /// Wire the production service from configuration: reqwest transport,
    /// file cache, and the two credential pools.
    pub fn from_config(config: &Config) -> Result<Self, ServiceInitError> {
        let pool_a = CredentialPool::new(PoolId::A, config.keys_a.clone())
            .map_err(|_| ServiceInitError::Config(ConfigError::MissingKeys))?;
        let pool_b = CredentialPool::new(PoolId::B, config.keys_b.clone())
            .map_err(|_| ServiceInitError::Config(ConfigError::MissingKeys))?;

        let quota = match &config.quota_phrases {
            Some(phrases) => QuotaMatcher::new(phrases.iter().cloned()),
            None => QuotaMatcher::default(),
        };

        let fetcher = Fetcher::new(
            Arc::new(ReqwestHttpClient::new()),
            Arc::new(KeyRing::new(pool_a, pool_b)),
            AccessGate::new(),
            quota,
            config.base_url.clone(),
        );
        let cache = FileCache::open(&config.cache_dir, config.cache_ttl)?;

        Ok(Self::new(fetcher, Arc::new(cache)))
    }

    /// Fetch the combined report for `ticker`.
    ///
    /// Returns `Ok(None)` for the two total-failure cases that carry no
    /// partial data: a cache-only request with no fresh cache, and quota
    /// exhaustion on both credential pools. Everything else is either a full
    /// report or a hard error.
    pub async fn get_financials(
        &self,
        ticker: &Ticker,
        cache_only: bool,
        force_refresh: bool,
    ) -> Result<Option<CombinedReport>, FetchError> {
        if !force_refresh {
            if let Some(bundle) = self.cached_bundle(ticker).await {
                info!(%ticker, "serving combined report from cache");
                return Ok(Some(build_combined(ticker, &bundle)));
            }
            if cache_only {
                debug!(%ticker, "cache-only request with no cached data");
                return Ok(None);
            }
        } else if cache_only {
            // Force-refresh wins over cache-only; treat as a normal refresh.
            debug!(%ticker, "forceRefresh overrides useCacheOnly");
        }

        let bundle = match self.fetcher.fetch_bundle(ticker).await {
            Ok(bundle) => bundle,
            Err(FetchError::BothPoolsExhausted) => return Ok(None),
            Err(error) => return Err(error),
        };

        self.store_bundle(ticker, &bundle).await;
        Ok(Some(build_combined(ticker, &bundle)))
    }

    /// Raw cached payload for one report kind (download endpoint).
    pub async fn cached_report(
        &self,
        ticker: &Ticker,
        kind: ReportKind,
    ) -> Result<Option<serde_json::Value>, CacheError> {
        self.cache.get(ticker, kind).await
    }

    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    pub fn gate_status(&self) -> GateStatus {
        self.fetcher.gate().status()
    }

    pub fn pool_status(&self) -> PoolStatus {
        self.fetcher.keys().status()
    }

    /// All five kinds fresh in cache, or nothing.
    async fn cached_bundle(&self, ticker: &Ticker) -> Option<StatementBundle> {
        let mut payloads = Vec::with_capacity(REPORT_SEQUENCE.len());
        for kind in REPORT_SEQUENCE {
            match self.cache.get(ticker, kind).await {
                Ok(Some(payload)) => payloads.push(payload),
                Ok(None) => return None,
                Err(error) => {
                    warn!(%ticker, kind = %kind, %error, "cache read failed");
                    return None;
                }
            }
        }

        let mut payloads = payloads.into_iter();
        Some(StatementBundle {
            income: payloads.next()?,
            balance: payloads.next()?,
            cash_flow: payloads.next()?,
            earnings: payloads.next()?,
            overview: payloads.next()?,
        })
    }

    /// Persist all five payloads. Failures are logged and swallowed so a
    /// fetched result is still returned to the caller.
    async fn store_bundle(&self, ticker: &Ticker, bundle: &StatementBundle) {
        for kind in REPORT_SEQUENCE {
            if let Err(error) = self.cache.put(ticker, kind, bundle.get(kind)).await {
                warn!(%ticker, kind = %kind, %error, "cache write failed, serving uncached result");
            }
        }
    }
}

/// Errors constructing the production service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceInitError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cache directory: {0}")]
    Cache(#[from] CacheError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::http_client::{HttpClient, HttpError, HttpRequest, HttpResponse};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    struct ScriptedClient {
        responses: Mutex<VecDeque<HttpResponse>>,
        calls: AtomicUsize,
    }

    impl ScriptedClient {
        fn new(responses: Vec<HttpResponse>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl HttpClient for ScriptedClient {
        fn execute<'a>(
            &'a self,
            _request: HttpRequest,
        ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let response = self
                .responses
                .lock()
                .expect("response script lock")
                .pop_front()
                .unwrap_or_else(|| HttpResponse::ok_json(report_body()));
            Box::pin(async move { Ok(response) })
        }
    }

    fn report_body() -> String {
        json!({
            "annualReports": [
                { "fiscalDateEnding": "2023-12-31", "totalRevenue": "1000", "netIncome": "100" }
            ]
        })
        .to_string()
    }

    fn quota_body() -> String {
        json!({
            "Information": "Thank you for using Alpha Vantage! Our standard API rate limit is 25 requests per day."
        })
        .to_string()
    }

    fn service(client: Arc<ScriptedClient>) -> FinancialService {
        let pool_a = CredentialPool::new(PoolId::A, vec!["a0".into()]).expect("pool A");
        let pool_b = CredentialPool::new(PoolId::B, vec!["b0".into()]).expect("pool B");
        let fetcher = Fetcher::new(
            client,
            Arc::new(KeyRing::new(pool_a, pool_b)),
            AccessGate::with_cooldown(Duration::from_millis(10)),
            QuotaMatcher::default(),
            "https://upstream.test/query",
        );
        FinancialService::new(fetcher, Arc::new(MemoryCache::new(Duration::from_secs(3600))))
    }

    fn ticker(symbol: &str) -> Ticker {
        Ticker::parse(symbol).expect("valid ticker")
    }

    #[tokio::test(start_paused = true)]
    async fn fetches_and_caches_on_miss() {
        let client = ScriptedClient::new(Vec::new());
        let service = service(client.clone());

        let report = service
            .get_financials(&ticker("IBM"), false, false)
            .await
            .expect("fetch succeeds")
            .expect("report present");
        assert_eq!(report.symbol, "IBM");
        assert_eq!(client.calls(), 5);

        // Second read is served from cache: no new upstream calls, no gate.
        let cached = service
            .get_financials(&ticker("IBM"), false, false)
            .await
            .expect("cache hit")
            .expect("report present");
        assert_eq!(cached.symbol, "IBM");
        assert_eq!(client.calls(), 5);
        assert!(!service.gate_status().busy);
    }

    #[tokio::test(start_paused = true)]
    async fn cache_only_miss_is_no_data_not_error() {
        let client = ScriptedClient::new(Vec::new());
        let service = service(client.clone());

        let result = service
            .get_financials(&ticker("IBM"), true, false)
            .await
            .expect("no hard error");
        assert!(result.is_none());
        assert_eq!(client.calls(), 0, "cache-only must never hit upstream");
    }

    #[tokio::test(start_paused = true)]
    async fn force_refresh_bypasses_fresh_cache() {
        let client = ScriptedClient::new(Vec::new());
        let service = service(client.clone());

        service
            .get_financials(&ticker("IBM"), false, false)
            .await
            .expect("initial fetch")
            .expect("report present");
        assert_eq!(client.calls(), 5);

        service
            .get_financials(&ticker("IBM"), false, true)
            .await
            .expect("refresh fetch")
            .expect("report present");
        assert_eq!(client.calls(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn both_pools_exhausted_surfaces_as_none() {
        let client = ScriptedClient::new(vec![
            HttpResponse::ok_json(quota_body()),
            HttpResponse::ok_json(quota_body()),
        ]);
        let service = service(client.clone());

        let result = service
            .get_financials(&ticker("IBM"), false, false)
            .await
            .expect("quota exhaustion is not a hard error");
        assert!(result.is_none());
        assert_eq!(service.pool_status().switch_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cached_report_serves_single_kind() {
        let client = ScriptedClient::new(Vec::new());
        let service = service(client);

        service
            .get_financials(&ticker("IBM"), false, false)
            .await
            .expect("fetch")
            .expect("report present");

        let payload = service
            .cached_report(&ticker("IBM"), ReportKind::Income)
            .await
            .expect("cache read")
            .expect("entry present");
        assert!(payload.get("annualReports").is_some());
    }
}
