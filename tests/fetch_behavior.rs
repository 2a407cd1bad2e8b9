//! Behavior-driven tests for the fetch sequence: credential rotation, quota
//! failover, and the caller-facing service semantics.

use std::sync::Arc;
use std::time::Duration;

use finstat_core::{
    AccessGate, CredentialPool, FetchError, Fetcher, FinancialService, KeyRing, MemoryCache,
    PoolId, QuotaMatcher, ReportKind,
};
use finstat_tests::{ticker, ScriptedClient, QUOTA_BODY, REPORT_BODY};
use finstat_core::{HttpError, HttpResponse};

fn fetcher_with(client: Arc<ScriptedClient>, keys_a: &[&str], keys_b: &[&str]) -> Fetcher {
    let pool_a = CredentialPool::new(PoolId::A, keys_a.iter().map(|s| s.to_string()).collect())
        .expect("pool A keys");
    let pool_b = CredentialPool::new(PoolId::B, keys_b.iter().map(|s| s.to_string()).collect())
        .expect("pool B keys");
    Fetcher::new(
        client,
        Arc::new(KeyRing::new(pool_a, pool_b)),
        AccessGate::with_cooldown(Duration::from_millis(10)),
        QuotaMatcher::default(),
        "https://upstream.test/query",
    )
}

#[tokio::test(start_paused = true)]
async fn five_reports_are_fetched_in_fixed_order_with_rotating_keys() {
    // Given: Three keys in pool A
    let client = ScriptedClient::new(Vec::new());
    let fetcher = fetcher_with(client.clone(), &["k0", "k1", "k2"], &["m0"]);

    // When: One ticker is fetched
    fetcher
        .fetch_bundle(&ticker("IBM"))
        .await
        .expect("sequence succeeds");

    // Then: The five calls run in statement order, rotating from cursor 0
    let urls = client.recorded_urls();
    let functions: Vec<&str> = urls
        .iter()
        .map(|url| {
            url.split("function=")
                .nth(1)
                .and_then(|rest| rest.split('&').next())
                .expect("function param present")
        })
        .collect();
    assert_eq!(
        functions,
        vec![
            "INCOME_STATEMENT",
            "BALANCE_SHEET",
            "CASH_FLOW",
            "EARNINGS",
            "OVERVIEW"
        ]
    );
    for (url, key) in urls.iter().zip(["k0", "k1", "k2", "k0", "k1"]) {
        assert!(url.ends_with(&format!("apikey={key}")), "url {url}");
    }
}

#[tokio::test(start_paused = true)]
async fn quota_rejection_mid_sequence_switches_pool_once_and_retries() {
    // Given: Pool A rejects the third call (cash flow) with quota text
    let client = ScriptedClient::new(vec![
        Ok(HttpResponse::ok_json(REPORT_BODY)),
        Ok(HttpResponse::ok_json(REPORT_BODY)),
        Ok(HttpResponse::ok_json(QUOTA_BODY)),
    ]);
    let fetcher = fetcher_with(client.clone(), &["a0", "a1"], &["b0", "b1"]);

    // When: The ticker is fetched
    fetcher
        .fetch_bundle(&ticker("XYZ"))
        .await
        .expect("retry on pool B succeeds");

    // Then: The pool switched exactly once and the retry restarted from
    // credential index 0 of pool B
    let status = fetcher.keys().status();
    assert_eq!(status.active_pool, PoolId::B);
    assert_eq!(status.switch_count, 1);

    let urls = client.recorded_urls();
    assert_eq!(urls.len(), 8, "3 aborted calls + 5 retry calls");
    assert!(urls[3].contains("function=INCOME_STATEMENT"));
    assert!(urls[3].ends_with("apikey=b0"));
    assert!(urls[4].ends_with("apikey=b1"));
}

#[tokio::test(start_paused = true)]
async fn quota_on_both_pools_is_terminal_after_one_switch() {
    // Given: Both pools reject the very first call
    let client = ScriptedClient::new(vec![
        Ok(HttpResponse::ok_json(QUOTA_BODY)),
        Ok(HttpResponse::ok_json(QUOTA_BODY)),
    ]);
    let fetcher = fetcher_with(client.clone(), &["a0"], &["b0"]);

    // When: The ticker is fetched
    let error = fetcher
        .fetch_bundle(&ticker("XYZ"))
        .await
        .expect_err("both pools exhausted");

    // Then: Exactly one switch happened and no further retry was attempted
    assert!(matches!(error, FetchError::BothPoolsExhausted));
    assert_eq!(fetcher.keys().status().switch_count, 1);
    assert_eq!(client.recorded_urls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn transport_failure_does_not_burn_the_retry_or_the_gate() {
    // Given: The first call dies on the wire
    let client = ScriptedClient::new(vec![Err(HttpError::new("connection reset"))]);
    let fetcher = fetcher_with(client.clone(), &["a0"], &["b0"]);

    // When: The ticker is fetched
    let error = fetcher
        .fetch_bundle(&ticker("XYZ"))
        .await
        .expect_err("transport failure is fatal");

    // Then: No pool switch, and the gate admits the next sequence
    assert!(matches!(error, FetchError::Transport { .. }));
    assert_eq!(fetcher.keys().status().switch_count, 0);
    fetcher
        .fetch_bundle(&ticker("ABC"))
        .await
        .expect("gate released after the failure");
}

#[tokio::test(start_paused = true)]
async fn service_round_trip_caches_and_serves_combined_reports() {
    // Given: A service over a scripted upstream and an in-memory cache
    let client = ScriptedClient::new(Vec::new());
    let service = FinancialService::new(
        fetcher_with(client.clone(), &["a0"], &["b0"]),
        Arc::new(MemoryCache::new(Duration::from_secs(3600))),
    );

    // When: The same ticker is requested twice
    let first = service
        .get_financials(&ticker("XYZ"), false, false)
        .await
        .expect("fetch succeeds")
        .expect("report present");
    let second = service
        .get_financials(&ticker("XYZ"), false, false)
        .await
        .expect("cache hit succeeds")
        .expect("report present");

    // Then: Only the first request hit upstream; both carry computed metrics
    assert_eq!(client.recorded_urls().len(), 5);
    assert_eq!(first.symbol, "XYZ");
    assert_eq!(second.years, vec!["2023"]);
    let metrics = &second.annual_reports[0].calculated_metrics;
    assert!((metrics.net_profit_margin.expect("margin") - 10.0).abs() < 1e-9);

    // And: The raw income payload is downloadable from the cache
    let income = service
        .cached_report(&ticker("XYZ"), ReportKind::Income)
        .await
        .expect("cache read")
        .expect("entry present");
    assert!(income.get("annualReports").is_some());
}

#[tokio::test(start_paused = true)]
async fn cache_only_request_with_empty_cache_returns_no_data() {
    // Given: A service with nothing cached
    let client = ScriptedClient::new(Vec::new());
    let service = FinancialService::new(
        fetcher_with(client.clone(), &["a0"], &["b0"]),
        Arc::new(MemoryCache::new(Duration::from_secs(3600))),
    );

    // When: A cache-only request is made
    let result = service
        .get_financials(&ticker("XYZ"), true, false)
        .await
        .expect("no hard error");

    // Then: It is a no-data result and upstream was never touched
    assert!(result.is_none());
    assert!(client.recorded_urls().is_empty());
}
