//! Fetch sequence orchestration: the ordered five-call upstream sequence,
//! credential rotation, quota classification, and the single pool-switch
//! retry.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use crate::error::FetchError;
use crate::gate::AccessGate;
use crate::http_client::{HttpClient, HttpRequest};
use crate::keypool::KeyRing;
use crate::quota::QuotaMatcher;
use crate::report::{ReportKind, StatementBundle, REPORT_SEQUENCE};
use crate::Ticker;

/// Default upstream query endpoint.
pub const DEFAULT_BASE_URL: &str = "https://www.alphavantage.co/query";

/// Retry progress of one top-level request. A quota hit on `Fresh` switches
/// pools and re-enters as `Retried`; a quota hit on `Retried` is terminal.
/// The bounded enum replaces the source's unbounded recursion so "exactly one
/// retry" holds structurally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Fresh,
    Retried,
}

/// Outcome of one gate-held five-call sequence.
enum SequenceError {
    Quota { kind: ReportKind },
    Fatal(FetchError),
}

/// Runs complete fetch sequences against the upstream API.
pub struct Fetcher {
    http: Arc<dyn HttpClient>,
    keys: Arc<KeyRing>,
    gate: AccessGate,
    quota: QuotaMatcher,
    base_url: String,
}

impl Fetcher {
    pub fn new(
        http: Arc<dyn HttpClient>,
        keys: Arc<KeyRing>,
        gate: AccessGate,
        quota: QuotaMatcher,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            keys,
            gate,
            quota,
            base_url: base_url.into(),
        }
    }

    pub fn gate(&self) -> &AccessGate {
        &self.gate
    }

    pub fn keys(&self) -> &Arc<KeyRing> {
        &self.keys
    }

    /// Fetch all five statements for `ticker`.
    ///
    /// Each attempt acquires the gate, runs the five calls with a fresh
    /// round-robin cursor, and releases the gate (starting the cooldown) on
    /// every exit path via the permit's scoped cleanup. A quota rejection on
    /// the first attempt switches the credential pool and performs one full
    /// fresh acquire/cooldown/five-call cycle on the other pool; a quota
    /// rejection on the retry fails with [`FetchError::BothPoolsExhausted`].
    /// Non-quota errors are fatal immediately and never retried.
    pub async fn fetch_bundle(&self, ticker: &Ticker) -> Result<StatementBundle, FetchError> {
        let mut attempt = Attempt::Fresh;
        loop {
            let permit = self.gate.acquire(ticker.clone()).await;
            let outcome = self.run_sequence(ticker).await;
            drop(permit);

            match outcome {
                Ok(bundle) => {
                    info!(%ticker, "fetched all statements");
                    return Ok(bundle);
                }
                Err(SequenceError::Quota { kind }) => match attempt {
                    Attempt::Fresh => {
                        let pool = self.keys.switch_pool();
                        info!(
                            %ticker,
                            report = %kind,
                            active_pool = %pool,
                            "quota exhausted, switching credential pool for one retry"
                        );
                        attempt = Attempt::Retried;
                    }
                    Attempt::Retried => {
                        warn!(%ticker, report = %kind, "quota exhausted on both credential pools");
                        return Err(FetchError::BothPoolsExhausted);
                    }
                },
                Err(SequenceError::Fatal(error)) => {
                    warn!(%ticker, %error, "fetch sequence failed");
                    return Err(error);
                }
            }
        }
    }

    /// One gate-held pass over the five report kinds. The cursor starts at 0
    /// for every pass and is never carried across tickers or the retry.
    async fn run_sequence(&self, ticker: &Ticker) -> Result<StatementBundle, SequenceError> {
        let mut payloads = Vec::with_capacity(REPORT_SEQUENCE.len());

        for (cursor, kind) in REPORT_SEQUENCE.into_iter().enumerate() {
            let payload = self.fetch_report(ticker, kind, cursor).await?;
            payloads.push(payload);
        }

        let mut payloads = payloads.into_iter();
        Ok(StatementBundle {
            income: payloads.next().unwrap_or(Value::Null),
            balance: payloads.next().unwrap_or(Value::Null),
            cash_flow: payloads.next().unwrap_or(Value::Null),
            earnings: payloads.next().unwrap_or(Value::Null),
            overview: payloads.next().unwrap_or(Value::Null),
        })
    }

    async fn fetch_report(
        &self,
        ticker: &Ticker,
        kind: ReportKind,
        cursor: usize,
    ) -> Result<Value, SequenceError> {
        let credential = self.keys.credential_at(cursor);
        let url = format!(
            "{}?function={}&symbol={}&apikey={}",
            self.base_url,
            kind.function(),
            urlencoding::encode(ticker.as_str()),
            urlencoding::encode(&credential),
        );

        let response = self
            .http
            .execute(HttpRequest::get(&url))
            .await
            .map_err(|error| {
                SequenceError::Fatal(FetchError::Transport {
                    kind,
                    message: error.message().to_owned(),
                })
            })?;

        if !response.is_success() {
            return Err(SequenceError::Fatal(FetchError::Upstream {
                kind,
                message: format!("upstream returned status {}", response.status),
            }));
        }

        let payload: Value = serde_json::from_str(&response.body)
            .map_err(|source| SequenceError::Fatal(FetchError::Malformed { kind, source }))?;

        if self.quota.is_quota_error(&payload) {
            return Err(SequenceError::Quota { kind });
        }

        if let Some(message) = upstream_error_message(&payload) {
            return Err(SequenceError::Fatal(FetchError::Upstream { kind, message }));
        }

        Ok(payload)
    }
}

/// Non-quota rejection reported inside an otherwise-200 body.
fn upstream_error_message(payload: &Value) -> Option<String> {
    payload
        .get("Error Message")
        .and_then(Value::as_str)
        .map(str::to_owned)
}
