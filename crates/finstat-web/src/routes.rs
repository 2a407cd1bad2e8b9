//! HTTP routes over the financial data service.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tower_http::cors::CorsLayer;
use tracing::info;

use finstat_core::{FinancialService, ReportKind, Ticker};

use crate::error::ApiError;
use crate::export;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<FinancialService>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/financials", post(financials))
        .route("/api/cache/:symbol/:kind", get(cache_entry))
        .route("/api/export/csv", get(export_csv))
        .route("/api/status", get(status))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinancialsBody {
    symbol: String,
    #[serde(default)]
    use_cache_only: bool,
    #[serde(default)]
    force_refresh: bool,
}

/// POST /api/financials — combined report for one ticker.
async fn financials(
    State(state): State<AppState>,
    Json(body): Json<FinancialsBody>,
) -> Result<impl IntoResponse, ApiError> {
    let ticker = Ticker::parse(&body.symbol)?;
    info!(
        %ticker,
        use_cache_only = body.use_cache_only,
        force_refresh = body.force_refresh,
        "processing financials request"
    );

    let report = state
        .service
        .get_financials(&ticker, body.use_cache_only, body.force_refresh)
        .await?;

    match report {
        Some(report) => Ok(Json(report)),
        None if body.use_cache_only => Err(ApiError::NotFound(format!(
            "no cached data for {ticker}; disable useCacheOnly to fetch from the API"
        ))),
        None => Err(ApiError::Upstream(format!(
            "failed to fetch financial data for {ticker}; both credential pools are exhausted, try again later"
        ))),
    }
}

/// GET /api/cache/:symbol/:kind — raw cached payload as a download.
async fn cache_entry(
    State(state): State<AppState>,
    Path((symbol, kind)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let ticker = Ticker::parse(&symbol)?;
    let kind = ReportKind::parse(&kind)?;

    let payload = state
        .service
        .cached_report(&ticker, kind)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no cached {kind} report for {ticker}")))?;

    let filename = format!("{}_{}.json", kind.as_str(), ticker.as_str());
    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_owned()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        Json(payload),
    ))
}

#[derive(Debug, Deserialize)]
struct ExportParams {
    years: Option<usize>,
}

/// GET /api/export/csv — consolidated spreadsheet of all cached symbols.
async fn export_csv(
    State(state): State<AppState>,
    Query(params): Query<ExportParams>,
) -> Result<impl IntoResponse, ApiError> {
    let years_back = params.years.unwrap_or(20);
    let csv = export::consolidated_csv(&state, years_back).await?;

    let date = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();
    let date = date.get(..10).unwrap_or("").to_owned();
    let filename = format!("financial_export_{date}.csv");

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv".to_owned()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        csv,
    ))
}

/// GET /api/status — gate and credential pool snapshots.
async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let gate = state.service.gate_status();
    let pools = state.service.pool_status();

    Json(json!({
        "success": true,
        "gate": gate,
        "pools": pools,
        "timestamp": OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use std::time::Duration;
    use tower::util::ServiceExt;

    use finstat_core::{
        AccessGate, CredentialPool, Fetcher, KeyRing, MemoryCache, NoopHttpClient, PoolId,
        QuotaMatcher,
    };

    fn test_state() -> AppState {
        let pool_a = CredentialPool::new(PoolId::A, vec!["a0".into()]).expect("pool A");
        let pool_b = CredentialPool::new(PoolId::B, vec!["b0".into()]).expect("pool B");
        let fetcher = Fetcher::new(
            Arc::new(NoopHttpClient),
            Arc::new(KeyRing::new(pool_a, pool_b)),
            AccessGate::with_cooldown(Duration::from_millis(1)),
            QuotaMatcher::default(),
            "https://upstream.test/query",
        );
        let service = FinancialService::new(
            fetcher,
            Arc::new(MemoryCache::new(Duration::from_secs(3600))),
        );
        AppState {
            service: Arc::new(service),
        }
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&bytes).expect("body is json")
    }

    #[tokio::test]
    async fn status_reports_idle_gate_and_pool_sizes() {
        let router = build_router(test_state());

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/api/status")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["gate"]["busy"], false);
        assert_eq!(body["gate"]["queueLength"], 0);
        assert_eq!(body["pools"]["activePool"], "A");
        assert_eq!(body["pools"]["switchCount"], 0);
    }

    #[tokio::test]
    async fn financials_rejects_invalid_symbol() {
        let router = build_router(test_state());

        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/financials")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"symbol":"NOT A TICKER!!"}"#))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().expect("error message").contains("ticker"));
    }

    #[tokio::test]
    async fn cache_only_miss_returns_not_found() {
        let router = build_router(test_state());

        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/financials")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"symbol":"IBM","useCacheOnly":true}"#))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn cache_download_404s_when_absent() {
        let router = build_router(test_state());

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/api/cache/IBM/income")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_report_kind_is_rejected() {
        let router = build_router(test_state());

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/api/cache/IBM/dividends")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn export_emits_header_rows_even_when_cache_is_empty() {
        let router = build_router(test_state());

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/api/export/csv")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let text = String::from_utf8(bytes.to_vec()).expect("utf8 csv");
        let mut lines = text.lines();
        assert!(lines.next().expect("group header").contains("Income Statement"));
        assert!(lines.next().expect("field header").starts_with("Symbol,Year"));
    }
}
