//! Shared helpers for finstat behavioral tests.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use finstat_core::{HttpClient, HttpError, HttpRequest, HttpResponse, Ticker};

/// A quota rejection body as the upstream actually phrases it.
pub const QUOTA_BODY: &str = r#"{"Note":"Thank you for using Alpha Vantage! Our standard API call frequency is 5 calls per minute and 500 calls per day."}"#;

/// A minimal well-formed statement body.
pub const REPORT_BODY: &str =
    r#"{"symbol":"XYZ","annualReports":[{"fiscalDateEnding":"2023-12-31","totalRevenue":"1000","netIncome":"100"}]}"#;

pub fn ticker(symbol: &str) -> Ticker {
    Ticker::parse(symbol).expect("valid test ticker")
}

/// Replays a scripted list of responses and records every request URL.
/// Once the script is exhausted, further calls get a well-formed report.
pub struct ScriptedClient {
    responses: Mutex<VecDeque<Result<HttpResponse, HttpError>>>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedClient {
    pub fn new(responses: Vec<Result<HttpResponse, HttpError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn recorded_urls(&self) -> Vec<String> {
        self.requests.lock().expect("request log lock").clone()
    }
}

impl HttpClient for ScriptedClient {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        self.requests
            .lock()
            .expect("request log lock")
            .push(request.url);
        let response = self
            .responses
            .lock()
            .expect("response script lock")
            .pop_front()
            .unwrap_or_else(|| Ok(HttpResponse::ok_json(REPORT_BODY)));
        Box::pin(async move { response })
    }
}
