//! Free-text quota rejection detection.
//!
//! The upstream API reports quota exhaustion inside an otherwise-200 JSON
//! body (a `Note` or `Information` field) with no distinct error code, so
//! substring matching against known rejection phrases is the only detection
//! mechanism. False negatives are possible if the upstream wording changes;
//! the phrase list is injectable configuration for exactly that reason.

use serde_json::Value;

/// Rejection phrases shipped by default, matched case-insensitively.
///
/// Covers the daily-limit notice, the free-tier call-frequency notice, the
/// premium-plan upsell that accompanies both, and the generic phrasing.
pub const DEFAULT_QUOTA_PHRASES: &[&str] = &[
    "requests per day",
    "calls per minute",
    "premium plan",
    "higher api call volume",
    "rate limit",
];

/// Pure predicate over raw upstream payloads.
#[derive(Debug, Clone)]
pub struct QuotaMatcher {
    phrases: Vec<String>,
}

impl Default for QuotaMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_QUOTA_PHRASES.iter().map(|s| s.to_string()))
    }
}

impl QuotaMatcher {
    /// Build a matcher from a configured phrase list. Phrases are lowercased
    /// once here; empty phrases are dropped.
    pub fn new(phrases: impl IntoIterator<Item = String>) -> Self {
        Self {
            phrases: phrases
                .into_iter()
                .map(|p| p.trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// Whether a raw upstream payload is a quota/rate-limit rejection.
    ///
    /// `Null` payloads never match. String payloads are matched directly;
    /// anything else is serialized to JSON text first.
    pub fn is_quota_error(&self, payload: &Value) -> bool {
        let text = match payload {
            Value::Null => return false,
            Value::String(s) => s.clone(),
            other => match serde_json::to_string(other) {
                Ok(text) => text,
                Err(_) => return false,
            },
        };

        let lowered = text.to_lowercase();
        self.phrases.iter().any(|phrase| lowered.contains(phrase))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detects_daily_limit_notice() {
        let matcher = QuotaMatcher::default();
        let payload = json!({
            "Information": "Thank you for using Alpha Vantage! Our standard API rate limit is 25 requests per day."
        });
        assert!(matcher.is_quota_error(&payload));
    }

    #[test]
    fn detects_call_frequency_notice() {
        let matcher = QuotaMatcher::default();
        let payload = json!({
            "Note": "Thank you for using Alpha Vantage! Our standard API call frequency is 5 calls per minute and 500 calls per day."
        });
        assert!(matcher.is_quota_error(&payload));
    }

    #[test]
    fn matching_is_case_insensitive() {
        let matcher = QuotaMatcher::default();
        let payload = json!({ "Note": "RATE LIMIT exceeded" });
        assert!(matcher.is_quota_error(&payload));
    }

    #[test]
    fn matches_bare_string_payloads() {
        let matcher = QuotaMatcher::default();
        assert!(matcher.is_quota_error(&Value::String(
            "please subscribe to a premium plan".to_owned()
        )));
    }

    #[test]
    fn well_formed_report_does_not_match() {
        let matcher = QuotaMatcher::default();
        let payload = json!({
            "symbol": "IBM",
            "annualReports": [{ "fiscalDateEnding": "2023-12-31", "totalRevenue": "61860000000" }]
        });
        assert!(!matcher.is_quota_error(&payload));
    }

    #[test]
    fn null_and_empty_payloads_do_not_match() {
        let matcher = QuotaMatcher::default();
        assert!(!matcher.is_quota_error(&Value::Null));
        assert!(!matcher.is_quota_error(&Value::String(String::new())));
        assert!(!matcher.is_quota_error(&json!({})));
    }

    #[test]
    fn custom_phrase_list_overrides_defaults() {
        let matcher = QuotaMatcher::new(vec!["throttled".to_owned()]);
        assert!(matcher.is_quota_error(&json!({ "Note": "request throttled" })));
        assert!(!matcher.is_quota_error(&json!({ "Note": "rate limit exceeded" })));
    }
}
