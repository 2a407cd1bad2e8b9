//! Assembly of the combined result: join the four statements per fiscal
//! period, attach computed metrics, and fill period-over-period growth.
//!
//! Periods are ordered newest first, so index 0 is always the latest period
//! and growth for entry `i` compares against entry `i + 1`.

use serde::Serialize;
use serde_json::{Map, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::metrics::{self, FinancialMetrics};
use crate::report::{numeric_field, StatementBundle};
use crate::Ticker;

/// One fiscal period with its raw statements and computed metrics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancedReport {
    /// Fiscal year ("2023") for annual entries, full fiscal date ending
    /// ("2023-09-30") for quarterly entries.
    pub period: String,
    pub fiscal_date_ending: Option<String>,
    pub income_statement: Value,
    pub balance_sheet: Value,
    pub cash_flow: Value,
    pub earnings: Value,
    pub calculated_metrics: FinancialMetrics,
}

/// Raw report arrays as returned upstream, keyed by fiscal year.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSeries {
    pub years: Vec<String>,
    pub reports: Vec<Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawData {
    pub income_statement: RawSeries,
    pub balance_sheet: RawSeries,
    pub cash_flow: RawSeries,
    pub earnings: RawSeries,
}

/// The combined per-ticker result returned to callers and cached consumers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedReport {
    pub symbol: String,
    pub fetched_at: String,
    pub company_overview: Value,
    pub years_available: usize,
    pub years: Vec<String>,
    pub annual_reports: Vec<EnhancedReport>,
    pub quarterly_reports: Vec<EnhancedReport>,
    pub raw_data: RawData,
}

/// Build the combined report from the five raw payloads.
pub fn build_combined(ticker: &Ticker, bundle: &StatementBundle) -> CombinedReport {
    let income_annual = report_array(&bundle.income, "annualReports");
    let balance_annual = report_array(&bundle.balance, "annualReports");
    let cash_flow_annual = report_array(&bundle.cash_flow, "annualReports");
    let earnings_annual = report_array(&bundle.earnings, "annualEarnings");

    let years = fiscal_years(&[
        &income_annual,
        &balance_annual,
        &cash_flow_annual,
        &earnings_annual,
    ]);

    let mut annual_reports: Vec<EnhancedReport> = years
        .iter()
        .map(|year| {
            enhanced_entry(
                year.clone(),
                find_by_prefix(&income_annual, year),
                find_by_prefix(&balance_annual, year),
                find_by_prefix(&cash_flow_annual, year),
                find_by_prefix(&earnings_annual, year),
            )
        })
        .collect();
    apply_growth(&mut annual_reports);

    let mut quarterly_reports = quarterly_series(bundle);
    apply_growth(&mut quarterly_reports);

    CombinedReport {
        symbol: ticker.as_str().to_owned(),
        fetched_at: OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default(),
        company_overview: bundle.overview.clone(),
        years_available: years.len(),
        years: years.clone(),
        annual_reports,
        quarterly_reports,
        raw_data: RawData {
            income_statement: raw_series(income_annual),
            balance_sheet: raw_series(balance_annual),
            cash_flow: raw_series(cash_flow_annual),
            earnings: raw_series(earnings_annual),
        },
    }
}

fn quarterly_series(bundle: &StatementBundle) -> Vec<EnhancedReport> {
    let income = report_array(&bundle.income, "quarterlyReports");
    let balance = report_array(&bundle.balance, "quarterlyReports");
    let cash_flow = report_array(&bundle.cash_flow, "quarterlyReports");
    let earnings = report_array(&bundle.earnings, "quarterlyEarnings");

    let mut periods: Vec<String> = [&income, &balance, &cash_flow, &earnings]
        .iter()
        .flat_map(|reports| reports.iter().filter_map(fiscal_date))
        .collect();
    periods.sort_unstable();
    periods.dedup();
    periods.reverse();

    periods
        .into_iter()
        .map(|period| {
            enhanced_entry(
                period.clone(),
                find_by_prefix(&income, &period),
                find_by_prefix(&balance, &period),
                find_by_prefix(&cash_flow, &period),
                find_by_prefix(&earnings, &period),
            )
        })
        .collect()
}

fn enhanced_entry(
    period: String,
    income: Value,
    balance: Value,
    cash_flow: Value,
    earnings: Value,
) -> EnhancedReport {
    let fiscal_date_ending = fiscal_date(&income)
        .or_else(|| fiscal_date(&balance))
        .or_else(|| fiscal_date(&cash_flow));
    let calculated_metrics = metrics::compute(&income, &balance, &cash_flow, &earnings);

    EnhancedReport {
        period,
        fiscal_date_ending,
        income_statement: income,
        balance_sheet: balance,
        cash_flow,
        earnings,
        calculated_metrics,
    }
}

/// Fill growth metrics by comparing each entry to the next-older one.
fn apply_growth(reports: &mut [EnhancedReport]) {
    for i in 0..reports.len().saturating_sub(1) {
        let current_revenue = numeric_field(&reports[i].income_statement, "totalRevenue");
        let previous_revenue = numeric_field(&reports[i + 1].income_statement, "totalRevenue");
        let current_income = numeric_field(&reports[i].income_statement, "netIncome");
        let previous_income = numeric_field(&reports[i + 1].income_statement, "netIncome");
        let current_eps = numeric_field(&reports[i].earnings, "reportedEPS");
        let previous_eps = numeric_field(&reports[i + 1].earnings, "reportedEPS");

        let metrics = &mut reports[i].calculated_metrics;
        metrics.revenue_growth = metrics::growth(current_revenue, previous_revenue);
        metrics.net_income_growth = metrics::growth(current_income, previous_income);
        metrics.eps_growth = metrics::growth(current_eps, previous_eps);
    }
}

/// Array-of-reports field from a raw payload, empty when absent.
fn report_array(payload: &Value, field: &str) -> Vec<Value> {
    payload
        .get(field)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn fiscal_date(report: &Value) -> Option<String> {
    report
        .get("fiscalDateEnding")
        .and_then(Value::as_str)
        .map(str::to_owned)
}

/// Union of fiscal years across statement arrays, newest first.
fn fiscal_years(series: &[&Vec<Value>]) -> Vec<String> {
    let mut years: Vec<String> = series
        .iter()
        .flat_map(|reports| {
            reports
                .iter()
                .filter_map(fiscal_date)
                .filter_map(|date| date.get(..4).map(str::to_owned))
        })
        .collect();
    years.sort_unstable();
    years.dedup();
    years.reverse();
    years
}

/// First report whose fiscal date starts with `prefix`, else an empty object.
fn find_by_prefix(reports: &[Value], prefix: &str) -> Value {
    reports
        .iter()
        .find(|report| {
            fiscal_date(report)
                .map(|date| date.starts_with(prefix))
                .unwrap_or(false)
        })
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new()))
}

fn raw_series(reports: Vec<Value>) -> RawSeries {
    let years = reports
        .iter()
        .filter_map(fiscal_date)
        .filter_map(|date| date.get(..4).map(str::to_owned))
        .collect();
    RawSeries { years, reports }
}
