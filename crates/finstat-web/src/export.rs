//! Consolidated spreadsheet export of every cached symbol.
//!
//! One CSV row per symbol per fiscal year, with grouped category headers in
//! the first row and field names in the second, mirroring the statement /
//! balance / cash-flow / metrics / company-info column layout of the JSON
//! API.

use serde_json::Value;

use finstat_core::{numeric_field, StatementBundle, Ticker};

use crate::error::ApiError;
use crate::routes::AppState;

/// Column group sizes: (label, field names).
const GROUPS: &[(&str, &[&str])] = &[
    ("", &["Symbol", "Year"]),
    (
        "Income Statement",
        &[
            "Total_Revenue",
            "Gross_Profit",
            "Operating_Income",
            "Net_Income",
            "EBITDA",
            "EPS",
        ],
    ),
    (
        "Balance Sheet",
        &[
            "Total_Assets",
            "Current_Assets",
            "Total_Liabilities",
            "Current_Liabilities",
            "Long_Term_Debt",
            "Shareholder_Equity",
        ],
    ),
    (
        "Cash Flow",
        &[
            "Cash_Equivalents",
            "Operating_Cash_Flow",
            "Capital_Expenditures",
            "Free_Cash_Flow",
            "Investing_Cash_Flow",
            "Financing_Cash_Flow",
        ],
    ),
    (
        "Metrics",
        &[
            "Gross_Profit_Margin",
            "Operating_Margin",
            "Net_Profit_Margin",
            "ROA",
            "ROE",
            "EBITDA_Margin",
            "Current_Ratio",
            "Quick_Ratio",
            "Debt_to_Equity",
            "Debt_to_Assets",
            "Asset_Turnover",
            "Revenue_Growth_YoY",
            "Net_Income_Growth_YoY",
            "EPS_Growth_YoY",
        ],
    ),
    (
        "Company Info",
        &[
            "Company_Name",
            "Sector",
            "Industry",
            "Market_Cap",
            "PE_Ratio",
            "Dividend_Yield",
        ],
    ),
];

/// Build the consolidated CSV for every fully-cached symbol.
///
/// Symbols missing any of the five cached reports are skipped; per-symbol
/// rows cover at most `years_back` fiscal years.
pub async fn consolidated_csv(state: &AppState, years_back: usize) -> Result<String, ApiError> {
    let symbols = state.service.cache().symbols().await?;

    let mut out = String::new();
    write_group_header(&mut out);
    write_field_header(&mut out);

    for symbol in symbols {
        let Ok(ticker) = Ticker::parse(&symbol) else {
            continue;
        };
        let Some(bundle) = cached_bundle(state, &ticker).await? else {
            continue;
        };
        append_symbol_rows(&mut out, &ticker, &bundle, years_back);
    }

    Ok(out)
}

async fn cached_bundle(
    state: &AppState,
    ticker: &Ticker,
) -> Result<Option<StatementBundle>, ApiError> {
    let cache = state.service.cache();
    let mut payloads = Vec::with_capacity(5);
    for kind in finstat_core::REPORT_SEQUENCE {
        match cache.get(ticker, kind).await? {
            Some(payload) => payloads.push(payload),
            None => return Ok(None),
        }
    }

    let mut payloads = payloads.into_iter();
    Ok(Some(StatementBundle {
        income: payloads.next().unwrap_or(Value::Null),
        balance: payloads.next().unwrap_or(Value::Null),
        cash_flow: payloads.next().unwrap_or(Value::Null),
        earnings: payloads.next().unwrap_or(Value::Null),
        overview: payloads.next().unwrap_or(Value::Null),
    }))
}

fn append_symbol_rows(out: &mut String, ticker: &Ticker, bundle: &StatementBundle, years_back: usize) {
    let income = annual_reports(&bundle.income, "annualReports");
    let balance = annual_reports(&bundle.balance, "annualReports");
    let cash_flow = annual_reports(&bundle.cash_flow, "annualReports");
    let earnings = annual_reports(&bundle.earnings, "annualEarnings");
    let overview = &bundle.overview;

    let max_years = years_back
        .min(income.len())
        .min(balance.len())
        .min(cash_flow.len());

    for i in 0..max_years {
        let empty = Value::Null;
        let income_report = income.get(i).unwrap_or(&empty);
        let balance_report = balance.get(i).unwrap_or(&empty);
        let cash_flow_report = cash_flow.get(i).unwrap_or(&empty);
        let earnings_report = earnings.get(i).unwrap_or(&empty);

        let year = income_report
            .get("fiscalDateEnding")
            .and_then(Value::as_str)
            .and_then(|date| date.get(..4))
            .unwrap_or("");

        let ocf = field_or_zero(cash_flow_report, "operatingCashflow");
        let capex = field_or_zero(cash_flow_report, "capitalExpenditures");

        let mut cells: Vec<String> = Vec::with_capacity(40);
        cells.push(csv_text(ticker.as_str()));
        cells.push(csv_text(year));

        // Income statement
        for field in ["totalRevenue", "grossProfit", "operatingIncome", "netIncome", "ebitda"] {
            cells.push(csv_number(field_or_zero(income_report, field)));
        }
        cells.push(csv_number(field_or_zero(earnings_report, "reportedEPS")));

        // Balance sheet
        for field in [
            "totalAssets",
            "totalCurrentAssets",
            "totalLiabilities",
            "totalCurrentLiabilities",
            "longTermDebt",
            "totalShareholderEquity",
        ] {
            cells.push(csv_number(field_or_zero(balance_report, field)));
        }

        // Cash flow
        cells.push(csv_number(field_or_zero(
            balance_report,
            "cashAndCashEquivalentsAtCarryingValue",
        )));
        cells.push(csv_number(ocf));
        cells.push(csv_number(capex));
        cells.push(csv_number(ocf - capex.abs()));
        cells.push(csv_number(field_or_zero(cash_flow_report, "cashflowFromInvestment")));
        cells.push(csv_number(field_or_zero(cash_flow_report, "cashflowFromFinancing")));

        // Metrics (zero-defaulted division, matching the rest of the sheet)
        cells.push(csv_number(safe_ratio(income_report, "grossProfit", income_report, "totalRevenue")));
        cells.push(csv_number(safe_ratio(income_report, "operatingIncome", income_report, "totalRevenue")));
        cells.push(csv_number(safe_ratio(income_report, "netIncome", income_report, "totalRevenue")));
        cells.push(csv_number(safe_ratio(income_report, "netIncome", balance_report, "totalAssets")));
        cells.push(csv_number(safe_ratio(income_report, "netIncome", balance_report, "totalShareholderEquity")));
        cells.push(csv_number(safe_ratio(income_report, "ebitda", income_report, "totalRevenue")));
        cells.push(csv_number(safe_ratio(
            balance_report,
            "totalCurrentAssets",
            balance_report,
            "totalCurrentLiabilities",
        )));
        cells.push(csv_number(quick_ratio(balance_report)));
        cells.push(csv_number(safe_ratio(
            balance_report,
            "longTermDebt",
            balance_report,
            "totalShareholderEquity",
        )));
        cells.push(csv_number(safe_ratio(balance_report, "totalLiabilities", balance_report, "totalAssets")));
        cells.push(csv_number(safe_ratio(income_report, "totalRevenue", balance_report, "totalAssets")));

        // Growth vs the next-older report in the raw arrays
        cells.push(csv_number(year_growth(&income, i, "totalRevenue")));
        cells.push(csv_number(year_growth(&income, i, "netIncome")));
        cells.push(csv_number(year_growth(&earnings, i, "reportedEPS")));

        // Company info, identical on every row for the symbol
        cells.push(csv_text(text_field(overview, "Name")));
        cells.push(csv_text(text_field(overview, "Sector")));
        cells.push(csv_text(text_field(overview, "Industry")));
        cells.push(csv_number(field_or_zero(overview, "MarketCapitalization")));
        cells.push(csv_number(field_or_zero(overview, "PERatio")));
        cells.push(csv_number(field_or_zero(overview, "DividendYield")));

        out.push_str(&cells.join(","));
        out.push('\n');
    }
}

fn write_group_header(out: &mut String) {
    let mut cells = Vec::new();
    for (label, fields) in GROUPS {
        cells.push(csv_text(label));
        cells.extend(std::iter::repeat(String::new()).take(fields.len() - 1));
    }
    out.push_str(&cells.join(","));
    out.push('\n');
}

fn write_field_header(out: &mut String) {
    let cells: Vec<String> = GROUPS
        .iter()
        .flat_map(|(_, fields)| fields.iter().map(|f| csv_text(f)))
        .collect();
    out.push_str(&cells.join(","));
    out.push('\n');
}

fn annual_reports(payload: &Value, field: &str) -> Vec<Value> {
    payload
        .get(field)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn field_or_zero(report: &Value, field: &str) -> f64 {
    numeric_field(report, field).unwrap_or(0.0)
}

fn text_field<'a>(report: &'a Value, field: &str) -> &'a str {
    report.get(field).and_then(Value::as_str).unwrap_or("")
}

/// Zero-defaulted division used throughout the sheet.
fn safe_ratio(num_report: &Value, num_field: &str, den_report: &Value, den_field: &str) -> f64 {
    let numerator = field_or_zero(num_report, num_field);
    let denominator = field_or_zero(den_report, den_field);
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

fn quick_ratio(balance_report: &Value) -> f64 {
    let current_assets = field_or_zero(balance_report, "totalCurrentAssets");
    let inventory = field_or_zero(balance_report, "inventory");
    let current_liabilities = field_or_zero(balance_report, "totalCurrentLiabilities");
    if current_liabilities == 0.0 {
        0.0
    } else {
        (current_assets - inventory) / current_liabilities
    }
}

/// Growth against the next-older entry of the raw (newest-first) array.
fn year_growth(reports: &[Value], i: usize, field: &str) -> f64 {
    let Some(previous) = reports.get(i + 1) else {
        return 0.0;
    };
    let current = field_or_zero(&reports[i], field);
    let previous = field_or_zero(previous, field);
    if previous == 0.0 {
        0.0
    } else {
        (current - previous) / previous
    }
}

fn csv_text(value: &str) -> String {
    if value.contains(',') || value.contains('"') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_owned()
    }
}

fn csv_number(value: f64) -> String {
    if value == value.trunc() && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value:.4}")
    }
}
