//! Derived financial ratios for one fiscal period.
//!
//! Pure arithmetic over parsed numeric fields. Every division is null-safe:
//! a ratio is `None` whenever an operand is missing or the denominator is
//! zero, and the JSON output carries `null` for it.

use serde::Serialize;
use serde_json::Value;

use crate::report::numeric_field;

/// The fixed set of computed metrics attached to each enhanced report.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialMetrics {
    // Profitability
    pub gross_profit_margin: Option<f64>,
    pub operating_margin: Option<f64>,
    pub net_profit_margin: Option<f64>,
    pub return_on_assets: Option<f64>,
    pub return_on_equity: Option<f64>,

    // Liquidity
    pub current_ratio: Option<f64>,
    pub quick_ratio: Option<f64>,
    pub working_capital: Option<f64>,

    // Leverage
    pub debt_to_equity: Option<f64>,
    pub debt_to_assets: Option<f64>,
    pub equity_ratio: Option<f64>,

    // Cash flow
    pub free_cash_flow: Option<f64>,
    pub free_cash_flow_to_revenue: Option<f64>,
    pub cash_flow_to_debt: Option<f64>,

    // Per share
    pub earnings_per_share: Option<f64>,
    pub book_value_per_share: Option<f64>,
    pub cash_per_share: Option<f64>,

    // Growth vs the previous period, filled in by the assembly pass.
    pub revenue_growth: Option<f64>,
    pub net_income_growth: Option<f64>,
    pub eps_growth: Option<f64>,

    // Efficiency
    pub asset_turnover: Option<f64>,
    pub inventory_turnover: Option<f64>,

    // Other
    pub ebitda_margin: Option<f64>,
    pub interest_coverage: Option<f64>,
}

/// Null-safe division.
fn div(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    match (numerator, denominator) {
        (Some(n), Some(d)) if d != 0.0 => Some(n / d),
        _ => None,
    }
}

/// Null-safe division expressed as a percentage.
fn pct(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    div(numerator, denominator).map(|v| v * 100.0)
}

/// Compute the metric set for one period from the four matching statements.
pub fn compute(income: &Value, balance: &Value, cash_flow: &Value, earnings: &Value) -> FinancialMetrics {
    let revenue = numeric_field(income, "totalRevenue");
    let net_income = numeric_field(income, "netIncome");
    let total_assets = numeric_field(balance, "totalAssets");
    let equity = numeric_field(balance, "totalShareholderEquity");
    let current_assets = numeric_field(balance, "totalCurrentAssets");
    let current_liabilities = numeric_field(balance, "totalCurrentLiabilities");
    let long_term_debt = numeric_field(balance, "longTermDebt");
    let inventory = numeric_field(balance, "inventory");
    let cash = numeric_field(balance, "cashAndCashEquivalentsAtCarryingValue");
    let shares = numeric_field(balance, "commonStockSharesOutstanding");
    let operating_cash_flow = numeric_field(cash_flow, "operatingCashflow");
    let capex = numeric_field(cash_flow, "capitalExpenditures");
    let eps = numeric_field(earnings, "reportedEPS");

    let free_cash_flow = match (operating_cash_flow, capex) {
        (Some(ocf), Some(capex)) => Some(ocf - capex.abs()),
        _ => None,
    };

    let quick_ratio = match (current_assets, current_liabilities) {
        // Missing inventory counts as zero rather than voiding the ratio.
        (Some(assets), Some(liabilities)) if liabilities != 0.0 => {
            Some((assets - inventory.unwrap_or(0.0)) / liabilities)
        }
        _ => None,
    };

    let working_capital = match (current_assets, current_liabilities) {
        (Some(assets), Some(liabilities)) => Some(assets - liabilities),
        _ => None,
    };

    let interest_coverage = match (
        numeric_field(income, "operatingIncome"),
        numeric_field(income, "interestExpense"),
    ) {
        (Some(operating), Some(interest)) if interest != 0.0 => Some(operating / interest.abs()),
        _ => None,
    };

    FinancialMetrics {
        gross_profit_margin: pct(numeric_field(income, "grossProfit"), revenue),
        operating_margin: pct(numeric_field(income, "operatingIncome"), revenue),
        net_profit_margin: pct(net_income, revenue),
        return_on_assets: pct(net_income, total_assets),
        return_on_equity: pct(net_income, equity),

        current_ratio: div(current_assets, current_liabilities),
        quick_ratio,
        working_capital,

        debt_to_equity: div(long_term_debt, equity),
        debt_to_assets: div(long_term_debt, total_assets),
        equity_ratio: div(equity, total_assets),

        free_cash_flow,
        free_cash_flow_to_revenue: pct(free_cash_flow, revenue),
        cash_flow_to_debt: div(operating_cash_flow, long_term_debt),

        earnings_per_share: eps,
        book_value_per_share: div(equity, shares),
        cash_per_share: div(cash, shares),

        revenue_growth: None,
        net_income_growth: None,
        eps_growth: None,

        asset_turnover: div(revenue, total_assets),
        inventory_turnover: div(numeric_field(income, "costOfRevenue"), inventory),

        ebitda_margin: pct(numeric_field(income, "ebitda"), revenue),
        interest_coverage,
    }
}

/// Period-over-period growth in percent. `None` unless both values are
/// present and the previous one is non-zero.
pub fn growth(current: Option<f64>, previous: Option<f64>) -> Option<f64> {
    match (current, previous) {
        (Some(cur), Some(prev)) if prev != 0.0 => Some((cur - prev) / prev * 100.0),
        _ => None,
    }
}
