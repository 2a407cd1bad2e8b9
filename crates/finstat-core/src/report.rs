use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ValidationError;

/// The five statement kinds fetched per ticker, in upstream call order.
pub const REPORT_SEQUENCE: [ReportKind; 5] = [
    ReportKind::Income,
    ReportKind::Balance,
    ReportKind::CashFlow,
    ReportKind::Earnings,
    ReportKind::Overview,
];

/// One kind of fundamental report served by the upstream API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    Income,
    Balance,
    CashFlow,
    Earnings,
    Overview,
}

impl ReportKind {
    /// Upstream query `function` parameter for this report kind.
    pub const fn function(self) -> &'static str {
        match self {
            Self::Income => "INCOME_STATEMENT",
            Self::Balance => "BALANCE_SHEET",
            Self::CashFlow => "CASH_FLOW",
            Self::Earnings => "EARNINGS",
            Self::Overview => "OVERVIEW",
        }
    }

    /// Cache key segment for this report kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Balance => "balance",
            Self::CashFlow => "cashflow",
            Self::Earnings => "earnings",
            Self::Overview => "overview",
        }
    }

    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        match input.trim().to_ascii_lowercase().as_str() {
            "income" => Ok(Self::Income),
            "balance" => Ok(Self::Balance),
            "cashflow" => Ok(Self::CashFlow),
            "earnings" => Ok(Self::Earnings),
            "overview" => Ok(Self::Overview),
            other => Err(ValidationError::InvalidReportKind {
                value: other.to_owned(),
            }),
        }
    }
}

impl Display for ReportKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The five raw payloads of a successful fetch sequence, passed by value.
#[derive(Debug, Clone)]
pub struct StatementBundle {
    pub income: Value,
    pub balance: Value,
    pub cash_flow: Value,
    pub earnings: Value,
    pub overview: Value,
}

impl StatementBundle {
    pub fn get(&self, kind: ReportKind) -> &Value {
        match kind {
            ReportKind::Income => &self.income,
            ReportKind::Balance => &self.balance,
            ReportKind::CashFlow => &self.cash_flow,
            ReportKind::Earnings => &self.earnings,
            ReportKind::Overview => &self.overview,
        }
    }
}

/// Extract a numeric field from a raw report object.
///
/// The upstream API encodes numbers as strings and marks unavailable values
/// with the literal token `"None"`; absent fields, `"None"`, empty strings,
/// and unparseable text all map to `None`.
pub fn numeric_field(report: &Value, field: &str) -> Option<f64> {
    match report.get(field)? {
        Value::Null => None,
        Value::Number(n) => n.as_f64(),
        Value::String(s) if s == "None" || s.is_empty() => None,
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
