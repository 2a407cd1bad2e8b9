use thiserror::Error;

use crate::report::ReportKind;

/// Validation errors for caller-supplied input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("ticker cannot be empty")]
    EmptyTicker,
    #[error("ticker length {len} exceeds max {max}")]
    TickerTooLong { len: usize, max: usize },
    #[error("ticker must start with an ASCII letter: '{ch}'")]
    TickerInvalidStart { ch: char },
    #[error("ticker contains invalid character '{ch}' at index {index}")]
    TickerInvalidChar { ch: char, index: usize },

    #[error("invalid report kind '{value}', expected one of income, balance, cashflow, earnings, overview")]
    InvalidReportKind { value: String },

    #[error("credential pool {pool} must contain at least one key")]
    EmptyCredentialPool { pool: &'static str },
}

/// Failure of a complete fetch sequence, as surfaced to callers.
///
/// A quota rejection on the first pool is recovered internally by switching
/// pools and is never visible here; only the terminal outcomes are.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("quota exhausted on both credential pools")]
    BothPoolsExhausted,

    #[error("upstream error on {kind} request: {message}")]
    Upstream { kind: ReportKind, message: String },

    #[error("transport failure on {kind} request: {message}")]
    Transport { kind: ReportKind, message: String },

    #[error("malformed {kind} payload: {source}")]
    Malformed {
        kind: ReportKind,
        #[source]
        source: serde_json::Error,
    },
}

/// Cache read/write errors. Write failures are logged by the service and
/// never abort a request that already has data in hand.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache io: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Process configuration errors raised at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("FINSTAT_KEYS_A must contain at least one API key")]
    MissingKeys,

    #[error("invalid value for {name}: '{value}'")]
    InvalidValue { name: &'static str, value: String },
}
