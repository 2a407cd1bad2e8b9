//! Core contracts for finstat.
//!
//! This crate contains:
//! - Ticker validation and the report/statement model
//! - Credential pools with round-robin selection and pool switching
//! - The free-text quota-error classifier
//! - The single-flight access gate (cooldown + FIFO queue)
//! - The five-call fetch sequence orchestrator
//! - Ratio metrics and enhanced-report assembly
//! - The TTL cache over raw report payloads

pub mod cache;
pub mod config;
pub mod enhance;
pub mod error;
pub mod fetcher;
pub mod gate;
pub mod http_client;
pub mod keypool;
pub mod metrics;
pub mod quota;
pub mod report;
pub mod service;
pub mod ticker;

pub use cache::{CacheStats, CacheStore, FileCache, MemoryCache, DEFAULT_TTL};
pub use config::Config;
pub use enhance::{build_combined, CombinedReport, EnhancedReport, RawData, RawSeries};
pub use error::{CacheError, ConfigError, FetchError, ValidationError};
pub use fetcher::{Fetcher, DEFAULT_BASE_URL};
pub use gate::{AccessGate, GatePermit, GateStatus, COOLDOWN};
pub use http_client::{HttpClient, HttpError, HttpRequest, HttpResponse, NoopHttpClient, ReqwestHttpClient};
pub use keypool::{CredentialPool, KeyRing, PoolId, PoolStatus};
pub use metrics::FinancialMetrics;
pub use quota::{QuotaMatcher, DEFAULT_QUOTA_PHRASES};
pub use report::{numeric_field, ReportKind, StatementBundle, REPORT_SEQUENCE};
pub use service::{FinancialService, ServiceInitError};
pub use ticker::Ticker;
