//! Key-value cache for raw report payloads, keyed by `(ticker, report kind)`.
//!
//! Entries expire after a configurable window (default 24 hours); expired
//! entries are deleted on read. The cache is an independent resource with no
//! coordination with the access gate — a fresh hit bypasses the gate
//! entirely.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::debug;

use crate::error::CacheError;
use crate::report::ReportKind;
use crate::Ticker;

/// Default entry lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Cache population summary for startup logging and the status surface.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub total_entries: usize,
    pub unique_symbols: usize,
    pub symbols: Vec<String>,
}

/// Async key-value store for raw report payloads.
pub trait CacheStore: Send + Sync {
    /// Non-expired payload for `(ticker, kind)`, or `None`.
    fn get<'a>(
        &'a self,
        ticker: &'a Ticker,
        kind: ReportKind,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Value>, CacheError>> + Send + 'a>>;

    fn put<'a>(
        &'a self,
        ticker: &'a Ticker,
        kind: ReportKind,
        payload: &'a Value,
    ) -> Pin<Box<dyn Future<Output = Result<(), CacheError>> + Send + 'a>>;

    /// Delete one kind, or all kinds for the ticker when `kind` is `None`.
    /// Returns the number of entries removed.
    fn delete<'a>(
        &'a self,
        ticker: &'a Ticker,
        kind: Option<ReportKind>,
    ) -> Pin<Box<dyn Future<Output = Result<u64, CacheError>> + Send + 'a>>;

    /// Distinct symbols with at least one cached entry (expired or not).
    fn symbols<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, CacheError>> + Send + 'a>>;

    fn stats<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<CacheStats, CacheError>> + Send + 'a>>;
}

/// On-disk JSON document wrapping one cached payload.
#[derive(Debug, Serialize, Deserialize)]
struct CacheEnvelope {
    symbol: String,
    kind: ReportKind,
    fetched_at: String,
    payload: Value,
}

/// One JSON file per `(kind, ticker)` entry in a cache directory.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
    ttl: Duration,
}

impl FileCache {
    /// Create the cache directory if needed.
    pub fn open(dir: impl Into<PathBuf>, ttl: Duration) -> Result<Self, CacheError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, ttl })
    }

    fn entry_path(&self, ticker: &Ticker, kind: ReportKind) -> PathBuf {
        self.dir
            .join(format!("{}_{}.json", kind.as_str(), ticker.as_str()))
    }

    fn read_entry(&self, path: &Path) -> Result<Option<CacheEnvelope>, CacheError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(error.into()),
        };
        Ok(Some(serde_json::from_str(&text)?))
    }

    fn is_expired(&self, envelope: &CacheEnvelope) -> bool {
        let Ok(fetched_at) = OffsetDateTime::parse(&envelope.fetched_at, &Rfc3339) else {
            // An unreadable timestamp is treated as stale.
            return true;
        };
        let age = OffsetDateTime::now_utc() - fetched_at;
        age.as_seconds_f64() > self.ttl.as_secs_f64()
    }

    fn symbol_of(file_name: &str) -> Option<String> {
        let stem = file_name.strip_suffix(".json")?;
        let (kind, symbol) = stem.split_once('_')?;
        ReportKind::parse(kind).ok()?;
        Some(symbol.to_owned())
    }

    fn list_symbols(&self) -> Result<Vec<String>, CacheError> {
        let mut symbols: Vec<String> = std::fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter_map(|name| Self::symbol_of(&name))
            .collect();
        symbols.sort_unstable();
        symbols.dedup();
        Ok(symbols)
    }
}

impl CacheStore for FileCache {
    fn get<'a>(
        &'a self,
        ticker: &'a Ticker,
        kind: ReportKind,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Value>, CacheError>> + Send + 'a>> {
        Box::pin(async move {
            let path = self.entry_path(ticker, kind);
            let Some(envelope) = self.read_entry(&path)? else {
                return Ok(None);
            };

            if self.is_expired(&envelope) {
                debug!(%ticker, kind = %kind, "cache entry expired, deleting");
                let _ = std::fs::remove_file(&path);
                return Ok(None);
            }

            Ok(Some(envelope.payload))
        })
    }

    fn put<'a>(
        &'a self,
        ticker: &'a Ticker,
        kind: ReportKind,
        payload: &'a Value,
    ) -> Pin<Box<dyn Future<Output = Result<(), CacheError>> + Send + 'a>> {
        Box::pin(async move {
            let envelope = CacheEnvelope {
                symbol: ticker.as_str().to_owned(),
                kind,
                fetched_at: OffsetDateTime::now_utc()
                    .format(&Rfc3339)
                    .unwrap_or_default(),
                payload: payload.clone(),
            };
            let text = serde_json::to_string_pretty(&envelope)?;
            std::fs::write(self.entry_path(ticker, kind), text)?;
            Ok(())
        })
    }

    fn delete<'a>(
        &'a self,
        ticker: &'a Ticker,
        kind: Option<ReportKind>,
    ) -> Pin<Box<dyn Future<Output = Result<u64, CacheError>> + Send + 'a>> {
        Box::pin(async move {
            let kinds: Vec<ReportKind> = match kind {
                Some(kind) => vec![kind],
                None => crate::report::REPORT_SEQUENCE.to_vec(),
            };

            let mut removed = 0;
            for kind in kinds {
                let path = self.entry_path(ticker, kind);
                match std::fs::remove_file(&path) {
                    Ok(()) => removed += 1,
                    Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
                    Err(error) => return Err(error.into()),
                }
            }
            Ok(removed)
        })
    }

    fn symbols<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, CacheError>> + Send + 'a>> {
        Box::pin(async move { self.list_symbols() })
    }

    fn stats<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<CacheStats, CacheError>> + Send + 'a>> {
        Box::pin(async move {
            let total_entries = std::fs::read_dir(&self.dir)?
                .filter_map(|entry| entry.ok())
                .filter_map(|entry| entry.file_name().into_string().ok())
                .filter(|name| Self::symbol_of(name).is_some())
                .count();
            let symbols = self.list_symbols()?;
            Ok(CacheStats {
                total_entries,
                unique_symbols: symbols.len(),
                symbols,
            })
        })
    }
}

/// In-process cache with the same TTL semantics, for tests and cache-free
/// deployments.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<(String, ReportKind), (Instant, Value)>>,
    ttl: Option<Duration>,
}

impl MemoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: Some(ttl),
        }
    }
}

impl CacheStore for MemoryCache {
    fn get<'a>(
        &'a self,
        ticker: &'a Ticker,
        kind: ReportKind,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Value>, CacheError>> + Send + 'a>> {
        Box::pin(async move {
            let mut entries = self.entries.lock().expect("memory cache lock");
            let key = (ticker.as_str().to_owned(), kind);
            let (stored_at, payload) = match entries.get(&key) {
                Some((stored_at, payload)) => (*stored_at, payload.clone()),
                None => return Ok(None),
            };
            let expired = self
                .ttl
                .map(|ttl| stored_at.elapsed() > ttl)
                .unwrap_or(false);
            if expired {
                entries.remove(&key);
                return Ok(None);
            }
            Ok(Some(payload))
        })
    }

    fn put<'a>(
        &'a self,
        ticker: &'a Ticker,
        kind: ReportKind,
        payload: &'a Value,
    ) -> Pin<Box<dyn Future<Output = Result<(), CacheError>> + Send + 'a>> {
        Box::pin(async move {
            self.entries
                .lock()
                .expect("memory cache lock")
                .insert((ticker.as_str().to_owned(), kind), (Instant::now(), payload.clone()));
            Ok(())
        })
    }

    fn delete<'a>(
        &'a self,
        ticker: &'a Ticker,
        kind: Option<ReportKind>,
    ) -> Pin<Box<dyn Future<Output = Result<u64, CacheError>> + Send + 'a>> {
        Box::pin(async move {
            let mut entries = self.entries.lock().expect("memory cache lock");
            let before = entries.len();
            match kind {
                Some(kind) => {
                    entries.remove(&(ticker.as_str().to_owned(), kind));
                }
                None => entries.retain(|(symbol, _), _| symbol != ticker.as_str()),
            }
            Ok((before - entries.len()) as u64)
        })
    }

    fn symbols<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, CacheError>> + Send + 'a>> {
        Box::pin(async move {
            let entries = self.entries.lock().expect("memory cache lock");
            let mut symbols: Vec<String> = entries.keys().map(|(symbol, _)| symbol.clone()).collect();
            symbols.sort_unstable();
            symbols.dedup();
            Ok(symbols)
        })
    }

    fn stats<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<CacheStats, CacheError>> + Send + 'a>> {
        Box::pin(async move {
            let total_entries = self.entries.lock().expect("memory cache lock").len();
            let symbols = self.symbols().await?;
            Ok(CacheStats {
                total_entries,
                unique_symbols: symbols.len(),
                symbols,
            })
        })
    }
}
