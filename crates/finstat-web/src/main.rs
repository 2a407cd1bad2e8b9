//! finstat HTTP server.
//!
//! Serves the financial data API backed by the file cache and the
//! gate-serialized upstream fetcher.

mod error;
mod export;
mod routes;

use std::process::ExitCode;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use finstat_core::{Config, FinancialService, ServiceInitError};

use crate::routes::{build_router, AppState};

#[derive(Debug, Error)]
enum ServerError {
    #[error(transparent)]
    Config(#[from] finstat_core::ConfigError),

    #[error(transparent)]
    Init(#[from] ServiceInitError),

    #[error("invalid bind address '{addr}': {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server terminated: {0}")]
    Serve(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), ServerError> {
    let config = Config::from_env()?;
    info!(
        bind = %config.bind,
        cache_dir = %config.cache_dir.display(),
        cache_ttl_hours = config.cache_ttl.as_secs() / 3600,
        pool_a = config.keys_a.len(),
        pool_b = config.keys_b.len(),
        "starting finstat server"
    );

    let service = Arc::new(FinancialService::from_config(&config)?);

    match service.cache().stats().await {
        Ok(stats) => info!(
            entries = stats.total_entries,
            symbols = stats.unique_symbols,
            "cache ready"
        ),
        Err(error) => warn!(%error, "cache statistics unavailable"),
    }

    let router = build_router(AppState { service });
    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .map_err(|source| ServerError::Bind {
            addr: config.bind.clone(),
            source,
        })?;

    info!(addr = %config.bind, "listening");
    axum::serve(listener, router).await?;
    Ok(())
}
