//! Process configuration from environment variables (with `.env` support).

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Runtime configuration shared by the server binary and the service.
#[derive(Debug, Clone)]
pub struct Config {
    /// Credential pool A (comma-separated `FINSTAT_KEYS_A`). Required.
    pub keys_a: Vec<String>,
    /// Credential pool B (`FINSTAT_KEYS_B`). Falls back to pool A's keys so
    /// a single-pool deployment still has a well-formed second pool.
    pub keys_b: Vec<String>,
    pub cache_dir: PathBuf,
    pub cache_ttl: Duration,
    pub bind: String,
    pub base_url: String,
    /// Optional quota phrase override (`FINSTAT_QUOTA_PHRASES`).
    pub quota_phrases: Option<Vec<String>>,
}

impl Config {
    /// Load configuration from the environment, reading `.env` first.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let keys_a = csv_list(&env_or_default("FINSTAT_KEYS_A", ""));
        if keys_a.is_empty() {
            return Err(ConfigError::MissingKeys);
        }

        let keys_b = match std::env::var("FINSTAT_KEYS_B") {
            Ok(raw) if !csv_list(&raw).is_empty() => csv_list(&raw),
            _ => keys_a.clone(),
        };

        let ttl_hours = env_or_default("FINSTAT_CACHE_EXPIRATION_HOURS", "24");
        let ttl_hours: u64 = ttl_hours
            .parse()
            .map_err(|_| ConfigError::InvalidValue {
                name: "FINSTAT_CACHE_EXPIRATION_HOURS",
                value: ttl_hours.clone(),
            })?;

        Ok(Self {
            keys_a,
            keys_b,
            cache_dir: PathBuf::from(env_or_default("FINSTAT_CACHE_DIR", "./cache")),
            cache_ttl: Duration::from_secs(ttl_hours * 60 * 60),
            bind: env_or_default("FINSTAT_BIND", "0.0.0.0:3000"),
            base_url: env_or_default("FINSTAT_BASE_URL", crate::fetcher::DEFAULT_BASE_URL),
            quota_phrases: std::env::var("FINSTAT_QUOTA_PHRASES")
                .ok()
                .map(|raw| csv_list(&raw))
                .filter(|phrases| !phrases.is_empty()),
        })
    }
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_owned())
}

fn csv_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_list_trims_and_drops_empties() {
        assert_eq!(csv_list(" k1 , k2 ,, k3 "), vec!["k1", "k2", "k3"]);
        assert_eq!(csv_list(""), Vec::<String>::new());
    }
}
