use anyhow::{anyhow, Context, Result};
use dotenvy::dotenv;
use std::collections::HashMap;
use std::env;
use std::time::Duration;

use crate::domains::smart_media::activities::RefreshPolicy;
use crate::kernel::jobs::{BackoffStrategy, RetryPolicy, TaskQueueConfig, MAX_CONCURRENT_TASKS};

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub openai_api_key: String,
    pub openai_model: String,
    pub social_api_url: String,
    /// chain id -> JSON-RPC endpoint
    pub chain_rpc_urls: HashMap<u64, String>,
    pub queue: TaskQueueConfig,
    pub refresh: RefreshPolicy,
    pub refresh_cron: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let retry = RetryPolicy {
            backoff: env::var("RETRY_BACKOFF")
                .map(|v| v.parse::<BackoffStrategy>())
                .unwrap_or(Ok(BackoffStrategy::default()))?,
            base_delay: Duration::from_millis(parse_var("RETRY_BASE_DELAY_MS", 1_000)?),
            max_attempts: parse_optional_var("RETRY_MAX_ATTEMPTS")?,
            max_delay: parse_optional_var("RETRY_MAX_DELAY_MS")?.map(Duration::from_millis),
        };

        let refresh = RefreshPolicy {
            freeze_threshold_secs: parse_var(
                "FREEZE_THRESHOLD_SECS",
                RefreshPolicy::default().freeze_threshold_secs,
            )?,
            min_engagement: parse_var("MIN_ENGAGEMENT", RefreshPolicy::default().min_engagement)?,
        };

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            port: parse_var("PORT", 8080)?,
            openai_api_key: env::var("OPENAI_API_KEY").context("OPENAI_API_KEY must be set")?,
            openai_model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()),
            social_api_url: env::var("SOCIAL_API_URL").context("SOCIAL_API_URL must be set")?,
            chain_rpc_urls: parse_chain_rpc_urls(&env::var("CHAIN_RPC_URLS").unwrap_or_default())?,
            queue: TaskQueueConfig {
                max_concurrent: non_zero_concurrency(parse_var(
                    "MAX_CONCURRENT_TASKS",
                    MAX_CONCURRENT_TASKS,
                )?)?,
                retry,
            },
            refresh,
            refresh_cron: env::var("REFRESH_CRON").unwrap_or_else(|_| "0 */5 * * * *".to_string()),
        })
    }
}

/// A queue with no slots never starts a job.
fn non_zero_concurrency(max_concurrent: usize) -> Result<usize> {
    if max_concurrent == 0 {
        return Err(anyhow!("MAX_CONCURRENT_TASKS must be at least 1"));
    }
    Ok(max_concurrent)
}

fn parse_var<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| anyhow!("{} must be a valid number: {}", key, e)),
        Err(_) => Ok(default),
    }
}

fn parse_optional_var<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    env::var(key)
        .ok()
        .map(|raw| {
            raw.parse()
                .map_err(|e| anyhow!("{} must be a valid number: {}", key, e))
        })
        .transpose()
}

/// Parse `chain_id=url` pairs separated by commas.
pub fn parse_chain_rpc_urls(raw: &str) -> Result<HashMap<u64, String>> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (chain_id, url) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("CHAIN_RPC_URLS entry {:?} is not chain_id=url", pair))?;
            let chain_id = chain_id
                .trim()
                .parse::<u64>()
                .with_context(|| format!("invalid chain id in CHAIN_RPC_URLS: {}", chain_id))?;
            Ok((chain_id, url.trim().to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_rpc_urls_parse_pairs() {
        let urls =
            parse_chain_rpc_urls("8453=https://base.rpc, 1=https://eth.rpc,").unwrap();

        assert_eq!(urls.len(), 2);
        assert_eq!(urls[&8453], "https://base.rpc");
        assert_eq!(urls[&1], "https://eth.rpc");
    }

    #[test]
    fn empty_chain_rpc_urls_is_empty() {
        assert!(parse_chain_rpc_urls("").unwrap().is_empty());
    }

    #[test]
    fn malformed_chain_rpc_urls_are_rejected() {
        assert!(parse_chain_rpc_urls("https://base.rpc").is_err());
        assert!(parse_chain_rpc_urls("base=https://base.rpc").is_err());
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        assert!(non_zero_concurrency(0).is_err());
        assert_eq!(non_zero_concurrency(4).unwrap(), 4);
    }
}
