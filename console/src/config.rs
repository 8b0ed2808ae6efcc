use crate::api::RetryPolicy;
use crate::store::ResponseOrdering;
use anyhow::{Context, Result};
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub poll_interval_secs: u64,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub request_timeout_secs: u64, // 0 = no timeout, the retry budget is the only bound
    pub trading_status: String,    // status value that means the run is trading
    pub transcript_width: usize,
    pub transcript_height: usize, // lines shown per redraw
    pub response_ordering: ResponseOrdering,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            poll_interval_secs: 5,
            retry_attempts: 3,
            retry_delay_ms: 1000,
            request_timeout_secs: 0,
            trading_status: "trading".to_string(),
            transcript_width: 100,
            transcript_height: 40,
            response_ordering: ResponseOrdering::DiscardStale,
        }
    }
}

impl Config {
    /// Load config from a specific .env file, or the default `.env` if None.
    pub fn from_env_file(path: Option<&str>) -> Result<Self> {
        match path {
            Some(p) => {
                dotenvy::from_filename(p).with_context(|| format!("Load config file {p}"))?;
            }
            None => {
                dotenvy::dotenv().ok();
            }
        }
        Self::build_from_env()
    }

    fn build_from_env() -> Result<Self> {
        let d = Self::default();
        let ordering = env("RESPONSE_ORDERING", "discard-stale");

        Ok(Self {
            api_url: env("API_URL", DEFAULT_API_URL).trim_end_matches('/').to_string(),
            poll_interval_secs: env("POLL_INTERVAL_SECS", "5").parse().unwrap_or(d.poll_interval_secs).max(1),
            retry_attempts: env("RETRY_ATTEMPTS", "3").parse().unwrap_or(d.retry_attempts).max(1),
            retry_delay_ms: env("RETRY_DELAY_MS", "1000").parse().unwrap_or(d.retry_delay_ms),
            request_timeout_secs: env("REQUEST_TIMEOUT_SECS", "0").parse().unwrap_or(0),
            trading_status: env("TRADING_STATUS", "trading"),
            transcript_width: env("TRANSCRIPT_WIDTH", "100").parse().unwrap_or(d.transcript_width),
            transcript_height: env("TRANSCRIPT_HEIGHT", "40").parse().unwrap_or(d.transcript_height),
            response_ordering: ordering
                .parse::<ResponseOrdering>()
                .with_context(|| format!("Invalid RESPONSE_ORDERING: {ordering}"))?,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.retry_attempts,
            delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }
}

fn env(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
