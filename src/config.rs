// Transcription relay configuration
//
// This module contains configuration structures and constants for the relay and
// the client workflow. It centralizes all configuration parameters and provides
// defaults from environment variables.

use std::env;
use std::time::Duration;

use crate::backoff::BackoffStrategy;
use crate::error::ClientError;

/// Default values for configuration
pub mod defaults {
    // Relay bind address
    pub const HOST: &str = "127.0.0.1";
    pub const PORT: u16 = 8080;

    // Upstream request timeouts, in seconds
    pub const UPLOAD_TIMEOUT_SECONDS: u64 = 60;
    pub const STATUS_TIMEOUT_SECONDS: u64 = 30;
    pub const TRANSCRIBE_TIMEOUT_SECONDS: u64 = 1800;

    // Max upload size accepted by the relay (512MB)
    pub const MAX_UPLOAD_SIZE: usize = 536870912;

    // Start-time retention for progress estimation
    pub const PROGRESS_RETENTION_HOURS: u64 = 24;
    pub const PROGRESS_CLEANUP_INTERVAL_HOURS: u64 = 1;

    // Files above this size are transcribed asynchronously (4MB)
    pub const LONG_FILE_THRESHOLD_BYTES: u64 = 4 * 1024 * 1024;

    // Delay before retrying a failed status check
    pub const STATUS_RETRY_DELAY_SECONDS: u64 = 5;

    pub const METRICS_BACKEND: &str = "prometheus";
}

/// Environment variable names
pub mod env_vars {
    pub const API_ENDPOINT: &str = "API_ENDPOINT";
    pub const API_KEY: &str = "API_KEY";
    pub const HOST: &str = "RELAY_HOST";
    pub const PORT: &str = "RELAY_PORT";
    pub const WORKERS: &str = "HTTP_WORKER_NUMBER";
    pub const UPLOAD_TIMEOUT: &str = "RELAY_UPLOAD_TIMEOUT_SECONDS";
    pub const STATUS_TIMEOUT: &str = "RELAY_STATUS_TIMEOUT_SECONDS";
    pub const TRANSCRIBE_TIMEOUT: &str = "RELAY_TRANSCRIBE_TIMEOUT_SECONDS";
    pub const MAX_UPLOAD_SIZE: &str = "MAX_UPLOAD_SIZE";
    pub const PROGRESS_RETENTION: &str = "PROGRESS_RETENTION_HOURS";
    pub const PROGRESS_CLEANUP_INTERVAL: &str = "PROGRESS_CLEANUP_INTERVAL_HOURS";
    pub const METRICS_BACKEND: &str = "METRICS_BACKEND";
    pub const STATUS_RETRY_DELAY: &str = "STATUS_RETRY_DELAY_SECONDS";
    pub const LONG_FILE_THRESHOLD: &str = "LONG_FILE_THRESHOLD_BYTES";
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Endpoint and key used for one upstream call
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiCredentials {
    /// Base URL of the upstream service, without the `/api` suffix
    pub endpoint: String,
    pub api_key: String,
}

impl ApiCredentials {
    pub fn new<E: Into<String>, K: Into<String>>(endpoint: E, api_key: K) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }

    /// Resolve credentials, caller-supplied values first, then defaults
    pub fn resolve(
        endpoint: Option<&str>,
        api_key: Option<&str>,
        default_endpoint: Option<&str>,
        default_api_key: Option<&str>,
    ) -> Result<Self, ClientError> {
        let pick = |primary: Option<&str>, fallback: Option<&str>| {
            primary
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .or_else(|| fallback.map(str::trim).filter(|s| !s.is_empty()))
                .map(str::to_string)
        };

        let endpoint = pick(endpoint, default_endpoint)
            .ok_or_else(|| ClientError::Configuration("API endpoint missing".to_string()))?;
        let api_key = pick(api_key, default_api_key)
            .ok_or_else(|| ClientError::Configuration("API key missing".to_string()))?;

        Ok(Self { endpoint, api_key })
    }
}

/// Configuration of the relay server and its upstream calls
#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Process-wide default upstream endpoint
    pub api_endpoint: Option<String>,
    /// Process-wide default upstream key
    pub api_key: Option<String>,
    pub host: String,
    pub port: u16,
    /// Number of HTTP workers, 0 for one per CPU
    pub workers: usize,
    pub upload_timeout: Duration,
    pub status_timeout: Duration,
    pub transcribe_timeout: Duration,
    pub max_upload_size: usize,
    pub progress_retention: Duration,
    pub progress_cleanup_interval: Duration,
    /// Metrics exporter ("prometheus" or "none")
    pub metrics_backend: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            api_endpoint: env_non_empty(env_vars::API_ENDPOINT),
            api_key: env_non_empty(env_vars::API_KEY),
            host: env::var(env_vars::HOST).unwrap_or_else(|_| String::from(defaults::HOST)),
            port: env_parse(env_vars::PORT, defaults::PORT),
            workers: env_parse(env_vars::WORKERS, 0),
            upload_timeout: Duration::from_secs(env_parse(
                env_vars::UPLOAD_TIMEOUT,
                defaults::UPLOAD_TIMEOUT_SECONDS,
            )),
            status_timeout: Duration::from_secs(env_parse(
                env_vars::STATUS_TIMEOUT,
                defaults::STATUS_TIMEOUT_SECONDS,
            )),
            transcribe_timeout: Duration::from_secs(env_parse(
                env_vars::TRANSCRIBE_TIMEOUT,
                defaults::TRANSCRIBE_TIMEOUT_SECONDS,
            )),
            max_upload_size: env_parse(env_vars::MAX_UPLOAD_SIZE, defaults::MAX_UPLOAD_SIZE),
            progress_retention: Duration::from_secs(
                env_parse(env_vars::PROGRESS_RETENTION, defaults::PROGRESS_RETENTION_HOURS)
                    * 3600,
            ),
            progress_cleanup_interval: Duration::from_secs(
                env_parse(
                    env_vars::PROGRESS_CLEANUP_INTERVAL,
                    defaults::PROGRESS_CLEANUP_INTERVAL_HOURS,
                )
                .max(1)
                    * 3600,
            ),
            metrics_backend: env::var(env_vars::METRICS_BACKEND)
                .unwrap_or_else(|_| String::from(defaults::METRICS_BACKEND)),
        }
    }
}

impl RelayConfig {
    /// Credentials for a request, header values taking precedence
    pub fn credentials(
        &self,
        endpoint: Option<&str>,
        api_key: Option<&str>,
    ) -> Result<ApiCredentials, ClientError> {
        ApiCredentials::resolve(
            endpoint,
            api_key,
            self.api_endpoint.as_deref(),
            self.api_key.as_deref(),
        )
    }

    /// Worker count handed to the HTTP server
    pub fn worker_count(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get()
        } else {
            self.workers
        }
    }
}

/// Timeouts applied by upstream clients
#[derive(Clone, Copy, Debug)]
pub struct Timeouts {
    pub upload: Duration,
    pub status: Duration,
    pub transcribe: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            upload: Duration::from_secs(defaults::UPLOAD_TIMEOUT_SECONDS),
            status: Duration::from_secs(defaults::STATUS_TIMEOUT_SECONDS),
            transcribe: Duration::from_secs(defaults::TRANSCRIBE_TIMEOUT_SECONDS),
        }
    }
}

impl From<&RelayConfig> for Timeouts {
    fn from(config: &RelayConfig) -> Self {
        Self {
            upload: config.upload_timeout,
            status: config.status_timeout,
            transcribe: config.transcribe_timeout,
        }
    }
}

/// Configuration of the client-side poller
#[derive(Clone, Debug)]
pub struct PollingConfig {
    /// Delay after a failed status request
    pub status_retry_delay: Duration,
    /// Delay between checks of a running job
    pub strategy: BackoffStrategy,
    /// Files larger than this are transcribed asynchronously
    pub long_file_threshold: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            status_retry_delay: Duration::from_secs(env_parse(
                env_vars::STATUS_RETRY_DELAY,
                defaults::STATUS_RETRY_DELAY_SECONDS,
            )),
            strategy: BackoffStrategy::fixed(),
            long_file_threshold: env_parse(
                env_vars::LONG_FILE_THRESHOLD,
                defaults::LONG_FILE_THRESHOLD_BYTES,
            ),
        }
    }
}

impl PollingConfig {
    pub fn with_strategy(mut self, strategy: BackoffStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn is_long_file(&self, size: u64) -> bool {
        size > self.long_file_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_credentials_take_precedence() {
        let creds = ApiCredentials::resolve(
            Some("https://caller"),
            Some("caller-key"),
            Some("https://default"),
            Some("default-key"),
        )
        .unwrap();
        assert_eq!(creds, ApiCredentials::new("https://caller", "caller-key"));
    }

    #[test]
    fn test_defaults_fill_missing_values() {
        let creds =
            ApiCredentials::resolve(None, Some("  "), Some("https://default"), Some("k")).unwrap();
        assert_eq!(creds, ApiCredentials::new("https://default", "k"));
    }

    #[test]
    fn test_missing_configuration_fails_fast() {
        let err = ApiCredentials::resolve(Some("https://x"), None, None, None).unwrap_err();
        assert!(matches!(err, ClientError::Configuration(_)));

        let err = ApiCredentials::resolve(None, Some("k"), None, None).unwrap_err();
        assert!(matches!(err, ClientError::Configuration(_)));
    }

    #[test]
    fn test_long_file_threshold() {
        let config = PollingConfig {
            status_retry_delay: Duration::from_secs(5),
            strategy: BackoffStrategy::fixed(),
            long_file_threshold: defaults::LONG_FILE_THRESHOLD_BYTES,
        };
        assert!(!config.is_long_file(4 * 1024 * 1024));
        assert!(config.is_long_file(4 * 1024 * 1024 + 1));
    }
}
