//! Configuration knobs for the client core.
//!
//! Mirrors the teacher's `Config` shape: a `#[serde(default)]`
//! struct-of-structs so embedders can hand in a partial JSON value (or
//! build one programmatically) and get sensible defaults for everything
//! they didn't set. Reading actual config *files* (`nuget.config`, project
//! files) stays out of scope; this only models in-memory tunables.

use std::time::Duration;

use serde::Deserialize;

const DEFAULT_METADATA_TTL_SECS: u64 = 30 * 60;
const DEFAULT_DISCOVERY_TTL_SECS: u64 = 24 * 60 * 60;
const DEFAULT_SERVICE_INDEX_TTL_SECS: u64 = 40 * 60;
const DEFAULT_DETECTION_TTL_SECS: u64 = 24 * 60 * 60;
const DEFAULT_REDIRECT_TTL_SECS: u64 = 24 * 60 * 60;

/// Top-level client configuration.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ClientConfig {
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub rate_limit: RateLimitConfig,
    pub cache: CacheConfig,
    pub http: HttpConfig,
}

impl ClientConfig {
    /// Parses configuration from an arbitrary JSON value, falling back to
    /// defaults for anything missing or malformed — same contract as
    /// `dependi_lsp::config::Config::from_init_options`.
    pub fn from_value(value: Option<serde_json::Value>) -> Self {
        match value {
            Some(v) => serde_json::from_value(v).unwrap_or_default(),
            None => Self::default(),
        }
    }
}

/// Retry policy (spec §4.3).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub backoff_factor: f64,
    pub max_backoff_ms: u64,
    pub jitter_factor: f64,
    pub max_retry_after_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 1_000,
            backoff_factor: 2.0,
            max_backoff_ms: 30_000,
            jitter_factor: 0.1,
            max_retry_after_secs: 300,
        }
    }
}

impl RetryConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn max_attempts(&self) -> u32 {
        1 + self.max_retries
    }
}

/// Circuit-breaker configuration (spec §4.3).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub max_failures: u32,
    pub timeout_secs: u64,
    pub max_half_open_requests: u32,
    /// Whether a terminal 5xx counts as a circuit failure when invoked via
    /// `do_with_retry` (spec §4.3, §9 Open Question #1). `429` never
    /// counts regardless of this flag.
    pub count_5xx_as_failure: bool,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            timeout_secs: 60,
            max_half_open_requests: 1,
            count_5xx_as_failure: true,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Token-bucket configuration (spec §4.3), applied per host.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub capacity: f64,
    pub refill_per_second: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { capacity: 10.0, refill_per_second: 5.0 }
    }
}

/// Cache TTLs and filesystem locations (spec §3, §6).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub metadata_ttl_secs: u64,
    pub discovery_ttl_secs: u64,
    pub service_index_ttl_secs: u64,
    pub detection_ttl_secs: u64,
    pub redirect_ttl_secs: u64,
    /// Byte budget for the in-memory tier.
    pub memory_budget_bytes: u64,
    /// Root directory for the on-disk content-addressed tier and the two
    /// persisted JSON maps. Defaults to `~/.gonuget`.
    pub root_dir: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            metadata_ttl_secs: DEFAULT_METADATA_TTL_SECS,
            discovery_ttl_secs: DEFAULT_DISCOVERY_TTL_SECS,
            service_index_ttl_secs: DEFAULT_SERVICE_INDEX_TTL_SECS,
            detection_ttl_secs: DEFAULT_DETECTION_TTL_SECS,
            redirect_ttl_secs: DEFAULT_REDIRECT_TTL_SECS,
            memory_budget_bytes: 64 * 1024 * 1024,
            root_dir: None,
        }
    }
}

impl CacheConfig {
    pub fn metadata_ttl(&self) -> Duration {
        Duration::from_secs(self.metadata_ttl_secs)
    }

    pub fn discovery_ttl(&self) -> Duration {
        Duration::from_secs(self.discovery_ttl_secs)
    }

    pub fn service_index_ttl(&self) -> Duration {
        Duration::from_secs(self.service_index_ttl_secs)
    }

    pub fn detection_ttl(&self) -> Duration {
        Duration::from_secs(self.detection_ttl_secs)
    }

    pub fn redirect_ttl(&self) -> Duration {
        Duration::from_secs(self.redirect_ttl_secs)
    }

    /// Resolves the on-disk root, defaulting to `~/.gonuget`.
    pub fn resolved_root_dir(&self) -> std::path::PathBuf {
        match &self.root_dir {
            Some(p) => std::path::PathBuf::from(p),
            None => dirs::home_dir().unwrap_or_else(|| std::path::PathBuf::from(".")).join(".gonuget"),
        }
    }
}

/// HTTP client-wide timeouts (spec §5).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
            user_agent: format!("nuget-client-core/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}
