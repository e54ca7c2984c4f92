//! Configuration management for the compounder screener.
//!
//! The screener reads a single configuration file at `~/.compounder/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (COMPOUNDER_* prefix)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `COMPOUNDER_MARKET` → screener.market
//! - `COMPOUNDER_TICKERS` → screener.tickers (comma separated)
//! - `COMPOUNDER_MAX_TICKERS` → screener.max_tickers
//! - `COMPOUNDER_TOP_N` → screener.top_n
//! - `COMPOUNDER_CONCURRENCY` → screener.concurrency
//! - `COMPOUNDER_INCLUDE_DIAGNOSTICS` → screener.include_diagnostics
//! - `COMPOUNDER_CACHE_PATH` → cache.path
//! - `COMPOUNDER_CACHE_TTL_DAYS` → cache.ttl_days
//! - `COMPOUNDER_LOG_LEVEL` → observability.log_level
//! - `COMPOUNDER_LOG_FORMAT` → observability.log_format

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".compounder"),
        |dirs| dirs.home_dir().join(".compounder"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Run scope (market, tickers, ranking)
    #[serde(default)]
    pub screener: ScreenerConfig,

    /// Pass/fail thresholds
    #[serde(default)]
    pub filters: FilterConfig,

    /// Snapshot cache
    #[serde(default)]
    pub cache: CacheConfig,

    /// Upstream fetch behaviour
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Ticker lists per market (e.g. "us", "th")
    #[serde(default)]
    pub universes: HashMap<String, Vec<String>>,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup (environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(market) = lookup("COMPOUNDER_MARKET") {
            self.screener.market = market.trim().to_lowercase();
        }
        if let Some(tickers) = lookup("COMPOUNDER_TICKERS") {
            let parsed = parse_ticker_list(&tickers);
            if !parsed.is_empty() {
                self.screener.tickers = Some(parsed);
            }
        }
        if let Some(max) = lookup("COMPOUNDER_MAX_TICKERS") {
            if let Ok(n) = max.trim().parse() {
                self.screener.max_tickers = Some(n);
            }
        }
        if let Some(top) = lookup("COMPOUNDER_TOP_N") {
            if let Ok(n) = top.trim().parse() {
                self.screener.top_n = n;
            }
        }
        if let Some(workers) = lookup("COMPOUNDER_CONCURRENCY") {
            if let Ok(n) = workers.trim().parse() {
                self.screener.concurrency = n;
            }
        }
        if let Some(flag) = lookup("COMPOUNDER_INCLUDE_DIAGNOSTICS") {
            if let Some(on) = parse_flag(&flag) {
                self.screener.include_diagnostics = on;
            }
        }
        if let Some(path) = lookup("COMPOUNDER_CACHE_PATH") {
            self.cache.path = PathBuf::from(path);
        }
        if let Some(days) = lookup("COMPOUNDER_CACHE_TTL_DAYS") {
            if let Ok(d) = days.trim().parse() {
                self.cache.ttl_days = d;
            }
        }
        if let Some(level) = lookup("COMPOUNDER_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = lookup("COMPOUNDER_LOG_FORMAT") {
            self.observability.log_format = format;
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Split a comma/whitespace separated ticker list, upper-casing symbols.
pub fn parse_ticker_list(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_uppercase)
        .collect()
}

// ============================================================================
// Observability
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Screener Scope
// ============================================================================

/// Which tickers to scan and how many results to keep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenerConfig {
    /// Market selector, a key into `universes`
    #[serde(default = "default_market")]
    pub market: String,

    /// Explicit ticker override; replaces the market universe when set
    #[serde(default)]
    pub tickers: Option<Vec<String>>,

    /// Cap on the resolved universe size
    #[serde(default)]
    pub max_tickers: Option<usize>,

    /// Number of ranked rows to return
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// Worker count for the fetch/derive pool
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Keep every evaluated row with its criteria in the result
    #[serde(default)]
    pub include_diagnostics: bool,
}

impl Default for ScreenerConfig {
    fn default() -> Self {
        Self {
            market: default_market(),
            tickers: None,
            max_tickers: None,
            top_n: default_top_n(),
            concurrency: default_concurrency(),
            include_diagnostics: false,
        }
    }
}

fn default_market() -> String {
    "us".into()
}

fn default_top_n() -> usize {
    20
}

fn default_concurrency() -> usize {
    4
}

// ============================================================================
// Filter Thresholds
// ============================================================================

/// Pass/fail thresholds, all in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// ROIC must be strictly greater than this
    #[serde(default = "default_min_roic")]
    pub min_roic: f64,

    /// Operating margin must be strictly greater than this
    #[serde(default = "default_min_operating_margin")]
    pub min_operating_margin: f64,

    /// Share count must have shrunk by at least this much over 3 years
    #[serde(default = "default_min_buyback")]
    pub min_buyback: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_roic: default_min_roic(),
            min_operating_margin: default_min_operating_margin(),
            min_buyback: default_min_buyback(),
        }
    }
}

fn default_min_roic() -> f64 {
    15.0
}

fn default_min_operating_margin() -> f64 {
    15.0
}

fn default_min_buyback() -> f64 {
    1.0
}

// ============================================================================
// Cache
// ============================================================================

/// Snapshot cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Path to the SQLite snapshot database
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,

    /// Maximum snapshot age in days before it is refetched
    #[serde(default = "default_ttl_days")]
    pub ttl_days: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
            ttl_days: default_ttl_days(),
        }
    }
}

fn default_cache_path() -> PathBuf {
    config_dir().join("snapshots.db")
}

fn default_ttl_days() -> i64 {
    7
}

/// Upper bound accepted for `cache.ttl_days` (100 years).
pub const MAX_TTL_DAYS: i64 = 36_500;

// ============================================================================
// Fetch
// ============================================================================

/// Upstream fetch and retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Additional attempts after the first failure
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Pre-request courtesy delay and backoff base, in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound of the random jitter added to each backoff, in milliseconds
    #[serde(default = "default_jitter_max_ms")]
    pub jitter_max_ms: u64,

    /// Timeout for a single upstream request, in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Years of daily price history requested for dividend yields
    #[serde(default = "default_history_years")]
    pub history_years: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            jitter_max_ms: default_jitter_max_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            history_years: default_history_years(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_jitter_max_ms() -> u64 {
    250
}

fn default_request_timeout_secs() -> u64 {
    20
}

fn default_history_years() -> u32 {
    8
}

// ============================================================================
// Tests
// ============================================================================
