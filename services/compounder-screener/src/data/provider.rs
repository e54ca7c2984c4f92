//! Data provider abstraction for fundamentals and prices.
//!
//! Defines the `FundamentalDataSource` trait that upstream sources implement,
//! along with the raw (pre-normalization) shapes they return.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

// ============================================================================
// Provider Error
// ============================================================================

/// Errors returned by data sources.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Network error (connection failed, reset)
    #[error("Network error: {0}")]
    Network(String),

    /// Rate limit exceeded
    #[error("Rate limited{}", retry_hint(.retry_after_secs))]
    RateLimited { retry_after_secs: Option<u64> },

    /// Data not available for the requested ticker
    #[error("Data not available: {0}")]
    DataNotAvailable(String),

    /// Response could not be decoded
    #[error("Parse error: {0}")]
    Parse(String),

    /// Request exceeded its deadline
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Internal provider error
    #[error("Internal error: {0}")]
    Internal(String),
}

fn retry_hint(retry_after_secs: &Option<u64>) -> String {
    retry_after_secs
        .map(|secs| format!(", retry after {} seconds", secs))
        .unwrap_or_default()
}

impl ProviderError {
    /// Check if the error is likely transient.
    ///
    /// The fetcher retries every failure regardless; this only feeds logging.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::RateLimited { .. } | Self::Timeout(_)
        )
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else if e.is_decode() {
            Self::Parse(e.to_string())
        } else if e.status().map(|s| s.as_u16()) == Some(429) {
            Self::RateLimited { retry_after_secs: None }
        } else {
            Self::Network(e.to_string())
        }
    }
}

// ============================================================================
// Request Shapes
// ============================================================================

/// Financial statement families served by the time-series endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Statement {
    Financials,
    BalanceSheet,
    CashFlow,
}

impl Statement {
    /// Upstream field names requested for this statement.
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            Self::Financials => &[
                "TotalRevenue",
                "OperatingRevenue",
                "NetIncomeCommonStockholders",
                "NetIncome",
                "DilutedEPS",
                "BasicEPS",
                "DilutedAverageShares",
            ],
            Self::BalanceSheet => &[
                "StockholdersEquity",
                "LongTermDebtAndCapitalLeaseObligation",
                "LongTermDebt",
                "TotalDebt",
                "CashCashEquivalentsAndShortTermInvestments",
                "CashAndCashEquivalents",
                "OrdinarySharesNumber",
                "ShareIssued",
            ],
            Self::CashFlow => &["OperatingCashFlow", "CapitalExpenditure", "FreeCashFlow"],
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Financials => write!(f, "financials"),
            Self::BalanceSheet => write!(f, "balance-sheet"),
            Self::CashFlow => write!(f, "cash-flow"),
        }
    }
}

/// Reporting frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Annual,
    Quarterly,
}

impl Frequency {
    /// Prefix used by the time-series endpoint (e.g. "annualTotalRevenue").
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Annual => "annual",
            Self::Quarterly => "quarterly",
        }
    }
}

// ============================================================================
// Raw Shapes
// ============================================================================

/// A date exactly as the upstream delivered it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DateInput {
    /// Calendar date
    Date(NaiveDate),
    /// Instant
    DateTime(DateTime<Utc>),
    /// Unix epoch, seconds or milliseconds
    Epoch(f64),
    /// Free-form date text
    Text(String),
}

/// One raw statement row: a date and whatever numeric fields were reported,
/// keyed by lower-camel field name (e.g. "totalRevenue", "dilutedEPS").
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub date: DateInput,
    pub values: HashMap<String, f64>,
}

impl RawRow {
    pub fn new(date: DateInput) -> Self {
        Self {
            date,
            values: HashMap::new(),
        }
    }

    /// Builder-style insert, mainly for tests and adapters.
    pub fn with(mut self, key: &str, value: f64) -> Self {
        self.values.insert(key.to_string(), value);
        self
    }

    /// A finite value for `key`.
    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied().filter(|v| v.is_finite())
    }

    /// First finite value along a fallback chain of keys.
    pub fn first_of(&self, keys: &[&str]) -> Option<f64> {
        keys.iter().find_map(|k| self.get(k))
    }
}

/// One daily price observation. Dividend-only events carry no close.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceBar {
    pub date: DateInput,
    pub close: Option<f64>,
    pub dividends: Option<f64>,
}

/// Point-in-time quote and statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuoteSummary {
    /// Operating margin as a fraction
    pub operating_margin: Option<f64>,
    /// Trailing dividend yield as a fraction
    pub dividend_yield: Option<f64>,
    pub shares_outstanding: Option<f64>,
    pub current_price: Option<f64>,
    pub market_cap: Option<f64>,
}

/// Everything fetched for one ticker before normalization.
#[derive(Debug, Clone, Default)]
pub struct RawBundle {
    pub quote: QuoteSummary,
    pub financials: Vec<RawRow>,
    pub balance_sheet: Vec<RawRow>,
    pub cash_flow: Vec<RawRow>,
    pub quarterly_balance_sheet: Vec<RawRow>,
    pub history: Vec<PriceBar>,
}

// ============================================================================
// Data Source Trait
// ============================================================================

/// Trait for fundamentals/quote data sources.
#[async_trait]
pub trait FundamentalDataSource: Send + Sync {
    /// Source name for logging (e.g., "yahoo")
    fn name(&self) -> &'static str;

    /// Point-in-time quote and statistics.
    async fn quote_summary(&self, ticker: &str) -> Result<QuoteSummary, ProviderError>;

    /// Statement rows reported since `period_start`.
    async fn fundamentals_time_series(
        &self,
        ticker: &str,
        period_start: NaiveDate,
        frequency: Frequency,
        statement: Statement,
    ) -> Result<Vec<RawRow>, ProviderError>;

    /// Daily closes and dividend events between `start` and `end`.
    async fn daily_history(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, ProviderError>;
}

// ============================================================================
// Tests
// ============================================================================
