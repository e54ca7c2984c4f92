//! Fundamentals data module.
//!
//! Everything between the upstream data source and a normalized
//! [`TickerSnapshot`]: the provider abstraction, the retrying fetcher,
//! normalization of raw statement rows, and the snapshot cache.
//!
//! # Data Flow
//!
//! ```text
//! SnapshotCache::get_or_fetch
//!   ├── hit (fresh, current schema) ──────────────────────────▶ TickerSnapshot
//!   └── miss / stale ─▶ RetryingFetcher ─▶ FundamentalDataSource
//!                          │  (quote, 3 annual statements, quarterly
//!                          │   balance sheet, daily history; concurrently)
//!                          └─▶ normalize::build_snapshot ─▶ SnapshotCache::set
//! ```

pub mod cache;
pub mod fetcher;
pub mod local_storage;
pub mod normalize;
pub mod provider;
pub mod universe;
pub mod yahoo;

pub use cache::{MemorySnapshotStore, SnapshotCache, SnapshotStore, StoredSnapshot};
pub use fetcher::{RetryConfig, RetryingFetcher};
pub use local_storage::SqliteSnapshotStore;
pub use normalize::{build_snapshot, dedup_by_date, normalize_date, yearly_dividend_yields};
pub use provider::{
    DateInput, Frequency, FundamentalDataSource, PriceBar, ProviderError, QuoteSummary, RawBundle,
    RawRow, Statement,
};
pub use universe::{StaticUniverse, TickerUniverse};
pub use yahoo::YahooFinanceSource;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Current snapshot layout version. Cached snapshots with any other
/// version are treated as misses.
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 2;

/// Number of most recent years kept in the yearly dividend yield series.
pub const DIVIDEND_YIELD_YEARS: usize = 5;

// ============================================================================
// Series Rows
// ============================================================================

/// A row in a date-keyed series.
pub trait Dated {
    /// Canonical row date.
    fn date(&self) -> NaiveDate;

    /// True when every numeric field is absent.
    fn is_empty(&self) -> bool;
}

/// Annual income statement row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialRow {
    pub date: NaiveDate,
    pub revenue: Option<f64>,
    pub net_income: Option<f64>,
    pub diluted_eps: Option<f64>,
    pub basic_eps: Option<f64>,
    pub diluted_average_shares: Option<f64>,
}

impl FinancialRow {
    /// Diluted EPS, falling back to basic EPS.
    pub fn eps(&self) -> Option<f64> {
        self.diluted_eps.or(self.basic_eps)
    }
}

impl Dated for FinancialRow {
    fn date(&self) -> NaiveDate {
        self.date
    }

    fn is_empty(&self) -> bool {
        self.revenue.is_none()
            && self.net_income.is_none()
            && self.diluted_eps.is_none()
            && self.basic_eps.is_none()
            && self.diluted_average_shares.is_none()
    }
}

/// Annual balance sheet row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceSheetRow {
    pub date: NaiveDate,
    pub stockholders_equity: Option<f64>,
    /// Long-term debt including capital lease obligations
    pub long_term_debt_and_leases: Option<f64>,
    pub long_term_debt: Option<f64>,
    pub total_debt: Option<f64>,
    /// Cash, cash equivalents and short-term investments
    pub cash_and_short_term_investments: Option<f64>,
    pub cash_and_equivalents: Option<f64>,
}

impl BalanceSheetRow {
    /// Debt for invested capital: lease-adjusted long-term debt, then plain
    /// long-term debt, then total debt, else zero.
    pub fn debt(&self) -> f64 {
        self.long_term_debt_and_leases
            .or(self.long_term_debt)
            .or(self.total_debt)
            .unwrap_or(0.0)
    }

    /// Cash for invested capital, preferring the broader figure, else zero.
    pub fn cash(&self) -> f64 {
        self.cash_and_short_term_investments
            .or(self.cash_and_equivalents)
            .unwrap_or(0.0)
    }
}

impl Dated for BalanceSheetRow {
    fn date(&self) -> NaiveDate {
        self.date
    }

    fn is_empty(&self) -> bool {
        self.stockholders_equity.is_none()
            && self.long_term_debt_and_leases.is_none()
            && self.long_term_debt.is_none()
            && self.total_debt.is_none()
            && self.cash_and_short_term_investments.is_none()
            && self.cash_and_equivalents.is_none()
    }
}

/// Annual cash flow statement row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashFlowRow {
    pub date: NaiveDate,
    pub operating_cash_flow: Option<f64>,
    /// Capital expenditure as reported; sign convention varies by source
    pub capital_expenditure: Option<f64>,
    pub free_cash_flow: Option<f64>,
}

impl Dated for CashFlowRow {
    fn date(&self) -> NaiveDate {
        self.date
    }

    fn is_empty(&self) -> bool {
        self.operating_cash_flow.is_none()
            && self.capital_expenditure.is_none()
            && self.free_cash_flow.is_none()
    }
}

/// Quarterly share count row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharesRow {
    pub date: NaiveDate,
    pub ordinary_shares: Option<f64>,
    pub shares_issued: Option<f64>,
}

impl SharesRow {
    /// Shares outstanding, preferring ordinary shares over shares issued.
    pub fn shares(&self) -> Option<f64> {
        self.ordinary_shares.or(self.shares_issued)
    }
}

impl Dated for SharesRow {
    fn date(&self) -> NaiveDate {
        self.date
    }

    fn is_empty(&self) -> bool {
        self.ordinary_shares.is_none() && self.shares_issued.is_none()
    }
}

/// Dividend yield for one calendar year, as a fraction of average close.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct YearlyDividendYield {
    pub year: i32,
    pub dividend_yield: f64,
}

// ============================================================================
// Ticker Snapshot
// ============================================================================

/// The complete normalized fundamentals/price bundle for one ticker.
///
/// Every series is deduplicated by date and sorted ascending. Point-in-time
/// ratios (operating margin, dividend yield) are fractions, as reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerSnapshot {
    #[serde(default)]
    pub schema_version: u32,
    pub ticker: String,
    #[serde(default)]
    pub financials: Vec<FinancialRow>,
    #[serde(default)]
    pub balance_sheet: Vec<BalanceSheetRow>,
    #[serde(default)]
    pub cash_flow: Vec<CashFlowRow>,
    #[serde(default)]
    pub quarterly_shares: Vec<SharesRow>,
    #[serde(default)]
    pub yearly_dividend_yields: Vec<YearlyDividendYield>,
    #[serde(default)]
    pub operating_margin: Option<f64>,
    #[serde(default)]
    pub dividend_yield: Option<f64>,
    #[serde(default)]
    pub shares_outstanding: Option<f64>,
    #[serde(default)]
    pub current_price: Option<f64>,
    #[serde(default)]
    pub market_cap: Option<f64>,
}

impl TickerSnapshot {
    /// Create an empty snapshot at the current schema version.
    pub fn empty(ticker: impl Into<String>) -> Self {
        Self {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            ticker: ticker.into(),
            financials: Vec::new(),
            balance_sheet: Vec::new(),
            cash_flow: Vec::new(),
            quarterly_shares: Vec::new(),
            yearly_dividend_yields: Vec::new(),
            operating_margin: None,
            dividend_yield: None,
            shares_outstanding: None,
            current_price: None,
            market_cap: None,
        }
    }

    /// Whether this snapshot was produced by the current normalizer.
    pub fn is_current_schema(&self) -> bool {
        self.schema_version == SNAPSHOT_SCHEMA_VERSION
    }

    /// Values of a financial-series field, skipping rows where it is absent.
    pub fn financial_values<F>(&self, field: F) -> Vec<f64>
    where
        F: Fn(&FinancialRow) -> Option<f64>,
    {
        self.financials.iter().filter_map(field).collect()
    }

    /// Latest balance sheet row, if any.
    pub fn latest_balance_sheet(&self) -> Option<&BalanceSheetRow> {
        self.balance_sheet.last()
    }

    /// Latest quarterly share count, if any.
    pub fn latest_quarterly_shares(&self) -> Option<f64> {
        self.quarterly_shares.iter().rev().find_map(SharesRow::shares)
    }
}

// ============================================================================
// Tests
// ============================================================================
