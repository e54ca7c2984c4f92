//! Normalization of raw upstream rows into canonical snapshot series.
//!
//! Raw statement rows arrive with dates in several shapes and with fields
//! that are present for some issuers and absent for others. This module
//! turns them into deduplicated, ascending, date-keyed series and derives
//! the yearly dividend yield series from daily history.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use std::collections::BTreeMap;

use super::provider::{DateInput, PriceBar, RawBundle, RawRow};
use super::{
    BalanceSheetRow, CashFlowRow, Dated, FinancialRow, SharesRow, TickerSnapshot,
    YearlyDividendYield, DIVIDEND_YIELD_YEARS, SNAPSHOT_SCHEMA_VERSION,
};

/// Epoch values below this are seconds, at or above it milliseconds.
const EPOCH_MILLIS_THRESHOLD: f64 = 1e12;

// Field fallback chains, most specific first.
const REVENUE: &[&str] = &["totalRevenue", "operatingRevenue"];
const NET_INCOME: &[&str] = &["netIncomeCommonStockholders", "netIncome"];
const DILUTED_EPS: &[&str] = &["dilutedEPS"];
const BASIC_EPS: &[&str] = &["basicEPS"];
const DILUTED_AVG_SHARES: &[&str] = &["dilutedAverageShares"];
const EQUITY: &[&str] = &["stockholdersEquity", "commonStockEquity"];
const LTD_AND_LEASES: &[&str] = &["longTermDebtAndCapitalLeaseObligation"];
const LTD: &[&str] = &["longTermDebt"];
const TOTAL_DEBT: &[&str] = &["totalDebt"];
const CASH_AND_STI: &[&str] = &["cashCashEquivalentsAndShortTermInvestments"];
const CASH: &[&str] = &["cashAndCashEquivalents", "cashFinancial"];
const OCF: &[&str] = &["operatingCashFlow", "cashFlowFromContinuingOperatingActivities"];
const CAPEX: &[&str] = &["capitalExpenditure"];
const FCF: &[&str] = &["freeCashFlow"];
const ORDINARY_SHARES: &[&str] = &["ordinarySharesNumber"];
const SHARES_ISSUED: &[&str] = &["shareIssued"];

// ============================================================================
// Dates
// ============================================================================

/// Normalize any supported date shape to a UTC calendar date.
///
/// Epoch numbers below 1e12 are seconds, otherwise milliseconds. Returns
/// `None` for unparseable or out-of-range input; such rows are dropped.
pub fn normalize_date(input: &DateInput) -> Option<NaiveDate> {
    match input {
        DateInput::Date(d) => Some(*d),
        DateInput::DateTime(dt) => Some(dt.date_naive()),
        DateInput::Epoch(n) => epoch_to_date(*n),
        DateInput::Text(s) => parse_date_text(s),
    }
}

fn epoch_to_date(value: f64) -> Option<NaiveDate> {
    if !value.is_finite() {
        return None;
    }
    let millis = if value.abs() < EPOCH_MILLIS_THRESHOLD {
        value * 1000.0
    } else {
        value
    };
    if millis.abs() > i64::MAX as f64 {
        return None;
    }
    DateTime::<Utc>::from_timestamp_millis(millis as i64).map(|dt| dt.date_naive())
}

fn parse_date_text(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc).date_naive());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    for fmt in ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%b %d, %Y", "%d %b %Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    None
}

// ============================================================================
// Series
// ============================================================================

/// Deduplicate rows by date (last occurrence wins) and sort ascending.
pub fn dedup_by_date<T: Dated>(rows: Vec<T>) -> Vec<T> {
    let mut by_date: BTreeMap<NaiveDate, T> = BTreeMap::new();
    for row in rows {
        by_date.insert(row.date(), row);
    }
    by_date.into_values().collect()
}

/// Map raw rows through `extract`, dropping undated and all-empty rows,
/// then dedup and sort.
fn normalize_series<T, F>(rows: &[RawRow], extract: F) -> Vec<T>
where
    T: Dated,
    F: Fn(NaiveDate, &RawRow) -> T,
{
    let parsed = rows
        .iter()
        .filter_map(|raw| normalize_date(&raw.date).map(|date| extract(date, raw)))
        .filter(|row| !row.is_empty())
        .collect();
    dedup_by_date(parsed)
}

pub fn normalize_financials(rows: &[RawRow]) -> Vec<FinancialRow> {
    normalize_series(rows, |date, raw| FinancialRow {
        date,
        revenue: raw.first_of(REVENUE),
        net_income: raw.first_of(NET_INCOME),
        diluted_eps: raw.first_of(DILUTED_EPS),
        basic_eps: raw.first_of(BASIC_EPS),
        diluted_average_shares: raw.first_of(DILUTED_AVG_SHARES),
    })
}

pub fn normalize_balance_sheet(rows: &[RawRow]) -> Vec<BalanceSheetRow> {
    normalize_series(rows, |date, raw| BalanceSheetRow {
        date,
        stockholders_equity: raw.first_of(EQUITY),
        long_term_debt_and_leases: raw.first_of(LTD_AND_LEASES),
        long_term_debt: raw.first_of(LTD),
        total_debt: raw.first_of(TOTAL_DEBT),
        cash_and_short_term_investments: raw.first_of(CASH_AND_STI),
        cash_and_equivalents: raw.first_of(CASH),
    })
}

pub fn normalize_cash_flow(rows: &[RawRow]) -> Vec<CashFlowRow> {
    normalize_series(rows, |date, raw| CashFlowRow {
        date,
        operating_cash_flow: raw.first_of(OCF),
        capital_expenditure: raw.first_of(CAPEX),
        free_cash_flow: raw.first_of(FCF),
    })
}

pub fn normalize_shares(rows: &[RawRow]) -> Vec<SharesRow> {
    normalize_series(rows, |date, raw| SharesRow {
        date,
        ordinary_shares: raw.first_of(ORDINARY_SHARES),
        shares_issued: raw.first_of(SHARES_ISSUED),
    })
}

// ============================================================================
// Dividend Yield
// ============================================================================

#[derive(Default)]
struct YearAccumulator {
    close_sum: f64,
    close_days: usize,
    dividends: f64,
}

/// Yearly dividend yield from daily history.
///
/// Per UTC calendar year: average close over days with a strictly positive
/// close, sum of dividends paid, yield = dividends / average close. Years
/// without a valid close are skipped. Only the most recent five years are
/// kept, ascending.
pub fn yearly_dividend_yields(history: &[PriceBar]) -> Vec<YearlyDividendYield> {
    let mut years: BTreeMap<i32, YearAccumulator> = BTreeMap::new();

    for bar in history {
        let Some(date) = normalize_date(&bar.date) else {
            continue;
        };
        let acc = years.entry(date.year()).or_default();
        if let Some(close) = bar.close.filter(|c| c.is_finite() && *c > 0.0) {
            acc.close_sum += close;
            acc.close_days += 1;
        }
        if let Some(div) = bar.dividends.filter(|d| d.is_finite()) {
            acc.dividends += div;
        }
    }

    let mut yields: Vec<YearlyDividendYield> = years
        .into_iter()
        .filter_map(|(year, acc)| {
            if acc.close_days == 0 {
                return None;
            }
            let avg_close = acc.close_sum / acc.close_days as f64;
            if avg_close <= 0.0 {
                return None;
            }
            Some(YearlyDividendYield {
                year,
                dividend_yield: acc.dividends / avg_close,
            })
        })
        .collect();

    if yields.len() > DIVIDEND_YIELD_YEARS {
        yields.drain(..yields.len() - DIVIDEND_YIELD_YEARS);
    }
    yields
}

// ============================================================================
// Snapshot
// ============================================================================

/// Build a normalized snapshot from everything fetched for a ticker.
pub fn build_snapshot(ticker: &str, raw: RawBundle) -> TickerSnapshot {
    let finite = |v: Option<f64>| v.filter(|x| x.is_finite());

    TickerSnapshot {
        schema_version: SNAPSHOT_SCHEMA_VERSION,
        ticker: ticker.to_string(),
        financials: normalize_financials(&raw.financials),
        balance_sheet: normalize_balance_sheet(&raw.balance_sheet),
        cash_flow: normalize_cash_flow(&raw.cash_flow),
        quarterly_shares: normalize_shares(&raw.quarterly_balance_sheet),
        yearly_dividend_yields: yearly_dividend_yields(&raw.history),
        operating_margin: finite(raw.quote.operating_margin),
        dividend_yield: finite(raw.quote.dividend_yield),
        shares_outstanding: finite(raw.quote.shares_outstanding),
        current_price: finite(raw.quote.current_price),
        market_cap: finite(raw.quote.market_cap),
    }
}

// ============================================================================
// Tests
// ============================================================================
