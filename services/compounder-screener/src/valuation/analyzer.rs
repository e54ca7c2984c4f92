//! Valuation engine.
//!
//! Profitability, capital allocation and intrinsic value metrics over a
//! [`TickerSnapshot`]. Every metric is optional: missing inputs or too-short
//! series yield `None` rather than an error.

use super::growth::growth_stats;
use super::types::{DcfConfig, DcfValuation};
use crate::data::{CashFlowRow, TickerSnapshot};

/// Quarterly points spanning three years back from the latest.
const QUARTERS_3Y: usize = 13;
/// Annual points spanning three years back from the latest.
const YEARS_3Y: usize = 4;

/// Computes ROIC, free cash flow, share-count trend and DCF value.
#[derive(Debug, Clone, Default)]
pub struct ValuationEngine {
    dcf: DcfConfig,
}

impl ValuationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return on invested capital (%): the latest financial row's net income
    /// over `equity + debt - cash` from the latest balance sheet. Undefined
    /// when the latest row reports no net income.
    pub fn roic_percent(&self, snapshot: &TickerSnapshot) -> Option<f64> {
        let net_income = snapshot.financials.last()?.net_income?;
        let sheet = snapshot.latest_balance_sheet()?;
        let equity = sheet.stockholders_equity?;

        let invested = equity + sheet.debt() - sheet.cash();
        if invested <= 0.0 {
            return None;
        }
        let roic = net_income / invested * 100.0;
        roic.is_finite().then_some(roic)
    }

    /// Free cash flow per annual row, ascending by date.
    pub fn free_cash_flow_series(&self, snapshot: &TickerSnapshot) -> Vec<f64> {
        snapshot.cash_flow.iter().filter_map(row_free_cash_flow).collect()
    }

    /// Share count change (%) over three years; negative means buybacks.
    ///
    /// Prefers quarterly counts (13 points), falling back to annual diluted
    /// average shares (4 points).
    pub fn share_change_3y_percent(&self, snapshot: &TickerSnapshot) -> Option<f64> {
        let quarterly: Vec<f64> = snapshot
            .quarterly_shares
            .iter()
            .filter_map(|r| r.shares())
            .collect();
        if let Some(change) = change_over(&quarterly, QUARTERS_3Y) {
            return Some(change);
        }

        let annual = snapshot.financial_values(|r| r.diluted_average_shares);
        change_over(&annual, YEARS_3Y)
    }

    /// Growth assumption (fraction) for the DCF projection.
    ///
    /// CAGR of the trailing positive FCF points, else the default growth,
    /// clamped to the configured range.
    pub fn growth_assumption(&self, fcf: &[f64]) -> f64 {
        let positive: Vec<f64> = fcf.iter().copied().filter(|v| *v > 0.0).collect();
        let tail = &positive[positive.len().saturating_sub(self.dcf.growth_lookback)..];

        let growth = if tail.len() >= 2 {
            growth_stats(tail)
                .cagr_percent
                .map(|p| p / 100.0)
                .unwrap_or(self.dcf.default_growth)
        } else {
            self.dcf.default_growth
        };
        growth.clamp(self.dcf.min_growth, self.dcf.max_growth)
    }

    /// Two-stage DCF intrinsic value per share.
    ///
    /// Requires at least two FCF points, a positive latest FCF and a positive
    /// share count. Non-finite or non-positive results are discarded.
    pub fn dcf(&self, snapshot: &TickerSnapshot, fcf: &[f64]) -> Option<DcfValuation> {
        if fcf.len() < 2 {
            return None;
        }
        let latest = *fcf.last()?;
        if latest <= 0.0 {
            return None;
        }
        let shares = snapshot
            .shares_outstanding
            .filter(|s| *s > 0.0)
            .or_else(|| snapshot.latest_quarterly_shares().filter(|s| *s > 0.0))?;

        let growth_rate = self.growth_assumption(fcf);
        let r = self.dcf.discount_rate;
        let tg = self.dcf.terminal_growth;

        let mut cash_flow = latest;
        let mut pv_cash_flows = 0.0;
        for year in 1..=self.dcf.projection_years {
            cash_flow *= 1.0 + growth_rate;
            pv_cash_flows += cash_flow / (1.0 + r).powi(year as i32);
        }

        let terminal = cash_flow * (1.0 + tg) / (r - tg);
        let pv_terminal = terminal / (1.0 + r).powi(self.dcf.projection_years as i32);
        let equity_value = pv_cash_flows + pv_terminal;
        let intrinsic_value = equity_value / shares;

        if !intrinsic_value.is_finite() || intrinsic_value <= 0.0 {
            return None;
        }

        Some(DcfValuation {
            growth_rate,
            pv_cash_flows,
            pv_terminal,
            equity_value,
            shares,
            intrinsic_value,
        })
    }

    /// Upside (%) of intrinsic value over a positive current price.
    pub fn upside_percent(&self, intrinsic_value: f64, current_price: Option<f64>) -> Option<f64> {
        let price = current_price.filter(|p| *p > 0.0 && p.is_finite())?;
        let upside = (intrinsic_value / price - 1.0) * 100.0;
        upside.is_finite().then_some(upside)
    }
}

/// Explicit FCF, else operating cash flow net of capex. Capex reported
/// negative is an outflow already and is added; positive capex is subtracted.
fn row_free_cash_flow(row: &CashFlowRow) -> Option<f64> {
    if let Some(fcf) = row.free_cash_flow {
        return Some(fcf);
    }
    let ocf = row.operating_cash_flow?;
    let capex = row.capital_expenditure?;
    Some(if capex < 0.0 { ocf + capex } else { ocf - capex })
}

/// `(latest / values[len - span] - 1) * 100` when `span` points exist and
/// the earlier value is positive.
fn change_over(values: &[f64], span: usize) -> Option<f64> {
    if values.len() < span {
        return None;
    }
    let earlier = values[values.len() - span];
    let latest = *values.last()?;
    if earlier <= 0.0 {
        return None;
    }
    Some((latest / earlier - 1.0) * 100.0)
}
