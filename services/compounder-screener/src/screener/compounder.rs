//! Per-ticker compounder metrics.

use serde::{Deserialize, Serialize};

use crate::data::TickerSnapshot;
use crate::valuation::{growth_stats, GrowthStats, ValuationEngine};

use super::quantitative::QualityScorer;

/// Derived metrics for one ticker. Built fresh from a snapshot each run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompounderRow {
    pub ticker: String,
    pub revenue_growth: GrowthStats,
    pub net_income_growth: GrowthStats,
    pub eps_growth: GrowthStats,
    pub roic_percent: Option<f64>,
    pub latest_fcf: Option<f64>,
    pub fcf_growth_percent: Option<f64>,
    /// Negative means the share count shrank
    pub share_change_3y_percent: Option<f64>,
    pub operating_margin_percent: Option<f64>,
    pub dividend_yield_percent: Option<f64>,
    pub avg_dividend_yield_5y_percent: Option<f64>,
    /// Current yield relative to the five-year average
    pub relative_dividend_yield_percent: Option<f64>,
    pub intrinsic_value: Option<f64>,
    pub upside_percent: Option<f64>,
    pub current_price: Option<f64>,
    pub market_cap: Option<f64>,
    /// Composite quality score, 1-100
    pub score: u8,
}

impl CompounderRow {
    /// Derive every metric and the composite score from `snapshot`.
    pub fn from_snapshot(snapshot: &TickerSnapshot, engine: &ValuationEngine) -> Self {
        let revenue = snapshot.financial_values(|r| r.revenue);
        let net_income = snapshot.financial_values(|r| r.net_income);
        let eps = snapshot.financial_values(|r| r.eps());

        let fcf = engine.free_cash_flow_series(snapshot);
        let dcf = engine.dcf(snapshot, &fcf);
        let intrinsic_value = dcf.map(|d| d.intrinsic_value);
        let upside_percent =
            intrinsic_value.and_then(|iv| engine.upside_percent(iv, snapshot.current_price));

        let dividend_yield_percent = snapshot.dividend_yield.map(|y| y * 100.0);
        let avg_dividend_yield_5y_percent = average_yield_percent(snapshot);
        let relative_dividend_yield_percent = match (dividend_yield_percent, avg_dividend_yield_5y_percent) {
            (Some(current), Some(avg)) if avg > 0.0 => Some((current / avg - 1.0) * 100.0),
            _ => None,
        };

        let mut row = Self {
            ticker: snapshot.ticker.clone(),
            revenue_growth: growth_stats(&revenue),
            net_income_growth: growth_stats(&net_income),
            eps_growth: growth_stats(&eps),
            roic_percent: engine.roic_percent(snapshot),
            latest_fcf: fcf.last().copied(),
            fcf_growth_percent: growth_stats(&fcf).cagr_percent,
            share_change_3y_percent: engine.share_change_3y_percent(snapshot),
            operating_margin_percent: snapshot.operating_margin.map(|m| m * 100.0),
            dividend_yield_percent,
            avg_dividend_yield_5y_percent,
            relative_dividend_yield_percent,
            intrinsic_value,
            upside_percent,
            current_price: snapshot.current_price,
            market_cap: snapshot.market_cap,
            score: 0,
        };
        row.score = QualityScorer::new().score(&row);
        row
    }
}

fn average_yield_percent(snapshot: &TickerSnapshot) -> Option<f64> {
    let yields = &snapshot.yearly_dividend_yields;
    if yields.is_empty() {
        return None;
    }
    let mean = yields.iter().map(|y| y.dividend_yield).sum::<f64>() / yields.len() as f64;
    Some(mean * 100.0)
}
