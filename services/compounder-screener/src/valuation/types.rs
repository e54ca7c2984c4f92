//! Valuation types.

use serde::{Deserialize, Serialize};

// ============================================================================
// Growth
// ============================================================================

/// Trend consistency and compound growth of a numeric series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GrowthStats {
    /// Consecutive pairs where the later value strictly exceeds the earlier
    pub positive_count: usize,
    /// Number of consecutive pairs (length - 1, or 0 for short series)
    pub intervals: usize,
    /// Compound growth rate (%), only when first and last are positive
    pub cagr_percent: Option<f64>,
}

impl GrowthStats {
    /// Fraction of intervals that grew, 0 when there are none.
    pub fn consistency(&self) -> f64 {
        if self.intervals == 0 {
            0.0
        } else {
            self.positive_count as f64 / self.intervals as f64
        }
    }
}

// ============================================================================
// DCF
// ============================================================================

/// Two-stage discounted cash flow parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DcfConfig {
    /// Explicit projection horizon (years)
    pub projection_years: u32,
    /// Discount rate (fraction)
    pub discount_rate: f64,
    /// Gordon terminal growth (fraction)
    pub terminal_growth: f64,
    /// Growth used when fewer than two positive FCF points exist (fraction)
    pub default_growth: f64,
    /// Lower clamp on the growth assumption (fraction)
    pub min_growth: f64,
    /// Upper clamp on the growth assumption (fraction)
    pub max_growth: f64,
    /// Trailing positive FCF points used for the growth assumption
    pub growth_lookback: usize,
}

impl Default for DcfConfig {
    fn default() -> Self {
        Self {
            projection_years: 10,
            discount_rate: 0.10,
            terminal_growth: 0.025,
            default_growth: 0.04,
            min_growth: -0.05,
            max_growth: 0.20,
            growth_lookback: 3,
        }
    }
}

/// Result of a DCF valuation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DcfValuation {
    /// Growth assumption after clamping (fraction)
    pub growth_rate: f64,
    /// Sum of discounted projected cash flows
    pub pv_cash_flows: f64,
    /// Discounted terminal value
    pub pv_terminal: f64,
    /// Total intrinsic equity value
    pub equity_value: f64,
    /// Shares used for the per-share figure
    pub shares: f64,
    /// Intrinsic value per share
    pub intrinsic_value: f64,
}
