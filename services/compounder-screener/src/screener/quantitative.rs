//! Quality scoring and pass/fail filtering of compounder rows.
//!
//! Scoring is additive over fixed-weight components:
//!
//! | Component                  | Max | Rule                                   |
//! |----------------------------|-----|----------------------------------------|
//! | Revenue growth consistency | 20  | share of growing intervals             |
//! | Net income consistency     | 20  | share of growing intervals             |
//! | EPS consistency            | 10  | share of growing intervals             |
//! | ROIC                       | 20  | ramp 5% -> 25%                         |
//! | FCF positive               | 5   | latest FCF > 0                         |
//! | FCF growth                 | 5   | ramp -5% -> 15% CAGR                   |
//! | Buyback                    | 10  | ramp 0% -> 8% three-year share shrink  |
//! | Operating margin           | 10  | ramp 10% -> 30%                        |
//!
//! Missing metrics contribute zero. Filtering treats a missing required
//! metric as a failed criterion.

use compounder_common::FilterConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::compounder::CompounderRow;
use crate::valuation::GrowthStats;

// ============================================================================
// Quality Scorer
// ============================================================================

/// Per-component score contributions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub revenue_growth: f64,
    pub net_income_growth: f64,
    pub eps_growth: f64,
    pub roic: f64,
    pub fcf_positive: f64,
    pub fcf_growth: f64,
    pub buyback: f64,
    pub operating_margin: f64,
}

impl ScoreBreakdown {
    pub fn sum(&self) -> f64 {
        self.revenue_growth
            + self.net_income_growth
            + self.eps_growth
            + self.roic
            + self.fcf_positive
            + self.fcf_growth
            + self.buyback
            + self.operating_margin
    }
}

/// Linear ramp from 0 at `lo` to `max` at `hi`, clamped.
fn ramp(value: Option<f64>, lo: f64, hi: f64, max: f64) -> f64 {
    match value {
        Some(v) if v.is_finite() => ((v - lo) / (hi - lo)).clamp(0.0, 1.0) * max,
        _ => 0.0,
    }
}

fn consistency(stats: &GrowthStats, max: f64) -> f64 {
    (stats.consistency() * max).clamp(0.0, max)
}

/// Composite 1-100 quality score.
#[derive(Debug, Clone, Copy, Default)]
pub struct QualityScorer;

impl QualityScorer {
    pub fn new() -> Self {
        Self
    }

    pub fn breakdown(&self, row: &CompounderRow) -> ScoreBreakdown {
        ScoreBreakdown {
            revenue_growth: consistency(&row.revenue_growth, 20.0),
            net_income_growth: consistency(&row.net_income_growth, 20.0),
            eps_growth: consistency(&row.eps_growth, 10.0),
            roic: ramp(row.roic_percent, 5.0, 25.0, 20.0),
            fcf_positive: if row.latest_fcf.is_some_and(|f| f > 0.0) { 5.0 } else { 0.0 },
            fcf_growth: ramp(row.fcf_growth_percent, -5.0, 15.0, 5.0),
            buyback: ramp(row.share_change_3y_percent.map(|c| -c), 0.0, 8.0, 10.0),
            operating_margin: ramp(row.operating_margin_percent, 10.0, 30.0, 10.0),
        }
    }

    /// Sum of components, clamped to [1, 100] and rounded.
    pub fn score(&self, row: &CompounderRow) -> u8 {
        self.breakdown(row).sum().clamp(1.0, 100.0).round() as u8
    }
}

// ============================================================================
// Filter Evaluator
// ============================================================================

/// Minimum intervals a growth series needs before it can pass.
pub const MIN_GROWTH_INTERVALS: usize = 3;
/// Share of intervals that must show growth, as a fraction in fifths.
const GROWTH_FIFTHS: usize = 4;

/// Filter criteria.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    RevenueGrowth,
    NetIncomeGrowth,
    Roic,
    Buyback,
    OperatingMargin,
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RevenueGrowth => write!(f, "revenue growth"),
            Self::NetIncomeGrowth => write!(f, "net income growth"),
            Self::Roic => write!(f, "ROIC"),
            Self::Buyback => write!(f, "3y share change"),
            Self::OperatingMargin => write!(f, "operating margin"),
        }
    }
}

/// Threshold comparison direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    /// actual > required
    GreaterThan,
    /// actual <= required
    AtMost,
}

impl Comparison {
    fn holds(&self, actual: f64, required: f64) -> bool {
        match self {
            Self::GreaterThan => actual > required,
            Self::AtMost => actual <= required,
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Self::GreaterThan => ">",
            Self::AtMost => "<=",
        }
    }
}

/// Actual versus required, per criterion kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckDetail {
    Growth {
        positive_count: usize,
        intervals: usize,
        required_positive: usize,
        min_intervals: usize,
    },
    Threshold {
        actual: Option<f64>,
        required: f64,
        comparison: Comparison,
    },
}

/// Outcome of one criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionCheck {
    pub criterion: Criterion,
    pub passed: bool,
    pub detail: CheckDetail,
}

impl fmt::Display for CriterionCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.passed { "pass" } else { "fail" };
        match &self.detail {
            CheckDetail::Growth {
                positive_count,
                intervals,
                required_positive,
                min_intervals,
            } => write!(
                f,
                "{} [{}]: {}/{} intervals grew (need >= {} of >= {} intervals)",
                self.criterion, status, positive_count, intervals, required_positive, min_intervals
            ),
            CheckDetail::Threshold {
                actual,
                required,
                comparison,
            } => match actual {
                Some(a) => write!(
                    f,
                    "{} [{}]: {:.2} (need {} {:.2})",
                    self.criterion,
                    status,
                    a,
                    comparison.symbol(),
                    required
                ),
                None => write!(
                    f,
                    "{} [{}]: unavailable (need {} {:.2})",
                    self.criterion,
                    status,
                    comparison.symbol(),
                    required
                ),
            },
        }
    }
}

/// All criteria for one row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterOutcome {
    pub passed: bool,
    pub checks: Vec<CriterionCheck>,
}

impl FilterOutcome {
    pub fn failures(&self) -> impl Iterator<Item = &CriterionCheck> {
        self.checks.iter().filter(|c| !c.passed)
    }
}

/// Applies the configured thresholds to compounder rows.
#[derive(Debug, Clone, Copy)]
pub struct FilterEvaluator {
    config: FilterConfig,
}

impl FilterEvaluator {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(FilterConfig::default())
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Evaluate every criterion; the row passes only if all pass.
    pub fn evaluate(&self, row: &CompounderRow) -> FilterOutcome {
        let checks = vec![
            growth_check(Criterion::RevenueGrowth, &row.revenue_growth),
            growth_check(Criterion::NetIncomeGrowth, &row.net_income_growth),
            threshold_check(
                Criterion::Roic,
                row.roic_percent,
                self.config.min_roic,
                Comparison::GreaterThan,
            ),
            threshold_check(
                Criterion::Buyback,
                row.share_change_3y_percent,
                -self.config.min_buyback.abs(),
                Comparison::AtMost,
            ),
            threshold_check(
                Criterion::OperatingMargin,
                row.operating_margin_percent,
                self.config.min_operating_margin,
                Comparison::GreaterThan,
            ),
        ];

        FilterOutcome {
            passed: checks.iter().all(|c| c.passed),
            checks,
        }
    }
}

/// Positive intervals required: at least 80% of `intervals`, and at least one.
///
/// Rounds up, so the share never drops below 80%: 3 intervals need 3, 4 need
/// 4, 5 need 4 and 8 need 7. Rounding to nearest would accept 2 of 3, 3 of 4
/// and 6 of 8.
pub fn required_positive(intervals: usize) -> usize {
    (GROWTH_FIFTHS * intervals).div_ceil(5).max(1)
}

fn growth_check(criterion: Criterion, stats: &GrowthStats) -> CriterionCheck {
    let required = required_positive(stats.intervals);
    CriterionCheck {
        criterion,
        passed: stats.intervals >= MIN_GROWTH_INTERVALS && stats.positive_count >= required,
        detail: CheckDetail::Growth {
            positive_count: stats.positive_count,
            intervals: stats.intervals,
            required_positive: required,
            min_intervals: MIN_GROWTH_INTERVALS,
        },
    }
}

fn threshold_check(
    criterion: Criterion,
    actual: Option<f64>,
    required: f64,
    comparison: Comparison,
) -> CriterionCheck {
    CriterionCheck {
        criterion,
        passed: actual.is_some_and(|a| comparison.holds(a, required)),
        detail: CheckDetail::Threshold {
            actual,
            required,
            comparison,
        },
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn growth(positive_count: usize, intervals: usize) -> GrowthStats {
        GrowthStats {
            positive_count,
            intervals,
            cagr_percent: None,
        }
    }

    fn passing_row() -> CompounderRow {
        CompounderRow {
            ticker: "TEST".into(),
            revenue_growth: growth(4, 4),
            net_income_growth: growth(4, 5),
            eps_growth: growth(3, 4),
            roic_percent: Some(25.0),
            latest_fcf: Some(100.0),
            fcf_growth_percent: Some(10.0),
            share_change_3y_percent: Some(-4.0),
            operating_margin_percent: Some(30.0),
            dividend_yield_percent: None,
            avg_dividend_yield_5y_percent: None,
            relative_dividend_yield_percent: None,
            intrinsic_value: None,
            upside_percent: None,
            current_price: None,
            market_cap: None,
            score: 0,
        }
    }

    #[test]
    fn test_score_breakdown() {
        let row = passing_row();
        let b = QualityScorer::new().breakdown(&row);
        assert_eq!(b.revenue_growth, 20.0);
        assert!((b.net_income_growth - 16.0).abs() < 1e-9);
        assert!((b.eps_growth - 7.5).abs() < 1e-9);
        assert_eq!(b.roic, 20.0);
        assert_eq!(b.fcf_positive, 5.0);
        assert!((b.fcf_growth - 3.75).abs() < 1e-9);
        assert!((b.buyback - 5.0).abs() < 1e-9);
        assert_eq!(b.operating_margin, 10.0);
        // 87.25 rounds to 87
        assert_eq!(QualityScorer::new().score(&row), 87);
    }

    #[test]
    fn test_score_ramps_clamp() {
        let mut row = passing_row();
        row.roic_percent = Some(3.0);
        row.operating_margin_percent = Some(90.0);
        row.share_change_3y_percent = Some(5.0);
        row.fcf_growth_percent = Some(-40.0);
        let b = QualityScorer::new().breakdown(&row);
        assert_eq!(b.roic, 0.0);
        assert_eq!(b.operating_margin, 10.0);
        assert_eq!(b.buyback, 0.0);
        assert_eq!(b.fcf_growth, 0.0);
    }

    #[test]
    fn test_score_floor_is_one() {
        let mut row = passing_row();
        row.revenue_growth = GrowthStats::default();
        row.net_income_growth = GrowthStats::default();
        row.eps_growth = GrowthStats::default();
        row.roic_percent = None;
        row.latest_fcf = Some(-1.0);
        row.fcf_growth_percent = None;
        row.share_change_3y_percent = None;
        row.operating_margin_percent = None;
        assert_eq!(QualityScorer::new().score(&row), 1);
    }

    #[test]
    fn test_required_positive() {
        assert_eq!(required_positive(0), 1);
        assert_eq!(required_positive(1), 1);
        assert_eq!(required_positive(3), 3);
        assert_eq!(required_positive(4), 4);
        assert_eq!(required_positive(5), 4);
        assert_eq!(required_positive(7), 6);
        assert_eq!(required_positive(8), 7);
    }

    #[test]
    fn test_passing_row_passes() {
        let outcome = FilterEvaluator::with_defaults().evaluate(&passing_row());
        assert!(outcome.passed, "{:?}", outcome.failures().collect::<Vec<_>>());
        assert_eq!(outcome.checks.len(), 5);
    }

    #[test]
    fn test_growth_needs_three_intervals() {
        let mut row = passing_row();
        row.revenue_growth = growth(2, 2);
        let outcome = FilterEvaluator::with_defaults().evaluate(&row);
        assert!(!outcome.passed);
        let failed: Vec<Criterion> = outcome.failures().map(|c| c.criterion).collect();
        assert_eq!(failed, vec![Criterion::RevenueGrowth]);
    }

    #[test]
    fn test_roic_boundary_is_strict() {
        let mut row = passing_row();
        row.roic_percent = Some(15.0);
        assert!(!FilterEvaluator::with_defaults().evaluate(&row).passed);
        row.roic_percent = Some(15.0001);
        assert!(FilterEvaluator::with_defaults().evaluate(&row).passed);
    }

    #[test]
    fn test_buyback_boundary_is_inclusive() {
        let mut row = passing_row();
        row.share_change_3y_percent = Some(-1.0);
        assert!(FilterEvaluator::with_defaults().evaluate(&row).passed);
        row.share_change_3y_percent = Some(-0.99);
        assert!(!FilterEvaluator::with_defaults().evaluate(&row).passed);

        // Sign of the configured minimum is ignored
        let evaluator = FilterEvaluator::new(FilterConfig {
            min_buyback: -2.0,
            ..FilterConfig::default()
        });
        row.share_change_3y_percent = Some(-1.5);
        assert!(!evaluator.evaluate(&row).passed);
    }

    #[test]
    fn test_missing_metric_fails_criterion() {
        let mut row = passing_row();
        row.operating_margin_percent = None;
        let outcome = FilterEvaluator::with_defaults().evaluate(&row);
        let failure = outcome.failures().next().unwrap();
        assert_eq!(failure.criterion, Criterion::OperatingMargin);
        assert!(failure.to_string().contains("unavailable"));
    }

    #[test]
    fn test_diagnostic_text() {
        let mut row = passing_row();
        row.net_income_growth = growth(2, 3);
        let outcome = FilterEvaluator::with_defaults().evaluate(&row);
        let check = outcome.failures().next().unwrap();
        assert_eq!(
            check.to_string(),
            "net income growth [fail]: 2/3 intervals grew (need >= 3 of >= 3 intervals)"
        );
    }
}
