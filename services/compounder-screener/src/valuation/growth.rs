//! Growth statistics over numeric series.

use super::types::GrowthStats;

/// Trend consistency and CAGR of `series`.
///
/// Series shorter than two points have zero intervals and no CAGR. The CAGR
/// is only computed when both endpoints are strictly positive.
pub fn growth_stats(series: &[f64]) -> GrowthStats {
    if series.len() < 2 {
        return GrowthStats::default();
    }

    let intervals = series.len() - 1;
    let positive_count = series.windows(2).filter(|w| w[1] > w[0]).count();

    let first = series[0];
    let last = series[intervals];
    let cagr_percent = if first > 0.0 && last > 0.0 {
        let rate = ((last / first).powf(1.0 / intervals as f64) - 1.0) * 100.0;
        rate.is_finite().then_some(rate)
    } else {
        None
    };

    GrowthStats {
        positive_count,
        intervals,
        cagr_percent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_series() {
        for series in [&[][..], &[42.0][..]] {
            let stats = growth_stats(series);
            assert_eq!(stats.intervals, 0);
            assert_eq!(stats.positive_count, 0);
            assert_eq!(stats.cagr_percent, None);
            assert_eq!(stats.consistency(), 0.0);
        }
    }

    #[test]
    fn test_strictly_increasing_series() {
        let stats = growth_stats(&[100.0, 110.0, 121.0, 133.1]);
        assert_eq!(stats.positive_count, 3);
        assert_eq!(stats.intervals, 3);
        let expected = ((133.1_f64 / 100.0).powf(1.0 / 3.0) - 1.0) * 100.0;
        assert!((stats.cagr_percent.unwrap() - expected).abs() < 1e-9);
        assert!((stats.cagr_percent.unwrap() - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_flat_steps_are_not_growth() {
        let stats = growth_stats(&[10.0, 10.0, 12.0]);
        assert_eq!(stats.positive_count, 1);
        assert_eq!(stats.intervals, 2);
    }

    #[test]
    fn test_non_positive_endpoint_has_no_cagr() {
        assert_eq!(growth_stats(&[-5.0, 10.0, 20.0]).cagr_percent, None);
        assert_eq!(growth_stats(&[10.0, 5.0, 0.0]).cagr_percent, None);

        let stats = growth_stats(&[10.0, -5.0, 12.0, 15.0]);
        assert_eq!(stats.positive_count, 2);
        assert!(stats.cagr_percent.is_some());
    }
}
