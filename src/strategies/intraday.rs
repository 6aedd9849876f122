use super::{ScoringStrategy, WindowMetrics};
use crate::models::PriceBar;

/// Percent change from the previous session's close to the latest close.
pub struct IntradayStrategy;

impl ScoringStrategy for IntradayStrategy {
    fn name(&self) -> &str {
        "intraday"
    }

    fn reference_close(&self, window: &[PriceBar]) -> f64 {
        window
            .len()
            .checked_sub(2)
            .and_then(|idx| window.get(idx))
            .map(|bar| bar.close)
            .unwrap_or(0.0)
    }

    fn score(&self, metrics: &WindowMetrics) -> f64 {
        metrics.momentum_pct
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::test_support::series;
    use crate::scoring::{score_series, ScorerConfig};

    #[test]
    fn measures_only_the_last_session() {
        let config = ScorerConfig {
            lookback_days: 5,
            min_avg_volume: 0.0,
        };
        let candidate = score_series(
            &series("AAA", &[50.0, 80.0, 100.0, 102.0], 10.0),
            &config,
            &IntradayStrategy,
        )
        .unwrap();
        assert!((candidate.momentum_pct - 2.0).abs() < 1e-9);
        assert_eq!(candidate.score, candidate.momentum_pct);
    }
}
