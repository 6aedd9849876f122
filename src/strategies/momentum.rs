use super::{ScoringStrategy, WindowMetrics};

/// Plain percent change across the lookback window.
pub struct MomentumStrategy;

impl ScoringStrategy for MomentumStrategy {
    fn name(&self) -> &str {
        "momentum"
    }

    fn score(&self, metrics: &WindowMetrics) -> f64 {
        metrics.momentum_pct
    }
}
