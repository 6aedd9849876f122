use super::{ScoringStrategy, WindowMetrics, SCORE_EPSILON};

/// Momentum per unit of return volatility, dampened by log liquidity.
///
/// `score = (momentum_pct + ε) / (volatility + ε) * ln(1 + max(avg_volume, 1))`
pub struct VolatilityAdjustedStrategy;

impl ScoringStrategy for VolatilityAdjustedStrategy {
    fn name(&self) -> &str {
        "volatility_adjusted"
    }

    fn score(&self, metrics: &WindowMetrics) -> f64 {
        let liquidity = metrics.avg_volume.max(1.0).ln_1p();
        (metrics.momentum_pct + SCORE_EPSILON) / (metrics.volatility + SCORE_EPSILON) * liquidity
    }
}
