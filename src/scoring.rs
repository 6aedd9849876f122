use crate::config::ScoringMethod;
use crate::models::*;
use statrs::statistics::Statistics;

/// Additive guard used by strategies that divide by volatility.
pub const SCORE_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScorerConfig {
    pub lookback_days: usize,
    pub min_avg_volume: f64,
}

/// Reductions of one lookback window, shared by every strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowMetrics {
    pub latest_price: f64,
    pub momentum_pct: f64,
    pub volatility: f64,
    pub avg_volume: f64,
}

pub trait ScoringStrategy {
    fn name(&self) -> &str;

    /// Close that momentum is measured against. Defaults to the first bar of the window.
    fn reference_close(&self, window: &[PriceBar]) -> f64 {
        window.first().map(|bar| bar.close).unwrap_or(0.0)
    }

    fn score(&self, metrics: &WindowMetrics) -> f64;
}

#[path = "strategies/volatility_adjusted.rs"]
pub mod volatility_adjusted;

pub use volatility_adjusted::VolatilityAdjustedStrategy;

#[path = "strategies/momentum.rs"]
pub mod momentum;

pub use momentum::MomentumStrategy;

#[path = "strategies/intraday.rs"]
pub mod intraday;

pub use intraday::IntradayStrategy;

pub fn create_strategy(method: ScoringMethod) -> Box<dyn ScoringStrategy + Send + Sync> {
    match method {
        ScoringMethod::VolatilityAdjusted => Box::new(VolatilityAdjustedStrategy),
        ScoringMethod::Momentum => Box::new(MomentumStrategy),
        ScoringMethod::Intraday => Box::new(IntradayStrategy),
    }
}

/// Reduces one series to a ranked candidate, or says why it was rejected.
pub fn score_series(
    series: &PriceSeries,
    config: &ScorerConfig,
    strategy: &dyn ScoringStrategy,
) -> Result<Candidate, Rejection> {
    let bars = &series.bars;
    if bars.is_empty() {
        return Err(Rejection::NoData);
    }
    if bars.len() < 2 {
        return Err(Rejection::TooFewBars { bars: bars.len() });
    }

    let lookback = config.lookback_days.max(1);
    let window = &bars[bars.len().saturating_sub(lookback.saturating_add(1))..];

    let avg_volume = average_volume(bars, lookback);
    if avg_volume < config.min_avg_volume {
        return Err(Rejection::LowVolume {
            avg_volume,
            minimum: config.min_avg_volume,
        });
    }

    let reference = strategy.reference_close(window);
    if !(reference.is_finite() && reference > 0.0) {
        return Err(Rejection::NonPositivePrice { price: reference });
    }

    let latest_price = window[window.len() - 1].close;
    let metrics = WindowMetrics {
        latest_price,
        momentum_pct: (latest_price - reference) / reference * 100.0,
        volatility: return_volatility(window),
        avg_volume,
    };

    let score = strategy.score(&metrics);
    if !score.is_finite() {
        return Err(Rejection::DegenerateScore);
    }

    Ok(Candidate {
        ticker: series.ticker.clone(),
        latest_price: metrics.latest_price,
        momentum_pct: metrics.momentum_pct,
        volatility: metrics.volatility,
        avg_volume: metrics.avg_volume,
        score,
    })
}

/// Mean volume over the last `lookback` bars, or all bars when fewer exist.
pub fn average_volume(bars: &[PriceBar], lookback: usize) -> f64 {
    let tail = &bars[bars.len().saturating_sub(lookback)..];
    if tail.is_empty() {
        return 0.0;
    }
    let volumes: Vec<f64> = tail.iter().map(|bar| bar.volume).collect();
    let mean = volumes.mean();
    if mean.is_finite() {
        mean
    } else {
        0.0
    }
}

/// Sample standard deviation of day-over-day fractional returns; 0 when undefined.
pub fn return_volatility(window: &[PriceBar]) -> f64 {
    let returns: Vec<f64> = window
        .windows(2)
        .filter(|pair| pair[0].close > 0.0)
        .map(|pair| pair[1].close / pair[0].close - 1.0)
        .collect();
    if returns.len() < 2 {
        return 0.0;
    }
    let std_dev = returns.std_dev();
    if std_dev.is_finite() {
        std_dev
    } else {
        0.0
    }
}
