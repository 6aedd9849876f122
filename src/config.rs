use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::path::PathBuf;

pub const DEFAULT_LOOKBACK_DAYS: usize = 5;
/// Ten years of trading days is far more history than a momentum window needs.
pub const MAX_LOOKBACK_DAYS: usize = 3_650;
pub const DEFAULT_MIN_AVG_VOLUME: f64 = 20_000.0;
pub const DEFAULT_BATCH_SIZE: usize = 40;
pub const DEFAULT_INVEST_AMOUNT: f64 = 10_000.0;
pub const DEFAULT_TARGET_PROFIT_PCT: f64 = 5.0;
pub const DEFAULT_PRICE_API_URL: &str = "https://query1.finance.yahoo.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringMethod {
    VolatilityAdjusted,
    Momentum,
    Intraday,
}

impl ScoringMethod {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "volatility_adjusted" | "vol_adjusted" | "risk_adjusted" => {
                Ok(Self::VolatilityAdjusted)
            }
            "momentum" => Ok(Self::Momentum),
            "intraday" | "daily_change" => Ok(Self::Intraday),
            other => Err(anyhow!(
                "SCORING_METHOD must be volatility_adjusted, momentum or intraday (value: {})",
                other
            )),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::VolatilityAdjusted => "volatility_adjusted",
            Self::Momentum => "momentum",
            Self::Intraday => "intraday",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationMode {
    Minimum,
    MaxProfit,
}

impl AllocationMode {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "minimum" | "minimum_amount_invest" | "min" => Ok(Self::Minimum),
            "max_profit" | "maximize_profit" | "maximise_profit" => Ok(Self::MaxProfit),
            other => Err(anyhow!(
                "ALLOCATION_MODE must be minimum or max-profit (value: {})",
                other
            )),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Minimum => "minimum",
            Self::MaxProfit => "max-profit",
        }
    }
}

/// Runtime settings shared by every command.
#[derive(Debug, Clone)]
pub struct Settings {
    // Scan inputs and outputs
    pub tickers_file: PathBuf,
    pub pick_file: PathBuf,
    pub candidates_file: PathBuf,
    pub portfolio_file: PathBuf,

    // Scoring
    pub lookback_days: usize,
    pub min_avg_volume: f64,
    pub scoring_method: ScoringMethod,
    pub top_n: usize,
    pub candidates_limit: usize,

    // Sizing and alerts
    pub invest_amount: f64,
    pub allocation_mode: AllocationMode,
    pub target_profit_pct: f64,
    pub target_gain_pct: f64,
    pub stop_loss_pct: f64,

    // Fetch pacing
    pub batch_size: usize,
    pub batch_delay_ms: u64,
    pub batch_jitter_ms: u64,
    pub request_delay_ms: u64,
    pub fetch_timeout_secs: u64,
    pub price_api_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tickers_file: PathBuf::from("tickers.csv"),
            pick_file: PathBuf::from("today_pick.json"),
            candidates_file: PathBuf::from("candidates.csv"),
            portfolio_file: PathBuf::from("portfolio.json"),
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            min_avg_volume: DEFAULT_MIN_AVG_VOLUME,
            scoring_method: ScoringMethod::VolatilityAdjusted,
            top_n: 10,
            candidates_limit: 100,
            invest_amount: DEFAULT_INVEST_AMOUNT,
            allocation_mode: AllocationMode::Minimum,
            target_profit_pct: DEFAULT_TARGET_PROFIT_PCT,
            target_gain_pct: 2.0,
            stop_loss_pct: 0.8,
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay_ms: 1_000,
            batch_jitter_ms: 500,
            request_delay_ms: 250,
            fetch_timeout_secs: 30,
            price_api_url: DEFAULT_PRICE_API_URL.to_string(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_settings_map(&env_map())
    }

    /// Validates `overrides` (command-line flags) exactly like environment values.
    /// Overrides are stored under the primary key, which wins over legacy aliases.
    pub fn from_settings_with_overrides(
        settings: &HashMap<String, String>,
        overrides: &[(&str, String)],
    ) -> Result<Self> {
        if overrides.is_empty() {
            return Self::from_settings_map(settings);
        }
        let mut merged = settings.clone();
        for (key, value) in overrides {
            merged.insert((*key).to_string(), value.clone());
        }
        Self::from_settings_map(&merged)
    }

    pub fn from_settings_map(settings: &HashMap<String, String>) -> Result<Self> {
        let defaults = Self::default();

        let lookback_days = setting_usize(
            settings,
            &["LOOKBACK_DAYS", "MOMENTUM_DAYS"],
            defaults.lookback_days,
            1,
            Some(MAX_LOOKBACK_DAYS),
        )?;
        let min_avg_volume = setting_f64(
            settings,
            &["MIN_AVG_VOLUME"],
            defaults.min_avg_volume,
            Some(0.0),
            None,
        )?;
        let batch_size = setting_usize(settings, &["BATCH_SIZE"], defaults.batch_size, 1, None)?;
        let invest_amount = setting_f64(
            settings,
            &["INVEST_AMOUNT", "INV_AMOUNT"],
            defaults.invest_amount,
            Some(0.0),
            None,
        )?;
        let target_profit_pct = setting_f64(
            settings,
            &["TARGET_PROFIT_PCT", "TARGET_PCT"],
            defaults.target_profit_pct,
            None,
            None,
        )?;
        let target_gain_pct = setting_f64(
            settings,
            &["TARGET_GAIN_PCT"],
            defaults.target_gain_pct,
            Some(0.0),
            None,
        )?;
        let stop_loss_pct = setting_f64(
            settings,
            &["STOP_LOSS_PCT"],
            defaults.stop_loss_pct,
            Some(0.0),
            Some(100.0),
        )?;
        let top_n = setting_usize(settings, &["TOP_N"], defaults.top_n, 1, None)?;
        let candidates_limit =
            setting_usize(settings, &["CANDIDATES_LIMIT"], defaults.candidates_limit, 1, None)?;
        let batch_delay_ms = setting_usize(
            settings,
            &["BATCH_DELAY_MS"],
            defaults.batch_delay_ms as usize,
            0,
            None,
        )? as u64;
        let batch_jitter_ms = setting_usize(
            settings,
            &["BATCH_JITTER_MS"],
            defaults.batch_jitter_ms as usize,
            0,
            None,
        )? as u64;
        let request_delay_ms = setting_usize(
            settings,
            &["REQUEST_DELAY_MS"],
            defaults.request_delay_ms as usize,
            0,
            None,
        )? as u64;
        let fetch_timeout_secs = setting_usize(
            settings,
            &["FETCH_TIMEOUT_SECS"],
            defaults.fetch_timeout_secs as usize,
            1,
            None,
        )? as u64;

        let scoring_method = match setting_str(settings, &["SCORING_METHOD"]) {
            Some(raw) => ScoringMethod::parse(raw)?,
            None => defaults.scoring_method,
        };
        let allocation_mode = match setting_str(settings, &["ALLOCATION_MODE"]) {
            Some(raw) => AllocationMode::parse(raw)?,
            None => defaults.allocation_mode,
        };
        let price_api_url = setting_str(settings, &["PRICE_API_URL"])
            .map(|value| value.trim_end_matches('/').to_string())
            .unwrap_or(defaults.price_api_url);

        Ok(Self {
            tickers_file: setting_path(settings, "TICKERS_FILE", defaults.tickers_file),
            pick_file: setting_path(settings, "PICK_FILE", defaults.pick_file),
            candidates_file: setting_path(settings, "CANDIDATES_FILE", defaults.candidates_file),
            portfolio_file: setting_path(settings, "PORTFOLIO_FILE", defaults.portfolio_file),
            lookback_days,
            min_avg_volume,
            scoring_method,
            top_n,
            candidates_limit,
            invest_amount,
            allocation_mode,
            target_profit_pct,
            target_gain_pct,
            stop_loss_pct,
            batch_size,
            batch_delay_ms,
            batch_jitter_ms,
            request_delay_ms,
            fetch_timeout_secs,
            price_api_url,
        })
    }
}

/// Process environment as a settings map. Entries that are not valid UTF-8 are skipped.
pub fn env_map() -> HashMap<String, String> {
    std::env::vars_os()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
        .collect()
}

/// First non-empty value among `keys`, so legacy aliases keep working.
pub fn setting_str<'a>(settings: &'a HashMap<String, String>, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| {
        settings
            .get(*key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    })
}

fn setting_path(settings: &HashMap<String, String>, key: &str, default: PathBuf) -> PathBuf {
    setting_str(settings, &[key])
        .map(PathBuf::from)
        .unwrap_or(default)
}

fn setting_f64(
    settings: &HashMap<String, String>,
    keys: &[&str],
    default: f64,
    min: Option<f64>,
    max: Option<f64>,
) -> Result<f64> {
    let Some(raw) = setting_str(settings, keys) else {
        return Ok(default);
    };
    let key = keys[0];
    let value = raw
        .parse::<f64>()
        .map_err(|_| anyhow!("Setting {} must be a number (value: {})", key, raw))?;
    if !value.is_finite() {
        return Err(anyhow!("Setting {} must be finite (value: {})", key, raw));
    }
    if let Some(min_value) = min {
        if value < min_value {
            return Err(anyhow!(
                "Setting {} must be >= {} (value: {})",
                key,
                min_value,
                raw
            ));
        }
    }
    if let Some(max_value) = max {
        if value > max_value {
            return Err(anyhow!(
                "Setting {} must be <= {} (value: {})",
                key,
                max_value,
                raw
            ));
        }
    }
    Ok(value)
}

fn setting_usize(
    settings: &HashMap<String, String>,
    keys: &[&str],
    default: usize,
    min: usize,
    max: Option<usize>,
) -> Result<usize> {
    let Some(raw) = setting_str(settings, keys) else {
        return Ok(default);
    };
    let key = keys[0];
    let value = raw
        .parse::<f64>()
        .map_err(|_| anyhow!("Setting {} must be a number (value: {})", key, raw))?;
    if !value.is_finite() {
        return Err(anyhow!("Setting {} must be finite (value: {})", key, raw));
    }
    if value.fract() != 0.0 {
        return Err(anyhow!(
            "Setting {} must be an integer (value: {})",
            key,
            raw
        ));
    }
    if value < min as f64 {
        return Err(anyhow!(
            "Setting {} must be >= {} (value: {})",
            key,
            min,
            raw
        ));
    }
    if let Some(max_value) = max {
        if value > max_value as f64 {
            return Err(anyhow!(
                "Setting {} must be <= {} (value: {})",
                key,
                max_value,
                raw
            ));
        }
    }
    Ok(value as usize)
}
