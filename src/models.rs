use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Daily bars for one ticker, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    pub ticker: String,
    pub bars: Vec<PriceBar>,
}

impl PriceSeries {
    pub fn new(ticker: impl Into<String>, mut bars: Vec<PriceBar>) -> Self {
        bars.sort_by(|a, b| a.date.cmp(&b.date));
        Self {
            ticker: ticker.into(),
            bars,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn latest_close(&self) -> Option<f64> {
        self.bars.last().map(|bar| bar.close)
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|bar| bar.close).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub ticker: String,
    pub latest_price: f64,
    pub momentum_pct: f64,
    pub volatility: f64,
    pub avg_volume: f64,
    pub score: f64,
}

/// Why a series did not produce a candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    NoData,
    TooFewBars { bars: usize },
    LowVolume { avg_volume: f64, minimum: f64 },
    NonPositivePrice { price: f64 },
    DegenerateScore,
}

impl Rejection {
    pub fn label(&self) -> &'static str {
        match self {
            Rejection::NoData => "no_data",
            Rejection::TooFewBars { .. } => "too_few_bars",
            Rejection::LowVolume { .. } => "low_volume",
            Rejection::NonPositivePrice { .. } => "non_positive_price",
            Rejection::DegenerateScore => "degenerate_score",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::NoData => write!(f, "no price data"),
            Rejection::TooFewBars { bars } => write!(f, "only {} bar(s), need at least 2", bars),
            Rejection::LowVolume {
                avg_volume,
                minimum,
            } => write!(
                f,
                "average volume {:.0} below minimum {:.0}",
                avg_volume, minimum
            ),
            Rejection::NonPositivePrice { price } => {
                write!(f, "non-positive reference price {}", price)
            }
            Rejection::DegenerateScore => write!(f, "score is not a finite number"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pick {
    pub date: NaiveDate,
    pub ticker: String,
    pub price: f64,
    pub momentum: f64,
    pub score: f64,
    pub qty: u64,
    pub cost: f64,
    pub invest_amount: f64,
    #[serde(default)]
    pub target_price: Option<f64>,
    #[serde(default)]
    pub stop_loss: Option<f64>,
    #[serde(default)]
    pub scoring: Option<String>,
}

/// Contents of the pick file: either a selected ticker or an explicit "no pick".
#[derive(Debug, Clone, PartialEq)]
pub enum PickRecord {
    Selected(Pick),
    NoPick { date: NaiveDate, reason: String },
}

impl PickRecord {
    pub fn date(&self) -> NaiveDate {
        match self {
            PickRecord::Selected(pick) => pick.date,
            PickRecord::NoPick { date, .. } => *date,
        }
    }

    pub fn pick(&self) -> Option<&Pick> {
        match self {
            PickRecord::Selected(pick) => Some(pick),
            PickRecord::NoPick { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Allocation {
    pub shares: BTreeMap<String, u64>,
    pub spent: f64,
    pub leftover: f64,
}

impl Allocation {
    pub fn quantity(&self, ticker: &str) -> u64 {
        self.shares.get(ticker).copied().unwrap_or(0)
    }

    pub fn total_shares(&self) -> u64 {
        self.shares.values().sum()
    }
}

/// A position the target checker evaluates.
#[derive(Debug, Clone, PartialEq)]
pub struct Holding {
    pub ticker: String,
    pub qty: u64,
    pub buy_price: f64,
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
