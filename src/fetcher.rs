use crate::models::{PriceBar, PriceSeries};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use log::debug;
use reqwest::{Client, Url};
use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

/// Upper bound on the requested history, about a century of calendar days.
pub const MAX_WINDOW_DAYS: i64 = 36_500;

/// Errors from a price provider. Callers skip the ticker on any of them.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request for {ticker} failed: {source}")]
    Request {
        ticker: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("provider returned status {status} for {ticker}")]
    Status { ticker: String, status: u16 },

    #[error("provider error for {ticker}: {message}")]
    Provider { ticker: String, message: String },

    #[error("malformed response for {ticker}: {message}")]
    Malformed { ticker: String, message: String },

    #[error("no bars returned for {ticker}")]
    Empty { ticker: String },
}

#[async_trait]
pub trait PriceFetcher: Send + Sync {
    /// Daily bars covering at least `lookback_days` trading days when the provider has them.
    async fn fetch(&self, ticker: &str, lookback_days: usize) -> Result<PriceSeries, FetchError>;

    /// Fetches each ticker in turn; one failure never aborts the rest of the batch.
    async fn fetch_batch(
        &self,
        tickers: &[String],
        lookback_days: usize,
    ) -> Vec<(String, Result<PriceSeries, FetchError>)> {
        let mut results = Vec::with_capacity(tickers.len());
        for ticker in tickers {
            let outcome = self.fetch(ticker, lookback_days).await;
            results.push((ticker.clone(), outcome));
        }
        results
    }

    /// Latest close, or `None` when the provider cannot supply one.
    async fn latest_price(&self, ticker: &str) -> Option<f64> {
        match self.fetch(ticker, 2).await {
            Ok(series) => series.latest_close(),
            Err(err) => {
                debug!("Latest price unavailable for {}: {}", ticker, err);
                None
            }
        }
    }
}

/// Daily bars from the Yahoo Finance chart endpoint.
pub struct YahooChartFetcher {
    http: Client,
    base_url: String,
    request_delay: Duration,
}

impl YahooChartFetcher {
    pub fn new(http: Client, base_url: impl Into<String>, request_delay: Duration) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            request_delay,
        }
    }

    fn chart_url(&self, ticker: &str, lookback_days: usize) -> Result<Url, FetchError> {
        let mut url = Url::parse(&format!("{}/v8/finance/chart/", self.base_url)).map_err(
            |err| FetchError::Malformed {
                ticker: ticker.to_string(),
                message: format!("invalid base url {}: {}", self.base_url, err),
            },
        )?;
        url.path_segments_mut()
            .map_err(|_| FetchError::Malformed {
                ticker: ticker.to_string(),
                message: format!("base url {} cannot carry a path", self.base_url),
            })?
            .pop_if_empty()
            .push(ticker);

        let (period1, period2) = request_window(Utc::now(), lookback_days);
        url.query_pairs_mut()
            .append_pair("period1", &period1.to_string())
            .append_pair("period2", &period2.to_string())
            .append_pair("interval", "1d")
            .append_pair("includePrePost", "false");
        Ok(url)
    }
}

#[async_trait]
impl PriceFetcher for YahooChartFetcher {
    async fn fetch(&self, ticker: &str, lookback_days: usize) -> Result<PriceSeries, FetchError> {
        if !self.request_delay.is_zero() {
            sleep(self.request_delay).await;
        }
        let url = self.chart_url(ticker, lookback_days)?;
        let response =
            self.http
                .get(url)
                .send()
                .await
                .map_err(|source| FetchError::Request {
                    ticker: ticker.to_string(),
                    source,
                })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| FetchError::Request {
                ticker: ticker.to_string(),
                source,
            })?;

        // Yahoo answers unknown symbols with 404 plus an error payload; prefer its description.
        if !status.is_success() {
            if let Ok(envelope) = serde_json::from_str::<ChartEnvelope>(&body) {
                if let Some(error) = envelope.chart.error {
                    return Err(FetchError::Provider {
                        ticker: ticker.to_string(),
                        message: error.describe(),
                    });
                }
            }
            return Err(FetchError::Status {
                ticker: ticker.to_string(),
                status: status.as_u16(),
            });
        }
        parse_chart_response(ticker, &body)
    }
}

/// Unix-second bounds wide enough to cover `lookback_days` trading days plus holidays.
/// Oversized lookbacks are capped at `MAX_WINDOW_DAYS`.
pub fn request_window(now: DateTime<Utc>, lookback_days: usize) -> (i64, i64) {
    let span_days = i64::try_from(lookback_days)
        .ok()
        .and_then(|days| days.checked_mul(2))
        .and_then(|days| days.checked_add(7))
        .map_or(MAX_WINDOW_DAYS, |days| days.min(MAX_WINDOW_DAYS));
    let start = now
        .checked_sub_signed(ChronoDuration::days(span_days))
        .map_or(0, |start| start.timestamp());
    (start, now.timestamp())
}

pub fn parse_chart_response(ticker: &str, body: &str) -> Result<PriceSeries, FetchError> {
    let envelope: ChartEnvelope =
        serde_json::from_str(body).map_err(|err| FetchError::Malformed {
            ticker: ticker.to_string(),
            message: err.to_string(),
        })?;

    if let Some(error) = envelope.chart.error {
        return Err(FetchError::Provider {
            ticker: ticker.to_string(),
            message: error.describe(),
        });
    }

    let Some(result) = envelope
        .chart
        .result
        .and_then(|results| results.into_iter().next())
    else {
        return Err(FetchError::Empty {
            ticker: ticker.to_string(),
        });
    };

    let quote = result
        .indicators
        .and_then(|indicators| indicators.quote.into_iter().next())
        .unwrap_or_default();

    let mut bars: Vec<PriceBar> = Vec::with_capacity(result.timestamp.len());
    for (idx, timestamp) in result.timestamp.iter().enumerate() {
        let Some(close) = value_at(&quote.close, idx).filter(|v| v.is_finite()) else {
            continue;
        };
        let Some(date) = DateTime::<Utc>::from_timestamp(*timestamp, 0).map(|dt| dt.date_naive())
        else {
            continue;
        };
        let open = value_at(&quote.open, idx).unwrap_or(close);
        let bar = PriceBar {
            date,
            open,
            high: value_at(&quote.high, idx).unwrap_or(close.max(open)),
            low: value_at(&quote.low, idx).unwrap_or(close.min(open)),
            close,
            volume: value_at(&quote.volume, idx).unwrap_or(0.0).max(0.0),
        };
        // Intraday refreshes can repeat the current session with a fresh timestamp.
        match bars.last_mut() {
            Some(last) if last.date == bar.date => *last = bar,
            _ => bars.push(bar),
        }
    }

    if bars.is_empty() {
        return Err(FetchError::Empty {
            ticker: ticker.to_string(),
        });
    }

    Ok(PriceSeries::new(ticker, bars))
}

fn value_at(values: &[LooseNumber], idx: usize) -> Option<f64> {
    values
        .get(idx)
        .and_then(|value| value.0)
        .filter(|v| v.is_finite())
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

impl ChartError {
    fn describe(&self) -> String {
        match (self.code.as_deref(), self.description.as_deref()) {
            (Some(code), Some(description)) => format!("{}: {}", code, description),
            (Some(code), None) => code.to_string(),
            (None, Some(description)) => description.to_string(),
            (None, None) => "unknown error".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    #[serde(default)]
    indicators: Option<ChartIndicators>,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Default, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    open: Vec<LooseNumber>,
    #[serde(default)]
    high: Vec<LooseNumber>,
    #[serde(default)]
    low: Vec<LooseNumber>,
    #[serde(default)]
    close: Vec<LooseNumber>,
    #[serde(default)]
    volume: Vec<LooseNumber>,
}

#[derive(Debug, Deserialize)]
struct LooseNumber(#[serde(deserialize_with = "deserialize_f64_opt")] Option<f64>);

fn deserialize_f64_opt<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    struct F64OptVisitor;

    impl<'de> Visitor<'de> for F64OptVisitor {
        type Value = Option<f64>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a number, string or null")
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(value))
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(value as f64))
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(value as f64))
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(value.trim().parse::<f64>().ok())
        }
    }

    deserializer.deserialize_any(F64OptVisitor)
}
