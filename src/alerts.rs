//! Profit-target evaluation and best-effort delivery of alert messages.

use crate::config::setting_str;
use crate::models::Holding;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use log::{debug, info, warn};
use reqwest::Client;
use serde_json::json;
use std::collections::{HashMap, HashSet};

const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";
const DEFAULT_TWILIO_API_URL: &str = "https://api.twilio.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertStatus {
    TargetReached,
    Hold,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertEvaluation {
    pub ticker: String,
    pub qty: u64,
    pub buy_price: f64,
    pub current_price: f64,
    pub profit_pct: f64,
    pub status: AlertStatus,
}

impl AlertEvaluation {
    pub fn triggered(&self) -> bool {
        self.status == AlertStatus::TargetReached
    }

    pub fn describe(&self) -> String {
        let qty = if self.qty > 0 {
            format!(" (Qty {})", self.qty)
        } else {
            String::new()
        };
        match self.status {
            AlertStatus::TargetReached => format!(
                "{}: Current {:.2} / Bought {:.2} -> Profit {:.2}%{} - consider selling",
                self.ticker, self.current_price, self.buy_price, self.profit_pct, qty
            ),
            AlertStatus::Hold => format!(
                "{}: {:+.2}% at {:.2}{} - hold",
                self.ticker, self.profit_pct, self.current_price, qty
            ),
        }
    }
}

/// Compares a fresh price with the buy price. Returns `None` (skip) when either
/// price is unusable.
pub fn evaluate(
    holding: &Holding,
    current_price: Option<f64>,
    threshold_pct: f64,
) -> Option<AlertEvaluation> {
    if !(holding.buy_price.is_finite() && holding.buy_price > 0.0) {
        debug!(
            "Skipping {}: buy price {} is not usable",
            holding.ticker, holding.buy_price
        );
        return None;
    }
    let Some(current_price) = current_price.filter(|price| price.is_finite()) else {
        debug!("Skipping {}: current price unavailable", holding.ticker);
        return None;
    };

    let profit_pct = (current_price - holding.buy_price) / holding.buy_price * 100.0;
    let status = if profit_pct >= threshold_pct {
        AlertStatus::TargetReached
    } else {
        AlertStatus::Hold
    };

    Some(AlertEvaluation {
        ticker: holding.ticker.clone(),
        qty: holding.qty,
        buy_price: holding.buy_price,
        current_price,
        profit_pct,
        status,
    })
}

/// Subject and body covering only the holdings that reached the target.
pub fn compose_alert(
    evaluations: &[AlertEvaluation],
    threshold_pct: f64,
    date: NaiveDate,
) -> Option<(String, String)> {
    let lines: Vec<String> = evaluations
        .iter()
        .filter(|evaluation| evaluation.triggered())
        .map(AlertEvaluation::describe)
        .collect();
    if lines.is_empty() {
        return None;
    }
    let subject = format!("Stock alert {} - target profit {:.2}% reached", date, threshold_pct);
    let body = format!("{}\n\n{}", date, lines.join("\n"));
    Some((subject, body))
}

/// Parses `WATCHLIST` (`A,B`) and `BUY_PRICES` (`A:101.5,B:20`). Tickers
/// without a buy price are dropped.
pub fn holdings_from_watchlist(watchlist: &str, buy_prices: &str) -> Vec<Holding> {
    let mut prices = HashMap::new();
    for item in buy_prices.split(',') {
        let Some((symbol, price)) = item.split_once(':') else {
            continue;
        };
        let Some(symbol) = crate::tickers::normalize_ticker_symbol(symbol) else {
            continue;
        };
        match price.trim().parse::<f64>() {
            Ok(price) => {
                prices.insert(symbol, price);
            }
            Err(_) => warn!("Ignoring unparseable buy price for {}: {}", symbol, price),
        }
    }

    let mut seen = HashSet::new();
    watchlist
        .split(',')
        .filter_map(crate::tickers::normalize_ticker_symbol)
        .filter(|symbol| seen.insert(symbol.clone()))
        .filter_map(|symbol| {
            let buy_price = prices.get(&symbol).copied();
            if buy_price.is_none() {
                debug!("No buy price configured for {}", symbol);
            }
            buy_price.map(|buy_price| Holding {
                ticker: symbol,
                qty: 0,
                buy_price,
            })
        })
        .collect()
}

#[async_trait]
pub trait AlertChannel: Send + Sync {
    fn name(&self) -> &str;
    async fn send(&self, subject: &str, body: &str) -> Result<()>;
}

/// Writes alerts to the log; always configured.
pub struct LogChannel;

#[async_trait]
impl AlertChannel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, subject: &str, body: &str) -> Result<()> {
        info!("{}\n{}", subject, body);
        Ok(())
    }
}

pub struct TelegramChannel {
    http: Client,
    base_url: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramChannel {
    pub fn new(
        http: Client,
        base_url: impl Into<String>,
        bot_token: impl Into<String>,
        chat_id: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
        }
    }
}

#[async_trait]
impl AlertChannel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, subject: &str, body: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.bot_token);
        let payload = json!({
            "chat_id": self.chat_id,
            "text": format!("{}\n\n{}", subject, body),
        });
        let response = self
            .http
            .post(url)
            .json(&payload)
            .send()
            .await
            .context("Telegram request failed")?;
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Telegram API error ({}): {}", status, error_text));
        }
        Ok(())
    }
}

pub struct TwilioSmsChannel {
    http: Client,
    base_url: String,
    account_sid: String,
    auth_token: String,
    from: String,
    to: String,
}

impl TwilioSmsChannel {
    pub fn new(
        http: Client,
        base_url: impl Into<String>,
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            from: from.into(),
            to: to.into(),
        }
    }
}

#[async_trait]
impl AlertChannel for TwilioSmsChannel {
    fn name(&self) -> &str {
        "sms"
    }

    async fn send(&self, subject: &str, body: &str) -> Result<()> {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url, self.account_sid
        );
        let text = format!("{}\n{}", subject, body);
        let form = [
            ("From", self.from.as_str()),
            ("To", self.to.as_str()),
            ("Body", text.as_str()),
        ];
        let response = self
            .http
            .post(url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await
            .context("Twilio request failed")?;
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Twilio API error ({}): {}", status, error_text));
        }
        Ok(())
    }
}

/// Log channel plus every remote channel whose credentials are all present.
pub fn channels_from_settings(
    http: &Client,
    settings: &HashMap<String, String>,
) -> Vec<Box<dyn AlertChannel>> {
    let mut channels: Vec<Box<dyn AlertChannel>> = vec![Box::new(LogChannel)];

    match (
        setting_str(settings, &["TELEGRAM_BOT_TOKEN"]),
        setting_str(settings, &["TELEGRAM_CHAT_ID"]),
    ) {
        (Some(token), Some(chat_id)) => {
            let base_url =
                setting_str(settings, &["TELEGRAM_API_URL"]).unwrap_or(DEFAULT_TELEGRAM_API_URL);
            channels.push(Box::new(TelegramChannel::new(
                http.clone(),
                base_url,
                token,
                chat_id,
            )));
        }
        (None, None) => {}
        _ => warn!("Telegram alerts disabled: TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID must both be set"),
    }

    let twilio = [
        setting_str(settings, &["TWILIO_ACCOUNT_SID"]),
        setting_str(settings, &["TWILIO_AUTH_TOKEN"]),
        setting_str(settings, &["TWILIO_PHONE"]),
        setting_str(settings, &["MY_PHONE"]),
    ];
    match twilio {
        [Some(sid), Some(token), Some(from), Some(to)] => {
            let base_url =
                setting_str(settings, &["TWILIO_API_URL"]).unwrap_or(DEFAULT_TWILIO_API_URL);
            channels.push(Box::new(TwilioSmsChannel::new(
                http.clone(),
                base_url,
                sid,
                token,
                from,
                to,
            )));
        }
        [None, None, None, None] => {}
        _ => warn!(
            "SMS alerts disabled: TWILIO_ACCOUNT_SID, TWILIO_AUTH_TOKEN, TWILIO_PHONE and MY_PHONE must all be set"
        ),
    }

    channels
}

/// Sends to every channel. Failures are logged and never propagated.
pub async fn deliver_all(channels: &[Box<dyn AlertChannel>], subject: &str, body: &str) -> usize {
    let mut delivered = 0;
    for channel in channels {
        match channel.send(subject, body).await {
            Ok(()) => {
                delivered += 1;
                debug!("Alert delivered via {}", channel.name());
            }
            Err(err) => warn!("Alert delivery via {} failed: {:#}", channel.name(), err),
        }
    }
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn holding(ticker: &str, buy_price: f64) -> Holding {
        Holding {
            ticker: ticker.to_string(),
            qty: 10,
            buy_price,
        }
    }

    #[test]
    fn fires_when_profit_meets_threshold() {
        let evaluation = evaluate(&holding("AAA", 100.0), Some(105.0), 5.0).unwrap();
        assert!((evaluation.profit_pct - 5.0).abs() < 1e-9);
        assert!(evaluation.triggered());

        let evaluation = evaluate(&holding("AAA", 100.0), Some(104.99), 5.0).unwrap();
        assert_eq!(evaluation.status, AlertStatus::Hold);
    }

    #[test]
    fn skips_zero_buy_price_and_missing_current_price() {
        assert!(evaluate(&holding("AAA", 0.0), Some(10.0), 5.0).is_none());
        assert!(evaluate(&holding("AAA", 10.0), None, 5.0).is_none());
        assert!(evaluate(&holding("AAA", 10.0), Some(f64::NAN), 5.0).is_none());
    }

    #[test]
    fn compose_alert_lists_only_triggered_holdings() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        let evaluations = vec![
            evaluate(&holding("WIN", 100.0), Some(110.0), 5.0).unwrap(),
            evaluate(&holding("FLAT", 100.0), Some(101.0), 5.0).unwrap(),
        ];
        let (subject, body) = compose_alert(&evaluations, 5.0, date).unwrap();
        assert!(subject.contains("2024-06-03"));
        assert!(body.contains("WIN"));
        assert!(!body.contains("FLAT"));

        assert!(compose_alert(&evaluations[1..], 5.0, date).is_none());
    }

    #[test]
    fn watchlist_pairs_tickers_with_buy_prices() {
        let holdings = holdings_from_watchlist(
            "infy.ns, TCS.NS,SBIN.NS,INFY.NS",
            "INFY.NS:1500.5, tcs.ns : 3200,SBIN.NS:abc",
        );
        assert_eq!(
            holdings,
            vec![
                Holding {
                    ticker: "INFY.NS".to_string(),
                    qty: 0,
                    buy_price: 1500.5
                },
                Holding {
                    ticker: "TCS.NS".to_string(),
                    qty: 0,
                    buy_price: 3200.0
                },
            ]
        );
    }

    #[test]
    fn channels_require_complete_credentials() {
        let http = Client::new();
        let mut settings = HashMap::new();
        assert_eq!(channels_from_settings(&http, &settings).len(), 1);

        settings.insert("TELEGRAM_BOT_TOKEN".to_string(), "token".to_string());
        assert_eq!(channels_from_settings(&http, &settings).len(), 1);

        settings.insert("TELEGRAM_CHAT_ID".to_string(), "42".to_string());
        let channels = channels_from_settings(&http, &settings);
        let names: Vec<&str> = channels.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["log", "telegram"]);
    }

    struct FailingChannel;

    #[async_trait]
    impl AlertChannel for FailingChannel {
        fn name(&self) -> &str {
            "failing"
        }

        async fn send(&self, _subject: &str, _body: &str) -> Result<()> {
            Err(anyhow!("smtp unreachable"))
        }
    }

    struct RecordingChannel(Mutex<Vec<String>>);

    #[async_trait]
    impl AlertChannel for RecordingChannel {
        fn name(&self) -> &str {
            "recording"
        }

        async fn send(&self, subject: &str, _body: &str) -> Result<()> {
            self.0.lock().unwrap().push(subject.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn delivery_failures_do_not_stop_other_channels() {
        let channels: Vec<Box<dyn AlertChannel>> = vec![
            Box::new(FailingChannel),
            Box::new(RecordingChannel(Mutex::new(Vec::new()))),
        ];
        let delivered = deliver_all(&channels, "subject", "body").await;
        assert_eq!(delivered, 1);
    }
}
