use crate::allocation::allocate_single;
use crate::config::Settings;
use crate::fetcher::PriceFetcher;
use crate::models::{round2, Candidate, Pick, PickRecord, Rejection};
use crate::ranking;
use crate::scoring::{create_strategy, score_series, ScorerConfig, ScoringStrategy};
use chrono::NaiveDate;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use std::time::Duration;

/// Outcome of one pass over the ticker list.
#[derive(Debug, Default)]
pub struct ScanReport {
    pub scanned: usize,
    /// Ranked best first.
    pub ranked: Vec<Candidate>,
    pub rejections: Vec<(String, Rejection)>,
    pub fetch_failures: Vec<(String, String)>,
}

impl ScanReport {
    pub fn best(&self) -> Option<&Candidate> {
        self.ranked.first()
    }

    pub fn log_summary(&self, top_n: usize) {
        info!(
            "Scanned {} tickers: {} candidates, {} rejected, {} fetch failures",
            self.scanned,
            self.ranked.len(),
            self.rejections.len(),
            self.fetch_failures.len()
        );
        for (idx, candidate) in ranking::top_n(&self.ranked, top_n).iter().enumerate() {
            info!(
                "#{:<2} {:<14} price {:>10.2}  momentum {:>7.2}%  vol {:.4}  avg vol {:>12.0}  score {:.4}",
                idx + 1,
                candidate.ticker,
                candidate.latest_price,
                candidate.momentum_pct,
                candidate.volatility,
                candidate.avg_volume,
                candidate.score
            );
        }
    }
}

pub struct Scanner<'a> {
    fetcher: &'a dyn PriceFetcher,
    strategy: Box<dyn ScoringStrategy + Send + Sync>,
    config: ScorerConfig,
    batch_size: usize,
    batch_delay: Duration,
    batch_jitter_ms: u64,
    show_progress: bool,
}

impl<'a> Scanner<'a> {
    pub fn new(fetcher: &'a dyn PriceFetcher, settings: &Settings) -> Self {
        Self {
            fetcher,
            strategy: create_strategy(settings.scoring_method),
            config: ScorerConfig {
                lookback_days: settings.lookback_days,
                min_avg_volume: settings.min_avg_volume,
            },
            batch_size: settings.batch_size.max(1),
            batch_delay: Duration::from_millis(settings.batch_delay_ms),
            batch_jitter_ms: settings.batch_jitter_ms,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }

    /// Fetches batches one after another and scores every series that arrives.
    pub async fn scan(&self, tickers: &[String]) -> ScanReport {
        let progress = self.progress_bar(tickers.len());
        let mut report = ScanReport {
            scanned: tickers.len(),
            ..ScanReport::default()
        };
        let mut candidates = Vec::new();
        let batch_count = tickers.len().div_ceil(self.batch_size);

        for (batch_idx, batch) in tickers.chunks(self.batch_size).enumerate() {
            debug!(
                "Fetching batch {}/{} ({} tickers)",
                batch_idx + 1,
                batch_count,
                batch.len()
            );
            let results = self
                .fetcher
                .fetch_batch(batch, self.config.lookback_days)
                .await;

            for (ticker, outcome) in results {
                progress.inc(1);
                let series = match outcome {
                    Ok(series) => series,
                    Err(err) => {
                        warn!("Skipping {}: {}", ticker, err);
                        report.fetch_failures.push((ticker, err.to_string()));
                        continue;
                    }
                };
                match score_series(&series, &self.config, self.strategy.as_ref()) {
                    Ok(candidate) => candidates.push(candidate),
                    Err(rejection) => {
                        debug!("Rejected {}: {}", ticker, rejection);
                        report.rejections.push((ticker, rejection));
                    }
                }
            }

            if batch_idx + 1 < batch_count {
                self.pause_between_batches().await;
            }
        }

        progress.finish_with_message("Scan completed");
        report.ranked = ranking::rank(candidates);
        report
    }

    async fn pause_between_batches(&self) {
        let jitter = if self.batch_jitter_ms > 0 {
            fastrand::u64(0..=self.batch_jitter_ms)
        } else {
            0
        };
        let delay = self.batch_delay + Duration::from_millis(jitter);
        if !delay.is_zero() {
            debug!("Sleeping {}ms before next batch", delay.as_millis());
            tokio::time::sleep(delay).await;
        }
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        match ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
        {
            Ok(style) => pb.set_style(style.progress_chars("#>-")),
            Err(err) => debug!("Falling back to default progress style: {}", err),
        }
        pb
    }
}

/// Sizes the best candidate into a pick, or explains why there is none.
pub fn build_pick_record(ranked: &[Candidate], settings: &Settings, date: NaiveDate) -> PickRecord {
    let Some(best) = ranking::best(ranked) else {
        return PickRecord::NoPick {
            date,
            reason: "no ticker passed the volume and data filters".to_string(),
        };
    };

    // Size from the stored price so qty * price never exceeds the budget.
    let price = round2(best.latest_price);
    let position = match allocate_single(settings.invest_amount, price) {
        Ok(position) => position,
        Err(err) => {
            return PickRecord::NoPick {
                date,
                reason: format!("could not size {}: {}", best.ticker, err),
            }
        }
    };

    PickRecord::Selected(Pick {
        date,
        ticker: best.ticker.clone(),
        price,
        momentum: round2(best.momentum_pct),
        score: best.score,
        qty: position.qty,
        cost: round2(position.qty as f64 * price),
        invest_amount: settings.invest_amount,
        target_price: Some(round2(price * (1.0 + settings.target_gain_pct / 100.0))),
        stop_loss: Some(round2(price * (1.0 - settings.stop_loss_pct / 100.0))),
        scoring: Some(settings.scoring_method.label().to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::FetchError;
    use crate::models::PriceSeries;
    use crate::scoring::test_support::series;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct StubFetcher {
        series: HashMap<String, PriceSeries>,
        calls: Mutex<Vec<String>>,
    }

    impl StubFetcher {
        fn new(entries: Vec<PriceSeries>) -> Self {
            Self {
                series: entries
                    .into_iter()
                    .map(|s| (s.ticker.clone(), s))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PriceFetcher for StubFetcher {
        async fn fetch(&self, ticker: &str, _lookback_days: usize) -> Result<PriceSeries, FetchError> {
            self.calls.lock().unwrap().push(ticker.to_string());
            self.series.get(ticker).cloned().ok_or_else(|| FetchError::Empty {
                ticker: ticker.to_string(),
            })
        }
    }

    fn quiet_settings() -> Settings {
        Settings {
            batch_size: 2,
            batch_delay_ms: 0,
            batch_jitter_ms: 0,
            ..Settings::default()
        }
    }

    fn tickers(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[tokio::test]
    async fn scan_ranks_survivors_and_records_skips() {
        let fetcher = StubFetcher::new(vec![
            series("UP", &[100.0, 102.0, 101.0, 105.0, 104.0], 50_000.0),
            series("DOWN", &[100.0, 99.0, 98.5, 97.0, 96.0], 50_000.0),
            series("THIN", &[10.0, 11.0, 12.0], 500.0),
            series("ONE", &[10.0], 90_000.0),
        ]);
        let settings = quiet_settings();
        let scanner = Scanner::new(&fetcher, &settings);
        let report = scanner
            .scan(&tickers(&["UP", "DOWN", "THIN", "ONE", "GONE"]))
            .await;

        assert_eq!(report.scanned, 5);
        let order: Vec<&str> = report.ranked.iter().map(|c| c.ticker.as_str()).collect();
        assert_eq!(order, vec!["UP", "DOWN"]);
        assert_eq!(report.best().map(|c| c.ticker.as_str()), Some("UP"));

        let rejected: Vec<(&str, &str)> = report
            .rejections
            .iter()
            .map(|(ticker, rejection)| (ticker.as_str(), rejection.label()))
            .collect();
        assert_eq!(rejected, vec![("THIN", "low_volume"), ("ONE", "too_few_bars")]);
        assert_eq!(report.fetch_failures.len(), 1);
        assert_eq!(report.fetch_failures[0].0, "GONE");

        let calls = fetcher.calls.lock().unwrap().clone();
        assert_eq!(calls, tickers(&["UP", "DOWN", "THIN", "ONE", "GONE"]));
    }

    #[tokio::test]
    async fn scan_of_empty_list_is_empty() {
        let fetcher = StubFetcher::new(Vec::new());
        let settings = quiet_settings();
        let report = Scanner::new(&fetcher, &settings).scan(&[]).await;
        assert!(report.ranked.is_empty());
        assert!(report.best().is_none());
    }

    #[test]
    fn pick_is_sized_with_targets() {
        let settings = Settings::default();
        let ranked = vec![Candidate {
            ticker: "AAA".to_string(),
            latest_price: 104.0,
            momentum_pct: 4.0,
            volatility: 0.02,
            avg_volume: 50_000.0,
            score: 3.2,
        }];
        let date = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        let record = build_pick_record(&ranked, &settings, date);
        let pick = record.pick().unwrap();
        assert_eq!(pick.ticker, "AAA");
        assert_eq!(pick.qty, 96);
        assert_eq!(pick.cost, 9_984.0);
        assert_eq!(pick.target_price, Some(106.08));
        assert_eq!(pick.stop_loss, Some(103.17));
        assert_eq!(pick.scoring.as_deref(), Some("volatility_adjusted"));
        assert!(pick.qty as f64 * pick.price <= pick.invest_amount);
    }

    #[test]
    fn pick_is_sized_from_the_rounded_price() {
        let settings = Settings::default();
        let ranked = vec![Candidate {
            ticker: "HEAVY".to_string(),
            latest_price: 1_666.666,
            momentum_pct: 1.0,
            volatility: 0.01,
            avg_volume: 50_000.0,
            score: 1.0,
        }];
        let date = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        let record = build_pick_record(&ranked, &settings, date);
        let pick = record.pick().unwrap();
        assert_eq!(pick.price, 1_666.67);
        assert_eq!(pick.qty, 5);
        assert!(pick.qty as f64 * pick.price <= pick.invest_amount);
        assert!((pick.cost - pick.qty as f64 * pick.price).abs() < 1e-6);
    }

    #[test]
    fn no_candidates_yields_no_pick() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        let record = build_pick_record(&[], &Settings::default(), date);
        assert!(matches!(record, PickRecord::NoPick { .. }));
        assert_eq!(record.date(), date);
    }
}
