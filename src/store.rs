//! File-backed stores for the daily pick, the ranked candidates and the
//! advised portfolio.

use crate::allocation::PricedTicker;
use crate::models::{round2, Allocation, Candidate, Holding, Pick, PickRecord};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Local, NaiveDate, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Writes through a sibling temp file that is synced and renamed over `path`.
/// The temp file is removed if any step fails.
pub fn write_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let temp_path = temp_path_for(path)?;

    let outcome = (|| -> Result<()> {
        let file = File::create(&temp_path)
            .with_context(|| format!("Failed to create {}", temp_path.display()))?;
        let mut writer = BufWriter::new(file);
        write(&mut writer)?;
        writer.flush().context("Failed to flush temp file")?;
        let file = writer
            .into_inner()
            .map_err(|err| anyhow!("Failed to finish temp file: {}", err.error()))?;
        file.sync_all().context("Failed to sync temp file")?;
        fs::rename(&temp_path, path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    })();

    if outcome.is_err() && temp_path.exists() {
        if let Err(err) = fs::remove_file(&temp_path) {
            warn!("Failed to remove {}: {}", temp_path.display(), err);
        }
    }
    outcome
}

fn temp_path_for(path: &Path) -> Result<PathBuf> {
    let mut name = path
        .file_name()
        .ok_or_else(|| anyhow!("{} is not a file path", path.display()))?
        .to_os_string();
    name.push(".tmp");
    Ok(path.with_file_name(name))
}

// ---------------------------------------------------------------------------
// Pick store
// ---------------------------------------------------------------------------

pub fn save_pick(path: &Path, record: &PickRecord) -> Result<()> {
    let value = match record {
        PickRecord::Selected(pick) => serde_json::to_value(pick).context("Failed to encode pick")?,
        PickRecord::NoPick { date, reason } => json!({
            "date": date,
            "ticker": Value::Null,
            "message": reason,
        }),
    };
    write_atomic(path, |writer| {
        serde_json::to_writer_pretty(&mut *writer, &value).context("Failed to write pick")?;
        writer.write_all(b"\n")?;
        Ok(())
    })?;
    info!("Saved pick to {}", path.display());
    Ok(())
}

/// Reads the pick file, tolerating older layouts. A missing file is `Ok(None)`.
pub fn load_pick(path: &Path) -> Result<Option<PickRecord>> {
    if !path.exists() {
        debug!("No pick file at {}", path.display());
        return Ok(None);
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read pick file {}", path.display()))?;
    let value: Value = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse pick file {}", path.display()))?;
    let object = value
        .as_object()
        .ok_or_else(|| anyhow!("Pick file {} is not a JSON object", path.display()))?;
    Ok(Some(pick_from_object(object)))
}

fn pick_from_object(object: &Map<String, Value>) -> PickRecord {
    let nested = object.get("best_stock").and_then(Value::as_object);
    let lookup = |keys: &[&str]| {
        field(object, keys).or_else(|| nested.and_then(|inner| field(inner, keys)))
    };

    let date = lookup(&["date", "timestamp"])
        .and_then(value_date)
        .unwrap_or_else(|| Local::now().date_naive());

    let ticker = lookup(&["ticker", "symbol"])
        .and_then(Value::as_str)
        .and_then(crate::tickers::normalize_ticker_symbol);
    let Some(ticker) = ticker else {
        let reason = lookup(&["message", "reason"])
            .and_then(Value::as_str)
            .unwrap_or("no ticker recorded")
            .to_string();
        return PickRecord::NoPick { date, reason };
    };

    let number = |keys: &[&str]| lookup(keys).and_then(value_f64);
    let price = number(&["price", "latest", "buy_price", "close"]).unwrap_or(0.0);
    let qty = number(&["qty", "quantity"])
        .filter(|qty| *qty > 0.0)
        .map(|qty| qty.floor() as u64)
        .unwrap_or(0);

    PickRecord::Selected(Pick {
        date,
        ticker,
        price,
        momentum: number(&["momentum", "change"]).unwrap_or(0.0),
        score: number(&["score"]).unwrap_or(0.0),
        qty,
        cost: number(&["cost"]).unwrap_or(qty as f64 * price),
        invest_amount: number(&["invest_amount", "investment"]).unwrap_or(0.0),
        target_price: number(&["target_price", "target"]),
        stop_loss: number(&["stop_loss"]),
        scoring: lookup(&["scoring"])
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

/// First non-null value among `keys`.
fn field<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .find_map(|key| object.get(*key).filter(|value| !value.is_null()))
}

fn value_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn value_date(value: &Value) -> Option<NaiveDate> {
    let text = value.as_str()?.trim();
    let prefix = text.get(..10).unwrap_or(text);
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
}

// ---------------------------------------------------------------------------
// Candidates store
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct CandidateRow {
    ticker: String,
    latest: f64,
    momentum: f64,
    vol_std: f64,
    avg_vol: f64,
    score: f64,
}

impl From<&Candidate> for CandidateRow {
    fn from(candidate: &Candidate) -> Self {
        Self {
            ticker: candidate.ticker.clone(),
            latest: candidate.latest_price,
            momentum: candidate.momentum_pct,
            vol_std: candidate.volatility,
            avg_vol: candidate.avg_volume,
            score: candidate.score,
        }
    }
}

impl From<CandidateRow> for Candidate {
    fn from(row: CandidateRow) -> Self {
        Self {
            ticker: row.ticker,
            latest_price: row.latest,
            momentum_pct: row.momentum,
            volatility: row.vol_std,
            avg_volume: row.avg_vol,
            score: row.score,
        }
    }
}

/// Writes the first `limit` of the already ranked candidates. The header is
/// written even when there are none.
pub fn save_candidates(path: &Path, ranked: &[Candidate], limit: usize) -> Result<()> {
    let rows = &ranked[..limit.min(ranked.len())];
    write_atomic(path, |writer| {
        let mut csv_writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(&mut *writer);
        csv_writer.write_record(["ticker", "latest", "momentum", "vol_std", "avg_vol", "score"])?;
        for candidate in rows {
            csv_writer.serialize(CandidateRow::from(candidate))?;
        }
        csv_writer.flush()?;
        Ok(())
    })?;
    info!("Saved {} candidates to {}", rows.len(), path.display());
    Ok(())
}

/// Reads up to `limit` candidates in file order. A missing file is `Ok(None)`.
pub fn load_candidates(path: &Path, limit: usize) -> Result<Option<Vec<Candidate>>> {
    if !path.exists() {
        return Ok(None);
    }
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open candidates file {}", path.display()))?;
    let mut candidates = Vec::new();
    for row in reader.deserialize::<CandidateRow>() {
        if candidates.len() >= limit {
            break;
        }
        let row = row.with_context(|| format!("Malformed row in {}", path.display()))?;
        candidates.push(Candidate::from(row));
    }
    Ok(Some(candidates))
}

// ---------------------------------------------------------------------------
// Portfolio store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub ticker: String,
    pub qty: u64,
    pub price: f64,
}

/// An advised allocation with buy prices, kept for later target checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub timestamp: DateTime<Utc>,
    pub mode: String,
    pub budget: f64,
    pub leftover: f64,
    pub positions: Vec<Position>,
}

impl Portfolio {
    pub fn from_allocation(
        mode: &str,
        budget: f64,
        allocation: &Allocation,
        tickers: &[PricedTicker],
        timestamp: DateTime<Utc>,
    ) -> Self {
        let positions = tickers
            .iter()
            .map(|entry| Position {
                ticker: entry.ticker.clone(),
                qty: allocation.quantity(&entry.ticker),
                price: round2(entry.price),
            })
            .collect();
        Self {
            timestamp,
            mode: mode.to_string(),
            budget,
            leftover: round2(allocation.leftover),
            positions,
        }
    }

    /// Positions that actually hold shares.
    pub fn holdings(&self) -> Vec<Holding> {
        self.positions
            .iter()
            .filter(|position| position.qty > 0)
            .map(|position| Holding {
                ticker: position.ticker.clone(),
                qty: position.qty,
                buy_price: position.price,
            })
            .collect()
    }
}

pub fn save_portfolio(path: &Path, portfolio: &Portfolio) -> Result<()> {
    write_atomic(path, |writer| {
        serde_json::to_writer_pretty(&mut *writer, portfolio)
            .context("Failed to write portfolio")?;
        writer.write_all(b"\n")?;
        Ok(())
    })?;
    info!("Saved portfolio to {}", path.display());
    Ok(())
}

pub fn load_portfolio(path: &Path) -> Result<Option<Portfolio>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read portfolio file {}", path.display()))?;
    let portfolio = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse portfolio file {}", path.display()))?;
    Ok(Some(portfolio))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()
    }

    fn sample_pick() -> Pick {
        Pick {
            date: date(),
            ticker: "INFY.NS".to_string(),
            price: 104.0,
            momentum: 4.0,
            score: 12.5,
            qty: 96,
            cost: 9_984.0,
            invest_amount: 10_000.0,
            target_price: Some(106.08),
            stop_loss: Some(103.17),
            scoring: Some("volatility_adjusted".to_string()),
        }
    }

    fn write_file(path: &Path, contents: &str) {
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn saved_pick_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("today_pick.json");
        let record = PickRecord::Selected(sample_pick());
        save_pick(&path, &record).unwrap();
        assert_eq!(load_pick(&path).unwrap(), Some(record));
        assert!(!dir.path().join("today_pick.json.tmp").exists());
    }

    #[test]
    fn no_pick_is_written_with_null_ticker_and_message() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pick.json");
        let record = PickRecord::NoPick {
            date: date(),
            reason: "no candidates".to_string(),
        };
        save_pick(&path, &record).unwrap();

        let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw["ticker"].is_null());
        assert_eq!(raw["message"], "no candidates");
        assert_eq!(load_pick(&path).unwrap(), Some(record));
    }

    #[test]
    fn missing_pick_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_pick(&dir.path().join("absent.json")).unwrap().is_none());
    }

    #[test]
    fn legacy_pick_layouts_are_understood() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pick.json");

        write_file(
            &path,
            r#"{"date": "2024-05-31", "symbol": "tcs.ns", "latest": "3200.5", "change": 1.25}"#,
        );
        let pick = load_pick(&path).unwrap().unwrap();
        let pick = pick.pick().unwrap();
        assert_eq!(pick.ticker, "TCS.NS");
        assert_eq!(pick.price, 3200.5);
        assert_eq!(pick.momentum, 1.25);
        assert_eq!(pick.qty, 0);
        assert_eq!(pick.date, NaiveDate::from_ymd_opt(2024, 5, 31).unwrap());

        write_file(
            &path,
            r#"{"timestamp": "2024-05-30T09:15:00", "best_stock": {"ticker": "SBIN.NS", "close": 812.4}}"#,
        );
        let pick = load_pick(&path).unwrap().unwrap();
        let pick = pick.pick().unwrap();
        assert_eq!(pick.ticker, "SBIN.NS");
        assert_eq!(pick.price, 812.4);
        assert_eq!(pick.date, NaiveDate::from_ymd_opt(2024, 5, 30).unwrap());
    }

    #[test]
    fn pick_without_ticker_reads_as_no_pick() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pick.json");
        write_file(&path, r#"{"date": "2024-06-03", "price": 10}"#);
        match load_pick(&path).unwrap().unwrap() {
            PickRecord::NoPick { reason, .. } => assert_eq!(reason, "no ticker recorded"),
            other => panic!("expected NoPick, got {:?}", other),
        }
    }

    #[test]
    fn failed_write_keeps_previous_file_and_removes_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pick.json");
        write_file(&path, "previous");

        let result = write_atomic(&path, |writer| {
            writer.write_all(b"partial")?;
            Err(anyhow!("serialization failed"))
        });
        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "previous");
        assert!(!dir.path().join("pick.json.tmp").exists());
    }

    #[test]
    fn candidates_are_limited_and_keep_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("candidates.csv");
        let ranked: Vec<Candidate> = (0..5)
            .map(|idx| Candidate {
                ticker: format!("T{idx}"),
                latest_price: 10.0 + idx as f64,
                momentum_pct: 1.5,
                volatility: 0.02,
                avg_volume: 50_000.0,
                score: 10.0 - idx as f64,
            })
            .collect();
        save_candidates(&path, &ranked, 3).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("ticker,latest,momentum,vol_std,avg_vol,score\n"));
        let loaded = load_candidates(&path, 10).unwrap().unwrap();
        assert_eq!(loaded, ranked[..3].to_vec());
        assert_eq!(load_candidates(&path, 2).unwrap().unwrap().len(), 2);

        save_candidates(&path, &[], 3).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "ticker,latest,momentum,vol_std,avg_vol,score\n"
        );
        assert!(load_candidates(&path, 3).unwrap().unwrap().is_empty());
    }

    #[test]
    fn portfolio_keeps_buy_prices_for_held_positions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portfolio.json");
        let tickers = vec![
            PricedTicker {
                ticker: "LOW".to_string(),
                price: 250.0,
                momentum_pct: 0.0,
            },
            PricedTicker {
                ticker: "HIGH".to_string(),
                price: 600.0,
                momentum_pct: 0.0,
            },
        ];
        let mut allocation = Allocation::default();
        allocation.shares.insert("LOW".to_string(), 2);
        allocation.shares.insert("HIGH".to_string(), 0);
        allocation.spent = 500.0;
        allocation.leftover = 500.0;

        let timestamp = Utc.with_ymd_and_hms(2024, 6, 3, 10, 0, 0).unwrap();
        let portfolio = Portfolio::from_allocation("minimum", 1_000.0, &allocation, &tickers, timestamp);
        save_portfolio(&path, &portfolio).unwrap();

        let loaded = load_portfolio(&path).unwrap().unwrap();
        assert_eq!(loaded, portfolio);
        assert_eq!(
            loaded.holdings(),
            vec![Holding {
                ticker: "LOW".to_string(),
                qty: 2,
                buy_price: 250.0
            }]
        );
        assert!(load_portfolio(&dir.path().join("none.json")).unwrap().is_none());
    }
}
