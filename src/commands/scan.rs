use crate::context::AppContext;
use crate::models::PickRecord;
use crate::scanner::{build_pick_record, Scanner};
use crate::store::{save_candidates, save_pick};
use crate::tickers::load_tickers;
use anyhow::{Context, Result};
use chrono::Local;
use log::{info, warn};

pub async fn run(app: &AppContext, show_progress: bool) -> Result<PickRecord> {
    let settings = app.settings();
    let tickers = load_tickers(&settings.tickers_file)
        .context("Cannot scan without a ticker list")?;
    if tickers.is_empty() {
        warn!(
            "Ticker list {} is empty; writing an empty result",
            settings.tickers_file.display()
        );
    }

    let scanner = Scanner::new(app.fetcher(), settings).with_progress(show_progress);
    info!(
        "Scanning {} tickers from {} ({} scoring, {} day lookback, batches of {})",
        tickers.len(),
        settings.tickers_file.display(),
        scanner.strategy_name(),
        settings.lookback_days,
        settings.batch_size
    );

    let report = scanner.scan(&tickers).await;
    report.log_summary(settings.top_n);

    let record = build_pick_record(&report.ranked, settings, Local::now().date_naive());
    save_pick(&settings.pick_file, &record)?;
    save_candidates(
        &settings.candidates_file,
        &report.ranked,
        settings.candidates_limit,
    )?;

    match &record {
        PickRecord::Selected(pick) => info!(
            "Today's pick: {} at {:.2} (momentum {:.2}%), buy {} for {:.2} of {:.2}",
            pick.ticker, pick.price, pick.momentum, pick.qty, pick.cost, pick.invest_amount
        ),
        PickRecord::NoPick { reason, .. } => warn!("No pick today: {}", reason),
    }

    Ok(record)
}
