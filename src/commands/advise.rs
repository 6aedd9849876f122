use crate::allocation::{allocate, PricedTicker};
use crate::config::AllocationMode;
use crate::context::AppContext;
use crate::models::Allocation;
use crate::scoring::{create_strategy, score_series, ScorerConfig};
use crate::store::{load_candidates, save_portfolio, Portfolio};
use crate::tickers::normalize_ticker_symbol;
use anyhow::{anyhow, Result};
use chrono::Utc;
use log::{info, warn};
use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
pub struct AdviseOptions {
    /// Explicit tickers; ignored when `from_candidates` is set.
    pub tickers: Vec<String>,
    pub from_candidates: Option<usize>,
    pub amount: Option<f64>,
    pub mode: Option<AllocationMode>,
    pub save: bool,
}

#[derive(Debug, Clone)]
pub struct Advice {
    pub mode: AllocationMode,
    pub budget: f64,
    pub priced: Vec<PricedTicker>,
    pub allocation: Allocation,
    pub failed: Vec<(String, String)>,
}

pub async fn run(app: &AppContext, options: &AdviseOptions) -> Result<Advice> {
    let settings = app.settings();
    let budget = options.amount.unwrap_or(settings.invest_amount);
    let mode = options.mode.unwrap_or(settings.allocation_mode);
    let tickers = resolve_tickers(app, options)?;

    info!(
        "Advising {} tickers with a budget of {:.2} ({} policy)",
        tickers.len(),
        budget,
        mode.label()
    );

    // Liquidity is the scan's concern; here every ticker with a price counts.
    let config = ScorerConfig {
        lookback_days: settings.lookback_days,
        min_avg_volume: 0.0,
    };
    let strategy = create_strategy(settings.scoring_method);

    let mut priced = Vec::new();
    let mut failed = Vec::new();
    for (ticker, outcome) in app
        .fetcher()
        .fetch_batch(&tickers, settings.lookback_days)
        .await
    {
        let series = match outcome {
            Ok(series) => series,
            Err(err) => {
                warn!("Skipping {}: {}", ticker, err);
                failed.push((ticker, err.to_string()));
                continue;
            }
        };
        match score_series(&series, &config, strategy.as_ref()) {
            Ok(candidate) => priced.push(PricedTicker::from(&candidate)),
            Err(rejection) => {
                warn!("Skipping {}: {}", ticker, rejection);
                failed.push((ticker, rejection.to_string()));
            }
        }
    }

    let allocation = allocate(mode, budget, &priced)?;
    print_table(&priced, &allocation, &failed);

    if options.save {
        let portfolio = Portfolio::from_allocation(mode.label(), budget, &allocation, &priced, Utc::now());
        save_portfolio(&settings.portfolio_file, &portfolio)?;
    }

    Ok(Advice {
        mode,
        budget,
        priced,
        allocation,
        failed,
    })
}

fn resolve_tickers(app: &AppContext, options: &AdviseOptions) -> Result<Vec<String>> {
    let tickers: Vec<String> = if let Some(count) = options.from_candidates {
        let path = &app.settings().candidates_file;
        let candidates = load_candidates(path, count)?.ok_or_else(|| {
            anyhow!(
                "Candidates file {} not found; run `scan` first",
                path.display()
            )
        })?;
        candidates.into_iter().map(|candidate| candidate.ticker).collect()
    } else {
        let mut seen = HashSet::new();
        options
            .tickers
            .iter()
            .flat_map(|raw| raw.split(','))
            .filter_map(normalize_ticker_symbol)
            .filter(|ticker| seen.insert(ticker.clone()))
            .collect()
    };

    if tickers.is_empty() {
        return Err(anyhow!(
            "No tickers to advise on; pass tickers or --from-candidates"
        ));
    }
    Ok(tickers)
}

fn print_table(priced: &[PricedTicker], allocation: &Allocation, failed: &[(String, String)]) {
    println!(
        "{:<14} {:>8} {:>12} {:>14}",
        "Ticker", "Qty", "Price", "Cost"
    );
    for entry in priced {
        let qty = allocation.quantity(&entry.ticker);
        println!(
            "{:<14} {:>8} {:>12.2} {:>14.2}",
            entry.ticker,
            qty,
            entry.price,
            qty as f64 * entry.price
        );
    }
    println!("Total cost:  {:.2}", allocation.spent);
    println!("Unused cash: {:.2}", allocation.leftover);
    if !failed.is_empty() {
        println!("Skipped:");
        for (ticker, reason) in failed {
            println!("  {}: {}", ticker, reason);
        }
    }
}
