use crate::alerts::{compose_alert, deliver_all, evaluate, holdings_from_watchlist, AlertEvaluation};
use crate::context::AppContext;
use crate::models::{Holding, PickRecord};
use crate::store::{load_pick, load_portfolio};
use anyhow::Result;
use chrono::Local;
use log::{info, warn};
use std::collections::HashSet;

/// Evaluates every known holding against the profit target and alerts once
/// when any of them reached it.
pub async fn run(app: &AppContext, target: Option<f64>) -> Result<Vec<AlertEvaluation>> {
    let threshold = target.unwrap_or(app.settings().target_profit_pct);
    let holdings = gather_holdings(app);
    if holdings.is_empty() {
        info!("No holdings to check: no pick, portfolio or watchlist with buy prices");
        return Ok(Vec::new());
    }

    info!(
        "Checking {} holding(s) against a {:.2}% profit target",
        holdings.len(),
        threshold
    );

    let mut evaluations = Vec::new();
    for holding in &holdings {
        let current = app.fetcher().latest_price(&holding.ticker).await;
        match evaluate(holding, current, threshold) {
            Some(evaluation) => {
                info!("{}", evaluation.describe());
                evaluations.push(evaluation);
            }
            None => warn!("Could not evaluate {}", holding.ticker),
        }
    }

    if let Some((subject, body)) = compose_alert(&evaluations, threshold, Local::now().date_naive()) {
        let delivered = deliver_all(app.channels(), &subject, &body).await;
        info!(
            "Target alert delivered via {}/{} channel(s)",
            delivered,
            app.channels().len()
        );
    } else {
        info!("No holding reached the {:.2}% target", threshold);
    }

    Ok(evaluations)
}

/// Pick first, then the saved portfolio, then the watchlist. The first source
/// to mention a ticker wins.
fn gather_holdings(app: &AppContext) -> Vec<Holding> {
    let settings = app.settings();
    let mut holdings = Vec::new();

    match load_pick(&settings.pick_file) {
        Ok(Some(PickRecord::Selected(pick))) if pick.price > 0.0 => holdings.push(Holding {
            ticker: pick.ticker,
            qty: pick.qty,
            buy_price: pick.price,
        }),
        Ok(_) => {}
        Err(err) => warn!("Ignoring unreadable pick file: {:#}", err),
    }

    match load_portfolio(&settings.portfolio_file) {
        Ok(Some(portfolio)) => holdings.extend(portfolio.holdings()),
        Ok(None) => {}
        Err(err) => warn!("Ignoring unreadable portfolio file: {:#}", err),
    }

    if let Some(watchlist) = app.env_value("WATCHLIST") {
        let buy_prices = app.env_value("BUY_PRICES").unwrap_or("");
        holdings.extend(holdings_from_watchlist(watchlist, buy_prices));
    }

    let mut seen = HashSet::new();
    holdings.retain(|holding| seen.insert(holding.ticker.clone()));
    holdings
}
